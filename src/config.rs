//! Configuration management for HabitStake

use crate::error::LedgerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub missions: MissionConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Annual yield rate as a fraction (0.10 = 10%/yr)
    #[serde(default = "default_annual_rate")]
    pub annual_rate: f64,
    #[serde(default = "default_lock_days")]
    pub lock_days: i64,
    /// Most recent transactions kept; 0 keeps everything
    #[serde(default = "default_transaction_log_cap")]
    pub transaction_log_cap: usize,
    /// Ceiling for a single voluntary stake; 0 disables it
    #[serde(default = "default_max_stake_per_call")]
    pub max_stake_per_call: f64,
    #[serde(default = "default_seed_balance")]
    pub seed_balance: f64,
    #[serde(default = "default_accrual_period_secs")]
    pub accrual_period_secs: u64,
    #[serde(default = "default_max_catch_up_minutes")]
    pub max_catch_up_minutes: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            annual_rate: default_annual_rate(),
            lock_days: default_lock_days(),
            transaction_log_cap: default_transaction_log_cap(),
            max_stake_per_call: default_max_stake_per_call(),
            seed_balance: default_seed_balance(),
            accrual_period_secs: default_accrual_period_secs(),
            max_catch_up_minutes: default_max_catch_up_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_save_attempts")]
    pub save_attempts: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            save_attempts: default_save_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Backend nodes tried in order at start-up
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// Central reserve available to the development backend
    #[serde(default = "default_reserve")]
    pub reserve: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            endpoints: default_endpoints(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff_ms(),
            reserve: default_reserve(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let ledger = &self.ledger;
        if !ledger.annual_rate.is_finite() || ledger.annual_rate < 0.0 {
            return Err(LedgerError::ConfigError(
                "ledger.annual_rate must be a non-negative number".to_string(),
            ));
        }
        if ledger.lock_days <= 0 {
            return Err(LedgerError::ConfigError(
                "ledger.lock_days must be at least 1".to_string(),
            ));
        }
        if !ledger.max_stake_per_call.is_finite() || ledger.max_stake_per_call < 0.0 {
            return Err(LedgerError::ConfigError(
                "ledger.max_stake_per_call must be zero or positive".to_string(),
            ));
        }
        if !ledger.seed_balance.is_finite() || ledger.seed_balance < 0.0 {
            return Err(LedgerError::ConfigError(
                "ledger.seed_balance must be zero or positive".to_string(),
            ));
        }
        if ledger.accrual_period_secs == 0 {
            return Err(LedgerError::ConfigError(
                "ledger.accrual_period_secs must be at least 1".to_string(),
            ));
        }
        if self.database.path.is_empty() {
            return Err(LedgerError::ConfigError(
                "database.path must be set in config.toml".to_string(),
            ));
        }
        if self.relay.connect_attempts == 0 {
            return Err(LedgerError::ConfigError(
                "relay.connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `config.toml` from the working directory, using defaults when absent.
pub fn load_config() -> Result<Config, LedgerError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

pub fn load_config_from<P: AsRef<Path>>(path: P) -> Result<Config, LedgerError> {
    let config_str = fs::read_to_string(path.as_ref()).unwrap_or_default();
    let config = parse_config(&config_str)?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config, LedgerError> {
    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(config_str)?
    };
    config.validate()?;
    Ok(config)
}

fn default_annual_rate() -> f64 {
    0.10
}

fn default_lock_days() -> i64 {
    90
}

fn default_transaction_log_cap() -> usize {
    50
}

fn default_max_stake_per_call() -> f64 {
    10_000.0
}

fn default_seed_balance() -> f64 {
    100.0
}

fn default_accrual_period_secs() -> u64 {
    60
}

fn default_max_catch_up_minutes() -> u32 {
    24 * 60
}

fn default_db_path() -> String {
    "./data/habitstake.db".to_string()
}

fn default_save_attempts() -> u32 {
    2
}

fn default_catalog_path() -> String {
    "./missions.json".to_string()
}

fn default_relay_port() -> u16 {
    3001
}

fn default_endpoints() -> Vec<String> {
    vec!["reserve://primary".to_string()]
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_backoff_ms() -> u64 {
    2000
}

fn default_reserve() -> f64 {
    1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.ledger.lock_days, 90);
        assert_eq!(config.ledger.transaction_log_cap, 50);
        assert!((config.ledger.annual_rate - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.relay.connect_attempts, 3);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = parse_config(
            r#"
            [ledger]
            annual_rate = 3.0
            transaction_log_cap = 0

            [relay]
            endpoints = ["reserve://a", "reserve://b"]
            "#,
        )
        .unwrap();
        assert!((config.ledger.annual_rate - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.ledger.transaction_log_cap, 0);
        assert_eq!(config.ledger.lock_days, 90);
        assert_eq!(config.relay.endpoints.len(), 2);
        assert_eq!(config.database.path, "./data/habitstake.db");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_config("[ledger]\nannual_rate = -0.5").is_err());
        assert!(parse_config("[ledger]\nlock_days = 0").is_err());
        assert!(parse_config("[database]\npath = \"\"").is_err());
        assert!(matches!(
            parse_config("[ledger\n"),
            Err(LedgerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_from("/nonexistent/habitstake/config.toml").unwrap();
        assert_eq!(config.relay.port, 3001);
    }
}
