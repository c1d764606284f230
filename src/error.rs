//! Error types for HabitStake

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    InvalidAmount(String),
    InsufficientBalance(String),
    LimitExceeded(String),
    Locked(DateTime<Utc>),
    NotFound(String),
    AlreadyCompleted(String),
    TransferFailed(String),
    DatabaseError(String),
    IoError(String),
    ConfigError(String),
    SerializationError(String),
}

impl LedgerError {
    /// True for the validation failures a user can correct and retry.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount(_)
                | LedgerError::InsufficientBalance(_)
                | LedgerError::LimitExceeded(_)
                | LedgerError::Locked(_)
                | LedgerError::NotFound(_)
                | LedgerError::AlreadyCompleted(_)
                | LedgerError::TransferFailed(_)
        )
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            LedgerError::InsufficientBalance(msg) => write!(f, "Insufficient balance: {}", msg),
            LedgerError::LimitExceeded(msg) => write!(f, "Limit exceeded: {}", msg),
            LedgerError::Locked(until) => write!(
                f,
                "Obligatory stake is locked until {}",
                until.format("%Y-%m-%d %H:%M UTC")
            ),
            LedgerError::NotFound(msg) => write!(f, "Not found: {}", msg),
            LedgerError::AlreadyCompleted(msg) => write!(f, "Already completed: {}", msg),
            LedgerError::TransferFailed(msg) => write!(f, "Transfer failed: {}", msg),
            LedgerError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            LedgerError::IoError(msg) => write!(f, "IO error: {}", msg),
            LedgerError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            LedgerError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::DatabaseError(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
