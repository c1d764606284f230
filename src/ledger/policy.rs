use crate::amount::{self, Amount, MINUTES_PER_YEAR};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use chrono::Duration;

/// Rates and limits applied by the ledger. Built once from configuration so
/// every call site uses the same canonical values.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPolicy {
    pub annual_rate: Amount,
    pub lock_duration: Duration,
    pub transaction_log_cap: Option<usize>,
    pub max_stake_per_call: Option<Amount>,
    pub seed_balance: Amount,
    pub max_catch_up_minutes: u32,
}

impl LedgerPolicy {
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let max_stake = amount::from_f64(config.max_stake_per_call)?;
        Ok(LedgerPolicy {
            annual_rate: amount::from_f64(config.annual_rate)?,
            lock_duration: Duration::days(config.lock_days),
            transaction_log_cap: (config.transaction_log_cap > 0)
                .then_some(config.transaction_log_cap),
            max_stake_per_call: (max_stake > Amount::ZERO).then_some(max_stake),
            seed_balance: amount::from_f64(config.seed_balance)?,
            max_catch_up_minutes: config.max_catch_up_minutes,
        })
    }

    /// Yield produced by `principal` over one minute.
    pub fn per_minute_yield(&self, principal: Amount) -> Amount {
        principal * self.annual_rate / MINUTES_PER_YEAR
    }
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        LedgerPolicy {
            annual_rate: Amount::from_num(0.10),
            lock_duration: Duration::days(90),
            transaction_log_cap: Some(50),
            max_stake_per_call: Some(Amount::from_num(10_000)),
            seed_balance: Amount::from_num(100),
            max_catch_up_minutes: 24 * 60,
        }
    }
}
