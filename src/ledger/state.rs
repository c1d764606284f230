use crate::amount::{serde_amount, Amount, MAX_AMOUNT};
use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::history::{TransactionKind, TransactionRecord};

/// Persisted balances for one wallet. Missing fields load as zero / empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    #[serde(with = "serde_amount")]
    pub liquid_balance: Amount,
    #[serde(with = "serde_amount")]
    pub obligatory_stake: Amount,
    #[serde(with = "serde_amount")]
    pub voluntary_stake: Amount,
    #[serde(with = "serde_amount")]
    pub spending_balance: Amount,
    #[serde(with = "serde_amount")]
    pub fractional_yield_obligatory: Amount,
    #[serde(with = "serde_amount")]
    pub fractional_yield_voluntary: Amount,
    #[serde(with = "serde_amount")]
    pub daily_yield_obligatory_accumulated: Amount,
    #[serde(with = "serde_amount")]
    pub daily_yield_voluntary_accumulated: Amount,
    pub lock_start_date: Option<DateTime<Utc>>,
    pub lock_end: Option<DateTime<Utc>>,
    pub last_yield_reset_date: Option<NaiveDate>,
    pub last_accrual_at: Option<DateTime<Utc>>,
    pub transactions: Vec<TransactionRecord>,
}

impl LedgerState {
    /// Fresh state for a wallet seen for the first time.
    pub fn seeded(seed_balance: Amount, now: DateTime<Utc>) -> Self {
        let mut state = LedgerState {
            liquid_balance: seed_balance,
            last_accrual_at: Some(now),
            ..LedgerState::default()
        };
        if seed_balance > Amount::ZERO {
            state.transactions.push(TransactionRecord::new(
                TransactionKind::Seed,
                "Welcome balance",
                seed_balance,
                now,
            ));
        }
        state
    }

    /// Sum of the four balance buckets.
    pub fn bucket_total(&self) -> Amount {
        self.liquid_balance + self.obligatory_stake + self.voluntary_stake + self.spending_balance
    }

    /// Bucket total plus unconverted yield carry.
    pub fn total_value(&self) -> Amount {
        self.bucket_total() + self.fractional_yield_obligatory + self.fractional_yield_voluntary
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lock_end, Some(end) if now < end)
    }

    /// Parses a stored record. Absent fields default; a record with the
    /// wrong shape or impossible values is rejected.
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(LedgerError::SerializationError(
                "ledger record is not an object".to_string(),
            ));
        }
        let state: LedgerState = serde_json::from_value(value)?;
        state.check_consistency()?;
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string(self)?)
    }

    fn check_consistency(&self) -> Result<(), LedgerError> {
        let amounts = [
            ("liquid_balance", self.liquid_balance),
            ("obligatory_stake", self.obligatory_stake),
            ("voluntary_stake", self.voluntary_stake),
            ("spending_balance", self.spending_balance),
            ("fractional_yield_obligatory", self.fractional_yield_obligatory),
            ("fractional_yield_voluntary", self.fractional_yield_voluntary),
            ("daily_yield_obligatory_accumulated", self.daily_yield_obligatory_accumulated),
            ("daily_yield_voluntary_accumulated", self.daily_yield_voluntary_accumulated),
        ];
        for (name, value) in amounts {
            if value < Amount::ZERO {
                return Err(LedgerError::SerializationError(format!(
                    "{} is negative ({})",
                    name, value
                )));
            }
            if value > MAX_AMOUNT {
                return Err(LedgerError::SerializationError(format!(
                    "{} exceeds the maximum balance ({})",
                    name, value
                )));
            }
        }
        if self.lock_end.is_some() != self.lock_start_date.is_some() {
            return Err(LedgerError::SerializationError(
                "lock_start_date and lock_end must be set together".to_string(),
            ));
        }
        // Lock dates exist exactly while there is locked principal.
        let has_locked_principal = self.obligatory_stake > Amount::ZERO;
        if has_locked_principal != self.lock_end.is_some() {
            return Err(LedgerError::SerializationError(format!(
                "obligatory_stake {} does not match the lock dates",
                self.obligatory_stake
            )));
        }
        if let (Some(start), Some(end)) = (self.lock_start_date, self.lock_end) {
            if end < start {
                return Err(LedgerError::SerializationError(
                    "lock_end precedes lock_start_date".to_string(),
                ));
            }
        }
        Ok(())
    }
}
