//! Balance ledger: liquid, obligatory-stake, voluntary-stake and spending
//! buckets with continuous yield accrual and an append-only history.
//!
//! The ledger is pure bookkeeping. It never touches storage or the clock;
//! callers pass `now` in and persist [`LedgerState`] afterwards (see
//! [`crate::service`]). Every operation validates before it mutates, so a
//! returned error means the state is unchanged.

pub mod accrual;
pub mod history;
pub mod policy;
pub mod staking;
pub mod state;

pub use accrual::AccrualOutcome;
pub use history::{RewardSplit, TransactionKind, TransactionRecord};
pub use policy::LedgerPolicy;
pub use state::LedgerState;

use crate::amount::Amount;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct BalanceLedger {
    state: LedgerState,
    policy: LedgerPolicy,
}

impl BalanceLedger {
    /// New ledger seeded with the policy's welcome balance.
    pub fn seeded(policy: LedgerPolicy, now: DateTime<Utc>) -> Self {
        let state = LedgerState::seeded(policy.seed_balance, now);
        BalanceLedger { state, policy }
    }

    pub fn from_state(state: LedgerState, policy: LedgerPolicy) -> Self {
        BalanceLedger { state, policy }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn total_value(&self) -> Amount {
        self.state.total_value()
    }

    pub fn transactions(&self) -> &[TransactionRecord] {
        &self.state.transactions
    }

    /// Appends a record to the history, trimming to the configured cap.
    pub fn record_transaction(
        &mut self,
        kind: TransactionKind,
        description: impl Into<String>,
        amount: Amount,
        now: DateTime<Utc>,
    ) {
        let record = TransactionRecord::new(kind, description, amount, now);
        self.push_record(record);
    }

    fn push_record(&mut self, record: TransactionRecord) {
        history::append(
            &mut self.state.transactions,
            record,
            self.policy.transaction_log_cap,
        );
    }
}
