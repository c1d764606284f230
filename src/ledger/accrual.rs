//! Per-minute yield accrual and the daily counter reset.

use super::history::TransactionKind;
use super::policy::LedgerPolicy;
use super::BalanceLedger;
use crate::amount::{whole_units, Amount, MAX_AMOUNT};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Whole units compounded into each sub-ledger by one accrual call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccrualOutcome {
    pub obligatory: Amount,
    pub voluntary: Amount,
}

impl AccrualOutcome {
    pub fn total(&self) -> Amount {
        self.obligatory + self.voluntary
    }

    pub fn is_empty(&self) -> bool {
        self.total() == Amount::ZERO
    }
}

/// One staking sub-ledger's mutable fields.
struct SubLedger<'a> {
    principal: &'a mut Amount,
    carry: &'a mut Amount,
    daily: &'a mut Amount,
}

impl SubLedger<'_> {
    fn accrue(&mut self, minutes: u32, policy: &LedgerPolicy) -> Amount {
        let mut credited = Amount::ZERO;
        for _ in 0..minutes {
            if *self.principal <= Amount::ZERO || *self.principal >= MAX_AMOUNT {
                break;
            }
            *self.carry += policy.per_minute_yield(*self.principal);
            let whole = whole_units(*self.carry).min(MAX_AMOUNT - *self.principal);
            if whole >= Amount::ONE {
                *self.principal += whole;
                *self.daily += whole;
                *self.carry -= whole;
                credited += whole;
            }
        }
        credited
    }

    /// Folds whole units of carry into principal and clears the day's counters.
    fn close_day(&mut self) -> Amount {
        let whole = whole_units(*self.carry).min(MAX_AMOUNT - *self.principal);
        if whole > Amount::ZERO {
            *self.principal += whole;
        }
        *self.carry = Amount::ZERO;
        *self.daily = Amount::ZERO;
        whole.max(Amount::ZERO)
    }
}

impl BalanceLedger {
    fn obligatory_sub_ledger(&mut self) -> SubLedger<'_> {
        SubLedger {
            principal: &mut self.state.obligatory_stake,
            carry: &mut self.state.fractional_yield_obligatory,
            daily: &mut self.state.daily_yield_obligatory_accumulated,
        }
    }

    fn voluntary_sub_ledger(&mut self) -> SubLedger<'_> {
        SubLedger {
            principal: &mut self.state.voluntary_stake,
            carry: &mut self.state.fractional_yield_voluntary,
            daily: &mut self.state.daily_yield_voluntary_accumulated,
        }
    }

    /// Accrues `elapsed_minutes` of yield on both stakes, compounding whole
    /// units into principal and keeping the remainder as carry.
    pub fn accrue_yield(&mut self, elapsed_minutes: u32, now: DateTime<Utc>) -> AccrualOutcome {
        let outcome = self.accrue_minutes(elapsed_minutes, now);
        self.state.last_accrual_at = Some(now);
        outcome
    }

    /// Accrues the whole minutes elapsed since the last accrual, bounded by
    /// the policy's catch-up limit. The first call only starts the clock.
    pub fn catch_up(&mut self, now: DateTime<Utc>) -> AccrualOutcome {
        let last = match self.state.last_accrual_at {
            Some(last) => last,
            None => {
                self.state.last_accrual_at = Some(now);
                return AccrualOutcome::default();
            }
        };

        let elapsed = (now - last).num_minutes();
        if elapsed <= 0 {
            return AccrualOutcome::default();
        }

        let limit = i64::from(self.policy.max_catch_up_minutes);
        if elapsed > limit {
            let outcome = self.accrue_minutes(self.policy.max_catch_up_minutes, now);
            self.state.last_accrual_at = Some(now);
            outcome
        } else {
            let outcome = self.accrue_minutes(elapsed as u32, now);
            // Keep the sub-minute remainder for the next catch-up.
            self.state.last_accrual_at = Some(last + Duration::minutes(elapsed));
            outcome
        }
    }

    fn accrue_minutes(&mut self, minutes: u32, now: DateTime<Utc>) -> AccrualOutcome {
        let policy = self.policy.clone();
        let outcome = AccrualOutcome {
            obligatory: self.obligatory_sub_ledger().accrue(minutes, &policy),
            voluntary: self.voluntary_sub_ledger().accrue(minutes, &policy),
        };

        if outcome.obligatory > Amount::ZERO {
            self.record_transaction(
                TransactionKind::Yield,
                "Yield on locked stake",
                outcome.obligatory,
                now,
            );
        }
        if outcome.voluntary > Amount::ZERO {
            self.record_transaction(
                TransactionKind::Yield,
                "Yield on voluntary stake",
                outcome.voluntary,
                now,
            );
        }
        outcome
    }

    /// Starts a new yield day. Returns `false` without changing anything when
    /// `today` was already reset.
    pub fn reset_daily_yields(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        if self.state.last_yield_reset_date == Some(today) {
            return false;
        }

        let folded_obligatory = self.obligatory_sub_ledger().close_day();
        let folded_voluntary = self.voluntary_sub_ledger().close_day();
        let folded = folded_obligatory + folded_voluntary;
        if folded > Amount::ZERO {
            self.record_transaction(TransactionKind::Yield, "End-of-day yield carry", folded, now);
        }

        self.state.last_yield_reset_date = Some(today);
        true
    }
}
