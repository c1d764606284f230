//! Moves between buckets: staking, unstaking, unlocking, mission credit and
//! external withdrawal.

use super::history::{RewardSplit, TransactionKind, TransactionRecord};
use super::BalanceLedger;
use crate::amount::{checked_credit, ensure_positive_whole, format_amount, Amount, MAX_AMOUNT};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};

impl BalanceLedger {
    /// Moves `amount` whole tokens from the liquid balance into the voluntary stake.
    pub fn stake_voluntary(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<(), LedgerError> {
        ensure_positive_whole(amount)?;
        if let Some(limit) = self.policy.max_stake_per_call {
            if amount > limit {
                return Err(LedgerError::LimitExceeded(format!(
                    "cannot stake more than {} per request (requested {})",
                    limit, amount
                )));
            }
        }
        if amount > self.state.liquid_balance {
            return Err(LedgerError::InsufficientBalance(format!(
                "requested {}, liquid balance is {}",
                amount,
                format_amount(self.state.liquid_balance, 2)
            )));
        }

        let voluntary = checked_credit(self.state.voluntary_stake, amount)?;
        self.state.liquid_balance -= amount;
        self.state.voluntary_stake = voluntary;
        self.record_transaction(TransactionKind::Stake, "Voluntary stake", amount, now);
        Ok(())
    }

    /// Unstakes part of the voluntary principal. A proportional share of the
    /// unconverted yield carry leaves with it. Returns the amount credited to
    /// the liquid balance.
    pub fn unstake_voluntary_partial(
        &mut self,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Amount, LedgerError> {
        ensure_positive_whole(amount)?;
        let principal = self.state.voluntary_stake;
        if amount > principal {
            return Err(LedgerError::InsufficientBalance(format!(
                "requested {}, voluntary stake is {}",
                amount, principal
            )));
        }

        let carry = self.state.fractional_yield_voluntary;
        let yield_out = if amount == principal {
            carry
        } else {
            carry * amount / principal
        };
        let credited = amount + yield_out;
        let liquid = checked_credit(self.state.liquid_balance, credited)?;

        self.state.voluntary_stake -= amount;
        self.state.fractional_yield_voluntary -= yield_out;
        self.state.liquid_balance = liquid;
        self.record_transaction(TransactionKind::Unstake, "Voluntary unstake", credited, now);
        Ok(credited)
    }

    /// Withdraws the whole voluntary sub-ledger, principal and carry, into
    /// the liquid balance.
    pub fn withdraw_max_voluntary(&mut self, now: DateTime<Utc>) -> Result<Amount, LedgerError> {
        let credited = self.state.voluntary_stake + self.state.fractional_yield_voluntary;
        if credited <= Amount::ZERO {
            return Err(LedgerError::NotFound("no voluntary stake to withdraw".to_string()));
        }
        let liquid = checked_credit(self.state.liquid_balance, credited)?;

        self.state.voluntary_stake = Amount::ZERO;
        self.state.fractional_yield_voluntary = Amount::ZERO;
        self.state.daily_yield_voluntary_accumulated = Amount::ZERO;
        self.state.liquid_balance = liquid;
        self.record_transaction(
            TransactionKind::Unstake,
            "Voluntary stake withdrawn in full",
            credited,
            now,
        );
        Ok(credited)
    }

    /// Releases the obligatory stake once its lock period has ended.
    pub fn withdraw_max_obligatory(&mut self, now: DateTime<Utc>) -> Result<Amount, LedgerError> {
        let credited = self.state.obligatory_stake + self.state.fractional_yield_obligatory;
        if credited <= Amount::ZERO {
            return Err(LedgerError::NotFound("no obligatory stake to withdraw".to_string()));
        }
        let end = self.state.lock_end.ok_or_else(|| {
            LedgerError::NotFound("obligatory stake has no lock period".to_string())
        })?;
        if now < end {
            return Err(LedgerError::Locked(end));
        }
        let liquid = checked_credit(self.state.liquid_balance, credited)?;

        self.state.obligatory_stake = Amount::ZERO;
        self.state.fractional_yield_obligatory = Amount::ZERO;
        self.state.daily_yield_obligatory_accumulated = Amount::ZERO;
        self.state.lock_start_date = None;
        self.state.lock_end = None;
        self.state.liquid_balance = liquid;
        self.record_transaction(TransactionKind::Unlock, "Locked stake released", credited, now);
        Ok(credited)
    }

    /// Credits a completed mission: 80% liquid, 10% obligatory stake, 10%
    /// spending. The lock period starts only when the obligatory stake goes
    /// from zero to nonzero.
    pub fn credit_mission_reward(
        &mut self,
        reward: Amount,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<RewardSplit, LedgerError> {
        let (split, liquid, obligatory, spending) = self.plan_mission_reward(reward)?;
        if self.state.obligatory_stake == Amount::ZERO {
            self.state.lock_start_date = Some(now);
            self.state.lock_end = Some(now + self.policy.lock_duration);
        }
        self.state.liquid_balance = liquid;
        self.state.obligatory_stake = obligatory;
        self.state.spending_balance = spending;

        let description = format!(
            "Mission '{}': {} liquid / {} locked / {} spending",
            title,
            format_amount(split.liquid, 2),
            format_amount(split.obligatory, 2),
            format_amount(split.spending, 2)
        );
        let record =
            TransactionRecord::new(TransactionKind::Mission, description, reward, now).with_split(split);
        self.push_record(record);
        Ok(split)
    }

    /// Checks that `reward` can be credited without applying it.
    pub fn check_mission_reward(&self, reward: Amount) -> Result<(), LedgerError> {
        self.plan_mission_reward(reward).map(|_| ())
    }

    /// The split and the three resulting bucket balances.
    fn plan_mission_reward(
        &self,
        reward: Amount,
    ) -> Result<(RewardSplit, Amount, Amount, Amount), LedgerError> {
        if reward <= Amount::ZERO || reward > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount(format!(
                "mission reward must be between 0 and {} (got {})",
                MAX_AMOUNT, reward
            )));
        }
        let split = RewardSplit::of(reward);
        Ok((
            split,
            checked_credit(self.state.liquid_balance, split.liquid)?,
            checked_credit(self.state.obligatory_stake, split.obligatory)?,
            checked_credit(self.state.spending_balance, split.spending)?,
        ))
    }

    /// Checks an external withdrawal without applying it.
    pub fn check_external_withdrawal(&self, amount: Amount) -> Result<(), LedgerError> {
        ensure_positive_whole(amount)?;
        if amount > self.state.liquid_balance {
            return Err(LedgerError::InsufficientBalance(format!(
                "requested {}, liquid balance is {}",
                amount,
                format_amount(self.state.liquid_balance, 2)
            )));
        }
        Ok(())
    }

    /// Debits liquid tokens paid out to an external address. This is the
    /// only operation that removes value from the ledger.
    pub fn withdraw_external(
        &mut self,
        amount: Amount,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.check_external_withdrawal(amount)?;
        self.state.liquid_balance -= amount;
        self.record_transaction(
            TransactionKind::Withdraw,
            format!("Withdrawal to {}", short_address(destination)),
            amount,
            now,
        );
        Ok(())
    }
}

fn short_address(address: &str) -> String {
    if address.chars().count() > 12 {
        let head: String = address.chars().take(6).collect();
        let tail: String = address.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{}...{}", head, tail)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::approx_eq;
    use crate::ledger::{LedgerPolicy, LedgerState};
    use chrono::{Duration, TimeZone};

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ledger_with_liquid(liquid: i64) -> BalanceLedger {
        let state = LedgerState {
            liquid_balance: Amount::from_num(liquid),
            ..LedgerState::default()
        };
        BalanceLedger::from_state(state, LedgerPolicy::default())
    }

    #[test]
    fn test_stake_moves_liquid_to_voluntary() {
        let mut ledger = ledger_with_liquid(100);
        ledger.stake_voluntary(Amount::from_num(30), day0()).unwrap();
        assert_eq!(ledger.state().liquid_balance, Amount::from_num(70));
        assert_eq!(ledger.state().voluntary_stake, Amount::from_num(30));
        let last = ledger.transactions().last().unwrap();
        assert_eq!(last.kind, TransactionKind::Stake);
        assert_eq!(last.amount, Amount::from_num(30));
    }

    #[test]
    fn test_stake_rejects_negative_and_fractional() {
        let mut ledger = ledger_with_liquid(100);
        let before = ledger.state().clone();
        assert!(matches!(
            ledger.stake_voluntary(Amount::from_num(-5), day0()),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.stake_voluntary(Amount::from_num(3.5), day0()),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert_eq!(ledger.state(), &before);
    }

    #[test]
    fn test_stake_rejects_overdraw_and_ceiling() {
        let mut ledger = ledger_with_liquid(50_000);
        assert!(matches!(
            ledger.stake_voluntary(Amount::from_num(10_001), day0()),
            Err(LedgerError::LimitExceeded(_))
        ));
        let mut poor = ledger_with_liquid(10);
        assert!(matches!(
            poor.stake_voluntary(Amount::from_num(11), day0()),
            Err(LedgerError::InsufficientBalance(_))
        ));
        assert_eq!(poor.state().liquid_balance, Amount::from_num(10));
        assert!(ledger.stake_voluntary(Amount::from_num(10_000), day0()).is_ok());
    }

    #[test]
    fn test_partial_unstake_carries_proportional_yield() {
        let state = LedgerState {
            voluntary_stake: Amount::from_num(100),
            fractional_yield_voluntary: Amount::from_num(4.5),
            ..LedgerState::default()
        };
        let mut ledger = BalanceLedger::from_state(state, LedgerPolicy::default());

        let credited = ledger.unstake_voluntary_partial(Amount::from_num(40), day0()).unwrap();
        assert!(approx_eq(credited, Amount::from_num(41.8)));
        assert!(approx_eq(ledger.state().liquid_balance, Amount::from_num(41.8)));
        assert_eq!(ledger.state().voluntary_stake, Amount::from_num(60));
        assert!(approx_eq(ledger.state().fractional_yield_voluntary, Amount::from_num(2.7)));
    }

    #[test]
    fn test_partial_unstake_bounds() {
        let state = LedgerState {
            voluntary_stake: Amount::from_num(10),
            ..LedgerState::default()
        };
        let mut ledger = BalanceLedger::from_state(state, LedgerPolicy::default());
        assert!(matches!(
            ledger.unstake_voluntary_partial(Amount::from_num(11), day0()),
            Err(LedgerError::InsufficientBalance(_))
        ));
        assert!(matches!(
            ledger.unstake_voluntary_partial(Amount::ZERO, day0()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_two_partials_equal_one_max() {
        let state = LedgerState {
            liquid_balance: Amount::from_num(5),
            voluntary_stake: Amount::from_num(100),
            fractional_yield_voluntary: Amount::from_num(4.5),
            daily_yield_voluntary_accumulated: Amount::from_num(3),
            ..LedgerState::default()
        };
        let mut split = BalanceLedger::from_state(state.clone(), LedgerPolicy::default());
        let mut whole = BalanceLedger::from_state(state, LedgerPolicy::default());

        split.unstake_voluntary_partial(Amount::from_num(40), day0()).unwrap();
        let remaining = split.state().voluntary_stake;
        split.unstake_voluntary_partial(remaining, day0()).unwrap();
        whole.withdraw_max_voluntary(day0()).unwrap();

        assert!(approx_eq(split.state().liquid_balance, whole.state().liquid_balance));
        assert!(approx_eq(whole.state().liquid_balance, Amount::from_num(109.5)));
        assert_eq!(split.state().voluntary_stake, Amount::ZERO);
        assert_eq!(whole.state().daily_yield_voluntary_accumulated, Amount::ZERO);
    }

    #[test]
    fn test_withdraw_max_voluntary_requires_stake() {
        let mut ledger = ledger_with_liquid(10);
        assert!(matches!(
            ledger.withdraw_max_voluntary(day0()),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_obligatory_lock_expires_after_ninety_days() {
        let mut ledger = ledger_with_liquid(0);
        ledger.credit_mission_reward(Amount::from_num(10), "Drink water", day0()).unwrap();
        assert_eq!(ledger.state().lock_start_date, Some(day0()));

        let day89 = day0() + Duration::days(89);
        assert!(matches!(
            ledger.withdraw_max_obligatory(day89),
            Err(LedgerError::Locked(_))
        ));
        assert_eq!(ledger.state().obligatory_stake, Amount::from_num(1));

        let day90 = day0() + Duration::days(90);
        let credited = ledger.withdraw_max_obligatory(day90).unwrap();
        assert_eq!(credited, Amount::from_num(1));
        assert_eq!(ledger.state().obligatory_stake, Amount::ZERO);
        assert_eq!(ledger.state().liquid_balance, Amount::from_num(9));
        assert!(ledger.state().lock_start_date.is_none());
        assert!(ledger.state().lock_end.is_none());
    }

    #[test]
    fn test_mission_reward_split_and_lock() {
        let mut ledger = ledger_with_liquid(0);
        let split = ledger.credit_mission_reward(Amount::from_num(10), "Walk", day0()).unwrap();
        assert_eq!(split.liquid, Amount::from_num(8));
        assert_eq!(ledger.state().liquid_balance, Amount::from_num(8));
        assert_eq!(ledger.state().obligatory_stake, Amount::from_num(1));
        assert_eq!(ledger.state().spending_balance, Amount::from_num(1));
        assert_eq!(ledger.state().lock_end, Some(day0() + Duration::days(90)));

        let missions: Vec<_> = ledger
            .transactions()
            .iter()
            .filter(|t| t.kind == TransactionKind::Mission)
            .collect();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].amount, Amount::from_num(10));
        assert_eq!(missions[0].split, Some(split));
    }

    #[test]
    fn test_later_missions_do_not_restart_lock() {
        let mut ledger = ledger_with_liquid(0);
        ledger.credit_mission_reward(Amount::from_num(10), "First", day0()).unwrap();
        let later = day0() + Duration::days(30);
        ledger.credit_mission_reward(Amount::from_num(20), "Second", later).unwrap();
        assert_eq!(ledger.state().lock_start_date, Some(day0()));
        assert_eq!(ledger.state().obligatory_stake, Amount::from_num(3));
    }

    #[test]
    fn test_mission_after_unlock_starts_new_lock() {
        let mut ledger = ledger_with_liquid(0);
        ledger.credit_mission_reward(Amount::from_num(10), "First", day0()).unwrap();
        let day90 = day0() + Duration::days(90);
        ledger.withdraw_max_obligatory(day90).unwrap();
        ledger.credit_mission_reward(Amount::from_num(10), "Again", day90).unwrap();
        assert_eq!(ledger.state().lock_start_date, Some(day90));
    }

    #[test]
    fn test_mission_reward_must_be_positive() {
        let mut ledger = ledger_with_liquid(0);
        assert!(matches!(
            ledger.credit_mission_reward(Amount::ZERO, "Nothing", day0()),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(ledger.state().lock_start_date.is_none());
    }

    #[test]
    fn test_stake_cycle_conserves_value() {
        let mut ledger = ledger_with_liquid(500);
        ledger.state.fractional_yield_voluntary = Amount::from_num(0.75);
        let before = ledger.total_value();

        ledger.stake_voluntary(Amount::from_num(200), day0()).unwrap();
        assert_eq!(ledger.total_value(), before);
        ledger.unstake_voluntary_partial(Amount::from_num(50), day0()).unwrap();
        assert!(approx_eq(ledger.total_value(), before));
        ledger.stake_voluntary(Amount::from_num(25), day0()).unwrap();
        assert!(approx_eq(ledger.total_value(), before));
        ledger.withdraw_max_voluntary(day0()).unwrap();
        assert!(approx_eq(ledger.total_value(), before));
        assert!(ledger.stake_voluntary(Amount::from_num(10_000), day0()).is_err());
        assert!(approx_eq(ledger.total_value(), before));
    }

    #[test]
    fn test_external_withdrawal_debits_liquid() {
        let mut ledger = ledger_with_liquid(100);
        ledger
            .withdraw_external(Amount::from_num(40), "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin", day0())
            .unwrap();
        assert_eq!(ledger.state().liquid_balance, Amount::from_num(60));
        let last = ledger.transactions().last().unwrap();
        assert_eq!(last.kind, TransactionKind::Withdraw);
        assert_eq!(last.description, "Withdrawal to 9xQeWv...VFin");
        assert!(matches!(
            ledger.withdraw_external(Amount::from_num(61), "dest", day0()),
            Err(LedgerError::InsufficientBalance(_))
        ));
    }

    #[test]
    fn test_obligatory_without_lock_is_not_released() {
        let state = LedgerState {
            obligatory_stake: Amount::from_num(500),
            ..LedgerState::default()
        };
        let mut ledger = BalanceLedger::from_state(state, LedgerPolicy::default());
        assert!(matches!(
            ledger.withdraw_max_obligatory(day0()),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(ledger.state().obligatory_stake, Amount::from_num(500));
        assert_eq!(ledger.state().liquid_balance, Amount::ZERO);
    }

    #[test]
    fn test_credits_near_maximum_are_refused() {
        let mut ledger = ledger_with_liquid(0);
        ledger.state.liquid_balance = MAX_AMOUNT;
        let before = ledger.state().clone();

        assert!(matches!(
            ledger.credit_mission_reward(Amount::from_num(10), "Too much", day0()),
            Err(LedgerError::LimitExceeded(_))
        ));
        assert!(matches!(
            ledger.check_mission_reward(MAX_AMOUNT + Amount::ONE),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert_eq!(ledger.state(), &before);

        ledger.state.liquid_balance = MAX_AMOUNT - Amount::from_num(10);
        ledger.state.voluntary_stake = Amount::from_num(50);
        assert!(matches!(
            ledger.unstake_voluntary_partial(Amount::from_num(20), day0()),
            Err(LedgerError::LimitExceeded(_))
        ));
        assert!(matches!(
            ledger.withdraw_max_voluntary(day0()),
            Err(LedgerError::LimitExceeded(_))
        ));
        assert_eq!(ledger.state().voluntary_stake, Amount::from_num(50));
    }
}
