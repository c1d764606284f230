//! Append-only transaction log entries

use crate::amount::{serde_amount, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Seed,
    Yield,
    Stake,
    Unstake,
    Unlock,
    Mission,
    Withdraw,
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Seed => "seed",
            TransactionKind::Yield => "yield",
            TransactionKind::Stake => "stake",
            TransactionKind::Unstake => "unstake",
            TransactionKind::Unlock => "unlock",
            TransactionKind::Mission => "mission",
            TransactionKind::Withdraw => "withdraw",
        }
    }

    /// Whether the kind moves value into the liquid balance.
    pub fn credits_liquid(&self) -> bool {
        matches!(
            self,
            TransactionKind::Seed
                | TransactionKind::Unstake
                | TransactionKind::Unlock
                | TransactionKind::Mission
        )
    }
}

/// Breakdown of a mission reward across the balance buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    #[serde(with = "serde_amount")]
    pub liquid: Amount,
    #[serde(with = "serde_amount")]
    pub obligatory: Amount,
    #[serde(with = "serde_amount")]
    pub spending: Amount,
}

impl RewardSplit {
    /// 80% liquid, 10% obligatory stake, 10% spending. The liquid share
    /// takes the rounding remainder so the parts always sum to `reward`.
    pub fn of(reward: Amount) -> Self {
        let tenth = reward / 10;
        RewardSplit {
            liquid: reward - tenth - tenth,
            obligatory: tenth,
            spending: tenth,
        }
    }

    pub fn total(&self) -> Amount {
        self.liquid + self.obligatory + self.spending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub description: String,
    /// Magnitude moved; `kind` gives the direction.
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<RewardSplit>,
}

impl TransactionRecord {
    pub fn new(
        kind: TransactionKind,
        description: impl Into<String>,
        amount: Amount,
        timestamp: DateTime<Utc>,
    ) -> Self {
        TransactionRecord {
            kind,
            description: description.into(),
            amount,
            timestamp,
            split: None,
        }
    }

    pub fn with_split(mut self, split: RewardSplit) -> Self {
        self.split = Some(split);
        self
    }
}

/// Appends `record`, dropping the oldest entries beyond `cap`.
pub(crate) fn append(log: &mut Vec<TransactionRecord>, record: TransactionRecord, cap: Option<usize>) {
    log.push(record);
    if let Some(cap) = cap {
        if log.len() > cap {
            let excess = log.len() - cap;
            log.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_split_sums_to_reward() {
        let split = RewardSplit::of(Amount::from_num(10));
        assert_eq!(split.liquid, Amount::from_num(8));
        assert_eq!(split.obligatory, Amount::from_num(1));
        assert_eq!(split.spending, Amount::from_num(1));

        let odd = RewardSplit::of(Amount::from_num(7));
        assert_eq!(odd.total(), Amount::from_num(7));
    }

    #[test]
    fn test_append_respects_cap() {
        let mut log = Vec::new();
        let now = Utc::now();
        for i in 0..60 {
            let record = TransactionRecord::new(
                TransactionKind::Yield,
                format!("tick {}", i),
                Amount::from_num(1),
                now,
            );
            append(&mut log, record, Some(50));
        }
        assert_eq!(log.len(), 50);
        assert_eq!(log[0].description, "tick 10");
        assert_eq!(log[49].description, "tick 59");
    }

    #[test]
    fn test_append_unbounded() {
        let mut log = Vec::new();
        for _ in 0..75 {
            append(
                &mut log,
                TransactionRecord::new(TransactionKind::Stake, "s", Amount::from_num(1), Utc::now()),
                None,
            );
        }
        assert_eq!(log.len(), 75);
    }
}
