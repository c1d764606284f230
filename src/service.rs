//! Ledger service: wires a [`BalanceLedger`] to storage, the clock and an
//! observer, and runs the periodic accrual tick.
//!
//! The ledger sits behind an async mutex. A user operation and an accrual
//! tick each hold it for their whole duration, so a tick can never land in
//! the middle of a stake or unstake. State is saved after every mutation; a
//! failed save is logged and retried on the next one, never rolled back.

use crate::amount::Amount;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::ledger::{AccrualOutcome, BalanceLedger, LedgerPolicy, LedgerState, RewardSplit};
use crate::mission::{CompletedMissions, MissionCatalog};
use crate::persistence::{Persistence, DEFAULT_WALLET_KEY};
use crate::relay::TransferBackend;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Called with the fresh state after every mutation.
pub type StateObserver = Arc<dyn Fn(&LedgerState) + Send + Sync>;

pub struct LedgerService {
    wallet_key: String,
    ledger: Mutex<BalanceLedger>,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    observer: Option<StateObserver>,
    save_attempts: u32,
    dirty: AtomicBool,
}

impl LedgerService {
    /// Loads (or seeds) the ledger for `wallet_key`, catches up on accrual
    /// missed while the wallet was offline and applies the daily reset.
    pub fn open(
        wallet_key: Option<&str>,
        policy: LedgerPolicy,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        let wallet_key = wallet_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_WALLET_KEY)
            .to_string();
        let now = clock.now();

        let mut ledger = match persistence.load_state(&wallet_key) {
            Ok(Some(state)) => BalanceLedger::from_state(state, policy),
            Ok(None) => {
                info!("No ledger stored for '{}', seeding a new one", wallet_key);
                BalanceLedger::seeded(policy, now)
            }
            Err(LedgerError::SerializationError(e)) => {
                warn!("Stored ledger for '{}' is malformed ({}). Resetting to defaults.", wallet_key, e);
                BalanceLedger::seeded(policy, now)
            }
            Err(e) => return Err(e),
        };

        let caught_up = ledger.catch_up(now);
        if !caught_up.is_empty() {
            info!("Caught up {} tokens of yield for '{}'", caught_up.total(), wallet_key);
        }
        ledger.reset_daily_yields(clock.today(), now);

        let initial = ledger.state().clone();
        let service = LedgerService {
            wallet_key,
            ledger: Mutex::new(ledger),
            persistence,
            clock,
            observer: None,
            save_attempts: 1,
            dirty: AtomicBool::new(false),
        };
        service.persist(&initial);
        Ok(service)
    }

    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts.max(1);
        self
    }

    pub fn wallet_key(&self) -> &str {
        &self.wallet_key
    }

    /// True while the last save failed and memory is ahead of storage.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.ledger.lock().await.state().clone()
    }

    pub async fn total_value(&self) -> Amount {
        self.ledger.lock().await.total_value()
    }

    /// Runs `op` under the ledger lock and persists/notifies on success.
    async fn mutate<T, F>(&self, op: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut BalanceLedger, DateTime<Utc>) -> Result<T, LedgerError>,
    {
        let mut ledger = self.ledger.lock().await;
        let now = self.clock.now();
        match op(&mut *ledger, now) {
            Ok(out) => {
                self.after_mutation(ledger.state());
                Ok(out)
            }
            Err(e) => {
                debug!("Ledger operation rejected for '{}': {}", self.wallet_key, e);
                Err(e)
            }
        }
    }

    fn after_mutation(&self, state: &LedgerState) {
        self.persist(state);
        if let Some(observer) = &self.observer {
            observer(state);
        }
    }

    fn persist(&self, state: &LedgerState) {
        let mut last_error = None;
        for attempt in 1..=self.save_attempts {
            match self.persistence.save_state(&self.wallet_key, state) {
                Ok(()) => {
                    self.dirty.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    debug!("Save attempt {} for '{}' failed: {}", attempt, self.wallet_key, e);
                    last_error = Some(e);
                }
            }
        }
        if let Some(e) = last_error {
            warn!("Failed to persist ledger for '{}': {}. Will retry on next change.", self.wallet_key, e);
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Saves again if the last save failed.
    pub async fn flush(&self) {
        if self.is_dirty() {
            let ledger = self.ledger.lock().await;
            self.persist(ledger.state());
        }
    }

    pub async fn stake_voluntary(&self, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(|ledger, now| ledger.stake_voluntary(amount, now)).await
    }

    pub async fn unstake_voluntary_partial(&self, amount: Amount) -> Result<Amount, LedgerError> {
        self.mutate(|ledger, now| ledger.unstake_voluntary_partial(amount, now))
            .await
    }

    pub async fn withdraw_max_voluntary(&self) -> Result<Amount, LedgerError> {
        self.mutate(|ledger, now| ledger.withdraw_max_voluntary(now)).await
    }

    pub async fn withdraw_max_obligatory(&self) -> Result<Amount, LedgerError> {
        self.mutate(|ledger, now| ledger.withdraw_max_obligatory(now)).await
    }

    /// Missions completed today by this wallet.
    pub fn completed_today(&self) -> Result<CompletedMissions, LedgerError> {
        let today = self.clock.today();
        let ids = self.persistence.completed_missions(&self.wallet_key, today)?;
        Ok(CompletedMissions::with_ids(today, ids))
    }

    /// Credits mission `id` once per calendar day. The completion is
    /// recorded before the reward is credited, so a failed record means no
    /// reward rather than a second claim.
    pub async fn complete_mission(
        &self,
        catalog: &MissionCatalog,
        id: &str,
    ) -> Result<RewardSplit, LedgerError> {
        let mut ledger = self.ledger.lock().await;
        let completed = self.completed_today()?;
        let mission = catalog.claim(id, &completed)?;
        ledger.check_mission_reward(mission.reward)?;

        self.persistence
            .mark_mission_completed(&self.wallet_key, id, completed.day)
            .map_err(|e| {
                warn!("Could not record completion of mission '{}': {}", id, e);
                e
            })?;
        let split = ledger.credit_mission_reward(mission.reward, &mission.title, self.clock.now())?;
        self.after_mutation(ledger.state());
        info!("Mission '{}' completed by '{}' (+{})", id, self.wallet_key, mission.reward);
        Ok(split)
    }

    /// Pays `amount` out to `destination` through `backend`, debiting the
    /// liquid balance only after the transfer was accepted.
    pub async fn withdraw_external(
        &self,
        backend: &dyn TransferBackend,
        destination: &str,
        amount: Amount,
    ) -> Result<String, LedgerError> {
        let mut ledger = self.ledger.lock().await;
        ledger.check_external_withdrawal(amount)?;

        let signature = backend
            .transfer(destination, amount)
            .map_err(|e| LedgerError::TransferFailed(e.to_string()))?;
        ledger.withdraw_external(amount, destination, self.clock.now())?;
        self.after_mutation(ledger.state());
        info!("Withdrew {} to {} ({})", amount, destination, signature);
        Ok(signature)
    }

    /// One accrual tick: daily reset check, then one minute of yield.
    pub async fn tick(&self) -> AccrualOutcome {
        let mut ledger = self.ledger.lock().await;
        let now = self.clock.now();
        if ledger.reset_daily_yields(self.clock.today(), now) {
            debug!("Daily yield counters reset for '{}'", self.wallet_key);
        }
        let outcome = ledger.accrue_yield(1, now);
        self.after_mutation(ledger.state());
        outcome
    }

    /// Accrues whatever whole minutes passed since the last accrual.
    pub async fn catch_up(&self) -> AccrualOutcome {
        let mut ledger = self.ledger.lock().await;
        let now = self.clock.now();
        ledger.reset_daily_yields(self.clock.today(), now);
        let outcome = ledger.catch_up(now);
        self.after_mutation(ledger.state());
        outcome
    }

    /// Starts the periodic accrual task. Dropping the handle stops it.
    pub fn spawn_accrual(self: &Arc<Self>, period: Duration) -> AccrualHandle {
        let service = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let outcome = service.tick().await;
                if !outcome.is_empty() {
                    info!(
                        "Accrued {} locked / {} voluntary for '{}'",
                        outcome.obligatory, outcome.voluntary, service.wallet_key
                    );
                }
            }
        });
        AccrualHandle { task }
    }
}

/// Owns the accrual task for the lifetime of a session.
pub struct AccrualHandle {
    task: JoinHandle<()>,
}

impl AccrualHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AccrualHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
