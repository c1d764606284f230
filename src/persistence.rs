//! Database persistence layer for HabitStake

use crate::error::LedgerError;
use crate::ledger::LedgerState;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Storage key used when no wallet is connected.
pub const DEFAULT_WALLET_KEY: &str = "default";

/// Abstraction for persistence backends. Ledger records are stored whole,
/// keyed by wallet identity.
pub trait Persistence: Send + Sync {
    /// `Ok(None)` when the wallet has no record yet. A record that exists
    /// but fails validation yields `SerializationError`.
    fn load_state(&self, wallet_key: &str) -> Result<Option<LedgerState>, LedgerError>;
    fn save_state(&self, wallet_key: &str, state: &LedgerState) -> Result<(), LedgerError>;
    fn completed_missions(&self, wallet_key: &str, day: NaiveDate) -> Result<HashSet<String>, LedgerError>;
    fn mark_mission_completed(&self, wallet_key: &str, mission_id: &str, day: NaiveDate) -> Result<(), LedgerError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledgers (
                wallet_key TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to create ledgers table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS completed_missions (
                wallet_key TEXT NOT NULL,
                mission_id TEXT NOT NULL,
                day TEXT NOT NULL,
                PRIMARY KEY (wallet_key, mission_id, day)
            )",
            [],
        )
        .map_err(|e| {
            LedgerError::DatabaseError(format!("Failed to create completed_missions table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Raw stored JSON, for diagnostics.
    pub fn raw_state(&self, wallet_key: &str) -> Result<Option<String>, LedgerError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT state_json FROM ledgers WHERE wallet_key = ?1",
            params![wallet_key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to read ledger: {}", e)))
    }

    /// Stores raw JSON without validation. Used to import records.
    pub fn put_raw_state(&self, wallet_key: &str, json: &str) -> Result<(), LedgerError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO ledgers (wallet_key, state_json, updated_at) VALUES (?1, ?2, ?3)",
            params![wallet_key, json, Utc::now().to_rfc3339()],
        )
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to save ledger: {}", e)))?;
        Ok(())
    }

    pub fn wallet_keys(&self) -> Result<Vec<String>, LedgerError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT wallet_key FROM ledgers ORDER BY wallet_key ASC")
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to query wallets: {}", e)))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| LedgerError::DatabaseError(format!("Failed to read row: {}", e)))?);
        }
        Ok(keys)
    }
}

impl Persistence for Database {
    fn load_state(&self, wallet_key: &str) -> Result<Option<LedgerState>, LedgerError> {
        match self.raw_state(wallet_key)? {
            Some(json) => LedgerState::from_json(&json).map(Some),
            None => Ok(None),
        }
    }

    fn save_state(&self, wallet_key: &str, state: &LedgerState) -> Result<(), LedgerError> {
        let json = state.to_json()?;
        self.put_raw_state(wallet_key, &json)
    }

    fn completed_missions(&self, wallet_key: &str, day: NaiveDate) -> Result<HashSet<String>, LedgerError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT mission_id FROM completed_missions WHERE wallet_key = ?1 AND day = ?2")
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params![wallet_key, day.to_string()], |row| row.get::<_, String>(0))
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to query missions: {}", e)))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row.map_err(|e| LedgerError::DatabaseError(format!("Failed to read row: {}", e)))?);
        }
        Ok(ids)
    }

    fn mark_mission_completed(&self, wallet_key: &str, mission_id: &str, day: NaiveDate) -> Result<(), LedgerError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO completed_missions (wallet_key, mission_id, day) VALUES (?1, ?2, ?3)",
            params![wallet_key, mission_id, day.to_string()],
        )
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to record mission: {}", e)))?;
        Ok(())
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub states: Arc<Mutex<HashMap<String, String>>>,
    pub missions: Arc<Mutex<HashSet<(String, String, NaiveDate)>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw JSON as-is, bypassing validation.
    pub fn put_raw_state(&self, wallet_key: &str, json: &str) {
        self.states.lock().insert(wallet_key.to_string(), json.to_string());
    }

    pub fn raw_state(&self, wallet_key: &str) -> Option<String> {
        self.states.lock().get(wallet_key).cloned()
    }
}

impl Persistence for InMemoryPersistence {
    fn load_state(&self, wallet_key: &str) -> Result<Option<LedgerState>, LedgerError> {
        match self.raw_state(wallet_key) {
            Some(json) => LedgerState::from_json(&json).map(Some),
            None => Ok(None),
        }
    }

    fn save_state(&self, wallet_key: &str, state: &LedgerState) -> Result<(), LedgerError> {
        let json = state.to_json()?;
        self.put_raw_state(wallet_key, &json);
        Ok(())
    }

    fn completed_missions(&self, wallet_key: &str, day: NaiveDate) -> Result<HashSet<String>, LedgerError> {
        let missions = self.missions.lock();
        Ok(missions
            .iter()
            .filter(|(key, _, d)| key == wallet_key && *d == day)
            .map(|(_, id, _)| id.clone())
            .collect())
    }

    fn mark_mission_completed(&self, wallet_key: &str, mission_id: &str, day: NaiveDate) -> Result<(), LedgerError> {
        self.missions
            .lock()
            .insert((wallet_key.to_string(), mission_id.to_string(), day));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    }

    #[test]
    fn test_database_open() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.conn.lock().is_autocommit());
    }

    #[test]
    fn test_save_and_load_state() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.load_state("wallet-a").unwrap().is_none());

        let state = LedgerState::seeded(Amount::from_num(100), Utc::now());
        db.save_state("wallet-a", &state).unwrap();
        assert_eq!(db.load_state("wallet-a").unwrap(), Some(state));
        assert!(db.load_state("wallet-b").unwrap().is_none());
        assert_eq!(db.wallet_keys().unwrap(), vec!["wallet-a".to_string()]);
    }

    #[test]
    fn test_malformed_record_reports_serialization_error() {
        let db = Database::open(":memory:").unwrap();
        db.put_raw_state(DEFAULT_WALLET_KEY, r#"{"liquid_balance": [1]}"#).unwrap();
        assert!(matches!(
            db.load_state(DEFAULT_WALLET_KEY),
            Err(LedgerError::SerializationError(_))
        ));
    }

    #[test]
    fn test_completed_missions_are_per_day() {
        let db = Database::open(":memory:").unwrap();
        db.mark_mission_completed("w", "water", day()).unwrap();
        db.mark_mission_completed("w", "water", day()).unwrap();
        db.mark_mission_completed("other", "walk", day()).unwrap();

        let today = db.completed_missions("w", day()).unwrap();
        assert_eq!(today.len(), 1);
        assert!(today.contains("water"));
        let tomorrow = db.completed_missions("w", day().succ_opt().unwrap()).unwrap();
        assert!(tomorrow.is_empty());
    }

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        let state = LedgerState::seeded(Amount::from_num(7), Utc::now());
        store.save_state("k", &state).unwrap();
        assert_eq!(store.load_state("k").unwrap(), Some(state));
        store.mark_mission_completed("k", "m", day()).unwrap();
        assert!(store.completed_missions("k", day()).unwrap().contains("m"));
    }
}
