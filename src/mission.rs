//! Mission catalog and the per-day completion set.
//!
//! The ledger only ever sees a mission's reward. Which missions exist and
//! which were already completed today is tracked here, by the caller.

use crate::amount::{serde_amount, Amount, MAX_AMOUNT};
use crate::error::LedgerError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "serde_amount")]
    pub reward: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MissionCatalog {
    missions: Vec<Mission>,
}

impl MissionCatalog {
    pub fn new(missions: Vec<Mission>) -> Result<Self, LedgerError> {
        let mut seen = HashSet::new();
        for mission in &missions {
            if mission.id.trim().is_empty() {
                return Err(LedgerError::ConfigError(format!(
                    "mission '{}' has an empty id",
                    mission.title
                )));
            }
            if !seen.insert(mission.id.as_str()) {
                return Err(LedgerError::ConfigError(format!(
                    "duplicate mission id '{}'",
                    mission.id
                )));
            }
            if mission.reward <= Amount::ZERO || mission.reward > MAX_AMOUNT {
                return Err(LedgerError::ConfigError(format!(
                    "mission '{}' reward {} is outside 0..={}",
                    mission.id, mission.reward, MAX_AMOUNT
                )));
            }
        }
        Ok(MissionCatalog { missions })
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let missions: Vec<Mission> = serde_json::from_str(json)?;
        Self::new(missions)
    }

    /// Loads a catalog file. A missing file yields an empty catalog.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Mission catalog {} not found, no missions available", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Result<&Mission, LedgerError> {
        self.missions
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| LedgerError::NotFound(format!("mission '{}'", id)))
    }

    pub fn missions(&self) -> &[Mission] {
        &self.missions
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }

    /// Looks up `id` and checks it has not been completed on `completed.day`.
    pub fn claim(&self, id: &str, completed: &CompletedMissions) -> Result<&Mission, LedgerError> {
        let mission = self.get(id)?;
        if completed.contains(id) {
            return Err(LedgerError::AlreadyCompleted(format!(
                "mission '{}' was already completed on {}",
                id, completed.day
            )));
        }
        Ok(mission)
    }

    /// Missions still open on the given day.
    pub fn available<'a>(&'a self, completed: &'a CompletedMissions) -> impl Iterator<Item = &'a Mission> {
        self.missions.iter().filter(move |m| !completed.contains(&m.id))
    }
}

/// Mission ids completed on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMissions {
    pub day: NaiveDate,
    ids: HashSet<String>,
}

impl CompletedMissions {
    pub fn new(day: NaiveDate) -> Self {
        CompletedMissions {
            day,
            ids: HashSet::new(),
        }
    }

    pub fn with_ids(day: NaiveDate, ids: impl IntoIterator<Item = String>) -> Self {
        CompletedMissions {
            day,
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"id": "water", "title": "Drink water", "description": "8 glasses", "reward": 10, "icon": "💧"},
        {"id": "walk", "title": "Walk 5k steps", "reward": "25", "link": "https://example.org/walk"}
    ]"#;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_catalog_parses_optional_fields() {
        let catalog = MissionCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        let walk = catalog.get("walk").unwrap();
        assert_eq!(walk.reward, Amount::from_num(25));
        assert!(walk.icon.is_none());
        assert_eq!(walk.description, "");
    }

    #[test]
    fn test_unknown_mission_not_found() {
        let catalog = MissionCatalog::from_json(CATALOG).unwrap();
        let completed = CompletedMissions::new(day());
        assert!(matches!(
            catalog.claim("meditate", &completed),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_completed_mission_cannot_be_claimed_twice() {
        let catalog = MissionCatalog::from_json(CATALOG).unwrap();
        let mut completed = CompletedMissions::new(day());
        assert!(catalog.claim("water", &completed).is_ok());
        completed.insert("water");
        assert!(matches!(
            catalog.claim("water", &completed),
            Err(LedgerError::AlreadyCompleted(_))
        ));
        let open: Vec<_> = catalog.available(&completed).map(|m| m.id.as_str()).collect();
        assert_eq!(open, vec!["walk"]);
    }

    #[test]
    fn test_catalog_validation() {
        let duplicate = r#"[{"id": "a", "title": "A", "reward": 1}, {"id": "a", "title": "B", "reward": 2}]"#;
        assert!(MissionCatalog::from_json(duplicate).is_err());
        let free = r#"[{"id": "a", "title": "A", "reward": 0}]"#;
        assert!(MissionCatalog::from_json(free).is_err());
        let huge = r#"[{"id": "a", "title": "A", "reward": "9000000000000000000"}]"#;
        assert!(matches!(
            MissionCatalog::from_json(huge),
            Err(LedgerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_catalog_file_is_empty() {
        let catalog = MissionCatalog::load("/nonexistent/missions.json").unwrap();
        assert!(catalog.is_empty());
    }
}
