//! Helpers shared by the command-line binaries

use crate::amount::format_amount;
use crate::clock::SystemClock;
use crate::config::{load_config_from, Config};
use crate::error::LedgerError;
use crate::ledger::{LedgerPolicy, LedgerState, TransactionRecord};
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use crate::service::LedgerService;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens the SQLite store named in the config, falling back to in-memory
/// storage when the database cannot be opened.
pub fn open_persistence(config: &Config) -> Arc<dyn Persistence> {
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create data dir {:?}: {}", parent, e);
            }
        }
    }

    match Database::open(&config.database.path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!(
                "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                config.database.path, e
            );
            Arc::new(InMemoryPersistence::new())
        }
    }
}

pub fn load_service_from_config(
    config_path: &str,
    wallet: Option<&str>,
) -> Result<(Config, LedgerService), LedgerError> {
    let config = load_config_from(config_path)?;
    let policy = LedgerPolicy::from_config(&config.ledger)?;
    let persistence = open_persistence(&config);
    let service = LedgerService::open(wallet, policy, persistence, Arc::new(SystemClock))?
        .with_save_attempts(config.database.save_attempts);
    Ok((config, service))
}

pub fn balance_table(state: &LedgerState) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Bucket").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Balance").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Yield today").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
        ]);

    table.add_row(vec![
        Cell::new("Liquid"),
        Cell::new(format_amount(state.liquid_balance, 2)).fg(TableColor::Green),
        Cell::new("-"),
    ]);
    table.add_row(vec![
        Cell::new("Locked stake"),
        Cell::new(format_amount(state.obligatory_stake, 2)).fg(TableColor::Yellow),
        Cell::new(format_amount(state.daily_yield_obligatory_accumulated, 0)),
    ]);
    table.add_row(vec![
        Cell::new("Voluntary stake"),
        Cell::new(format_amount(state.voluntary_stake, 2)).fg(TableColor::Magenta),
        Cell::new(format_amount(state.daily_yield_voluntary_accumulated, 0)),
    ]);
    table.add_row(vec![
        Cell::new("Spending"),
        Cell::new(format_amount(state.spending_balance, 2)).fg(TableColor::Blue),
        Cell::new("-"),
    ]);
    table
}

/// Most recent `limit` records, newest first.
pub fn history_table(records: &[TransactionRecord], limit: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("When").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Kind").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Amount").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Description").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
        ]);

    for record in records.iter().rev().take(limit) {
        let color = if record.kind.credits_liquid() {
            TableColor::Green
        } else {
            TableColor::Yellow
        };
        table.add_row(vec![
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(record.kind.label()).fg(color),
            Cell::new(format_amount(record.amount, 2)),
            Cell::new(&record.description),
        ]);
    }
    table
}
