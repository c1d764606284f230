//! HabitStake - a habit-tracking token ledger with staking yield
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger
//! - [`ledger`] - Balance buckets, yield accrual, staking and history
//! - [`amount`] - Fixed-point token amounts
//! - [`mission`] - Mission catalog and daily completion tracking
//!
//! ## State Management
//! - [`persistence`] - Storage layer (SQLite, in-memory)
//! - [`service`] - Lock-guarded ledger with persistence and the accrual timer
//! - [`clock`] - Wall-clock abstraction
//!
//! ## Integration
//! - [`relay`] - Withdrawal relay to the external token network
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod amount;
pub mod ledger;
pub mod mission;

// ============================================================================
// State Management
// ============================================================================
pub mod clock;
pub mod persistence;
pub mod service;

// ============================================================================
// Integration
// ============================================================================
pub mod relay;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;
