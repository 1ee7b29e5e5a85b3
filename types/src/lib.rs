//! Common types shared across the greenfelt service.
//!
//! Everything the store persists (transaction log records, streak rows) carries
//! a manual codec implementation so the bytes written today can be decoded by
//! tomorrow's build. Wire-facing views live in [`api`] and use serde instead.

pub mod api;
pub mod constants;
mod ledger;
mod streak;

pub use ledger::{read_string, string_encode_size, write_string, Transaction, TxKind};
pub use streak::StreakRecord;

/// Stable user identifier handed to the core by the external auth layer.
pub type PlayerId = String;

/// Chip amount in the smallest unit.
pub type Chips = u64;
