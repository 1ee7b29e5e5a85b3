//! Deterministic game logic for greenfelt.
//!
//! This crate contains the commit-reveal shuffle pipeline and the per-table
//! game state machines consumed by the server.
//!
//! ## Determinism requirements
//! - Do not use wall-clock time inside game logic; timers live in the server.
//! - Do not use ambient randomness; entropy is always passed in by the
//!   caller, and every dealt card comes from the shuffled shoe.
//! - A table is owned by exactly one writer; nothing here synchronizes.

pub mod cards;
pub mod shoe;
pub mod shuffle;
pub mod table;

mod blackjack;
mod let_it_ride;
mod war;

pub use shuffle::{
    compute_commit, shuffle_deck, verify_reveal, SeedCommitment, ShuffleError, ShuffleProof,
    MAX_DECK_SIZE, SEED_LEN,
};
pub use table::{
    GameVariant, PlayerAction, Settlement, SettlementKind, Table, TableConfig, TableError,
    TablePhase, TableUpdate,
};
