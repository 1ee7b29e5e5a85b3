//! Env-driven configuration with typed fallbacks.

use std::time::Duration;

use greenfelt_engine::TableConfig;
use greenfelt_types::constants::{
    DEFAULT_ACTION_TIMEOUT_MS, DEFAULT_BETTING_WINDOW_MS, DEFAULT_GRACE_WINDOW_MS,
    DEFAULT_LEDGER_TIMEOUT_MS, DEFAULT_PENETRATION_BPS, MAX_BET, MIN_BET, MIN_TRANSFER_AMOUNT,
    STARTING_CHIPS, STREAK_RESET_DAYS,
};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Minimum peer-to-peer transfer amount.
    pub min_transfer: u64,
    /// Shoe penetration before a mandatory reshuffle, in basis points.
    pub penetration_bps: u16,
    pub min_bet: u64,
    pub max_bet: u64,
    /// Per-seat action timeout, scoped to the current phase.
    pub action_timeout: Duration,
    /// Betting window between the first wager and the deal.
    pub betting_window: Duration,
    /// How long a disconnected seat is held before defaults apply.
    pub grace_window: Duration,
    /// Bounded wait for ledger calls from a table actor.
    pub ledger_timeout: Duration,
    /// Days without a claim before a streak resets.
    pub streak_reset_days: u64,
    /// Welcome bonus when the auth layer supplies no starting balance.
    pub starting_chips: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_transfer: MIN_TRANSFER_AMOUNT,
            penetration_bps: DEFAULT_PENETRATION_BPS,
            min_bet: MIN_BET,
            max_bet: MAX_BET,
            action_timeout: Duration::from_millis(DEFAULT_ACTION_TIMEOUT_MS),
            betting_window: Duration::from_millis(DEFAULT_BETTING_WINDOW_MS),
            grace_window: Duration::from_millis(DEFAULT_GRACE_WINDOW_MS),
            ledger_timeout: Duration::from_millis(DEFAULT_LEDGER_TIMEOUT_MS),
            streak_reset_days: STREAK_RESET_DAYS,
            starting_chips: STARTING_CHIPS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_transfer: read_u64("GREENFELT_MIN_TRANSFER", defaults.min_transfer),
            penetration_bps: read_u16("GREENFELT_PENETRATION_BPS", defaults.penetration_bps),
            min_bet: read_u64("GREENFELT_MIN_BET", defaults.min_bet),
            max_bet: read_u64("GREENFELT_MAX_BET", defaults.max_bet),
            action_timeout: read_ms("GREENFELT_ACTION_TIMEOUT_MS", defaults.action_timeout),
            betting_window: read_ms("GREENFELT_BETTING_WINDOW_MS", defaults.betting_window),
            grace_window: read_ms("GREENFELT_GRACE_WINDOW_MS", defaults.grace_window),
            ledger_timeout: read_ms("GREENFELT_LEDGER_TIMEOUT_MS", defaults.ledger_timeout),
            streak_reset_days: read_u64("GREENFELT_STREAK_RESET_DAYS", defaults.streak_reset_days),
            starting_chips: read_u64("GREENFELT_STARTING_CHIPS", defaults.starting_chips),
        }
    }

    pub fn table_config(&self) -> TableConfig {
        TableConfig {
            penetration_bps: self.penetration_bps,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            ..TableConfig::default()
        }
    }
}

fn read_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn read_u16(key: &str, fallback: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(fallback)
}

fn read_ms(key: &str, fallback: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}
