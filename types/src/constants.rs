/// Maximum player identifier length accepted on the wire.
pub const MAX_PLAYER_ID_LENGTH: usize = 64;

/// Maximum table identifier length accepted on the wire.
pub const MAX_TABLE_ID_LENGTH: usize = 64;

/// Maximum client-supplied seed length for shuffle commitments.
pub const MAX_CLIENT_SEED_LENGTH: usize = 64;

/// Chips granted as a welcome bonus when no starting balance is supplied.
pub const STARTING_CHIPS: u64 = 1_000;

/// Minimum peer-to-peer transfer amount.
pub const MIN_TRANSFER_AMOUNT: u64 = 10;

/// Fraction of the shoe (basis points) consumed before a mandatory reshuffle.
pub const DEFAULT_PENETRATION_BPS: u16 = 7_500;

/// Seats per table.
pub const MAX_SEATS: usize = 6;

/// Table bet bounds (per betting circle).
pub const MIN_BET: u64 = 1;
pub const MAX_BET: u64 = 10_000;

/// Per-seat action timeout, scoped to the current phase.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 15_000;

/// Betting window between the first wager and the deal.
pub const DEFAULT_BETTING_WINDOW_MS: u64 = 12_000;

/// How long a disconnected player's seat is held before defaults apply.
pub const DEFAULT_GRACE_WINDOW_MS: u64 = 30_000;

/// Bounded wait for ledger calls issued from a table actor.
pub const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 2_000;

/// Bounded retries for store-level write conflicts before surfacing one.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Days without a claim before the streak resets to day 1 (a gap of exactly
/// one day keeps the streak alive).
pub const STREAK_RESET_DAYS: u64 = 2;

/// Daily reward amounts keyed by streak day (1-indexed; later days clamp to
/// the last entry).
pub const DAILY_REWARDS: [u64; 7] = [100, 120, 140, 160, 180, 200, 250];

/// Milestone overrides: (streak day, amplified reward).
pub const STREAK_MILESTONES: [(u32, u64); 3] = [(7, 500), (14, 1_000), (30, 5_000)];

/// Milliseconds per reward day.
pub const MS_PER_DAY: u64 = 24 * 60 * 60 * 1_000;
