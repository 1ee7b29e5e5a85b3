//! Shared playing-card helpers.
//!
//! Cards are encoded as `0..=51`, where:
//! - suit = card / 13 (0..=3)
//! - rank = card % 13 (0..=12)
//!
//! Ace encodes as rank 0 but compares high (14) in rank contests.

/// Total cards in a standard deck.
pub const CARDS_PER_DECK: u8 = 52;

/// Ranks per suit.
pub const RANKS_PER_SUIT: u8 = 13;

/// Returns true if `card` is within `0..CARDS_PER_DECK`.
pub fn is_valid_card(card: u8) -> bool {
    card < CARDS_PER_DECK
}

/// Returns the 0-based rank (0..=12), where 0 is Ace.
pub fn card_rank(card: u8) -> u8 {
    card % RANKS_PER_SUIT
}

/// Returns the 1-based rank (1..=13), where 1 is Ace and 13 is King.
pub fn card_rank_one_based(card: u8) -> u8 {
    card_rank(card) + 1
}

/// Returns the rank for comparisons (2..=14), where Ace is high (14).
pub fn card_rank_ace_high(card: u8) -> u8 {
    let r = card_rank_one_based(card);
    if r == 1 {
        14
    } else {
        r
    }
}

/// Returns the suit (0..=3).
pub fn card_suit(card: u8) -> u8 {
    card / RANKS_PER_SUIT
}

/// Short display label, e.g. "AS" or "10H". Invalid cards render as "?".
pub fn card_label(card: u8) -> String {
    if !is_valid_card(card) {
        return "?".to_string();
    }
    let rank_label = match card_rank_one_based(card) {
        1 => "A".to_string(),
        11 => "J".to_string(),
        12 => "Q".to_string(),
        13 => "K".to_string(),
        r => r.to_string(),
    };
    let suit = match card_suit(card) {
        0 => "S",
        1 => "H",
        2 => "D",
        3 => "C",
        _ => "?",
    };
    format!("{}{}", rank_label, suit)
}

/// Label used for cards the viewer is not allowed to see yet.
pub const HIDDEN_LABEL: &str = "??";
