//! Routing envelope and wire-level helpers for the real-time channel.

use greenfelt_engine::{PlayerAction, TableError};
use greenfelt_types::api::Outbound;
use greenfelt_types::PlayerId;

use crate::coordinator::CoordinatorError;
use crate::engagement::EngagementError;
use crate::ledger::LedgerError;
use crate::table_actor::ActorError;

/// One broadcast message with its routing target.
///
/// `target: None` is table-public (spectator-safe); `Some(player)` is for
/// that player's session only.
#[derive(Clone, Debug)]
pub struct Event {
    pub target: Option<PlayerId>,
    pub msg: Outbound,
}

impl Event {
    pub fn public(msg: Outbound) -> Self {
        Self { target: None, msg }
    }

    pub fn personal(player: impl Into<PlayerId>, msg: Outbound) -> Self {
        Self {
            target: Some(player.into()),
            msg,
        }
    }
}

/// Parse an inbound `player_action` into a typed action.
pub fn parse_action(action: &str, amount: Option<u64>) -> Option<PlayerAction> {
    match action {
        "hit" => Some(PlayerAction::Hit),
        "stand" => Some(PlayerAction::Stand),
        "double" => Some(PlayerAction::Double),
        "split" => Some(PlayerAction::Split),
        "insurance" => Some(PlayerAction::Insurance(amount.unwrap_or(0))),
        "pass" => Some(PlayerAction::Insurance(0)),
        "war" => Some(PlayerAction::War),
        "surrender" => Some(PlayerAction::Surrender),
        "ride" => Some(PlayerAction::Ride),
        "pull" | "pull_back" => Some(PlayerAction::PullBack),
        _ => None,
    }
}

/// Stable error codes surfaced on `action_rejected`/`error` messages.
pub fn error_code(err: &CoordinatorError) -> (&'static str, String) {
    let code = match err {
        CoordinatorError::IdentifierTooLong => "INVALID_IDENTIFIER",
        CoordinatorError::UnknownGame(_) => "UNKNOWN_GAME",
        CoordinatorError::GameMismatch(_) => "GAME_MISMATCH",
        CoordinatorError::NotAtTable => "NOT_AT_TABLE",
        CoordinatorError::Actor(actor) => match actor {
            ActorError::Table(table) => table_error_code(table),
            ActorError::Ledger(ledger) => ledger_error_code(ledger),
            ActorError::Infrastructure(_) => "INFRASTRUCTURE",
            ActorError::Closed => "TABLE_CLOSED",
        },
        CoordinatorError::Ledger(ledger) => ledger_error_code(ledger),
        CoordinatorError::Engagement(EngagementError::AlreadyClaimed) => "ALREADY_CLAIMED",
        CoordinatorError::Engagement(EngagementError::Ledger(ledger)) => ledger_error_code(ledger),
        CoordinatorError::Engagement(EngagementError::Unavailable(_)) => "INFRASTRUCTURE",
        CoordinatorError::Store(_) => "INFRASTRUCTURE",
        CoordinatorError::InvalidAction(_) => "INVALID_ACTION",
    };
    (code, err.to_string())
}

fn table_error_code(err: &TableError) -> &'static str {
    match err {
        TableError::TableFull => "TABLE_FULL",
        TableError::NotSeated => "NOT_SEATED",
        TableError::WrongPhase(_) => "WRONG_PHASE",
        TableError::OutOfTurn => "OUT_OF_TURN",
        TableError::InvalidBet { .. } => "INVALID_BET",
        TableError::AlreadyBet => "ALREADY_BET",
        TableError::NoBets => "NO_BETS",
        TableError::NeedsOpponent => "NEEDS_OPPONENT",
        TableError::IllegalAction(_) => "ILLEGAL_ACTION",
        TableError::InvalidInsurance { .. } => "INVALID_INSURANCE",
        TableError::Shuffle(_) => "INVALID_SEED",
        TableError::Protocol => "PROTOCOL_VIOLATION",
    }
}

fn ledger_error_code(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        LedgerError::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
        LedgerError::BelowMinimum { .. } => "TRANSFER_BELOW_MINIMUM",
        LedgerError::SelfTransfer => "SELF_TRANSFER",
        LedgerError::NotFriends => "NOT_FRIENDS",
        LedgerError::AmountOverflow => "INVALID_AMOUNT",
        LedgerError::Conflict => "TRANSIENT_CONFLICT",
        LedgerError::Unavailable(_) => "INFRASTRUCTURE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!(parse_action("hit", None), Some(PlayerAction::Hit));
        assert_eq!(
            parse_action("insurance", Some(25)),
            Some(PlayerAction::Insurance(25))
        );
        assert_eq!(parse_action("pass", None), Some(PlayerAction::Insurance(0)));
        assert_eq!(parse_action("pull_back", None), Some(PlayerAction::PullBack));
        assert_eq!(parse_action("fold", None), None);
    }

    #[test]
    fn test_error_codes_are_stable() {
        let err = CoordinatorError::Actor(ActorError::Ledger(
            LedgerError::InsufficientBalance { have: 1, need: 2 },
        ));
        assert_eq!(error_code(&err).0, "INSUFFICIENT_BALANCE");
        let err = CoordinatorError::Actor(ActorError::Table(TableError::OutOfTurn));
        assert_eq!(error_code(&err).0, "OUT_OF_TURN");
    }
}
