//! Per-table game state machine.
//!
//! One [`Table`] instance exists per active room and is owned by a single
//! writer (the table actor); nothing here is shared. The generic phase cycle
//! is `Waiting -> Betting -> Dealing -> PlayerAction -> Resolution -> Payout
//! -> Complete -> Waiting`, with variant-specific round data carried as a
//! tagged [`RoundState`] so the legal-action check stays a pure function of
//! (variant, phase, seat state).
//!
//! Money never moves here. Stakes are debited by the ledger *before*
//! [`Table::commit_bet`]/[`Table::act`] record them, and the table reports
//! [`Settlement`] credits for the server to apply. A failed debit therefore
//! leaves the table exactly where it was.

use greenfelt_types::api::{HandView, SeatView, TableSnapshot};
use greenfelt_types::constants::{
    DEFAULT_PENETRATION_BPS, MAX_BET, MAX_CLIENT_SEED_LENGTH, MAX_SEATS, MIN_BET,
};
use greenfelt_types::{Chips, PlayerId};
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::{debug, error};

use crate::blackjack::{self, BjStage, BlackjackRound};
use crate::cards::{card_label, CARDS_PER_DECK, HIDDEN_LABEL};
use crate::let_it_ride::{self, LirRound, LirStage, STAKES_PER_SEAT};
use crate::shoe::Shoe;
use crate::shuffle::{SeedCommitment, ShuffleError, ShuffleProof};
use crate::war::{self, WarRound};

/// Supported game variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameVariant {
    War = 0,
    Blackjack = 1,
    LetItRide = 2,
}

impl GameVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::War => "war",
            Self::Blackjack => "blackjack",
            Self::LetItRide => "let_it_ride",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "war" => Some(Self::War),
            "blackjack" => Some(Self::Blackjack),
            "let_it_ride" => Some(Self::LetItRide),
            _ => None,
        }
    }

    /// War is head-to-head; the other variants play against the paytable or
    /// the dealer and accept a lone seat.
    fn min_players(&self) -> usize {
        match self {
            Self::War => 2,
            Self::Blackjack | Self::LetItRide => 1,
        }
    }
}

/// Generic table phases shared by every variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TablePhase {
    Waiting,
    Betting,
    Dealing,
    PlayerAction,
    Resolution,
    Payout,
    Complete,
}

impl TablePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Betting => "betting",
            Self::Dealing => "dealing",
            Self::PlayerAction => "player_action",
            Self::Resolution => "resolution",
            Self::Payout => "payout",
            Self::Complete => "complete",
        }
    }
}

/// Player decisions submitted during the action phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    Hit,
    Stand,
    Double,
    Split,
    /// Insurance stake; zero declines.
    Insurance(Chips),
    War,
    Surrender,
    Ride,
    PullBack,
}

impl PlayerAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stand => "stand",
            Self::Double => "double",
            Self::Split => "split",
            Self::Insurance(_) => "insurance",
            Self::War => "war",
            Self::Surrender => "surrender",
            Self::Ride => "ride",
            Self::PullBack => "pull",
        }
    }
}

/// A credit owed to a player when a round resolves or voids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub player: PlayerId,
    pub amount: Chips,
    pub kind: SettlementKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementKind {
    Payout,
    Refund,
}

/// What a mutating table call produced.
#[derive(Debug, Default)]
pub struct TableUpdate {
    pub settlements: Vec<Settlement>,
    /// Published when a shoe retired during this call.
    pub retired_proof: Option<ShuffleProof>,
    pub round_voided: bool,
}

/// Outcome of a variant-level step, translated into phases by the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VariantStep {
    Continue,
    Resolved,
    /// The shoe could not supply the cards the rules demanded.
    Voided,
}

/// Typed rejections. Everything except [`TableError::Protocol`] leaves table
/// state unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("table is full")]
    TableFull,
    #[error("player is not seated at this table")]
    NotSeated,
    #[error("action not legal in phase {0}")]
    WrongPhase(&'static str),
    #[error("not this seat's turn")]
    OutOfTurn,
    #[error("bet out of bounds (got={got}, min={min}, max={max})")]
    InvalidBet { got: u64, min: u64, max: u64 },
    #[error("bet already placed for this round")]
    AlreadyBet,
    #[error("no bets on the table")]
    NoBets,
    #[error("this game needs another seated player")]
    NeedsOpponent,
    #[error("{0} is not legal for this hand")]
    IllegalAction(&'static str),
    #[error("insurance amount {got} exceeds half the bet ({max})")]
    InvalidInsurance { got: u64, max: u64 },
    #[error(transparent)]
    Shuffle(#[from] ShuffleError),
    #[error("shuffle reveal failed verification")]
    Protocol,
}

/// Table-level configuration values.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub penetration_bps: u16,
    pub min_bet: Chips,
    pub max_bet: Chips,
    pub seats: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            penetration_bps: DEFAULT_PENETRATION_BPS,
            min_bet: MIN_BET,
            max_bet: MAX_BET,
            seats: MAX_SEATS,
        }
    }
}

#[derive(Clone, Debug)]
struct Seat {
    player: PlayerId,
    pending_leave: bool,
}

#[derive(Clone, Debug)]
enum RoundState {
    Idle,
    War(WarRound),
    Blackjack(BlackjackRound),
    LetItRide(LirRound),
}

/// One table: seats, shoe, commitment, and the current round.
#[derive(Debug)]
pub struct Table {
    id: String,
    variant: GameVariant,
    config: TableConfig,
    phase: TablePhase,
    seats: Vec<Option<Seat>>,
    /// Per-seat base wager for the current round.
    bets: Vec<Option<Chips>>,
    /// Everything each seat has put into the current round (for voids).
    staked: Vec<Chips>,
    shoe: Option<Shoe>,
    commitment: SeedCommitment,
    active_proof: Option<ShuffleProof>,
    pending_client_seed: Option<String>,
    shoe_generation: u64,
    round_id: u64,
    round: RoundState,
}

impl Table {
    pub fn new<R: RngCore + CryptoRng>(
        id: String,
        variant: GameVariant,
        config: TableConfig,
        entropy: &mut R,
    ) -> Self {
        let seats = config.seats;
        Self {
            id,
            variant,
            config,
            phase: TablePhase::Waiting,
            seats: vec![None; seats],
            bets: vec![None; seats],
            staked: vec![0; seats],
            shoe: None,
            commitment: SeedCommitment::generate(entropy, 0),
            active_proof: None,
            pending_client_seed: None,
            shoe_generation: 0,
            round_id: 0,
            round: RoundState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn phase(&self) -> TablePhase {
        self.phase
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn is_empty(&self) -> bool {
        self.seats.iter().all(Option::is_none)
    }

    pub fn occupied(&self) -> usize {
        self.seats.iter().filter(|seat| seat.is_some()).count()
    }

    /// A round is in progress once cards have hit the felt.
    pub fn round_active(&self) -> bool {
        matches!(
            self.phase,
            TablePhase::Dealing
                | TablePhase::PlayerAction
                | TablePhase::Resolution
                | TablePhase::Payout
        )
    }

    pub fn seat_of(&self, player: &str) -> Option<usize> {
        self.seats.iter().position(|seat| {
            seat.as_ref()
                .is_some_and(|occupied| occupied.player == player)
        })
    }

    pub fn player_at(&self, seat: usize) -> Option<&PlayerId> {
        self.seats.get(seat)?.as_ref().map(|seat| &seat.player)
    }

    pub fn seated_players(&self) -> Vec<(usize, PlayerId)> {
        self.seats
            .iter()
            .enumerate()
            .filter_map(|(idx, seat)| seat.as_ref().map(|seat| (idx, seat.player.clone())))
            .collect()
    }

    /// Seat a player (idempotent for an already-seated player).
    ///
    /// A client seed offered here feeds the next shuffle, not the shoe
    /// already in play.
    pub fn join(&mut self, player: &str, client_seed: Option<&str>) -> Result<usize, TableError> {
        if let Some(seed) = client_seed {
            if seed.len() > MAX_CLIENT_SEED_LENGTH {
                return Err(ShuffleError::ClientSeedTooLong(seed.len()).into());
            }
            if !seed.is_empty() && self.pending_client_seed.is_none() {
                self.pending_client_seed = Some(seed.to_string());
            }
        }
        if let Some(seat) = self.seat_of(player) {
            return Ok(seat);
        }
        let free = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(TableError::TableFull)?;
        self.seats[free] = Some(Seat {
            player: player.to_string(),
            pending_leave: false,
        });
        Ok(free)
    }

    /// Remove a player. A seat holding live chips in an active round is held
    /// until the round settles; a betting-phase wager is refunded on the
    /// spot.
    pub fn leave(&mut self, player: &str) -> Result<TableUpdate, TableError> {
        let seat = self.seat_of(player).ok_or(TableError::NotSeated)?;
        let mut update = TableUpdate::default();
        if self.round_active() && self.staked[seat] > 0 {
            if let Some(occupied) = self.seats[seat].as_mut() {
                occupied.pending_leave = true;
            }
            return Ok(update);
        }
        if self.phase == TablePhase::Betting && self.staked[seat] > 0 {
            update.settlements.push(Settlement {
                player: player.to_string(),
                amount: self.staked[seat],
                kind: SettlementKind::Refund,
            });
        }
        self.seats[seat] = None;
        self.bets[seat] = None;
        self.staked[seat] = 0;
        if self.is_empty() && !self.round_active() {
            self.phase = TablePhase::Waiting;
            self.round = RoundState::Idle;
        }
        Ok(update)
    }

    /// Validate a wager and return the amount the ledger must debit
    /// (Let-It-Ride places three equal stakes per wager).
    pub fn check_bet(&self, player: &str, amount: Chips) -> Result<Chips, TableError> {
        let seat = self.seat_of(player).ok_or(TableError::NotSeated)?;
        match self.phase {
            TablePhase::Waiting | TablePhase::Complete | TablePhase::Betting => {}
            other => return Err(TableError::WrongPhase(other.as_str())),
        }
        if self.phase == TablePhase::Betting && self.bets[seat].is_some() {
            return Err(TableError::AlreadyBet);
        }
        if amount < self.config.min_bet || amount > self.config.max_bet {
            return Err(TableError::InvalidBet {
                got: amount,
                min: self.config.min_bet,
                max: self.config.max_bet,
            });
        }
        Ok(self.bet_stake(amount))
    }

    fn bet_stake(&self, amount: Chips) -> Chips {
        match self.variant {
            GameVariant::LetItRide => amount.saturating_mul(STAKES_PER_SEAT),
            _ => amount,
        }
    }

    /// Record a wager whose stake the ledger has already debited.
    pub fn commit_bet(&mut self, player: &str, amount: Chips) -> Result<(), TableError> {
        let stake = self.check_bet(player, amount)?;
        let seat = self.seat_of(player).ok_or(TableError::NotSeated)?;
        if matches!(self.phase, TablePhase::Waiting | TablePhase::Complete) {
            // First wager of a fresh round reopens betting.
            self.round = RoundState::Idle;
            self.bets.iter_mut().for_each(|bet| *bet = None);
            self.staked.iter_mut().for_each(|staked| *staked = 0);
            self.phase = TablePhase::Betting;
        }
        self.bets[seat] = Some(amount);
        self.staked[seat] = stake;
        Ok(())
    }

    pub fn has_bets(&self) -> bool {
        self.bets.iter().any(Option::is_some)
    }

    fn wagered_seats(&self) -> usize {
        self.bets.iter().filter(|bet| bet.is_some()).count()
    }

    /// Whether the betting window can close into a deal right now.
    pub fn can_deal(&self) -> bool {
        self.phase == TablePhase::Betting && self.wagered_seats() >= self.variant.min_players()
    }

    /// Every occupied seat has wagered, so the deal need not wait out the
    /// betting window.
    pub fn all_seats_ready(&self) -> bool {
        self.can_deal()
            && self
                .seats
                .iter()
                .enumerate()
                .all(|(idx, seat)| seat.is_none() || self.bets[idx].is_some())
    }

    /// Close a betting window that cannot produce a deal, refunding any
    /// wagers that were taken (e.g. a lone War seat with no opponent).
    pub fn cancel_betting(&mut self) -> Result<TableUpdate, TableError> {
        if self.phase != TablePhase::Betting {
            return Err(TableError::WrongPhase(self.phase.as_str()));
        }
        let mut update = TableUpdate::default();
        for (idx, seat) in self.seats.iter().enumerate() {
            let Some(seat) = seat else { continue };
            if self.staked[idx] > 0 {
                update.settlements.push(Settlement {
                    player: seat.player.clone(),
                    amount: self.staked[idx],
                    kind: SettlementKind::Refund,
                });
            }
        }
        self.bets.iter_mut().for_each(|bet| *bet = None);
        self.staked.iter_mut().for_each(|staked| *staked = 0);
        self.phase = TablePhase::Waiting;
        Ok(update)
    }

    /// Shuffle a fresh shoe if the current one is missing, penetrated, or
    /// force-flagged. Returns the retired (revealed, verified) proof.
    fn ensure_shoe<R: RngCore + CryptoRng>(
        &mut self,
        entropy: &mut R,
    ) -> Result<Option<ShuffleProof>, TableError> {
        let needs = match &self.shoe {
            None => true,
            Some(shoe) => shoe.needs_reshuffle(),
        };
        if !needs {
            return Ok(None);
        }
        let retired = if let Some(mut proof) = self.active_proof.take() {
            let next_nonce = self.commitment.next_nonce();
            let old = std::mem::replace(
                &mut self.commitment,
                SeedCommitment::generate(entropy, next_nonce),
            );
            proof.server_seed = Some(old.reveal());
            if proof.verify().is_err() {
                // Fatal protocol violation: the caller voids the round and
                // the incident is preserved for audit.
                error!(table = %self.id, nonce = proof.nonce, "shuffle reveal failed verification");
                self.shoe = None;
                return Err(TableError::Protocol);
            }
            Some(proof)
        } else {
            None
        };
        let client_seed = match self.pending_client_seed.take() {
            Some(seed) => seed,
            None => default_client_seed(entropy),
        };
        let (deck, proof) = self
            .commitment
            .shuffle(&client_seed, usize::from(CARDS_PER_DECK))?;
        self.shoe = Some(Shoe::new(deck, self.config.penetration_bps));
        self.shoe_generation += 1;
        debug!(
            table = %self.id,
            generation = self.shoe_generation,
            nonce = proof.nonce,
            "shoe shuffled"
        );
        self.active_proof = Some(proof);
        Ok(retired)
    }

    /// Deal the round for every seated wager.
    pub fn deal<R: RngCore + CryptoRng>(
        &mut self,
        entropy: &mut R,
    ) -> Result<TableUpdate, TableError> {
        if self.phase != TablePhase::Betting {
            return Err(TableError::WrongPhase(self.phase.as_str()));
        }
        let entries: Vec<(usize, PlayerId, Chips)> = self
            .seats
            .iter()
            .enumerate()
            .filter_map(|(idx, seat)| {
                let seat = seat.as_ref()?;
                let bet = self.bets[idx]?;
                Some((idx, seat.player.clone(), bet))
            })
            .collect();
        if entries.is_empty() {
            return Err(TableError::NoBets);
        }
        if entries.len() < self.variant.min_players() {
            return Err(TableError::NeedsOpponent);
        }

        let mut update = TableUpdate::default();
        match self.ensure_shoe(entropy) {
            Ok(retired) => update.retired_proof = retired,
            Err(TableError::Protocol) => {
                let mut voided = self.void_round();
                voided.retired_proof = None;
                return Ok(voided);
            }
            Err(other) => return Err(other),
        }
        self.phase = TablePhase::Dealing;
        self.round_id += 1;

        let Some(shoe) = self.shoe.as_mut() else {
            return Err(TableError::WrongPhase("dealing"));
        };
        let step = match self.variant {
            GameVariant::War => match war::deal(entries, shoe) {
                Some((round, step)) => {
                    self.round = RoundState::War(round);
                    step
                }
                None => VariantStep::Voided,
            },
            GameVariant::Blackjack => match blackjack::deal(entries, shoe) {
                Some((round, step)) => {
                    self.round = RoundState::Blackjack(round);
                    step
                }
                None => VariantStep::Voided,
            },
            GameVariant::LetItRide => match let_it_ride::deal(entries, shoe) {
                Some((round, step)) => {
                    self.round = RoundState::LetItRide(round);
                    step
                }
                None => VariantStep::Voided,
            },
        };
        self.finish_step(step, update)
    }

    /// Seat index the round is waiting on, during the action phase.
    pub fn current_turn(&self) -> Option<usize> {
        if self.phase != TablePhase::PlayerAction {
            return None;
        }
        match &self.round {
            RoundState::War(round) => round.turn_entry().map(|e| round.entries[e].seat),
            RoundState::Blackjack(round) => round.turn_seat().map(|e| round.seats[e].seat),
            RoundState::LetItRide(round) => round.turn_seat().map(|e| round.seats[e].seat),
            RoundState::Idle => None,
        }
    }

    /// The action applied when the current seat's timer expires.
    pub fn default_action(&self) -> Option<PlayerAction> {
        if self.phase != TablePhase::PlayerAction {
            return None;
        }
        match &self.round {
            RoundState::War(round) => Some(if round.depth <= 1 {
                PlayerAction::Surrender
            } else {
                PlayerAction::War
            }),
            RoundState::Blackjack(round) => match round.stage {
                BjStage::Insurance => Some(PlayerAction::Insurance(0)),
                BjStage::Hands => Some(PlayerAction::Stand),
                BjStage::Complete => None,
            },
            RoundState::LetItRide(_) => Some(PlayerAction::Ride),
            RoundState::Idle => None,
        }
    }

    /// Legal actions for a player, empty unless it is their turn.
    pub fn legal_actions(&self, player: &str) -> Vec<&'static str> {
        let Some(seat) = self.seat_of(player) else {
            return Vec::new();
        };
        if self.current_turn() != Some(seat) {
            return Vec::new();
        }
        match &self.round {
            RoundState::War(round) => round.legal_actions(),
            RoundState::Blackjack(round) => round
                .entry_of_seat(seat)
                .map(|e| round.legal_actions(e))
                .unwrap_or_default(),
            RoundState::LetItRide(round) => round.legal_actions(),
            RoundState::Idle => Vec::new(),
        }
    }

    /// Chips the ledger must debit before [`Table::act`] records `action`.
    pub fn stake_required(
        &self,
        player: &str,
        action: &PlayerAction,
    ) -> Result<Chips, TableError> {
        if self.phase != TablePhase::PlayerAction {
            return Err(TableError::WrongPhase(self.phase.as_str()));
        }
        let seat = self.seat_of(player).ok_or(TableError::NotSeated)?;
        match &self.round {
            RoundState::War(round) => {
                let entry = round.entry_of_seat(seat).ok_or(TableError::NotSeated)?;
                Ok(round.stake_required(entry, action))
            }
            RoundState::Blackjack(round) => {
                let entry = round.entry_of_seat(seat).ok_or(TableError::NotSeated)?;
                round.stake_required(entry, action)
            }
            RoundState::LetItRide(_) => Ok(0),
            RoundState::Idle => Err(TableError::WrongPhase("idle")),
        }
    }

    /// Apply a player decision whose stake (if any) is already debited.
    pub fn act(&mut self, player: &str, action: PlayerAction) -> Result<TableUpdate, TableError> {
        self.act_inner(player, action, false)
    }

    /// Settle the current seat with its default when the player cannot act:
    /// an unfunded mandatory war raise surrenders, everything else takes the
    /// free default action.
    pub fn forfeit(&mut self, player: &str) -> Result<TableUpdate, TableError> {
        match &self.round {
            RoundState::War(_) => self.act_inner(player, PlayerAction::Surrender, true),
            _ => match self.default_action() {
                Some(action) => self.act_inner(player, action, true),
                None => Err(TableError::WrongPhase(self.phase.as_str())),
            },
        }
    }

    fn act_inner(
        &mut self,
        player: &str,
        action: PlayerAction,
        forced: bool,
    ) -> Result<TableUpdate, TableError> {
        if self.phase != TablePhase::PlayerAction {
            return Err(TableError::WrongPhase(self.phase.as_str()));
        }
        let seat = self.seat_of(player).ok_or(TableError::NotSeated)?;
        if self.current_turn() != Some(seat) {
            return Err(TableError::OutOfTurn);
        }
        let stake = self.stake_required(player, &action)?;

        let mut update = TableUpdate::default();
        self.staked[seat] = self.staked[seat].saturating_add(stake);

        let result = match &mut self.round {
            RoundState::War(round) => {
                let entry = round.entry_of_seat(seat).ok_or(TableError::NotSeated)?;
                match self.shoe.as_mut() {
                    Some(shoe) => round.act(entry, &action, shoe, forced),
                    None => Err(TableError::WrongPhase("idle")),
                }
            }
            RoundState::Blackjack(round) => {
                let entry = round.entry_of_seat(seat).ok_or(TableError::NotSeated)?;
                match self.shoe.as_mut() {
                    Some(shoe) => round.act(entry, &action, shoe),
                    None => Err(TableError::WrongPhase("idle")),
                }
            }
            RoundState::LetItRide(round) => {
                let entry = round.entry_of_seat(seat).ok_or(TableError::NotSeated)?;
                match round.act(entry, &action) {
                    Ok((step, refund)) => {
                        if let Some(refund) = refund {
                            self.staked[seat] = self.staked[seat].saturating_sub(refund);
                            update.settlements.push(Settlement {
                                player: player.to_string(),
                                amount: refund,
                                kind: SettlementKind::Refund,
                            });
                        }
                        Ok(step)
                    }
                    Err(err) => Err(err),
                }
            }
            RoundState::Idle => Err(TableError::WrongPhase("idle")),
        };

        let step = match result {
            Ok(step) => step,
            Err(err) => {
                // Unwind the stake bookkeeping; the caller refunds the debit.
                self.staked[seat] = self.staked[seat].saturating_sub(stake);
                return Err(err);
            }
        };
        self.finish_step(step, update)
    }

    /// Translate a variant step into table phases and settlements.
    fn finish_step(
        &mut self,
        step: VariantStep,
        mut update: TableUpdate,
    ) -> Result<TableUpdate, TableError> {
        match step {
            VariantStep::Continue => {
                self.phase = TablePhase::PlayerAction;
            }
            VariantStep::Resolved => {
                self.phase = TablePhase::Resolution;
                let settlements = match &self.round {
                    RoundState::War(round) => round.settlements(),
                    RoundState::Blackjack(round) => round.settlements(),
                    RoundState::LetItRide(round) => round.settlements(),
                    RoundState::Idle => Vec::new(),
                };
                update.settlements.extend(settlements);
                self.phase = TablePhase::Complete;
                self.close_round();
            }
            VariantStep::Voided => {
                let mut voided = self.void_round();
                update.settlements.append(&mut voided.settlements);
                update.round_voided = true;
            }
        }
        Ok(update)
    }

    /// Void the round: refund every stake taken, force a reshuffle, and
    /// settle the table into `Complete`.
    pub fn void_round(&mut self) -> TableUpdate {
        let mut update = TableUpdate {
            round_voided: true,
            ..Default::default()
        };
        for (idx, seat) in self.seats.iter().enumerate() {
            let Some(seat) = seat else { continue };
            if self.staked[idx] > 0 {
                update.settlements.push(Settlement {
                    player: seat.player.clone(),
                    amount: self.staked[idx],
                    kind: SettlementKind::Refund,
                });
            }
        }
        self.bets.iter_mut().for_each(|bet| *bet = None);
        self.round = RoundState::Idle;
        if let Some(shoe) = &mut self.shoe {
            shoe.force_reshuffle();
        }
        self.phase = TablePhase::Complete;
        self.close_round();
        update
    }

    fn close_round(&mut self) {
        self.staked.iter_mut().for_each(|staked| *staked = 0);
        for (idx, seat) in self.seats.iter_mut().enumerate() {
            if seat.as_ref().is_some_and(|s| s.pending_leave) {
                *seat = None;
                self.bets[idx] = None;
            }
        }
        if self.is_empty() {
            self.phase = TablePhase::Waiting;
        }
    }

    /// Hex commitment for the shoe in play (or the next one).
    pub fn commitment_hex(&self) -> String {
        let hash = self
            .active_proof
            .as_ref()
            .map(|proof| &proof.server_seed_hash)
            .unwrap_or_else(|| self.commitment.hash());
        commonware_utils::hex(hash)
    }

    /// Full latest-state snapshot. `viewer` controls hidden-card visibility.
    pub fn snapshot(&self, viewer: Option<&str>) -> TableSnapshot {
        let turn = self.current_turn();
        let mut seats = Vec::new();
        for (idx, seat) in self.seats.iter().enumerate() {
            let Some(seat) = seat else { continue };
            let mut view = SeatView {
                seat: idx as u8,
                player_id: seat.player.clone(),
                bet: self.bets[idx].unwrap_or(0),
                cards: Vec::new(),
                hands: Vec::new(),
                status: if self.bets[idx].is_some() {
                    "ready"
                } else {
                    "waiting"
                }
                .to_string(),
            };
            match &self.round {
                RoundState::War(round) => {
                    if let Some(entry) = round.entry_of_seat(idx) {
                        let entry = &round.entries[entry];
                        view.cards = entry.cards.iter().copied().map(card_label).collect();
                        view.bet = entry.bet;
                        view.status = entry.status.as_str().to_string();
                    }
                }
                RoundState::Blackjack(round) => {
                    if let Some(entry) = round.entry_of_seat(idx) {
                        let seat_round = &round.seats[entry];
                        view.bet = seat_round.base_bet();
                        view.hands = seat_round
                            .hands
                            .iter()
                            .map(|hand| HandView {
                                cards: hand.cards.iter().copied().map(card_label).collect(),
                                bet: hand.bet,
                                status: hand.status.as_str().to_string(),
                            })
                            .collect();
                        view.status = if round.turn_seat() == Some(entry) {
                            "acting".to_string()
                        } else {
                            "playing".to_string()
                        };
                    }
                }
                RoundState::LetItRide(round) => {
                    if let Some(entry) = round.entry_of_seat(idx) {
                        let seat_round = &round.seats[entry];
                        let mine = viewer == Some(seat.player.as_str());
                        let shown = mine || round.stage == LirStage::Complete;
                        view.cards = seat_round
                            .cards
                            .iter()
                            .map(|&card| {
                                if shown {
                                    card_label(card)
                                } else {
                                    HIDDEN_LABEL.to_string()
                                }
                            })
                            .collect();
                        view.bet = seat_round.unit;
                        view.status = match seat_round.rank {
                            Some(rank) => rank.as_str().to_string(),
                            None => format!("riding_{}", seat_round.live),
                        };
                    }
                }
                RoundState::Idle => {}
            }
            seats.push(view);
        }

        let dealer_cards = match &self.round {
            RoundState::Blackjack(round) if !round.dealer.is_empty() => {
                if round.hole_revealed {
                    round.dealer.iter().copied().map(card_label).collect()
                } else {
                    vec![card_label(round.dealer[0]), HIDDEN_LABEL.to_string()]
                }
            }
            _ => Vec::new(),
        };
        let community_cards = match &self.round {
            RoundState::LetItRide(round) => round
                .community
                .iter()
                .enumerate()
                .map(|(i, &card)| {
                    if (i as u8) < round.revealed {
                        card_label(card)
                    } else {
                        HIDDEN_LABEL.to_string()
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        let war_depth = match &self.round {
            RoundState::War(round) if round.depth > 0 => Some(round.depth),
            _ => None,
        };
        let your_seat = viewer.and_then(|player| self.seat_of(player));
        let your_actions = viewer
            .map(|player| {
                self.legal_actions(player)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        TableSnapshot {
            table_id: self.id.clone(),
            game: self.variant.as_str().to_string(),
            round_id: self.round_id,
            phase: self.phase.as_str().to_string(),
            commitment: self.commitment_hex(),
            shoe_remaining: self
                .shoe
                .as_ref()
                .map_or(u32::from(CARDS_PER_DECK), |shoe| shoe.remaining() as u32),
            seats,
            dealer_cards,
            community_cards,
            turn: turn.map(|seat| seat as u8),
            war_depth,
            your_seat: your_seat.map(|seat| seat as u8),
            your_actions,
        }
    }
}

/// Default client seed when no player contributed one before the shuffle.
fn default_client_seed<R: RngCore + CryptoRng>(entropy: &mut R) -> String {
    let mut bytes = [0u8; 16];
    entropy.fill_bytes(&mut bytes);
    commonware_utils::hex(&bytes)
}
