//! Multi-seat Blackjack rounds.
//!
//! House rules: dealer hits soft 17, naturals pay 3:2, doubles are first
//! action only, pairs split up to 3 hands, insurance is offered only when the
//! dealer shows an ace (capped at half the original bet, pays 2:1 on a dealer
//! blackjack). The dealer's hole card stays hidden until the insurance peek
//! or the dealer's turn.

use greenfelt_types::{Chips, PlayerId};

use crate::cards::card_rank;
use crate::shoe::Shoe;
use crate::table::{PlayerAction, Settlement, SettlementKind, TableError, VariantStep};

/// Splitting stops once a seat holds this many hands.
const MAX_HANDS_PER_SEAT: usize = 3;

/// Dealer stands at hard 17 and above; soft 17 is hit.
const DEALER_STAND_TOTAL: u8 = 17;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HandStatus {
    Playing,
    Stood,
    Busted,
    Natural,
}

impl HandStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Stood => "stood",
            Self::Busted => "busted",
            Self::Natural => "blackjack",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BjHand {
    pub cards: Vec<u8>,
    /// Current stake on this hand (doubled in place on a double down).
    pub bet: Chips,
    pub doubled: bool,
    pub from_split: bool,
    pub status: HandStatus,
}

impl BjHand {
    fn new(bet: Chips, from_split: bool) -> Self {
        Self {
            cards: Vec::with_capacity(2),
            bet,
            doubled: false,
            from_split,
            status: HandStatus::Playing,
        }
    }

    fn refresh_status(&mut self) {
        let (total, _) = hand_value(&self.cards);
        if total > 21 {
            self.status = HandStatus::Busted;
        } else if self.cards.len() == 2 && total == 21 && !self.from_split {
            self.status = HandStatus::Natural;
        } else if total == 21 {
            self.status = HandStatus::Stood;
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BjSeatRound {
    pub seat: usize,
    pub player: PlayerId,
    pub hands: Vec<BjHand>,
    pub active_hand: usize,
    pub insurance: Chips,
    pub insurance_payout: Chips,
}

impl BjSeatRound {
    pub(crate) fn base_bet(&self) -> Chips {
        self.hands.first().map_or(0, |hand| {
            if hand.doubled {
                hand.bet / 2
            } else {
                hand.bet
            }
        })
    }

    fn next_playable(&self) -> Option<usize> {
        self.hands
            .iter()
            .position(|hand| hand.status == HandStatus::Playing)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BjStage {
    Insurance,
    Hands,
    Complete,
}

#[derive(Clone, Debug)]
pub(crate) struct BlackjackRound {
    pub seats: Vec<BjSeatRound>,
    pub dealer: Vec<u8>,
    pub stage: BjStage,
    pub hole_revealed: bool,
    turn: usize,
}

/// Total of a hand with aces valued as high as they fit, plus softness.
pub(crate) fn hand_value(cards: &[u8]) -> (u8, bool) {
    let mut total: u8 = 0;
    let mut aces = 0u8;
    for &card in cards {
        let rank = card_rank(card);
        let value = match rank {
            0 => {
                aces += 1;
                1
            }
            r if r >= 9 => 10,
            r => r + 1,
        };
        total = total.saturating_add(value);
    }
    if aces > 0 && total + 10 <= 21 {
        (total + 10, true)
    } else {
        (total, false)
    }
}

/// Deal two cards to every anted seat and the dealer.
///
/// Returns `None` when the shoe runs out mid-deal (the table voids).
pub(crate) fn deal(
    entries: Vec<(usize, PlayerId, Chips)>,
    shoe: &mut Shoe,
) -> Option<(BlackjackRound, VariantStep)> {
    let needed = entries.len() * 2 + 2;
    if !shoe.can_supply(needed) {
        return None;
    }
    let mut round = BlackjackRound {
        seats: entries
            .into_iter()
            .map(|(seat, player, bet)| BjSeatRound {
                seat,
                player,
                hands: vec![BjHand::new(bet, false)],
                active_hand: 0,
                insurance: 0,
                insurance_payout: 0,
            })
            .collect(),
        dealer: Vec::with_capacity(2),
        stage: BjStage::Insurance,
        hole_revealed: false,
        turn: 0,
    };
    for seat in &mut round.seats {
        seat.hands[0].cards.push(shoe.draw()?);
    }
    round.dealer.push(shoe.draw()?);
    for seat in &mut round.seats {
        seat.hands[0].cards.push(shoe.draw()?);
        seat.hands[0].refresh_status();
    }
    round.dealer.push(shoe.draw()?);

    if card_rank(round.dealer[0]) == 0 {
        // Ace up: every seat gets an insurance decision before play.
        round.stage = BjStage::Insurance;
        round.turn = 0;
        return Some((round, VariantStep::Continue));
    }
    let step = round.start_hands(shoe)?;
    Some((round, step))
}

impl BlackjackRound {
    /// Seat index (into `seats`) whose decision the round is waiting on.
    pub(crate) fn turn_seat(&self) -> Option<usize> {
        match self.stage {
            BjStage::Insurance | BjStage::Hands => self.seats.get(self.turn).map(|_| self.turn),
            BjStage::Complete => None,
        }
    }

    pub(crate) fn entry_of_seat(&self, seat: usize) -> Option<usize> {
        self.seats.iter().position(|s| s.seat == seat)
    }

    pub(crate) fn legal_actions(&self, entry_idx: usize) -> Vec<&'static str> {
        match self.stage {
            BjStage::Insurance => vec!["insurance", "pass"],
            BjStage::Hands => {
                let seat = &self.seats[entry_idx];
                let Some(hand) = seat.hands.get(seat.active_hand) else {
                    return Vec::new();
                };
                let mut actions = vec!["hit", "stand"];
                if hand.cards.len() == 2 && !hand.doubled {
                    actions.push("double");
                    if card_rank(hand.cards[0]) == card_rank(hand.cards[1])
                        && seat.hands.len() < MAX_HANDS_PER_SEAT
                    {
                        actions.push("split");
                    }
                }
                actions
            }
            BjStage::Complete => Vec::new(),
        }
    }

    pub(crate) fn stake_required(
        &self,
        entry_idx: usize,
        action: &PlayerAction,
    ) -> Result<Chips, TableError> {
        let seat = &self.seats[entry_idx];
        match (self.stage, action) {
            (BjStage::Insurance, PlayerAction::Insurance(amount)) => {
                let cap = seat.base_bet() / 2;
                if *amount > cap {
                    return Err(TableError::InvalidInsurance {
                        got: *amount,
                        max: cap,
                    });
                }
                Ok(*amount)
            }
            (BjStage::Hands, PlayerAction::Double) | (BjStage::Hands, PlayerAction::Split) => {
                let hand = seat
                    .hands
                    .get(seat.active_hand)
                    .ok_or(TableError::IllegalAction(action.name()))?;
                Ok(hand.bet)
            }
            _ => Ok(0),
        }
    }

    pub(crate) fn act(
        &mut self,
        entry_idx: usize,
        action: &PlayerAction,
        shoe: &mut Shoe,
    ) -> Result<VariantStep, TableError> {
        if self.turn_seat() != Some(entry_idx) {
            return Err(TableError::OutOfTurn);
        }
        match self.stage {
            BjStage::Insurance => self.act_insurance(entry_idx, action, shoe),
            BjStage::Hands => self.act_hand(entry_idx, action, shoe),
            BjStage::Complete => Err(TableError::WrongPhase("complete")),
        }
    }

    fn act_insurance(
        &mut self,
        entry_idx: usize,
        action: &PlayerAction,
        shoe: &mut Shoe,
    ) -> Result<VariantStep, TableError> {
        let amount = match action {
            PlayerAction::Insurance(amount) => *amount,
            other => return Err(TableError::IllegalAction(other.name())),
        };
        let cap = self.seats[entry_idx].base_bet() / 2;
        if amount > cap {
            return Err(TableError::InvalidInsurance {
                got: amount,
                max: cap,
            });
        }
        self.seats[entry_idx].insurance = amount;
        self.turn += 1;
        if self.turn < self.seats.len() {
            return Ok(VariantStep::Continue);
        }
        // Peek: an ace is showing, so a ten in the hole ends the round here.
        let (total, _) = hand_value(&self.dealer);
        if self.dealer.len() == 2 && total == 21 {
            self.hole_revealed = true;
            for seat in &mut self.seats {
                if seat.insurance > 0 {
                    seat.insurance_payout = seat.insurance.saturating_mul(3);
                }
            }
            self.stage = BjStage::Complete;
            return Ok(VariantStep::Resolved);
        }
        match self.start_hands(shoe) {
            Some(step) => Ok(step),
            None => Ok(VariantStep::Voided),
        }
    }

    /// Enter the per-hand stage, skipping seats with nothing left to decide.
    fn start_hands(&mut self, shoe: &mut Shoe) -> Option<VariantStep> {
        self.stage = BjStage::Hands;
        self.turn = 0;
        self.advance(shoe)
    }

    fn act_hand(
        &mut self,
        entry_idx: usize,
        action: &PlayerAction,
        shoe: &mut Shoe,
    ) -> Result<VariantStep, TableError> {
        let seat = &mut self.seats[entry_idx];
        let hand_idx = seat.active_hand;
        let playing = seat
            .hands
            .get(hand_idx)
            .is_some_and(|hand| hand.status == HandStatus::Playing);
        if !playing {
            return Err(TableError::IllegalAction(action.name()));
        }
        match action {
            PlayerAction::Hit => {
                let card = match shoe.draw() {
                    Some(card) => card,
                    None => return Ok(VariantStep::Voided),
                };
                let hand = &mut seat.hands[hand_idx];
                hand.cards.push(card);
                hand.refresh_status();
            }
            PlayerAction::Stand => {
                seat.hands[hand_idx].status = HandStatus::Stood;
            }
            PlayerAction::Double => {
                {
                    let hand = &seat.hands[hand_idx];
                    if hand.cards.len() != 2 || hand.doubled {
                        return Err(TableError::IllegalAction("double"));
                    }
                }
                let card = match shoe.draw() {
                    Some(card) => card,
                    None => return Ok(VariantStep::Voided),
                };
                let hand = &mut seat.hands[hand_idx];
                hand.bet = hand.bet.saturating_mul(2);
                hand.doubled = true;
                hand.cards.push(card);
                hand.refresh_status();
                if hand.status == HandStatus::Playing {
                    hand.status = HandStatus::Stood;
                }
            }
            PlayerAction::Split => {
                let bet = {
                    let hand = &seat.hands[hand_idx];
                    if hand.cards.len() != 2
                        || card_rank(hand.cards[0]) != card_rank(hand.cards[1])
                        || seat.hands.len() >= MAX_HANDS_PER_SEAT
                    {
                        return Err(TableError::IllegalAction("split"));
                    }
                    hand.bet
                };
                // Both halves draw their second card immediately.
                let first = match shoe.draw() {
                    Some(card) => card,
                    None => return Ok(VariantStep::Voided),
                };
                let second = match shoe.draw() {
                    Some(card) => card,
                    None => return Ok(VariantStep::Voided),
                };
                let hand = &mut seat.hands[hand_idx];
                let Some(moved) = hand.cards.pop() else {
                    return Err(TableError::IllegalAction("split"));
                };
                hand.from_split = true;
                hand.cards.push(first);
                hand.refresh_status();
                let mut new_hand = BjHand::new(bet, true);
                new_hand.cards.push(moved);
                new_hand.cards.push(second);
                new_hand.refresh_status();
                seat.hands.insert(hand_idx + 1, new_hand);
            }
            other => return Err(TableError::IllegalAction(other.name())),
        }
        match self.advance(shoe) {
            Some(step) => Ok(step),
            None => Ok(VariantStep::Voided),
        }
    }

    /// Move the turn to the next playable hand; play the dealer when the
    /// last seat finishes. Returns `None` if the shoe empties under the
    /// dealer.
    fn advance(&mut self, shoe: &mut Shoe) -> Option<VariantStep> {
        while self.turn < self.seats.len() {
            let seat = &mut self.seats[self.turn];
            match seat.next_playable() {
                Some(idx) => {
                    seat.active_hand = idx;
                    return Some(VariantStep::Continue);
                }
                None => self.turn += 1,
            }
        }
        self.dealer_play(shoe)?;
        self.stage = BjStage::Complete;
        Some(VariantStep::Resolved)
    }

    fn dealer_play(&mut self, shoe: &mut Shoe) -> Option<()> {
        self.hole_revealed = true;
        let any_live = self.seats.iter().any(|seat| {
            seat.hands
                .iter()
                .any(|hand| matches!(hand.status, HandStatus::Stood | HandStatus::Natural))
        });
        if !any_live {
            return Some(());
        }
        loop {
            let (total, soft) = hand_value(&self.dealer);
            if total > 21 || total > DEALER_STAND_TOTAL {
                break;
            }
            if total == DEALER_STAND_TOTAL && !soft {
                break;
            }
            self.dealer.push(shoe.draw()?);
        }
        Some(())
    }

    /// Credits owed once the round resolves.
    pub(crate) fn settlements(&self) -> Vec<Settlement> {
        let (dealer_total, _) = hand_value(&self.dealer);
        let dealer_bust = dealer_total > 21;
        let dealer_natural = self.dealer.len() == 2 && dealer_total == 21;
        let mut settlements = Vec::new();
        for seat in &self.seats {
            let mut amount: Chips = seat.insurance_payout;
            for hand in &seat.hands {
                let (total, _) = hand_value(&hand.cards);
                amount = amount.saturating_add(match hand.status {
                    HandStatus::Busted | HandStatus::Playing => 0,
                    HandStatus::Natural => {
                        if dealer_natural {
                            hand.bet
                        } else {
                            hand.bet + hand.bet.saturating_mul(3) / 2
                        }
                    }
                    HandStatus::Stood => {
                        if dealer_natural {
                            0
                        } else if dealer_bust || total > dealer_total {
                            hand.bet.saturating_mul(2)
                        } else if total == dealer_total {
                            hand.bet
                        } else {
                            0
                        }
                    }
                });
            }
            if amount > 0 {
                settlements.push(Settlement {
                    player: seat.player.clone(),
                    amount,
                    kind: SettlementKind::Payout,
                });
            }
        }
        settlements
    }
}
