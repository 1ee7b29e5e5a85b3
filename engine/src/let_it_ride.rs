//! Multi-seat Let-It-Ride rounds.
//!
//! A bet of `n` places three equal stakes. Every seat gets three cards and
//! shares two community cards that are revealed progressively: after looking
//! at their own cards a seat may pull back the first stake, after the first
//! community reveal the second. The third stake is locked; once the last
//! community card shows, every surviving stake is paid against the paytable
//! (pair of tens or better) or lost.

use greenfelt_types::{Chips, PlayerId};

use crate::cards::{card_rank, card_rank_ace_high, card_suit};
use crate::shoe::Shoe;
use crate::table::{PlayerAction, Settlement, SettlementKind, TableError, VariantStep};

/// Stakes placed per seat at the deal.
pub(crate) const STAKES_PER_SEAT: u64 = 3;

/// Five-card hand classes recognized by the paytable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum HandRank {
    Nothing,
    PairTensOrBetter,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl HandRank {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::PairTensOrBetter => "pair_tens_or_better",
            Self::TwoPair => "two_pair",
            Self::ThreeOfAKind => "three_of_a_kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full_house",
            Self::FourOfAKind => "four_of_a_kind",
            Self::StraightFlush => "straight_flush",
            Self::RoyalFlush => "royal_flush",
        }
    }

    /// Payout odds (to one) for a winning stake, `None` for a losing hand.
    pub(crate) fn payout_odds(&self) -> Option<u64> {
        match self {
            Self::Nothing => None,
            Self::PairTensOrBetter => Some(1),
            Self::TwoPair => Some(2),
            Self::ThreeOfAKind => Some(3),
            Self::Straight => Some(5),
            Self::Flush => Some(8),
            Self::FullHouse => Some(11),
            Self::FourOfAKind => Some(50),
            Self::StraightFlush => Some(200),
            Self::RoyalFlush => Some(1_000),
        }
    }
}

/// Classify five cards for the paytable.
pub(crate) fn evaluate_five(cards: &[u8; 5]) -> HandRank {
    let mut rank_counts = [0u8; 13];
    for &card in cards {
        rank_counts[card_rank(card) as usize] += 1;
    }
    let flush = cards
        .iter()
        .all(|&card| card_suit(card) == card_suit(cards[0]));

    let mut ranks: Vec<u8> = cards.iter().map(|&c| card_rank_ace_high(c)).collect();
    ranks.sort_unstable();
    let distinct = ranks.windows(2).all(|pair| pair[0] != pair[1]);
    let wheel = ranks == [2, 3, 4, 5, 14];
    let straight = distinct && (ranks[4] - ranks[0] == 4 || wheel);

    let mut pairs = 0u8;
    let mut trips = false;
    let mut quads = false;
    let mut pair_rank: Option<u8> = None;
    for (rank, &count) in rank_counts.iter().enumerate() {
        match count {
            2 => {
                pairs += 1;
                pair_rank = Some(rank as u8);
            }
            3 => trips = true,
            4 => quads = true,
            _ => {}
        }
    }

    if straight && flush {
        return if ranks[0] == 10 {
            HandRank::RoyalFlush
        } else {
            HandRank::StraightFlush
        };
    }
    if quads {
        return HandRank::FourOfAKind;
    }
    if trips && pairs == 1 {
        return HandRank::FullHouse;
    }
    if flush {
        return HandRank::Flush;
    }
    if straight {
        return HandRank::Straight;
    }
    if trips {
        return HandRank::ThreeOfAKind;
    }
    if pairs == 2 {
        return HandRank::TwoPair;
    }
    if pairs == 1 {
        // Tens or better: ace (0) or ten through king (9..=12).
        let rank = pair_rank.unwrap_or(0);
        if rank == 0 || rank >= 9 {
            return HandRank::PairTensOrBetter;
        }
    }
    HandRank::Nothing
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LirStage {
    /// Deciding the first stake on the seat's own three cards.
    First,
    /// Deciding the second stake after the first community reveal.
    Second,
    Complete,
}

#[derive(Clone, Debug)]
pub(crate) struct LirSeatRound {
    pub seat: usize,
    pub player: PlayerId,
    /// Per-stake amount.
    pub unit: Chips,
    /// Stakes still riding (3 at the deal, floor 1).
    pub live: u8,
    pub cards: [u8; 3],
    /// Final classification, set at scoring time.
    pub rank: Option<HandRank>,
}

#[derive(Clone, Debug)]
pub(crate) struct LirRound {
    pub seats: Vec<LirSeatRound>,
    pub community: [u8; 2],
    /// Community cards turned face up so far (0..=2).
    pub revealed: u8,
    pub stage: LirStage,
    turn: usize,
}

/// Deal three cards per seat plus the two face-down community cards.
pub(crate) fn deal(
    entries: Vec<(usize, PlayerId, Chips)>,
    shoe: &mut Shoe,
) -> Option<(LirRound, VariantStep)> {
    if !shoe.can_supply(entries.len() * 3 + 2) {
        return None;
    }
    let mut seats = Vec::with_capacity(entries.len());
    for (seat, player, unit) in entries {
        let cards = [shoe.draw()?, shoe.draw()?, shoe.draw()?];
        seats.push(LirSeatRound {
            seat,
            player,
            unit,
            live: STAKES_PER_SEAT as u8,
            cards,
            rank: None,
        });
    }
    let community = [shoe.draw()?, shoe.draw()?];
    Some((
        LirRound {
            seats,
            community,
            revealed: 0,
            stage: LirStage::First,
            turn: 0,
        },
        VariantStep::Continue,
    ))
}

impl LirRound {
    pub(crate) fn turn_seat(&self) -> Option<usize> {
        match self.stage {
            LirStage::First | LirStage::Second => self.seats.get(self.turn).map(|_| self.turn),
            LirStage::Complete => None,
        }
    }

    pub(crate) fn entry_of_seat(&self, seat: usize) -> Option<usize> {
        self.seats.iter().position(|s| s.seat == seat)
    }

    pub(crate) fn legal_actions(&self) -> Vec<&'static str> {
        match self.stage {
            LirStage::First | LirStage::Second => vec!["ride", "pull"],
            LirStage::Complete => Vec::new(),
        }
    }

    /// Apply a ride/pull decision; returns the refunded amount on a pull.
    pub(crate) fn act(
        &mut self,
        entry_idx: usize,
        action: &PlayerAction,
    ) -> Result<(VariantStep, Option<Chips>), TableError> {
        if self.turn_seat() != Some(entry_idx) {
            return Err(TableError::OutOfTurn);
        }
        let refund = match action {
            PlayerAction::Ride => None,
            PlayerAction::PullBack => {
                let seat = &mut self.seats[entry_idx];
                seat.live -= 1;
                Some(seat.unit)
            }
            other => return Err(TableError::IllegalAction(other.name())),
        };
        self.turn += 1;
        if self.turn < self.seats.len() {
            return Ok((VariantStep::Continue, refund));
        }
        self.turn = 0;
        match self.stage {
            LirStage::First => {
                self.revealed = 1;
                self.stage = LirStage::Second;
                Ok((VariantStep::Continue, refund))
            }
            LirStage::Second => {
                self.revealed = 2;
                self.stage = LirStage::Complete;
                self.score();
                Ok((VariantStep::Resolved, refund))
            }
            LirStage::Complete => Err(TableError::WrongPhase("complete")),
        }
    }

    fn score(&mut self) {
        for seat in &mut self.seats {
            let hand = [
                seat.cards[0],
                seat.cards[1],
                seat.cards[2],
                self.community[0],
                self.community[1],
            ];
            seat.rank = Some(evaluate_five(&hand));
        }
    }

    /// Credits owed once the round resolves.
    pub(crate) fn settlements(&self) -> Vec<Settlement> {
        let mut settlements = Vec::new();
        for seat in &self.seats {
            let Some(odds) = seat.rank.and_then(|rank| rank.payout_odds()) else {
                continue;
            };
            let staked = seat.unit.saturating_mul(u64::from(seat.live));
            let amount = staked.saturating_mul(odds + 1);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_classification() {
        // Pair of nines does not pay.
        assert_eq!(evaluate_five(&[8, 21, 2, 16, 30]), HandRank::Nothing);
        // Pair of tens pays.
        assert_eq!(
            evaluate_five(&[9, 22, 2, 16, 30]),
            HandRank::PairTensOrBetter
        );
        // Pair of aces pays.
        assert_eq!(
            evaluate_five(&[0, 13, 2, 16, 30]),
            HandRank::PairTensOrBetter
        );
        // Two pair.
        assert_eq!(evaluate_five(&[9, 22, 16, 29, 2]), HandRank::TwoPair);
        // Trips.
        assert_eq!(evaluate_five(&[9, 22, 35, 16, 2]), HandRank::ThreeOfAKind);
        // Wheel straight (A-2-3-4-5, mixed suits).
        assert_eq!(evaluate_five(&[0, 14, 2, 3, 4]), HandRank::Straight);
        // Flush in spades.
        assert_eq!(evaluate_five(&[1, 3, 5, 7, 9]), HandRank::Flush);
        // Full house.
        assert_eq!(evaluate_five(&[9, 22, 35, 16, 29]), HandRank::FullHouse);
        // Quads.
        assert_eq!(evaluate_five(&[9, 22, 35, 48, 2]), HandRank::FourOfAKind);
        // Straight flush (2-6 of spades).
        assert_eq!(evaluate_five(&[1, 2, 3, 4, 5]), HandRank::StraightFlush);
        // Royal flush in hearts.
        assert_eq!(evaluate_five(&[22, 23, 24, 25, 13]), HandRank::RoyalFlush);
    }

    fn entry_inputs(units: &[Chips]) -> Vec<(usize, PlayerId, Chips)> {
        units
            .iter()
            .enumerate()
            .map(|(seat, &unit)| (seat, format!("player-{seat}"), unit))
            .collect()
    }

    #[test]
    fn test_pull_sequence_and_payout() {
        // Seat cards 10S 10H 2S + community KD KC: two pair pays 2:1.
        let mut shoe = Shoe::new(vec![9, 22, 1, 38, 51], 10_000);
        let (mut round, step) = deal(entry_inputs(&[10]), &mut shoe).unwrap();
        assert_eq!(step, VariantStep::Continue);
        assert_eq!(round.stage, LirStage::First);

        // Pull the first stake, refund of one unit.
        let (step, refund) = round.act(0, &PlayerAction::PullBack).unwrap();
        assert_eq!(step, VariantStep::Continue);
        assert_eq!(refund, Some(10));
        assert_eq!(round.revealed, 1);
        assert_eq!(round.stage, LirStage::Second);

        // Let the second stake ride; the last community card flips and the
        // two surviving stakes are paid at 2:1.
        let (step, refund) = round.act(0, &PlayerAction::Ride).unwrap();
        assert_eq!(step, VariantStep::Resolved);
        assert_eq!(refund, None);
        assert_eq!(round.revealed, 2);
        assert_eq!(round.seats[0].rank, Some(HandRank::TwoPair));
        let settlements = round.settlements();
        assert_eq!(settlements.len(), 1);
        // 2 live stakes of 10, at 2:1 plus stake back: 20 * 3.
        assert_eq!(settlements[0].amount, 60);
    }

    #[test]
    fn test_losing_hand_forfeits_remaining_stakes() {
        // Junk hand: 2S 5H 9D + community KD 7C.
        let mut shoe = Shoe::new(vec![1, 17, 34, 38, 45], 10_000);
        let (mut round, _) = deal(entry_inputs(&[10]), &mut shoe).unwrap();
        round.act(0, &PlayerAction::Ride).unwrap();
        let (step, _) = round.act(0, &PlayerAction::Ride).unwrap();
        assert_eq!(step, VariantStep::Resolved);
        assert_eq!(round.seats[0].rank, Some(HandRank::Nothing));
        assert!(round.settlements().is_empty());
    }

    #[test]
    fn test_exhausted_shoe_refuses_deal() {
        let mut shoe = Shoe::new(vec![1, 2, 3, 4], 10_000);
        assert!(deal(entry_inputs(&[10]), &mut shoe).is_none());
    }
}
