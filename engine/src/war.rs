//! Multi-seat War rounds.
//!
//! Each seat antes during the betting phase and receives one card; the
//! highest ace-high rank takes the round at 1:1 on everything that seat has
//! staked. An exact tie among the leaders opens a war: every tied seat either
//! raises (an additional bet equal to the ante) or surrenders for half the
//! ante back. A war burns three cards, deals one more to each raiser, and
//! recurses on further ties. Surrender is offered only at the first tie; at
//! deeper levels the raise is mandatory and an unfunded seat is settled as a
//! surrender.

use greenfelt_types::{Chips, PlayerId};

use crate::cards::card_rank_ace_high;
use crate::shoe::Shoe;
use crate::table::{PlayerAction, Settlement, SettlementKind, TableError, VariantStep};

/// Cards burned before each war deal.
const WAR_BURN_CARDS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WarStatus {
    InPlay,
    Surrendered,
    Lost,
    Won,
}

impl WarStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::InPlay => "in_play",
            Self::Surrendered => "surrendered",
            Self::Lost => "lost",
            Self::Won => "won",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct WarEntry {
    pub seat: usize,
    pub player: PlayerId,
    /// Original ante.
    pub bet: Chips,
    /// Everything this seat has put into the round (ante + raises).
    pub staked: Chips,
    /// One card per war level.
    pub cards: Vec<u8>,
    pub status: WarStatus,
}

#[derive(Clone, Debug)]
pub(crate) struct WarRound {
    pub entries: Vec<WarEntry>,
    /// 0 before any tie; war level N while the Nth tie is being fought.
    pub depth: u8,
    /// Entry indices awaiting a war/surrender decision, in seat order.
    awaiting: Vec<usize>,
    turn: usize,
}

/// Deal one card to every anted seat and compare.
///
/// Returns `None` when the shoe cannot supply the opening cards (the table
/// voids the round).
pub(crate) fn deal(
    entries: Vec<(usize, PlayerId, Chips)>,
    shoe: &mut Shoe,
) -> Option<(WarRound, VariantStep)> {
    if !shoe.can_supply(entries.len()) {
        return None;
    }
    let mut round = WarRound {
        entries: entries
            .into_iter()
            .map(|(seat, player, bet)| WarEntry {
                seat,
                player,
                bet,
                staked: bet,
                cards: Vec::new(),
                status: WarStatus::InPlay,
            })
            .collect(),
        depth: 0,
        awaiting: Vec::new(),
        turn: 0,
    };
    for entry in &mut round.entries {
        entry.cards.push(shoe.draw()?);
    }
    let step = round.compare();
    Some((round, step))
}

impl WarRound {
    /// Entry index whose decision the round is waiting on.
    pub(crate) fn turn_entry(&self) -> Option<usize> {
        self.awaiting.get(self.turn).copied()
    }

    pub(crate) fn entry_of_seat(&self, seat: usize) -> Option<usize> {
        self.entries.iter().position(|entry| entry.seat == seat)
    }

    pub(crate) fn legal_actions(&self) -> Vec<&'static str> {
        if self.depth <= 1 {
            vec!["war", "surrender"]
        } else {
            vec!["war"]
        }
    }

    pub(crate) fn stake_required(&self, entry_idx: usize, action: &PlayerAction) -> Chips {
        match action {
            PlayerAction::War => self.entries[entry_idx].bet,
            _ => 0,
        }
    }

    /// Apply a war/surrender decision for the entry whose turn it is.
    ///
    /// `forced` marks server-side resolutions (unfunded raise, expired seat)
    /// that may surrender past the first tie.
    pub(crate) fn act(
        &mut self,
        entry_idx: usize,
        action: &PlayerAction,
        shoe: &mut Shoe,
        forced: bool,
    ) -> Result<VariantStep, TableError> {
        if self.turn_entry() != Some(entry_idx) {
            return Err(TableError::OutOfTurn);
        }
        match action {
            PlayerAction::War => {
                let entry = &mut self.entries[entry_idx];
                entry.staked = entry.staked.saturating_add(entry.bet);
            }
            PlayerAction::Surrender if self.depth <= 1 || forced => {
                self.entries[entry_idx].status = WarStatus::Surrendered;
            }
            PlayerAction::Surrender => return Err(TableError::IllegalAction("surrender")),
            other => return Err(TableError::IllegalAction(other.name())),
        }
        self.turn += 1;
        if self.turn < self.awaiting.len() {
            return Ok(VariantStep::Continue);
        }
        Ok(self.go_to_war(shoe))
    }

    /// All decisions are in: burn, deal the raisers, and compare again.
    fn go_to_war(&mut self, shoe: &mut Shoe) -> VariantStep {
        let raisers: Vec<usize> = self
            .awaiting
            .iter()
            .copied()
            .filter(|&idx| self.entries[idx].status == WarStatus::InPlay)
            .collect();
        self.awaiting.clear();
        self.turn = 0;

        match raisers.len() {
            0 => return VariantStep::Resolved,
            1 => {
                self.entries[raisers[0]].status = WarStatus::Won;
                return VariantStep::Resolved;
            }
            _ => {}
        }

        if !shoe.can_supply(WAR_BURN_CARDS + raisers.len()) {
            return VariantStep::Voided;
        }
        shoe.burn(WAR_BURN_CARDS);
        for idx in raisers {
            match shoe.draw() {
                Some(card) => self.entries[idx].cards.push(card),
                None => return VariantStep::Voided,
            }
        }
        self.compare()
    }

    /// Rank the latest card of every in-play entry.
    fn compare(&mut self) -> VariantStep {
        let best = self
            .entries
            .iter()
            .filter(|entry| entry.status == WarStatus::InPlay)
            .filter_map(|entry| entry.cards.last().copied())
            .map(card_rank_ace_high)
            .max()
            .unwrap_or(0);
        let mut leaders = Vec::new();
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if entry.status != WarStatus::InPlay {
                continue;
            }
            let rank = entry.cards.last().copied().map(card_rank_ace_high);
            if rank == Some(best) {
                leaders.push(idx);
            } else {
                entry.status = WarStatus::Lost;
            }
        }
        if leaders.len() == 1 {
            self.entries[leaders[0]].status = WarStatus::Won;
            return VariantStep::Resolved;
        }
        self.depth = self.depth.saturating_add(1);
        self.awaiting = leaders;
        self.turn = 0;
        VariantStep::Continue
    }

    /// Credits owed once the round resolves.
    pub(crate) fn settlements(&self) -> Vec<Settlement> {
        let mut settlements = Vec::new();
        for entry in &self.entries {
            let amount = match entry.status {
                WarStatus::Won => entry.staked.saturating_mul(2),
                WarStatus::Surrendered => entry.bet / 2,
                WarStatus::Lost | WarStatus::InPlay => 0,
            };
            if amount > 0 {
                settlements.push(Settlement {
                    player: entry.player.clone(),
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

    fn entry_inputs(bets: &[Chips]) -> Vec<(usize, PlayerId, Chips)> {
        bets.iter()
            .enumerate()
            .map(|(seat, &bet)| (seat, format!("player-{seat}"), bet))
            .collect()
    }

    #[test]
    fn test_highest_card_wins_outright() {
        // KS to seat 0, 2H to seat 1.
        let mut shoe = Shoe::new(vec![12, 14], 10_000);
        let (round, step) = deal(entry_inputs(&[100, 100]), &mut shoe).unwrap();
        assert_eq!(step, VariantStep::Resolved);
        assert_eq!(round.entries[0].status, WarStatus::Won);
        assert_eq!(round.entries[1].status, WarStatus::Lost);
        let settlements = round.settlements();
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].amount, 200);
    }

    #[test]
    fn test_exact_tie_opens_war() {
        // 7S and 7H tie; a lower 2D seat drops out immediately.
        let mut shoe = Shoe::new(vec![6, 19, 27], 10_000);
        let (round, step) = deal(entry_inputs(&[50, 50, 50]), &mut shoe).unwrap();
        assert_eq!(step, VariantStep::Continue);
        assert_eq!(round.depth, 1);
        assert_eq!(round.entries[2].status, WarStatus::Lost);
        assert_eq!(round.turn_entry(), Some(0));
        assert_eq!(round.legal_actions(), vec!["war", "surrender"]);
    }

    #[test]
    fn test_war_burns_three_and_deals() {
        // Tie on 7s, then war: burn 3, deal AS to seat 0 and 3H to seat 1.
        let mut shoe = Shoe::new(vec![6, 19, 50, 50, 50, 0, 15], 10_000);
        let (mut round, _) = deal(entry_inputs(&[100, 100]), &mut shoe).unwrap();
        let step = round
            .act(0, &PlayerAction::War, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Continue);
        let step = round
            .act(1, &PlayerAction::War, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Resolved);
        assert_eq!(round.entries[0].status, WarStatus::Won);
        assert_eq!(round.entries[0].staked, 200);
        // Winner is paid 1:1 on ante + raise.
        assert_eq!(round.settlements()[0].amount, 400);
    }

    #[test]
    fn test_insufficient_shoe_voids_war() {
        // Fresh 6-card shoe: two cards dealt, war needs 3 burn + 2 deal = 5 > 4.
        let mut shoe = Shoe::new(vec![6, 19, 1, 2, 3, 4], 10_000);
        let (mut round, step) = deal(entry_inputs(&[100, 100]), &mut shoe).unwrap();
        assert_eq!(step, VariantStep::Continue);
        round.act(0, &PlayerAction::War, &mut shoe, false).unwrap();
        let step = round
            .act(1, &PlayerAction::War, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Voided);
    }

    #[test]
    fn test_surrender_pays_half_the_ante() {
        let mut shoe = Shoe::new(vec![6, 19, 50, 51, 49, 0, 15], 10_000);
        let (mut round, _) = deal(entry_inputs(&[100, 100]), &mut shoe).unwrap();
        let step = round
            .act(0, &PlayerAction::Surrender, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Continue);
        // The lone remaining contender wins without more cards.
        let step = round
            .act(1, &PlayerAction::War, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Resolved);
        let settlements = round.settlements();
        let surrendered = settlements
            .iter()
            .find(|s| s.player == "player-0")
            .unwrap();
        assert_eq!(surrendered.amount, 50);
        let winner = settlements
            .iter()
            .find(|s| s.player == "player-1")
            .unwrap();
        assert_eq!(winner.amount, 400);
    }

    #[test]
    fn test_surrender_rejected_past_first_tie() {
        // Two ties in a row: 7S/7H then AS/AH.
        let mut shoe = Shoe::new(vec![6, 19, 50, 51, 49, 0, 13, 40, 41, 42, 1, 15], 10_000);
        let (mut round, _) = deal(entry_inputs(&[100, 100]), &mut shoe).unwrap();
        round.act(0, &PlayerAction::War, &mut shoe, false).unwrap();
        let step = round
            .act(1, &PlayerAction::War, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Continue);
        assert_eq!(round.depth, 2);
        assert_eq!(round.legal_actions(), vec!["war"]);
        let result = round.act(0, &PlayerAction::Surrender, &mut shoe, false);
        assert!(matches!(result, Err(TableError::IllegalAction(_))));
        // A forced surrender (unfunded raise) is still accepted.
        let step = round
            .act(0, &PlayerAction::Surrender, &mut shoe, true)
            .unwrap();
        assert_eq!(step, VariantStep::Continue);
    }

    #[test]
    fn test_all_surrender_leaves_no_winner() {
        let mut shoe = Shoe::new(vec![6, 19, 1, 2, 3, 4, 5], 10_000);
        let (mut round, _) = deal(entry_inputs(&[100, 100]), &mut shoe).unwrap();
        round
            .act(0, &PlayerAction::Surrender, &mut shoe, false)
            .unwrap();
        let step = round
            .act(1, &PlayerAction::Surrender, &mut shoe, false)
            .unwrap();
        assert_eq!(step, VariantStep::Resolved);
        let settlements = round.settlements();
        assert_eq!(settlements.len(), 2);
        assert!(settlements.iter().all(|s| s.amount == 50));
    }
}
