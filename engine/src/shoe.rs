//! The working set of cards remaining to be dealt from the current shuffle.

/// A shuffled deck being consumed card by card.
///
/// `penetration_bps` is the fraction of the shoe (in basis points) that may
/// be dealt before a reshuffle becomes mandatory. Reshuffles are checked
/// between rounds, never mid-hand; a round that empties the shoe anyway is
/// voided by the table and sets the forced flag.
#[derive(Clone, Debug)]
pub struct Shoe {
    cards: Vec<u8>,
    drawn: usize,
    penetration_bps: u16,
    forced: bool,
}

impl Shoe {
    pub fn new(cards: Vec<u8>, penetration_bps: u16) -> Self {
        Self {
            cards,
            drawn: 0,
            penetration_bps,
            forced: false,
        }
    }

    /// Next card off the top, or `None` when the shoe is exhausted.
    pub fn draw(&mut self) -> Option<u8> {
        let card = self.cards.get(self.drawn).copied()?;
        self.drawn += 1;
        Some(card)
    }

    /// Discard `n` cards face down. Returns false (without drawing) when the
    /// shoe cannot supply them.
    pub fn burn(&mut self, n: usize) -> bool {
        if self.remaining() < n {
            return false;
        }
        self.drawn += n;
        true
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.drawn
    }

    pub fn size(&self) -> usize {
        self.cards.len()
    }

    /// Whether the shoe can supply `n` more cards.
    pub fn can_supply(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// True once penetration is reached, the shoe is empty, or a void forced
    /// the next round onto a fresh shuffle.
    pub fn needs_reshuffle(&self) -> bool {
        if self.forced || self.remaining() == 0 {
            return true;
        }
        (self.drawn as u64) * 10_000 >= (self.cards.len() as u64) * u64::from(self.penetration_bps)
    }

    pub fn force_reshuffle(&mut self) {
        self.forced = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_order_matches_shuffle() {
        let mut shoe = Shoe::new(vec![5, 9, 13], 10_000);
        assert_eq!(shoe.draw(), Some(5));
        assert_eq!(shoe.draw(), Some(9));
        assert_eq!(shoe.remaining(), 1);
        assert_eq!(shoe.draw(), Some(13));
        assert_eq!(shoe.draw(), None);
    }

    #[test]
    fn test_burn_refuses_partial() {
        let mut shoe = Shoe::new(vec![1, 2, 3], 10_000);
        assert!(!shoe.burn(4));
        assert_eq!(shoe.remaining(), 3);
        assert!(shoe.burn(2));
        assert_eq!(shoe.draw(), Some(3));
    }

    #[test]
    fn test_penetration_threshold() {
        let cards: Vec<u8> = (0..52).collect();
        let mut shoe = Shoe::new(cards, 7_500);
        assert!(!shoe.needs_reshuffle());
        // 39 of 52 cards is exactly 75%.
        for _ in 0..38 {
            shoe.draw();
        }
        assert!(!shoe.needs_reshuffle());
        shoe.draw();
        assert!(shoe.needs_reshuffle());
    }

    #[test]
    fn test_forced_reshuffle() {
        let mut shoe = Shoe::new((0..52).collect(), 7_500);
        assert!(!shoe.needs_reshuffle());
        shoe.force_reshuffle();
        assert!(shoe.needs_reshuffle());
    }
}
