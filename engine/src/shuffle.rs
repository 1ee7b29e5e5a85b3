//! Commit-reveal shuffle pipeline for provably fair dealing.
//!
//! ## Commit-Reveal Flow
//!
//! 1. **Commit** - The server publishes `hash(server_seed)` before any client
//!    seed is known.
//! 2. **Contribute** - The client supplies a seed string before the deal (a
//!    default is generated if absent).
//! 3. **Shuffle** - The deck order is derived from
//!    `(server_seed ‖ client_seed ‖ nonce)`; the nonce strictly increases per
//!    table per shuffle so a seed is never reused for two decks.
//! 4. **Reveal** - When the shoe retires, the server seed is disclosed and
//!    anyone can recompute the permutation and check it against what was
//!    dealt.
//!
//! ## Determinism
//!
//! The card stream is SHA-256 in counter mode over the seed material. Draws
//! use rejection sampling, so every permutation of the deck is equally likely
//! and repeated calls with identical inputs yield identical output.

use commonware_cryptography::sha256::Sha256;
use commonware_cryptography::Hasher;
use greenfelt_types::constants::MAX_CLIENT_SEED_LENGTH;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// Length of server seeds and commitments in bytes.
pub const SEED_LEN: usize = 32;

/// Largest permutation the card stream will produce.
pub const MAX_DECK_SIZE: usize = 256;

/// Errors from the shuffle pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShuffleError {
    #[error("client seed too long (len={0}, max={MAX_CLIENT_SEED_LENGTH})")]
    ClientSeedTooLong(usize),
    #[error("deck size out of range (got={0}, max={MAX_DECK_SIZE})")]
    InvalidDeckSize(usize),
    #[error("nonce {got} already consumed (next={next})")]
    NonceReused { got: u64, next: u64 },
    #[error("server seed not yet revealed")]
    SeedNotRevealed,
    #[error("seed reveal does not match published commitment")]
    VerificationFailed,
}

/// Compute the public commitment for a server seed.
///
/// Uses SHA256: `commit = hash(seed)`.
pub fn compute_commit(server_seed: &[u8; SEED_LEN]) -> [u8; SEED_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(server_seed);
    hasher.finalize().0
}

/// Verify that a revealed server seed matches a published commitment.
///
/// This is the check that lets any observer prove the house did not swap the
/// deck after seeing bets. A mismatch is a protocol violation, never noise.
pub fn verify_reveal(server_seed: &[u8; SEED_LEN], published: &[u8; SEED_LEN]) -> bool {
    &compute_commit(server_seed) == published
}

/// Deterministic byte stream for one shuffle, derived from
/// `(server_seed ‖ client_seed ‖ nonce)`.
///
/// Blocks are SHA-256 outputs in counter mode over a domain-separated base
/// digest.
struct CardStream {
    base: [u8; SEED_LEN],
    counter: u64,
    block: [u8; SEED_LEN],
    offset: usize,
}

impl CardStream {
    fn new(server_seed: &[u8; SEED_LEN], client_seed: &str, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(server_seed);
        hasher.update(client_seed.as_bytes());
        hasher.update(&nonce.to_be_bytes());
        hasher.update(b"deck");
        let base = hasher.finalize().0;
        let mut stream = Self {
            base,
            counter: 0,
            block: [0u8; SEED_LEN],
            offset: SEED_LEN,
        };
        stream.refill();
        stream
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(&self.base);
        hasher.update(&self.counter.to_be_bytes());
        self.block = hasher.finalize().0;
        self.counter += 1;
        self.offset = 0;
    }

    fn next_u32(&mut self) -> u32 {
        if self.offset + 4 > SEED_LEN {
            self.refill();
        }
        let bytes = [
            self.block[self.offset],
            self.block[self.offset + 1],
            self.block[self.offset + 2],
            self.block[self.offset + 3],
        ];
        self.offset += 4;
        u32::from_be_bytes(bytes)
    }

    /// Unbiased draw in `0..bound` via rejection sampling.
    fn next_below(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0);
        let zone = u32::MAX - (u32::MAX % bound);
        loop {
            let value = self.next_u32();
            if value < zone {
                return value % bound;
            }
        }
    }
}

/// Produce the deck permutation for `(server_seed, client_seed, nonce)`.
///
/// Returns the ordered sequence `0..deck_size` shuffled with Fisher-Yates
/// driven by the card stream. Deterministic: identical inputs yield identical
/// permutations.
pub fn shuffle_deck(
    server_seed: &[u8; SEED_LEN],
    client_seed: &str,
    nonce: u64,
    deck_size: usize,
) -> Result<Vec<u8>, ShuffleError> {
    if client_seed.len() > MAX_CLIENT_SEED_LENGTH {
        return Err(ShuffleError::ClientSeedTooLong(client_seed.len()));
    }
    if deck_size == 0 || deck_size > MAX_DECK_SIZE {
        return Err(ShuffleError::InvalidDeckSize(deck_size));
    }
    let mut stream = CardStream::new(server_seed, client_seed, nonce);
    let mut deck: Vec<u8> = (0..deck_size).map(|card| card as u8).collect();
    for i in (1..deck.len()).rev() {
        let j = stream.next_below(i as u32 + 1) as usize;
        deck.swap(i, j);
    }
    Ok(deck)
}

/// Published record of one shoe's shuffle.
///
/// Created at shoe initialization with the server seed withheld; the seed is
/// filled in when the shoe retires so observers can replay the shuffle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShuffleProof {
    pub server_seed_hash: [u8; SEED_LEN],
    /// Revealed once the shoe is exhausted or penetration is reached.
    pub server_seed: Option<[u8; SEED_LEN]>,
    pub client_seed: String,
    pub nonce: u64,
}

impl ShuffleProof {
    /// Verify `hash(server_seed) == server_seed_hash` for a revealed proof.
    pub fn verify(&self) -> Result<(), ShuffleError> {
        let seed = self.server_seed.ok_or(ShuffleError::SeedNotRevealed)?;
        if verify_reveal(&seed, &self.server_seed_hash) {
            Ok(())
        } else {
            Err(ShuffleError::VerificationFailed)
        }
    }

    /// Recompute the permutation this proof committed to.
    pub fn replay(&self, deck_size: usize) -> Result<Vec<u8>, ShuffleError> {
        let seed = self.server_seed.ok_or(ShuffleError::SeedNotRevealed)?;
        self.verify()?;
        shuffle_deck(&seed, &self.client_seed, self.nonce, deck_size)
    }
}

/// Server-side seed with its published commitment and a monotonic nonce.
///
/// One commitment backs one shoe; the nonce keeps increasing across shoe
/// generations so a (seed, nonce) pair can never produce two decks.
#[derive(Clone, Debug)]
pub struct SeedCommitment {
    server_seed: [u8; SEED_LEN],
    hash: [u8; SEED_LEN],
    next_nonce: u64,
}

impl SeedCommitment {
    /// Draw a fresh server seed from the provided entropy source.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng), starting_nonce: u64) -> Self {
        let mut server_seed = [0u8; SEED_LEN];
        rng.fill_bytes(&mut server_seed);
        Self::from_seed(server_seed, starting_nonce)
    }

    /// Build a commitment from an explicit seed (tests, replay).
    pub fn from_seed(server_seed: [u8; SEED_LEN], starting_nonce: u64) -> Self {
        let hash = compute_commit(&server_seed);
        Self {
            server_seed,
            hash,
            next_nonce: starting_nonce,
        }
    }

    /// The published commitment hash.
    pub fn hash(&self) -> &[u8; SEED_LEN] {
        &self.hash
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    /// Shuffle a deck, consuming the next nonce.
    ///
    /// Returns the permutation and the unrevealed proof for this shoe.
    pub fn shuffle(
        &mut self,
        client_seed: &str,
        deck_size: usize,
    ) -> Result<(Vec<u8>, ShuffleProof), ShuffleError> {
        let nonce = self.next_nonce;
        self.shuffle_at(client_seed, nonce, deck_size)
    }

    /// Shuffle with an explicit nonce. Reusing a consumed nonce with an
    /// unchanged server seed is a protocol violation and is rejected.
    pub fn shuffle_at(
        &mut self,
        client_seed: &str,
        nonce: u64,
        deck_size: usize,
    ) -> Result<(Vec<u8>, ShuffleProof), ShuffleError> {
        if nonce < self.next_nonce {
            return Err(ShuffleError::NonceReused {
                got: nonce,
                next: self.next_nonce,
            });
        }
        let deck = shuffle_deck(&self.server_seed, client_seed, nonce, deck_size)?;
        self.next_nonce = nonce + 1;
        let proof = ShuffleProof {
            server_seed_hash: self.hash,
            server_seed: None,
            client_seed: client_seed.to_string(),
            nonce,
        };
        Ok((deck, proof))
    }

    /// Disclose the server seed, retiring this commitment.
    pub fn reveal(self) -> [u8; SEED_LEN] {
        self.server_seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_seed(tag: u8) -> [u8; SEED_LEN] {
        let mut seed = [tag; SEED_LEN];
        seed[0] = tag.wrapping_add(1);
        seed
    }

    #[test]
    fn test_shuffle_deterministic() {
        let seed = test_seed(7);
        let a = shuffle_deck(&seed, "client", 3, 52).unwrap();
        let b = shuffle_deck(&seed, "client", 3, 52).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_is_exact_permutation() {
        let seed = test_seed(9);
        let deck = shuffle_deck(&seed, "", 0, 52).unwrap();
        assert_eq!(deck.len(), 52);
        let mut sorted = deck.clone();
        sorted.sort_unstable();
        let canonical: Vec<u8> = (0..52).collect();
        assert_eq!(sorted, canonical);
    }

    #[test]
    fn test_distinct_nonces_distinct_decks() {
        let seed = test_seed(3);
        let a = shuffle_deck(&seed, "client", 1, 52).unwrap();
        let b = shuffle_deck(&seed, "client", 2, 52).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_distinct_client_seeds_distinct_decks() {
        let seed = test_seed(3);
        let a = shuffle_deck(&seed, "alice", 1, 52).unwrap();
        let b = shuffle_deck(&seed, "bob", 1, 52).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let seed = test_seed(1);
        let long_seed = "x".repeat(MAX_CLIENT_SEED_LENGTH + 1);
        assert_eq!(
            shuffle_deck(&seed, &long_seed, 0, 52),
            Err(ShuffleError::ClientSeedTooLong(long_seed.len()))
        );
        assert_eq!(
            shuffle_deck(&seed, "ok", 0, 0),
            Err(ShuffleError::InvalidDeckSize(0))
        );
        assert_eq!(
            shuffle_deck(&seed, "ok", 0, MAX_DECK_SIZE + 1),
            Err(ShuffleError::InvalidDeckSize(MAX_DECK_SIZE + 1))
        );
    }

    #[test]
    fn test_nonce_reuse_rejected() {
        let mut commitment = SeedCommitment::from_seed(test_seed(5), 0);
        commitment.shuffle("client", 52).unwrap();
        let result = commitment.shuffle_at("client", 0, 52);
        assert_eq!(
            result.err(),
            Some(ShuffleError::NonceReused { got: 0, next: 1 })
        );
    }

    #[test]
    fn test_commit_reveal_verifies() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut commitment = SeedCommitment::generate(&mut rng, 0);
        let hash = *commitment.hash();
        let (deck, mut proof) = commitment.shuffle("client", 52).unwrap();
        assert_eq!(proof.server_seed_hash, hash);

        proof.server_seed = Some(commitment.reveal());
        proof.verify().unwrap();
        assert_eq!(proof.replay(52).unwrap(), deck);
    }

    #[test]
    fn test_tampered_reveal_fails() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut commitment = SeedCommitment::generate(&mut rng, 0);
        let (_, mut proof) = commitment.shuffle("client", 52).unwrap();
        let mut bad_seed = commitment.reveal();
        bad_seed[0] ^= 0xFF;
        proof.server_seed = Some(bad_seed);
        assert_eq!(proof.verify(), Err(ShuffleError::VerificationFailed));
    }

    #[test]
    fn test_unrevealed_proof_cannot_verify() {
        let mut commitment = SeedCommitment::from_seed(test_seed(2), 0);
        let (_, proof) = commitment.shuffle("client", 52).unwrap();
        assert_eq!(proof.verify(), Err(ShuffleError::SeedNotRevealed));
    }

    #[test]
    fn test_first_card_distribution_is_roughly_uniform() {
        // Basic chi-square check over the card dealt first across many nonces.
        let seed = test_seed(11);
        let mut counts = [0u64; 52];
        let trials = 5_200u64;
        for nonce in 0..trials {
            let deck = shuffle_deck(&seed, "entropy", nonce, 52).unwrap();
            counts[deck[0] as usize] += 1;
        }
        let expected = trials as f64 / 52.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&count| {
                let diff = count as f64 - expected;
                diff * diff / expected
            })
            .sum();
        // Critical value for 51 degrees of freedom at p=0.001 is ~88.
        assert!(
            chi_square < 100.0,
            "first-card distribution seems non-uniform, chi-square = {}",
            chi_square
        );
    }
}
