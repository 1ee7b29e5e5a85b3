//! Storage abstraction for the transactional store the core assumes.
//!
//! The ledger and engagement services issue operations against [`Store`]
//! without knowing the backend. Rows are persisted codec-encoded, the same
//! bytes a real KV backend would hold, so the in-memory implementation
//! exercises the full encode/decode path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use commonware_codec::{DecodeExt, Encode};
use greenfelt_types::{StreakRecord, Transaction};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic write conflict; safe to retry.
    #[error("storage write conflict")]
    Conflict,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(&'static str),
}

/// Operations the core issues against its transactional store.
pub trait Store: Send + Sync {
    /// Append records to the immutable transaction log. All-or-nothing: on
    /// error no record was written.
    fn append_transactions(&self, txs: &[Transaction]) -> Result<(), StoreError>;

    /// A player's transaction history in append order.
    fn transactions_for(&self, player: &str) -> Result<Vec<Transaction>, StoreError>;

    /// Denormalized balance row: always re-derivable from the log, persisted
    /// for O(1) reads and restart recovery.
    fn save_balance(&self, player: &str, balance: u64) -> Result<(), StoreError>;

    fn load_balance(&self, player: &str) -> Result<Option<u64>, StoreError>;

    fn load_streak(&self, player: &str) -> Result<Option<StreakRecord>, StoreError>;

    fn save_streak(&self, player: &str, record: &StreakRecord) -> Result<(), StoreError>;

    /// Ephemeral table snapshot for crash recovery (not the ledger of
    /// record).
    fn save_table_snapshot(&self, table_id: &str, blob: &[u8]) -> Result<(), StoreError>;

    fn load_table_snapshot(&self, table_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn drop_table_snapshot(&self, table_id: &str) -> Result<(), StoreError>;

    /// Record a directed friend request; returns true once the relation is
    /// accepted (both directions present).
    fn record_friend_request(&self, from: &str, to: &str) -> Result<bool, StoreError>;

    fn are_friends(&self, a: &str, b: &str) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    /// Codec-encoded transaction records, append order.
    log: Vec<Vec<u8>>,
    by_player: HashMap<String, Vec<usize>>,
    balances: HashMap<String, u64>,
    streaks: HashMap<String, Vec<u8>>,
    snapshots: HashMap<String, Vec<u8>>,
    friend_requests: HashSet<(String, String)>,
}

/// In-memory store used by the server binary and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, for degradation tests.
    pub fn poison(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.unavailable.store(false, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store poisoned".into()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn append_transactions(&self, txs: &[Transaction]) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        for tx in txs {
            let index = inner.log.len();
            inner.log.push(tx.encode().to_vec());
            inner
                .by_player
                .entry(tx.player.clone())
                .or_default()
                .push(index);
        }
        Ok(())
    }

    fn transactions_for(&self, player: &str) -> Result<Vec<Transaction>, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        let Some(indices) = inner.by_player.get(player) else {
            return Ok(Vec::new());
        };
        indices
            .iter()
            .map(|&index| {
                Transaction::decode(&mut inner.log[index].as_slice())
                    .map_err(|_| StoreError::Corrupt("transaction"))
            })
            .collect()
    }

    fn save_balance(&self, player: &str, balance: u64) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().balances.insert(player.to_string(), balance);
        Ok(())
    }

    fn load_balance(&self, player: &str) -> Result<Option<u64>, StoreError> {
        self.check_available()?;
        Ok(self.lock().balances.get(player).copied())
    }

    fn load_streak(&self, player: &str) -> Result<Option<StreakRecord>, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        inner
            .streaks
            .get(player)
            .map(|bytes| {
                StreakRecord::decode(&mut bytes.as_slice())
                    .map_err(|_| StoreError::Corrupt("streak record"))
            })
            .transpose()
    }

    fn save_streak(&self, player: &str, record: &StreakRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock()
            .streaks
            .insert(player.to_string(), record.encode().to_vec());
        Ok(())
    }

    fn save_table_snapshot(&self, table_id: &str, blob: &[u8]) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock()
            .snapshots
            .insert(table_id.to_string(), blob.to_vec());
        Ok(())
    }

    fn load_table_snapshot(&self, table_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        Ok(self.lock().snapshots.get(table_id).cloned())
    }

    fn drop_table_snapshot(&self, table_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().snapshots.remove(table_id);
        Ok(())
    }

    fn record_friend_request(&self, from: &str, to: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        inner
            .friend_requests
            .insert((from.to_string(), to.to_string()));
        Ok(inner
            .friend_requests
            .contains(&(to.to_string(), from.to_string())))
    }

    fn are_friends(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        Ok(inner
            .friend_requests
            .contains(&(a.to_string(), b.to_string()))
            && inner
                .friend_requests
                .contains(&(b.to_string(), a.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenfelt_types::TxKind;

    fn tx(id: u64, player: &str, amount: i64, before: u64) -> Transaction {
        Transaction {
            id,
            player: player.to_string(),
            kind: if amount < 0 { TxKind::Bet } else { TxKind::Payout },
            amount,
            balance_before: before,
            balance_after: (before as i64 + amount) as u64,
            related_player: None,
            related_tx: None,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_log_roundtrips_through_encoding() {
        let store = MemoryStore::new();
        store
            .append_transactions(&[tx(1, "alice", -100, 1_000), tx(2, "alice", 200, 900)])
            .unwrap();
        let log = store.transactions_for("alice").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, 1);
        assert_eq!(log[1].balance_after, 1_100);
        assert!(store.transactions_for("bob").unwrap().is_empty());
    }

    #[test]
    fn test_friendship_requires_both_directions() {
        let store = MemoryStore::new();
        assert!(!store.record_friend_request("alice", "bob").unwrap());
        assert!(!store.are_friends("alice", "bob").unwrap());
        assert!(store.record_friend_request("bob", "alice").unwrap());
        assert!(store.are_friends("alice", "bob").unwrap());
        assert!(store.are_friends("bob", "alice").unwrap());
    }

    #[test]
    fn test_poisoned_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.poison();
        assert!(matches!(
            store.append_transactions(&[tx(1, "alice", -1, 1)]),
            Err(StoreError::Unavailable(_))
        ));
        store.heal();
        assert!(store.append_transactions(&[tx(1, "alice", -1, 1)]).is_ok());
    }
}
