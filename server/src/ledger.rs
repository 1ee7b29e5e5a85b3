//! The ledger service: the only component that moves chips.
//!
//! Balances are the denormalized fold of the append-only transaction log;
//! every mutation appends exactly one record (two for a transfer) in the same
//! critical section that changes the balance. Per-account async locks
//! serialize concurrent mutations; operations touching two accounts lock in
//! ascending player-id order so they can never deadlock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use greenfelt_types::{Chips, PlayerId, Transaction, TxKind};
use thiserror::Error;
use tracing::warn;

use crate::store::{Store, StoreError};
use greenfelt_types::constants::MAX_CONFLICT_RETRIES;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance (have={have}, need={need})")]
    InsufficientBalance { have: u64, need: u64 },
    #[error("unknown account {0}")]
    UnknownAccount(String),
    #[error("transfer amount {got} is below the minimum {min}")]
    BelowMinimum { got: u64, min: u64 },
    #[error("cannot transfer to self")]
    SelfTransfer,
    #[error("players do not hold an accepted friendship")]
    NotFriends,
    #[error("amount exceeds the ledger's signed range")]
    AmountOverflow,
    #[error("storage conflict persisted after retries")]
    Conflict,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict,
            StoreError::Unavailable(message) => Self::Unavailable(message),
            StoreError::Corrupt(what) => Self::Unavailable(format!("corrupt {what}")),
        }
    }
}

#[derive(Debug)]
struct Account {
    balance: Chips,
}

/// Owner of all balance mutations and the transaction log.
pub struct Ledger {
    accounts: Mutex<HashMap<PlayerId, Arc<tokio::sync::Mutex<Account>>>>,
    store: Arc<dyn Store>,
    next_tx_id: AtomicU64,
    min_transfer: Chips,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, min_transfer: Chips) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            store,
            next_tx_id: AtomicU64::new(1),
            min_transfer,
        }
    }

    /// Create an account and grant its starting balance as a welcome bonus.
    ///
    /// Returns `None` for an already-known player. The grant is a
    /// non-critical side effect: if the store is down the account still
    /// opens (at zero) and the failure is logged rather than propagated.
    pub async fn open_account(
        &self,
        player: &str,
        starting: Chips,
    ) -> Result<Option<Transaction>, LedgerError> {
        {
            let mut accounts = self.lock_accounts();
            if accounts.contains_key(player) {
                return Ok(None);
            }
            // A persisted balance row means this player predates the current
            // process; restore it instead of granting a second bonus.
            match self.store.load_balance(player) {
                Ok(Some(balance)) => {
                    accounts.insert(
                        player.to_string(),
                        Arc::new(tokio::sync::Mutex::new(Account { balance })),
                    );
                    return Ok(None);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%player, %err, "balance row lookup failed; opening fresh")
                }
            }
            accounts.insert(
                player.to_string(),
                Arc::new(tokio::sync::Mutex::new(Account { balance: 0 })),
            );
        }
        if starting == 0 {
            return Ok(None);
        }
        match self.credit(player, starting, TxKind::WelcomeBonus).await {
            Ok(tx) => Ok(Some(tx)),
            Err(err) => {
                warn!(%player, %err, "welcome bonus grant failed; account opened at zero");
                Ok(None)
            }
        }
    }

    pub async fn balance(&self, player: &str) -> Option<Chips> {
        let account = self.account(player)?;
        let guard = account.lock().await;
        Some(guard.balance)
    }

    /// Remove chips. Never partial: on any error the balance and the log are
    /// untouched.
    pub async fn debit(
        &self,
        player: &str,
        amount: Chips,
        kind: TxKind,
    ) -> Result<Transaction, LedgerError> {
        let signed = to_signed(amount)?;
        let account = self
            .account(player)
            .ok_or_else(|| LedgerError::UnknownAccount(player.to_string()))?;
        let mut guard = account.lock().await;
        if guard.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                have: guard.balance,
                need: amount,
            });
        }
        let tx = self.build_tx(player, kind, -signed, guard.balance, guard.balance - amount);
        self.append_with_retry(std::slice::from_ref(&tx))?;
        guard.balance -= amount;
        self.persist_balance(player, guard.balance);
        Ok(tx)
    }

    /// Add chips. Never partial, like [`Ledger::debit`].
    pub async fn credit(
        &self,
        player: &str,
        amount: Chips,
        kind: TxKind,
    ) -> Result<Transaction, LedgerError> {
        let signed = to_signed(amount)?;
        let account = self
            .account(player)
            .ok_or_else(|| LedgerError::UnknownAccount(player.to_string()))?;
        let mut guard = account.lock().await;
        let after = guard
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let tx = self.build_tx(player, kind, signed, guard.balance, after);
        self.append_with_retry(std::slice::from_ref(&tx))?;
        guard.balance = after;
        self.persist_balance(player, guard.balance);
        Ok(tx)
    }

    /// Move chips between friends: two linked records referencing each
    /// other, appended in one all-or-nothing operation.
    pub async fn transfer(
        &self,
        sender: &str,
        receiver: &str,
        amount: Chips,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        if sender == receiver {
            return Err(LedgerError::SelfTransfer);
        }
        if amount < self.min_transfer {
            return Err(LedgerError::BelowMinimum {
                got: amount,
                min: self.min_transfer,
            });
        }
        let signed = to_signed(amount)?;
        if !self.store.are_friends(sender, receiver)? {
            return Err(LedgerError::NotFriends);
        }
        let sender_account = self
            .account(sender)
            .ok_or_else(|| LedgerError::UnknownAccount(sender.to_string()))?;
        let receiver_account = self
            .account(receiver)
            .ok_or_else(|| LedgerError::UnknownAccount(receiver.to_string()))?;

        // Ascending-id lock order keeps concurrent transfers deadlock-free.
        let (mut sender_guard, mut receiver_guard) = if sender < receiver {
            let first = sender_account.lock().await;
            let second = receiver_account.lock().await;
            (first, second)
        } else {
            let second = receiver_account.lock().await;
            let first = sender_account.lock().await;
            (first, second)
        };

        if sender_guard.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                have: sender_guard.balance,
                need: amount,
            });
        }
        let receiver_after = receiver_guard
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;

        let sent_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let received_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let timestamp_ms = now_ms();
        let sent = Transaction {
            id: sent_id,
            player: sender.to_string(),
            kind: TxKind::TransferSent,
            amount: -signed,
            balance_before: sender_guard.balance,
            balance_after: sender_guard.balance - amount,
            related_player: Some(receiver.to_string()),
            related_tx: Some(received_id),
            timestamp_ms,
        };
        let received = Transaction {
            id: received_id,
            player: receiver.to_string(),
            kind: TxKind::TransferReceived,
            amount: signed,
            balance_before: receiver_guard.balance,
            balance_after: receiver_after,
            related_player: Some(sender.to_string()),
            related_tx: Some(sent_id),
            timestamp_ms,
        };
        self.append_with_retry(&[sent.clone(), received.clone()])?;
        sender_guard.balance -= amount;
        receiver_guard.balance = receiver_after;
        self.persist_balance(sender, sender_guard.balance);
        self.persist_balance(receiver, receiver_guard.balance);
        Ok((sent, received))
    }

    /// Re-derive a balance from the log and compare it to the denormalized
    /// value. `true` means the materialized view is consistent.
    pub async fn reconcile(&self, player: &str) -> Result<bool, LedgerError> {
        let Some(account) = self.account(player) else {
            return Err(LedgerError::UnknownAccount(player.to_string()));
        };
        let guard = account.lock().await;
        let log = self.store.transactions_for(player)?;
        let mut folded: i128 = 0;
        for tx in &log {
            if !tx.is_balanced() {
                return Ok(false);
            }
            folded += i128::from(tx.amount);
        }
        Ok(folded == i128::from(guard.balance))
    }

    fn account(&self, player: &str) -> Option<Arc<tokio::sync::Mutex<Account>>> {
        self.lock_accounts().get(player).cloned()
    }

    fn lock_accounts(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<PlayerId, Arc<tokio::sync::Mutex<Account>>>> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_tx(
        &self,
        player: &str,
        kind: TxKind,
        amount: i64,
        before: Chips,
        after: Chips,
    ) -> Transaction {
        Transaction {
            id: self.next_tx_id.fetch_add(1, Ordering::SeqCst),
            player: player.to_string(),
            kind,
            amount,
            balance_before: before,
            balance_after: after,
            related_player: None,
            related_tx: None,
            timestamp_ms: now_ms(),
        }
    }

    /// Write-through of the denormalized balance row. The log is the record;
    /// a lagging row is repaired on the next mutation.
    fn persist_balance(&self, player: &str, balance: Chips) {
        if let Err(err) = self.store.save_balance(player, balance) {
            warn!(%player, %err, "failed to persist balance row");
        }
    }

    /// Append to the log, retrying bounded store conflicts before surfacing
    /// one as transient.
    fn append_with_retry(&self, txs: &[Transaction]) -> Result<(), LedgerError> {
        let mut attempts = 0;
        loop {
            match self.store.append_transactions(txs) {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict) if attempts < MAX_CONFLICT_RETRIES => {
                    attempts += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn to_signed(amount: Chips) -> Result<i64, LedgerError> {
    i64::try_from(amount).map_err(|_| LedgerError::AmountOverflow)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use greenfelt_types::constants::MIN_TRANSFER_AMOUNT;
    use std::sync::atomic::AtomicU32;

    fn ledger_with_store() -> (Arc<Ledger>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::new(store.clone(), MIN_TRANSFER_AMOUNT));
        (ledger, store)
    }

    async fn befriend(store: &MemoryStore, a: &str, b: &str) {
        store.record_friend_request(a, b).unwrap();
        store.record_friend_request(b, a).unwrap();
    }

    #[tokio::test]
    async fn test_welcome_bonus_opens_account() {
        let (ledger, _) = ledger_with_store();
        let tx = ledger.open_account("alice", 1_000).await.unwrap().unwrap();
        assert_eq!(tx.kind, TxKind::WelcomeBonus);
        assert_eq!(tx.balance_after, 1_000);
        assert_eq!(ledger.balance("alice").await, Some(1_000));
        // Idempotent on repeat.
        assert!(ledger.open_account("alice", 1_000).await.unwrap().is_none());
        assert!(ledger.reconcile("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_debit_never_overdraws() {
        let (ledger, store) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();
        let err = ledger.debit("alice", 150, TxKind::Bet).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                have: 100,
                need: 150
            }
        );
        // No partial mutation: only the welcome bonus is on the log.
        assert_eq!(store.transactions_for("alice").unwrap().len(), 1);
        assert_eq!(ledger.balance("alice").await, Some(100));
    }

    #[tokio::test]
    async fn test_transfer_rules() {
        let (ledger, store) = ledger_with_store();
        ledger.open_account("alice", 1_000).await.unwrap();
        ledger.open_account("bob", 1_000).await.unwrap();

        // Below the configured minimum.
        assert_eq!(
            ledger.transfer("alice", "bob", 5).await.unwrap_err(),
            LedgerError::BelowMinimum { got: 5, min: 10 }
        );
        // Self transfer.
        assert_eq!(
            ledger.transfer("alice", "alice", 50).await.unwrap_err(),
            LedgerError::SelfTransfer
        );
        // Not friends yet.
        assert_eq!(
            ledger.transfer("alice", "bob", 50).await.unwrap_err(),
            LedgerError::NotFriends
        );
        // None of the rejections wrote a record.
        assert_eq!(store.transactions_for("alice").unwrap().len(), 1);
        assert_eq!(store.transactions_for("bob").unwrap().len(), 1);

        befriend(&store, "alice", "bob").await;
        let (sent, received) = ledger.transfer("alice", "bob", 250).await.unwrap();
        assert_eq!(sent.amount, -250);
        assert_eq!(received.amount, 250);
        assert_eq!(sent.related_tx, Some(received.id));
        assert_eq!(received.related_tx, Some(sent.id));
        assert_eq!(ledger.balance("alice").await, Some(750));
        assert_eq!(ledger.balance("bob").await, Some(1_250));
        assert!(ledger.reconcile("alice").await.unwrap());
        assert!(ledger.reconcile("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_transfers_conserve_chips() {
        let (ledger, store) = ledger_with_store();
        ledger.open_account("alice", 10_000).await.unwrap();
        ledger.open_account("bob", 10_000).await.unwrap();
        befriend(&store, "alice", "bob").await;

        // Opposite directions concurrently; ascending-id locking means no
        // deadlock and no lost update.
        let forward = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _ = ledger.transfer("alice", "bob", 40).await;
                }
            })
        };
        let backward = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _ = ledger.transfer("bob", "alice", 60).await;
                }
            })
        };
        forward.await.unwrap();
        backward.await.unwrap();

        let alice = ledger.balance("alice").await.unwrap();
        let bob = ledger.balance("bob").await.unwrap();
        assert_eq!(alice + bob, 20_000);
        assert!(ledger.reconcile("alice").await.unwrap());
        assert!(ledger.reconcile("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_restores_balance_row_without_second_bonus() {
        let store = Arc::new(MemoryStore::new());
        {
            let ledger = Ledger::new(store.clone(), MIN_TRANSFER_AMOUNT);
            ledger.open_account("alice", 1_000).await.unwrap();
            ledger.debit("alice", 400, TxKind::Bet).await.unwrap();
        }
        // A new ledger over the same store sees the persisted row.
        let ledger = Ledger::new(store, MIN_TRANSFER_AMOUNT);
        let granted = ledger.open_account("alice", 1_000).await.unwrap();
        assert!(granted.is_none());
        assert_eq!(ledger.balance("alice").await, Some(600));
    }

    /// Store that fails the first `conflicts` appends with a write conflict.
    struct FlakyStore {
        inner: MemoryStore,
        remaining: AtomicU32,
    }

    impl Store for FlakyStore {
        fn append_transactions(&self, txs: &[Transaction]) -> Result<(), StoreError> {
            if self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                })
                .is_ok()
            {
                return Err(StoreError::Conflict);
            }
            self.inner.append_transactions(txs)
        }

        fn transactions_for(&self, player: &str) -> Result<Vec<Transaction>, StoreError> {
            self.inner.transactions_for(player)
        }

        fn save_balance(&self, player: &str, balance: u64) -> Result<(), StoreError> {
            self.inner.save_balance(player, balance)
        }

        fn load_balance(&self, player: &str) -> Result<Option<u64>, StoreError> {
            self.inner.load_balance(player)
        }

        fn load_streak(
            &self,
            player: &str,
        ) -> Result<Option<greenfelt_types::StreakRecord>, StoreError> {
            self.inner.load_streak(player)
        }

        fn save_streak(
            &self,
            player: &str,
            record: &greenfelt_types::StreakRecord,
        ) -> Result<(), StoreError> {
            self.inner.save_streak(player, record)
        }

        fn save_table_snapshot(&self, table_id: &str, blob: &[u8]) -> Result<(), StoreError> {
            self.inner.save_table_snapshot(table_id, blob)
        }

        fn load_table_snapshot(&self, table_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.load_table_snapshot(table_id)
        }

        fn drop_table_snapshot(&self, table_id: &str) -> Result<(), StoreError> {
            self.inner.drop_table_snapshot(table_id)
        }

        fn record_friend_request(&self, from: &str, to: &str) -> Result<bool, StoreError> {
            self.inner.record_friend_request(from, to)
        }

        fn are_friends(&self, a: &str, b: &str) -> Result<bool, StoreError> {
            self.inner.are_friends(a, b)
        }
    }

    #[tokio::test]
    async fn test_bounded_conflict_retry() {
        // Two conflicts then success: retried internally.
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            remaining: AtomicU32::new(2),
        });
        let ledger = Ledger::new(store, MIN_TRANSFER_AMOUNT);
        ledger.open_account("alice", 500).await.unwrap();
        assert_eq!(ledger.balance("alice").await, Some(500));

        // More conflicts than the retry budget: surfaced as transient.
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            remaining: AtomicU32::new(100),
        });
        let ledger = Ledger::new(store, MIN_TRANSFER_AMOUNT);
        ledger.open_account("bob", 0).await.unwrap();
        let err = ledger.credit("bob", 100, TxKind::Payout).await.unwrap_err();
        assert_eq!(err, LedgerError::Conflict);
        assert_eq!(ledger.balance("bob").await, Some(0));
    }
}
