//! Session coordinator: maps players to table seats and routes everything
//! else.
//!
//! Table actors are created on the first join to an empty room and die when
//! the last seat empties; the coordinator prunes dead handles lazily and
//! respawns on the next join. Engagement and transfer traffic never touches
//! a table: it goes straight through the ledger, with notifications fanned
//! out over the per-session channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use greenfelt_engine::{GameVariant, Table};
use greenfelt_types::api::{Outbound, TableSnapshot};
use greenfelt_types::constants::{MAX_PLAYER_ID_LENGTH, MAX_TABLE_ID_LENGTH};
use greenfelt_types::{Chips, PlayerId, Transaction, TxKind};
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::api::{parse_action, Event};
use crate::config::ServerConfig;
use crate::engagement::{Engagement, EngagementError};
use crate::ledger::{Ledger, LedgerError};
use crate::store::{Store, StoreError};
use crate::table_actor::{self, ActorError, JoinOutcome, Mailbox};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("identifier too long")]
    IdentifierTooLong,
    #[error("unknown game variant {0}")]
    UnknownGame(String),
    #[error("table {0} is hosting a different game")]
    GameMismatch(String),
    #[error("player is not at a table")]
    NotAtTable,
    #[error("unknown action {0}")]
    InvalidAction(String),
    #[error(transparent)]
    Actor(#[from] ActorError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Engagement(#[from] EngagementError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Everything needed to talk to (and listen to) one table.
#[derive(Clone)]
pub struct TableHandle {
    pub mailbox: Mailbox,
    pub events: broadcast::Sender<Event>,
    pub variant: GameVariant,
}

/// Direct per-player outbound channels (balance updates, transfer
/// notifications, personal snapshots requested outside a table context).
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<PlayerId, mpsc::UnboundedSender<Outbound>>>>,
}

impl SessionRegistry {
    pub fn register(&self, player: &str, sender: mpsc::UnboundedSender<Outbound>) {
        self.lock().insert(player.to_string(), sender);
    }

    /// Remove a session, but only if it still owns the slot (a reconnect may
    /// already have replaced it).
    pub fn unregister(&self, player: &str, sender: &mpsc::UnboundedSender<Outbound>) {
        let mut sessions = self.lock();
        if sessions
            .get(player)
            .is_some_and(|current| current.same_channel(sender))
        {
            sessions.remove(player);
        }
    }

    /// Fire-and-forget delivery to a player's session, if connected.
    pub fn send(&self, player: &str, msg: Outbound) {
        if let Some(sender) = self.lock().get(player) {
            let _ = sender.send(msg);
        }
    }

    fn lock(
        &self,
    ) -> MutexGuard<'_, HashMap<PlayerId, mpsc::UnboundedSender<Outbound>>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct Coordinator {
    tables: Mutex<HashMap<String, TableHandle>>,
    players: Mutex<HashMap<PlayerId, String>>,
    ledger: Arc<Ledger>,
    engagement: Engagement,
    store: Arc<dyn Store>,
    config: ServerConfig,
    sessions: SessionRegistry,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Arc<Self> {
        let ledger = Arc::new(Ledger::new(store.clone(), config.min_transfer));
        let engagement = Engagement::new(store.clone(), ledger.clone(), config.streak_reset_days);
        Arc::new(Self {
            tables: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
            ledger,
            engagement,
            store,
            config,
            sessions: SessionRegistry::default(),
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Seat a player, provisioning their account on first contact.
    pub async fn join_table(
        &self,
        player: &str,
        table_id: &str,
        game: &str,
        balance: Option<Chips>,
        client_seed: Option<String>,
    ) -> Result<(JoinOutcome, TableHandle), CoordinatorError> {
        if player.is_empty()
            || player.len() > MAX_PLAYER_ID_LENGTH
            || table_id.is_empty()
            || table_id.len() > MAX_TABLE_ID_LENGTH
        {
            return Err(CoordinatorError::IdentifierTooLong);
        }
        let variant = GameVariant::parse(game)
            .ok_or_else(|| CoordinatorError::UnknownGame(game.to_string()))?;

        // The welcome bonus is a non-critical side effect: a degraded store
        // must not block the join.
        match self
            .ledger
            .open_account(player, balance.unwrap_or(self.config.starting_chips))
            .await
        {
            Ok(Some(tx)) => self.sessions.send(
                player,
                Outbound::BalanceUpdated {
                    balance: tx.balance_after,
                    amount: tx.amount,
                    reason: TxKind::WelcomeBonus.as_str().to_string(),
                },
            ),
            Ok(None) => {}
            Err(err) => warn!(%player, %err, "account provisioning degraded"),
        }

        // A cached handle may belong to an actor that already shut down;
        // prune it and respawn once.
        for _ in 0..2 {
            let handle = self.handle_for(table_id, variant)?;
            match handle.mailbox.join(player, client_seed.clone()).await {
                Ok(outcome) => {
                    self.lock_players()
                        .insert(player.to_string(), table_id.to_string());
                    return Ok((outcome, handle));
                }
                Err(ActorError::Closed) => {
                    self.lock_tables().remove(table_id);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ActorError::Closed.into())
    }

    pub async fn leave_table(&self, player: &str) -> Result<(), CoordinatorError> {
        let handle = self.table_of(player)?;
        let result = handle.mailbox.leave(player).await;
        self.lock_players().remove(player);
        result.map_err(Into::into)
    }

    pub async fn place_bet(&self, player: &str, amount: Chips) -> Result<(), CoordinatorError> {
        self.table_of(player)?
            .mailbox
            .place_bet(player, amount)
            .await
            .map_err(Into::into)
    }

    /// Route a `player_action` to the owning table actor.
    pub async fn submit_action(
        &self,
        player: &str,
        action: &str,
        amount: Option<Chips>,
    ) -> Result<(), CoordinatorError> {
        let action = parse_action(action, amount)
            .ok_or_else(|| CoordinatorError::InvalidAction(action.to_string()))?;
        self.table_of(player)?
            .mailbox
            .act(player, action)
            .await
            .map_err(Into::into)
    }

    /// Start the reconnection grace window for a dropped session.
    pub async fn disconnect(&self, player: &str) {
        if let Ok(handle) = self.table_of(player) {
            handle.mailbox.disconnected(player).await;
        }
    }

    /// Restore a held seat and replay the authoritative current snapshot
    /// (latest-state, never an event history).
    pub async fn reconnect(
        &self,
        player: &str,
    ) -> Result<(TableSnapshot, TableHandle), CoordinatorError> {
        let handle = self.table_of(player)?;
        let snapshot = handle.mailbox.reconnected(player).await?;
        Ok((snapshot, handle))
    }

    pub async fn transfer(
        &self,
        sender: &str,
        receiver: &str,
        amount: Chips,
    ) -> Result<(Transaction, Transaction), CoordinatorError> {
        let (sent, received) = self.ledger.transfer(sender, receiver, amount).await?;
        self.sessions.send(
            sender,
            Outbound::BalanceUpdated {
                balance: sent.balance_after,
                amount: sent.amount,
                reason: sent.kind.as_str().to_string(),
            },
        );
        self.sessions.send(
            receiver,
            Outbound::BalanceUpdated {
                balance: received.balance_after,
                amount: received.amount,
                reason: received.kind.as_str().to_string(),
            },
        );
        let note = Outbound::TransferNotification {
            from: sender.to_string(),
            to: receiver.to_string(),
            amount,
        };
        self.sessions.send(sender, note.clone());
        self.sessions.send(receiver, note);
        Ok((sent, received))
    }

    pub async fn claim_daily(&self, player: &str) -> Result<(Transaction, u32), CoordinatorError> {
        let (tx, streak) = self.engagement.claim_daily(player, now_ms()).await?;
        self.sessions.send(
            player,
            Outbound::BalanceUpdated {
                balance: tx.balance_after,
                amount: tx.amount,
                reason: tx.kind.as_str().to_string(),
            },
        );
        Ok((tx, streak))
    }

    /// Record a friend request; the relation is accepted once both sides
    /// have asked.
    pub fn add_friend(&self, player: &str, peer: &str) -> Result<bool, CoordinatorError> {
        Ok(self.store.record_friend_request(player, peer)?)
    }

    fn handle_for(
        &self,
        table_id: &str,
        variant: GameVariant,
    ) -> Result<TableHandle, CoordinatorError> {
        let mut tables = self.lock_tables();
        if let Some(handle) = tables.get(table_id) {
            if handle.variant != variant {
                return Err(CoordinatorError::GameMismatch(table_id.to_string()));
            }
            return Ok(handle.clone());
        }
        let table = {
            let mut rng = OsRng;
            Table::new(
                table_id.to_string(),
                variant,
                self.config.table_config(),
                &mut rng,
            )
        };
        let (mailbox, events) = table_actor::spawn(
            table,
            self.ledger.clone(),
            self.store.clone(),
            self.config.clone(),
        );
        let handle = TableHandle {
            mailbox,
            events,
            variant,
        };
        tables.insert(table_id.to_string(), handle.clone());
        Ok(handle)
    }

    fn table_of(&self, player: &str) -> Result<TableHandle, CoordinatorError> {
        let table_id = self
            .lock_players()
            .get(player)
            .cloned()
            .ok_or(CoordinatorError::NotAtTable)?;
        self.lock_tables()
            .get(&table_id)
            .cloned()
            .ok_or(CoordinatorError::NotAtTable)
    }

    fn lock_tables(&self) -> MutexGuard<'_, HashMap<String, TableHandle>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_players(&self) -> MutexGuard<'_, HashMap<PlayerId, String>> {
        self.players
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
