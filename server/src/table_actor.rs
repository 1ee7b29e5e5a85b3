//! Per-table actor: the single writer for one [`Table`].
//!
//! Every mutation of a table flows through the actor's mailbox, so table
//! state never needs a lock. The actor owns the per-seat timers (action
//! timeout, betting window, reconnection grace) and is the only place that
//! talks to the ledger on the game path; broadcasts fan out through a
//! `tokio::sync::broadcast` channel and never block action processing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use greenfelt_engine::{
    PlayerAction, SettlementKind, Table, TableError, TablePhase, TableUpdate,
};
use greenfelt_types::api::{Outbound, TableSnapshot};
use greenfelt_types::{Chips, PlayerId, Transaction, TxKind};
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, warn};

use crate::api::Event;
use crate::config::ServerConfig;
use crate::ledger::{Ledger, LedgerError};
use crate::store::Store;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("infrastructure failure: {0}")]
    Infrastructure(&'static str),
    #[error("table is gone")]
    Closed,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub seat: usize,
    /// The seat was held through a disconnect and this join restored it.
    pub rejoined: bool,
    pub snapshot: TableSnapshot,
}

/// Messages sent to a table actor.
pub enum Command {
    Join {
        player: PlayerId,
        client_seed: Option<String>,
        reply: oneshot::Sender<Result<JoinOutcome, ActorError>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    PlaceBet {
        player: PlayerId,
        amount: Chips,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    Act {
        player: PlayerId,
        action: PlayerAction,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    Snapshot {
        player: Option<PlayerId>,
        reply: oneshot::Sender<TableSnapshot>,
    },
    Disconnected {
        player: PlayerId,
    },
    Reconnected {
        player: PlayerId,
        reply: oneshot::Sender<Result<TableSnapshot, ActorError>>,
    },
}

/// Mailbox for a table actor.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Command>,
}

impl Mailbox {
    pub async fn join(
        &self,
        player: &str,
        client_seed: Option<String>,
    ) -> Result<JoinOutcome, ActorError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Join {
            player: player.to_string(),
            client_seed,
            reply,
        })
        .await?;
        response.await.map_err(|_| ActorError::Closed)?
    }

    pub async fn leave(&self, player: &str) -> Result<(), ActorError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Leave {
            player: player.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ActorError::Closed)?
    }

    pub async fn place_bet(&self, player: &str, amount: Chips) -> Result<(), ActorError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::PlaceBet {
            player: player.to_string(),
            amount,
            reply,
        })
        .await?;
        response.await.map_err(|_| ActorError::Closed)?
    }

    pub async fn act(&self, player: &str, action: PlayerAction) -> Result<(), ActorError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Act {
            player: player.to_string(),
            action,
            reply,
        })
        .await?;
        response.await.map_err(|_| ActorError::Closed)?
    }

    pub async fn snapshot(&self, player: Option<&str>) -> Result<TableSnapshot, ActorError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot {
            player: player.map(str::to_string),
            reply,
        })
        .await?;
        response.await.map_err(|_| ActorError::Closed)
    }

    pub async fn disconnected(&self, player: &str) {
        let _ = self
            .sender
            .send(Command::Disconnected {
                player: player.to_string(),
            })
            .await;
    }

    pub async fn reconnected(&self, player: &str) -> Result<TableSnapshot, ActorError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Reconnected {
            player: player.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ActorError::Closed)?
    }

    async fn send(&self, command: Command) -> Result<(), ActorError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ActorError::Closed)
    }
}

/// Spawn the actor for `table`; it runs until the table empties.
pub fn spawn(
    table: Table,
    ledger: Arc<Ledger>,
    store: Arc<dyn Store>,
    config: ServerConfig,
) -> (Mailbox, broadcast::Sender<Event>) {
    let (sender, rx) = mpsc::channel(64);
    let (events, _) = broadcast::channel(256);
    let actor = TableActor {
        table,
        rx,
        ledger,
        store,
        events: events.clone(),
        config,
        betting_deadline: None,
        action_deadline: None,
        disconnected: HashMap::new(),
    };
    tokio::spawn(actor.run());
    (Mailbox { sender }, events)
}

enum DebitFailure {
    /// Typed rejection (insufficient balance, unknown account, conflict).
    Rejected(LedgerError),
    /// The ledger is unreachable: fatal to the round.
    Unreachable,
}

struct TableActor {
    table: Table,
    rx: mpsc::Receiver<Command>,
    ledger: Arc<Ledger>,
    store: Arc<dyn Store>,
    events: broadcast::Sender<Event>,
    config: ServerConfig,
    betting_deadline: Option<Instant>,
    /// (seat, deadline) for the decision currently awaited.
    action_deadline: Option<(usize, Instant)>,
    /// Grace deadlines for disconnected (or departed) seats.
    disconnected: HashMap<PlayerId, Instant>,
}

impl TableActor {
    async fn run(mut self) {
        debug!(table = %self.table.id(), "table actor started");
        loop {
            self.refresh_deadlines();
            let next = self.next_deadline();
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = sleep_until(next.unwrap_or_else(far_future)), if next.is_some() => {
                    self.handle_deadlines().await;
                }
            }
            if self.table.is_empty() && !self.table.round_active() {
                break;
            }
        }
        if let Err(err) = self.store.drop_table_snapshot(self.table.id()) {
            warn!(table = %self.table.id(), %err, "failed to drop table snapshot");
        }
        debug!(table = %self.table.id(), "table actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Join {
                player,
                client_seed,
                reply,
            } => {
                let rejoined = self.disconnected.remove(&player).is_some();
                let result = self
                    .table
                    .join(&player, client_seed.as_deref())
                    .map(|seat| JoinOutcome {
                        seat,
                        rejoined,
                        snapshot: self.table.snapshot(Some(&player)),
                    })
                    .map_err(ActorError::from);
                let ok = result.is_ok();
                let _ = reply.send(result);
                if ok {
                    self.broadcast_state();
                }
            }
            Command::Leave { player, reply } => match self.table.leave(&player) {
                Ok(update) => {
                    if self.table.seat_of(&player).is_some() {
                        // Seat is held until the round settles; its pending
                        // decisions default immediately.
                        self.disconnected.insert(player.clone(), Instant::now());
                    } else {
                        self.disconnected.remove(&player);
                    }
                    self.apply_update(update).await;
                    let _ = reply.send(Ok(()));
                    self.broadcast_state();
                }
                Err(err) => {
                    let _ = reply.send(Err(err.into()));
                }
            },
            Command::PlaceBet {
                player,
                amount,
                reply,
            } => {
                let result = self.place_bet(&player, amount).await;
                let ok = result.is_ok();
                let _ = reply.send(result);
                if ok {
                    if self.table.all_seats_ready() {
                        self.run_deal().await;
                    }
                    self.broadcast_state();
                }
            }
            Command::Act {
                player,
                action,
                reply,
            } => {
                let result = self.player_act(&player, action).await;
                let ok = result.is_ok();
                let _ = reply.send(result);
                if ok {
                    self.broadcast_state();
                }
            }
            Command::Snapshot { player, reply } => {
                let _ = reply.send(self.table.snapshot(player.as_deref()));
            }
            Command::Disconnected { player } => {
                if let Some(seat) = self.table.seat_of(&player) {
                    let grace = Instant::now() + self.config.grace_window;
                    self.disconnected.insert(player.clone(), grace);
                    // A decision already being awaited from this seat waits
                    // out the grace window, not the shorter action timeout.
                    if let Some((deadline_seat, _)) = self.action_deadline {
                        if deadline_seat == seat {
                            self.action_deadline = Some((seat, grace));
                        }
                    }
                }
            }
            Command::Reconnected { player, reply } => {
                if self.table.seat_of(&player).is_some() {
                    self.disconnected.remove(&player);
                    let _ = reply.send(Ok(self.table.snapshot(Some(&player))));
                } else {
                    let _ = reply.send(Err(ActorError::Table(TableError::NotSeated)));
                }
            }
        }
    }

    async fn place_bet(&mut self, player: &str, amount: Chips) -> Result<(), ActorError> {
        let stake = self.table.check_bet(player, amount)?;
        let tx = match self.debit(player, stake).await {
            Ok(tx) => tx,
            Err(DebitFailure::Rejected(err)) => return Err(err.into()),
            Err(DebitFailure::Unreachable) => {
                return Err(ActorError::Infrastructure("ledger unreachable"))
            }
        };
        if let Err(err) = self.table.commit_bet(player, amount) {
            // The check above makes this unreachable under the single-writer
            // discipline, but chips are never kept on a rejected bet.
            self.refund(player, stake).await;
            return Err(err.into());
        }
        self.emit_balance(player, &tx, "BET");
        Ok(())
    }

    async fn player_act(&mut self, player: &str, action: PlayerAction) -> Result<(), ActorError> {
        let stake = self.table.stake_required(player, &action)?;
        if self.table.seat_of(player) != self.table.current_turn() {
            return Err(TableError::OutOfTurn.into());
        }
        let debit_tx = if stake > 0 {
            match self.debit(player, stake).await {
                Ok(tx) => Some(tx),
                Err(DebitFailure::Rejected(err)) => return Err(err.into()),
                Err(DebitFailure::Unreachable) => {
                    self.void_for_infrastructure().await;
                    return Err(ActorError::Infrastructure("ledger unreachable"));
                }
            }
        } else {
            None
        };
        match self.table.act(player, action) {
            Ok(update) => {
                if let Some(tx) = debit_tx {
                    self.emit_balance(player, &tx, "BET");
                }
                // Whatever decision comes next gets a fresh timer.
                self.action_deadline = None;
                self.apply_update(update).await;
                Ok(())
            }
            Err(err) => {
                if stake > 0 {
                    self.refund(player, stake).await;
                }
                Err(err.into())
            }
        }
    }

    /// Bounded-wait ledger debit on the action path.
    async fn debit(&self, player: &str, amount: Chips) -> Result<Transaction, DebitFailure> {
        match timeout(
            self.config.ledger_timeout,
            self.ledger.debit(player, amount, TxKind::Bet),
        )
        .await
        {
            Ok(Ok(tx)) => Ok(tx),
            Ok(Err(err @ LedgerError::Unavailable(_))) => {
                error!(%player, %err, "ledger unavailable during debit");
                Err(DebitFailure::Unreachable)
            }
            Ok(Err(err)) => Err(DebitFailure::Rejected(err)),
            Err(_) => {
                error!(%player, "ledger debit timed out");
                Err(DebitFailure::Unreachable)
            }
        }
    }

    async fn refund(&self, player: &str, amount: Chips) {
        match timeout(
            self.config.ledger_timeout,
            self.ledger.credit(player, amount, TxKind::Payout),
        )
        .await
        {
            Ok(Ok(tx)) => self.emit_balance(player, &tx, "REFUND"),
            Ok(Err(err)) => error!(%player, %err, "refund credit failed"),
            Err(_) => error!(%player, "refund credit timed out"),
        }
    }

    async fn run_deal(&mut self) {
        let result = {
            let mut rng = OsRng;
            self.table.deal(&mut rng)
        };
        match result {
            Ok(update) => {
                self.betting_deadline = None;
                self.action_deadline = None;
                self.apply_update(update).await;
            }
            Err(err) => warn!(table = %self.table.id(), %err, "deal failed"),
        }
    }

    /// Credit settlements (ascending player id), publish a retired proof,
    /// and announce voided rounds.
    async fn apply_update(&mut self, update: TableUpdate) {
        let TableUpdate {
            mut settlements,
            retired_proof,
            round_voided,
        } = update;
        settlements.sort_by(|a, b| a.player.cmp(&b.player));
        for settlement in settlements {
            let reason = match settlement.kind {
                SettlementKind::Payout => "PAYOUT",
                SettlementKind::Refund => "REFUND",
            };
            match timeout(
                self.config.ledger_timeout,
                self.ledger
                    .credit(&settlement.player, settlement.amount, TxKind::Payout),
            )
            .await
            {
                Ok(Ok(tx)) => self.emit_balance(&settlement.player, &tx, reason),
                Ok(Err(err)) => {
                    error!(player = %settlement.player, %err, "settlement credit failed")
                }
                Err(_) => error!(player = %settlement.player, "settlement credit timed out"),
            }
        }
        if let Some(proof) = retired_proof {
            if let Some(seed) = proof.server_seed {
                self.emit(Event::public(Outbound::ShuffleProof {
                    table_id: self.table.id().to_string(),
                    server_seed_hash: commonware_utils::hex(&proof.server_seed_hash),
                    server_seed: commonware_utils::hex(&seed),
                    client_seed: proof.client_seed,
                    nonce: proof.nonce,
                }));
            }
        }
        if round_voided {
            self.emit(Event::public(Outbound::Error {
                request_id: None,
                code: "ROUND_VOIDED".to_string(),
                message: "round voided; stakes refunded".to_string(),
            }));
        }
    }

    async fn void_for_infrastructure(&mut self) {
        error!(table = %self.table.id(), "ledger unreachable; voiding round");
        let update = self.table.void_round();
        self.apply_update(update).await;
        self.broadcast_state();
    }

    /// Apply the default action for `player` (their timer or grace window
    /// expired). Unfundable mandatory raises settle as surrenders.
    async fn apply_default(&mut self, player: &str) {
        let Some(action) = self.table.default_action() else {
            return;
        };
        let stake = self
            .table
            .stake_required(player, &action)
            .unwrap_or_default();
        if stake > 0 {
            match self.debit(player, stake).await {
                Ok(tx) => self.emit_balance(player, &tx, "BET"),
                Err(DebitFailure::Rejected(_)) => {
                    match self.table.forfeit(player) {
                        Ok(update) => {
                            self.action_deadline = None;
                            self.apply_update(update).await;
                        }
                        Err(err) => warn!(%player, %err, "forfeit failed"),
                    }
                    return;
                }
                Err(DebitFailure::Unreachable) => {
                    self.void_for_infrastructure().await;
                    return;
                }
            }
        }
        match self.table.act(player, action) {
            Ok(update) => {
                self.action_deadline = None;
                self.apply_update(update).await;
            }
            Err(err) => {
                warn!(%player, %err, "default action failed; forfeiting seat");
                if stake > 0 {
                    self.refund(player, stake).await;
                }
                if let Ok(update) = self.table.forfeit(player) {
                    self.action_deadline = None;
                    self.apply_update(update).await;
                }
            }
        }
    }

    fn refresh_deadlines(&mut self) {
        let now = Instant::now();
        if self.table.phase() == TablePhase::Betting && self.table.has_bets() {
            if self.betting_deadline.is_none() {
                self.betting_deadline = Some(now + self.config.betting_window);
            }
        } else {
            self.betting_deadline = None;
        }
        match self.table.current_turn() {
            Some(seat) => {
                let stale =
                    !matches!(self.action_deadline, Some((held, _)) if held == seat);
                if stale {
                    let deadline = self
                        .table
                        .player_at(seat)
                        .and_then(|player| self.disconnected.get(player.as_str()).copied())
                        .map(|grace| grace.max(now))
                        .unwrap_or_else(|| now + self.config.action_timeout);
                    self.action_deadline = Some((seat, deadline));
                }
            }
            None => self.action_deadline = None,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut next = self.betting_deadline;
        if let Some((_, deadline)) = self.action_deadline {
            next = Some(next.map_or(deadline, |current| current.min(deadline)));
        }
        for deadline in self.disconnected.values() {
            next = Some(next.map_or(*deadline, |current| current.min(*deadline)));
        }
        next
    }

    async fn handle_deadlines(&mut self) {
        let now = Instant::now();

        // Expired grace windows: default any pending decision, then release
        // the seat.
        let expired: Vec<PlayerId> = self
            .disconnected
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(player, _)| player.clone())
            .collect();
        for player in expired {
            self.disconnected.remove(&player);
            let seat = self.table.seat_of(&player);
            if seat.is_some() && self.table.current_turn() == seat {
                self.apply_default(&player).await;
            }
            if self.table.seat_of(&player).is_some() {
                match self.table.leave(&player) {
                    Ok(update) => self.apply_update(update).await,
                    Err(err) => warn!(%player, %err, "failed to release expired seat"),
                }
            }
            self.broadcast_state();
        }

        if let Some((seat, deadline)) = self.action_deadline {
            if deadline <= now && self.table.current_turn() == Some(seat) {
                self.action_deadline = None;
                if let Some(player) = self.table.player_at(seat).cloned() {
                    self.apply_default(&player).await;
                    self.broadcast_state();
                }
            }
        }

        if let Some(deadline) = self.betting_deadline {
            if deadline <= now {
                self.betting_deadline = None;
                if self.table.can_deal() {
                    self.run_deal().await;
                } else if self.table.phase() == TablePhase::Betting {
                    match self.table.cancel_betting() {
                        Ok(update) => self.apply_update(update).await,
                        Err(err) => warn!(table = %self.table.id(), %err, "cancel betting failed"),
                    }
                }
                self.broadcast_state();
            }
        }
    }

    /// Broadcast the latest state: one spectator-safe snapshot plus one
    /// personalized snapshot per seated player. Per-table ordering follows
    /// the order of state transitions; delivery is fire-and-forget.
    fn broadcast_state(&self) {
        let snapshot = self.table.snapshot(None);
        match serde_json::to_vec(&snapshot) {
            Ok(blob) => {
                if let Err(err) = self.store.save_table_snapshot(self.table.id(), &blob) {
                    warn!(table = %self.table.id(), %err, "failed to persist table snapshot");
                }
            }
            Err(err) => warn!(table = %self.table.id(), %err, "failed to serialize snapshot"),
        }
        self.emit(Event::public(Outbound::TableState {
            table_id: self.table.id().to_string(),
            snapshot,
        }));
        for (_, player) in self.table.seated_players() {
            let personal = self.table.snapshot(Some(&player));
            self.emit(Event::personal(
                player,
                Outbound::TableState {
                    table_id: self.table.id().to_string(),
                    snapshot: personal,
                },
            ));
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn emit_balance(&self, player: &str, tx: &Transaction, reason: &str) {
        self.emit(Event::personal(
            player.to_string(),
            Outbound::BalanceUpdated {
                balance: tx.balance_after,
                amount: tx.amount,
                reason: reason.to_string(),
            },
        ));
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(24 * 60 * 60)
}
