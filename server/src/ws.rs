//! WebSocket gateway for the real-time channel.
//!
//! One task pair per connection: a writer draining an unbounded queue into
//! the socket, and a reader dispatching inbound messages to the coordinator.
//! Joining a table subscribes the session to that table's broadcast channel;
//! personal messages (balance updates, personalized snapshots) arrive over
//! the session registry instead, so the forwarder drops the spectator copy
//! of `table_state` for seated players.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use greenfelt_types::api::{Inbound, Outbound};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::api::error_code;
use crate::coordinator::{Coordinator, CoordinatorError, TableHandle};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

pub async fn healthz() -> &'static str {
    "ok"
}

struct Session {
    player: Option<String>,
    outbound: mpsc::UnboundedSender<Outbound>,
    table_task: Option<JoinHandle<()>>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (writer, mut writer_rx) = mpsc::unbounded_channel::<Message>();

    let write_task = tokio::spawn(async move {
        while let Some(message) = writer_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Personal channel: anything pushed here is serialized to this socket.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let personal_writer = writer.clone();
    let personal_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            forward(&personal_writer, &msg);
        }
    });

    let mut session = Session {
        player: None,
        outbound: outbound_tx,
        table_task: None,
    };

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<Inbound>(&text) {
                Ok(inbound) => handle_inbound(inbound, &state, &mut session).await,
                Err(err) => warn!(?err, "invalid inbound message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Dropped socket: hold the seat for the grace window.
    if let Some(player) = &session.player {
        state.coordinator.disconnect(player).await;
        state
            .coordinator
            .sessions()
            .unregister(player, &session.outbound);
    }
    if let Some(task) = session.table_task.take() {
        task.abort();
    }
    personal_task.abort();
    write_task.abort();
}

async fn handle_inbound(inbound: Inbound, state: &AppState, session: &mut Session) {
    match inbound {
        Inbound::JoinTable {
            request_id,
            player_id,
            table_id,
            game,
            balance,
            client_seed,
        } => {
            bind_player(state, session, &player_id);
            match state
                .coordinator
                .join_table(&player_id, &table_id, &game, balance, client_seed)
                .await
            {
                Ok((outcome, handle)) => {
                    subscribe_table(session, &player_id, &handle);
                    session.reply(Outbound::Ack { request_id });
                    session.reply(Outbound::TableState {
                        table_id,
                        snapshot: outcome.snapshot,
                    });
                }
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
        Inbound::LeaveTable {
            request_id,
            player_id,
        } => {
            bind_player(state, session, &player_id);
            match state.coordinator.leave_table(&player_id).await {
                Ok(()) => {
                    if let Some(task) = session.table_task.take() {
                        task.abort();
                    }
                    session.reply(Outbound::Ack { request_id });
                }
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
        Inbound::PlaceBet {
            request_id,
            player_id,
            amount,
        } => {
            bind_player(state, session, &player_id);
            match state.coordinator.place_bet(&player_id, amount).await {
                Ok(()) => session.reply(Outbound::Ack { request_id }),
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
        Inbound::PlayerAction {
            request_id,
            player_id,
            action,
            amount,
        } => {
            bind_player(state, session, &player_id);
            match state
                .coordinator
                .submit_action(&player_id, &action, amount)
                .await
            {
                Ok(()) => session.reply(Outbound::Ack { request_id }),
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
        Inbound::RequestTransfer {
            request_id,
            player_id,
            receiver_id,
            amount,
        } => {
            bind_player(state, session, &player_id);
            match state
                .coordinator
                .transfer(&player_id, &receiver_id, amount)
                .await
            {
                Ok(_) => session.reply(Outbound::Ack { request_id }),
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
        Inbound::ClaimDaily {
            request_id,
            player_id,
        } => {
            bind_player(state, session, &player_id);
            match state.coordinator.claim_daily(&player_id).await {
                Ok(_) => session.reply(Outbound::Ack { request_id }),
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
        Inbound::AddFriend {
            request_id,
            player_id,
            peer_id,
        } => {
            bind_player(state, session, &player_id);
            match state.coordinator.add_friend(&player_id, &peer_id) {
                Ok(_) => session.reply(Outbound::Ack { request_id }),
                Err(err) => session.reject(Some(request_id), &err),
            }
        }
    }
}

impl Session {
    fn reply(&self, msg: Outbound) {
        let _ = self.outbound.send(msg);
    }

    fn reject(&self, request_id: Option<String>, err: &CoordinatorError) {
        let (code, message) = error_code(err);
        self.reply(Outbound::Error {
            request_id,
            code: code.to_string(),
            message,
        });
    }
}

fn bind_player(state: &AppState, session: &mut Session, player_id: &str) {
    if session.player.as_deref() != Some(player_id) {
        session.player = Some(player_id.to_string());
        state
            .coordinator
            .sessions()
            .register(player_id, session.outbound.clone());
    }
}

/// Subscribe the session to a table's broadcast stream.
///
/// Personal events for this player pass through; the spectator `table_state`
/// copy is dropped because a seated player receives the personalized one.
fn subscribe_table(session: &mut Session, player: &str, handle: &TableHandle) {
    if let Some(previous) = session.table_task.take() {
        previous.abort();
    }
    let mut events = handle.events.subscribe();
    let me = player.to_string();
    let outbound = session.outbound.clone();
    session.table_task = Some(tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let deliver = match &event.target {
                        Some(target) => *target == me,
                        None => !matches!(event.msg, Outbound::TableState { .. }),
                    };
                    if deliver && outbound.send(event.msg).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(player = %me, skipped, "session lagged behind table broadcasts");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }));
}

fn forward(writer: &mpsc::UnboundedSender<Message>, msg: &Outbound) {
    match serde_json::to_string(msg) {
        Ok(text) => {
            let _ = writer.send(Message::Text(text));
        }
        Err(err) => warn!(?err, "failed to serialize outbound message"),
    }
}
