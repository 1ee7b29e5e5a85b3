//! Wire messages for the real-time channel.
//!
//! Inbound messages carry a `requestId` that is echoed on the matching `ack`
//! or `error`; everything else is pushed by the server. The sync model is
//! latest-state: `table_state` always carries a full snapshot, never a diff.

use serde::{Deserialize, Serialize};

/// Messages a client sends over the real-time channel.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    #[serde(rename = "join_table")]
    JoinTable {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "tableId")]
        table_id: String,
        game: String,
        /// Starting balance supplied by the auth layer on first contact.
        balance: Option<u64>,
        #[serde(rename = "clientSeed")]
        client_seed: Option<String>,
    },
    #[serde(rename = "leave_table")]
    LeaveTable {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    #[serde(rename = "place_bet")]
    PlaceBet {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
        amount: u64,
    },
    #[serde(rename = "player_action")]
    PlayerAction {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
        action: String,
        /// Action-specific amount (insurance only).
        amount: Option<u64>,
    },
    #[serde(rename = "request_transfer")]
    RequestTransfer {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "receiverId")]
        receiver_id: String,
        amount: u64,
    },
    #[serde(rename = "claim_daily")]
    ClaimDaily {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    #[serde(rename = "add_friend")]
    AddFriend {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "peerId")]
        peer_id: String,
    },
}

/// Messages the server pushes to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "ack")]
    Ack {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: String,
        message: String,
    },
    #[serde(rename = "table_state")]
    TableState {
        #[serde(rename = "tableId")]
        table_id: String,
        snapshot: TableSnapshot,
    },
    #[serde(rename = "balance_updated")]
    BalanceUpdated {
        balance: u64,
        amount: i64,
        reason: String,
    },
    #[serde(rename = "transfer_notification")]
    TransferNotification {
        from: String,
        to: String,
        amount: u64,
    },
    #[serde(rename = "shuffle_proof")]
    ShuffleProof {
        #[serde(rename = "tableId")]
        table_id: String,
        #[serde(rename = "serverSeedHash")]
        server_seed_hash: String,
        #[serde(rename = "serverSeed")]
        server_seed: String,
        #[serde(rename = "clientSeed")]
        client_seed: String,
        nonce: u64,
    },
}

/// Full table snapshot: the latest-state sync payload and the ephemeral
/// crash-recovery blob. Hidden cards render as `"??"`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_id: String,
    pub game: String,
    pub round_id: u64,
    pub phase: String,
    /// Hex hash committing to the server seed of the shoe in play.
    pub commitment: String,
    pub shoe_remaining: u32,
    pub seats: Vec<SeatView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dealer_cards: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub community_cards: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub war_depth: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_seat: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub your_actions: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat: u8,
    pub player_id: String,
    pub bet: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hands: Vec<HandView>,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandView {
    pub cards: Vec<String>,
    pub bet: u64,
    pub status: String,
}
