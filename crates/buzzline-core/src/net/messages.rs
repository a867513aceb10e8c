use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::player::{Player, ScoredPlayer};
use crate::room::Room;

/// Inbound events, validated once at the boundary. Frames whose `type`
/// tag is not listed here fail to decode and are dropped by the
/// dispatcher without a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    CreateRoom { user_id: String, username: String },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        user_id: String,
        username: String,
        room_code: String,
    },
    #[serde(rename_all = "camelCase")]
    PressBuzzer {
        user_id: String,
        username: String,
        room_code: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    ResetBuzzer { room_code: String },
    #[serde(rename_all = "camelCase")]
    LockPlayerBuzzer {
        room_code: String,
        player_id: String,
        lock: bool,
    },
    #[serde(rename_all = "camelCase")]
    AwardPoints {
        room_code: String,
        player_id: String,
        points: i64,
    },
    /// Departure is handled by socket closure; the explicit event exists
    /// on the wire but carries no work.
    LeaveRoom {},
}

/// Outbound frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    RoomCreated {
        room: Room,
    },
    RoomJoined {
        room: Room,
    },
    PlayerJoined {
        players: Vec<Player>,
    },
    /// Caller-only rejection of a press by a locked player.
    BuzzerLocked {
        locked: bool,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    BuzzerPressed {
        player_id: String,
        username: String,
        timestamp: i64,
    },
    BuzzerReset {},
    #[serde(rename_all = "camelCase")]
    PlayerBuzzerLocked {
        player_id: String,
        locked: bool,
    },
    PointsUpdated {
        scores: HashMap<String, i64>,
        players: Vec<ScoredPlayer>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        players: Vec<Player>,
        new_host: String,
    },
    Error {
        message: String,
    },
}
