use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

use buzzline_core::net::messages::ServerMessage;
use buzzline_core::net::protocol::encode_server_message;
use buzzline_core::player::{Player, ScoredPlayer};
use buzzline_core::room::{self, Room};

/// Per-connection sender for outbound text frames.
/// Bounded to prevent memory exhaustion from slow clients. `Utf8Bytes`
/// clones cheaply when one broadcast fans out to many sockets.
pub type PlayerSender = mpsc::Sender<Utf8Bytes>;

/// Registry-assigned id for one WebSocket connection.
pub type ConnId = u64;

/// How many fixed-length draws to attempt before widening a room code.
const CODE_RETRY_BUDGET: usize = 32;

/// A connected socket receiving a room's broadcasts.
struct ConnectedClient {
    sender: PlayerSender,
}

struct RoomEntry {
    room: Room,
    connections: HashMap<ConnId, ConnectedClient>,
}

/// Outcome of a buzzer press attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum PressOutcome {
    /// The press won the race.
    Buzzed,
    /// The presser is locked; only they are told.
    Locked,
    /// Someone already holds the buzzer, or the room or presser is
    /// unknown. No feedback is sent.
    Ignored,
}

/// What a closing connection left behind.
#[derive(Debug, PartialEq, Eq)]
pub enum Departure {
    /// The room lost its last player and was deleted.
    RoomDeleted,
    /// A player left; survivors need a PLAYER_LEFT notification.
    PlayerLeft {
        players: Vec<Player>,
        new_host: String,
    },
    /// The connection was not attached to a live room.
    NotInRoom,
}

/// Owns every live room and the per-room connection index used for
/// broadcast fan-out. All mutation runs under the store's write lock, so
/// room operations appear atomic to the dispatcher and two concurrent
/// buzzer presses can never both observe an unclaimed buzzer.
pub struct RoomManager {
    rooms: HashMap<String, RoomEntry>,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Create a room hosted by `user_id` and register the creating
    /// connection for its broadcasts. Returns the new room snapshot.
    pub fn create_room(
        &mut self,
        conn_id: ConnId,
        sender: PlayerSender,
        user_id: &str,
        username: &str,
    ) -> Room {
        let code = self.generate_unique_code();
        let room = Room::new(code.clone(), user_id, username);
        let mut connections = HashMap::new();
        connections.insert(conn_id, ConnectedClient { sender });
        let snapshot = room.clone();
        self.rooms.insert(code, RoomEntry { room, connections });
        snapshot
    }

    /// Join an existing room. Appending the player is idempotent per user
    /// id; the connection always (re)registers for broadcasts. Returns the
    /// room snapshot, or None when the code is unknown.
    pub fn join_room(
        &mut self,
        room_code: &str,
        conn_id: ConnId,
        sender: PlayerSender,
        user_id: &str,
        username: &str,
    ) -> Option<Room> {
        let entry = self.rooms.get_mut(room_code)?;
        entry.room.add_player(user_id, username);
        entry.connections.insert(conn_id, ConnectedClient { sender });
        Some(entry.room.clone())
    }

    /// Drop a connection from a room's delivery set without touching the
    /// player list. Used when a connection moves to another room.
    pub fn detach_connection(&mut self, room_code: &str, conn_id: ConnId) {
        if let Some(entry) = self.rooms.get_mut(room_code) {
            entry.connections.remove(&conn_id);
        }
    }

    /// Resolve the buzzer race: the press wins only when the buzzer is
    /// unclaimed. Locked players never claim it, and neither does a user
    /// id that is not a player of the room.
    pub fn press_buzzer(&mut self, room_code: &str, user_id: &str) -> PressOutcome {
        let Some(entry) = self.rooms.get_mut(room_code) else {
            return PressOutcome::Ignored;
        };
        let Some(player) = entry.room.player(user_id) else {
            return PressOutcome::Ignored;
        };
        if player.locked {
            return PressOutcome::Locked;
        }
        if entry.room.active_buzzer.is_some() {
            return PressOutcome::Ignored;
        }
        entry.room.active_buzzer = Some(user_id.to_string());
        PressOutcome::Buzzed
    }

    /// Host-only: release the buzzer for the next round. Returns true when
    /// the requester is the host of a live room.
    pub fn reset_buzzer(&mut self, room_code: &str, requester_id: &str) -> bool {
        match self.rooms.get_mut(room_code) {
            Some(entry) if entry.room.host == requester_id => {
                entry.room.active_buzzer = None;
                true
            },
            _ => false,
        }
    }

    /// Host-only: set a player's lock flag. Returns true when the flag was
    /// applied (authorized requester and known target).
    pub fn set_player_lock(
        &mut self,
        room_code: &str,
        requester_id: &str,
        player_id: &str,
        lock: bool,
    ) -> bool {
        let Some(entry) = self.rooms.get_mut(room_code) else {
            return false;
        };
        if entry.room.host != requester_id {
            return false;
        }
        match entry.room.player_mut(player_id) {
            Some(player) => {
                player.locked = lock;
                true
            },
            None => false,
        }
    }

    /// Host-only: add `points` (possibly negative) to a player's score,
    /// initializing it at zero first. Returns the updated score table and
    /// the score-annotated player list for the POINTS_UPDATED broadcast.
    pub fn award_points(
        &mut self,
        room_code: &str,
        requester_id: &str,
        player_id: &str,
        points: i64,
    ) -> Option<(HashMap<String, i64>, Vec<ScoredPlayer>)> {
        let entry = self.rooms.get_mut(room_code)?;
        if entry.room.host != requester_id {
            return None;
        }
        *entry.room.scores.entry(player_id.to_string()).or_insert(0) += points;
        Some((entry.room.scores.clone(), entry.room.scored_players()))
    }

    /// Remove a closing connection and its player from `room_code`.
    /// Deletes the room when the last player leaves; otherwise migrates
    /// the host to the first remaining player (by join order) if needed.
    pub fn remove_connection(
        &mut self,
        room_code: &str,
        conn_id: ConnId,
        user_id: &str,
    ) -> Departure {
        let Some(entry) = self.rooms.get_mut(room_code) else {
            return Departure::NotInRoom;
        };

        entry.connections.remove(&conn_id);
        entry.room.remove_player(user_id);

        // A held buzzer must always name a current player; release it when
        // its holder leaves.
        if entry.room.active_buzzer.as_deref() == Some(user_id) {
            entry.room.active_buzzer = None;
        }

        if entry.room.players.is_empty() {
            self.rooms.remove(room_code);
            return Departure::RoomDeleted;
        }

        if entry.room.host == user_id
            && let Some(next) = entry.room.players.first()
        {
            entry.room.host = next.id.clone();
        }

        Departure::PlayerLeft {
            players: entry.room.players.clone(),
            new_host: entry.room.host.clone(),
        }
    }

    /// Deliver one message to every connection currently registered with
    /// `room_code`. Full or closed channels are skipped, never retried.
    pub fn broadcast_to_room(&self, room_code: &str, msg: &ServerMessage) {
        let Some(entry) = self.rooms.get(room_code) else {
            return;
        };
        let text = match encode_server_message(msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(room = room_code, error = %e, "Failed to encode broadcast");
                return;
            },
        };
        let frame = Utf8Bytes::from(text);
        for (&conn_id, client) in &entry.connections {
            if let Err(e) = client.sender.try_send(frame.clone()) {
                tracing::debug!(
                    conn_id, room = room_code, error = %e,
                    "Skipping broadcast to slow client"
                );
            }
        }
    }

    /// Room and player totals for the health endpoint.
    pub fn stats(&self) -> (usize, usize) {
        let players = self.rooms.values().map(|e| e.room.players.len()).sum();
        (self.rooms.len(), players)
    }

    /// Draw a fresh code, retrying against live rooms and widening after
    /// the attempt budget so an existing room is never overwritten.
    fn generate_unique_code(&self) -> String {
        for _ in 0..CODE_RETRY_BUDGET {
            let code = room::generate_room_code();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
        let mut len = room::ROOM_CODE_LEN + 1;
        loop {
            let code = room::code_of_len(len);
            if !self.rooms.contains_key(&code) {
                return code;
            }
            len += 1;
        }
    }

    #[cfg(test)]
    pub fn room(&self, room_code: &str) -> Option<&Room> {
        self.rooms.get(room_code).map(|e| &e.room)
    }

    #[cfg(test)]
    pub fn room_exists(&self, room_code: &str) -> bool {
        self.rooms.contains_key(room_code)
    }
}
