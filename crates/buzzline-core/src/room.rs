use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::{Player, ScoredPlayer};

/// Length of a freshly generated room code.
pub const ROOM_CODE_LEN: usize = 6;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A named, ephemeral group of players sharing buzzer and score state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: String,
    /// User id of the privileged player. Always a member of `players`
    /// while `players` is non-empty.
    pub host: String,
    pub players: Vec<Player>,
    pub scores: HashMap<String, i64>,
    /// Player id currently holding the buzzer, or null between rounds.
    pub active_buzzer: Option<String>,
}

impl Room {
    /// Create a room with `host_id` as its only player and host.
    pub fn new(code: String, host_id: impl Into<String>, username: impl Into<String>) -> Self {
        let host_id = host_id.into();
        Self {
            code,
            host: host_id.clone(),
            players: vec![Player::new(host_id, username)],
            scores: HashMap::new(),
            active_buzzer: None,
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Append a player unless one with the same id is already present.
    /// Returns true when the list changed.
    pub fn add_player(&mut self, id: &str, username: &str) -> bool {
        if self.player(id).is_some() {
            return false;
        }
        self.players.push(Player::new(id, username));
        true
    }

    /// Remove the player with `id`. Returns true when an entry was removed.
    pub fn remove_player(&mut self, id: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        self.players.len() != before
    }

    /// The player list annotated with current scores; a missing score
    /// reads as zero.
    pub fn scored_players(&self) -> Vec<ScoredPlayer> {
        self.players
            .iter()
            .map(|p| ScoredPlayer {
                id: p.id.clone(),
                username: p.username.clone(),
                locked: p.locked,
                score: self.scores.get(&p.id).copied().unwrap_or(0),
            })
            .collect()
    }
}

/// Generate a room code: `ROOM_CODE_LEN` uppercase alphanumerics.
pub fn generate_room_code() -> String {
    code_of_len(ROOM_CODE_LEN)
}

/// Generate a code of arbitrary length. Used when the collision retry
/// budget runs out and the code must widen.
pub fn code_of_len(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Check the shape of a room code: at least `ROOM_CODE_LEN` characters,
/// all uppercase alphanumeric.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() >= ROOM_CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
