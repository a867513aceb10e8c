use serde::{Deserialize, Serialize};

/// A participant in a buzzer room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub username: String,
    /// Host-imposed buzzer lock. Absent on the wire means unlocked.
    #[serde(default)]
    pub locked: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            locked: false,
        }
    }
}

/// A player entry annotated with its running score, as broadcast in
/// `POINTS_UPDATED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredPlayer {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub locked: bool,
    pub score: i64,
}
