pub mod net;
pub mod player;
pub mod room;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::player::Player;
    use crate::room::Room;

    /// Create `n` test players with ids `p1`..`pN` named `Player1`..`PlayerN`.
    pub fn make_players(n: usize) -> Vec<Player> {
        (1..=n)
            .map(|i| Player::new(format!("p{i}"), format!("Player{i}")))
            .collect()
    }

    /// Create a room under `code` with `n` players; the first player hosts.
    pub fn make_room(code: &str, n: usize) -> Room {
        let mut room = Room::new(code.to_string(), "p1", "Player1");
        for player in make_players(n).into_iter().skip(1) {
            room.add_player(&player.id, &player.username);
        }
        room
    }
}
