//! Process-wide room registry
//!
//! Owns the code→room and player→code indexes. Each room runs as its own
//! actor task; the spawn wrapper removes the registry entries once the
//! actor returns, so an emptied room disappears on its own.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::game::room::{RoomActor, RoomHandle};
use crate::game::RoomCommand;

/// Characters a room code is drawn from
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Length of a room code
pub const CODE_LENGTH: usize = 6;
/// Collision retries before code generation gives up
const MAX_CODE_ATTEMPTS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Exhausted the retry budget while generating a code. With a 36^6
    /// domain this only happens if something is badly wrong.
    #[error("could not allocate a room code")]
    CodeSpaceExhausted,
}

/// Code→room and player→code indexes for every open room. The indexes
/// are shared with each room's cleanup task, hence the inner `Arc`s.
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
    players: Arc<DashMap<Uuid, String>>,
    round_duration: f32,
}

impl RoomRegistry {
    pub fn new(round_duration: f32) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            players: Arc::new(DashMap::new()),
            round_duration,
        }
    }

    /// Draw a random code not currently in use
    pub fn generate_code(&self) -> Result<String, RegistryError> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code: String = (0..CODE_LENGTH)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
        }
        error!("room code generation exhausted its retry budget");
        Err(RegistryError::CodeSpaceExhausted)
    }

    /// Get or create the room for `code` and point the player at it. An
    /// absent or empty code creates a room under a fresh generated code.
    /// The caller subscribes to the returned handle and then stages its
    /// own `AddPlayer` command, so the roster reply is never missed.
    pub fn join(&self, player_id: Uuid, code: Option<String>) -> Result<RoomHandle, RegistryError> {
        let code = match code.map(|c| c.trim().to_ascii_uppercase()).filter(|c| !c.is_empty()) {
            Some(code) => code,
            None => self.generate_code()?,
        };

        let handle = self
            .rooms
            .entry(code.clone())
            .or_insert_with(|| self.spawn_room(code.clone()))
            .clone();

        self.players.insert(player_id, code);
        Ok(handle)
    }

    /// Forward a player's departure to their room and forget the mapping
    pub async fn leave(&self, player_id: Uuid) {
        let Some((_, code)) = self.players.remove(&player_id) else {
            return;
        };
        if let Some(handle) = self.room(&code) {
            // A closed channel means the actor already shut down
            let _ = handle.send(RoomCommand::RemovePlayer { player_id }).await;
        }
    }

    pub fn room(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|r| r.value().clone())
    }

    pub fn room_of(&self, player_id: Uuid) -> Option<RoomHandle> {
        let code = self.players.get(&player_id)?.clone();
        self.room(&code)
    }

    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_players(&self) -> usize {
        self.players.len()
    }

    fn spawn_room(&self, code: String) -> RoomHandle {
        let (actor, handle) = RoomActor::new(code.clone(), self.round_duration);

        let rooms = Arc::clone(&self.rooms);
        let players = Arc::clone(&self.players);
        tokio::spawn(async move {
            actor.run().await;
            rooms.remove(&code);
            players.retain(|_, c| *c != code);
            debug!(room = %code, "room removed from registry");
        });

        info!(room = %handle.code, "room opened");
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::game::{Outbound, Recipient};
    use crate::ws::protocol::ServerMsg;

    /// Virtual-time budget for a single expectation under paused time
    const WAIT: Duration = Duration::from_secs(600);

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::new(120.0))
    }

    /// Join a room and stage the player's roster entry, returning the
    /// subscription opened before the join so no reply is missed
    async fn join_room(
        reg: &Arc<RoomRegistry>,
        code: &str,
        player_id: Uuid,
        name: &str,
    ) -> (RoomHandle, broadcast::Receiver<Outbound>) {
        let handle = reg.join(player_id, Some(code.into())).unwrap();
        let events = handle.subscribe();
        handle
            .send(RoomCommand::AddPlayer { player_id, name: name.into() })
            .await
            .unwrap();
        (handle, events)
    }

    /// Receive broadcasts until one matches, panicking on a stuck room
    async fn recv_matching(
        rx: &mut broadcast::Receiver<Outbound>,
        pred: impl Fn(&ServerMsg) -> bool,
    ) -> ServerMsg {
        tokio::time::timeout(WAIT, async {
            loop {
                match rx.recv().await {
                    Ok(out) if pred(&out.msg) => return out.msg,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("room channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for a matching message")
    }

    #[test]
    fn codes_are_fixed_length_uppercase() {
        let reg = registry();
        for _ in 0..32 {
            let code = reg.generate_code().unwrap();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn join_without_code_creates_a_room() {
        let reg = registry();
        let player = Uuid::new_v4();

        let handle = reg.join(player, None).unwrap();
        assert_eq!(handle.code.len(), CODE_LENGTH);
        assert_eq!(reg.open_rooms(), 1);
        assert!(reg.room_of(player).is_some());
    }

    #[tokio::test]
    async fn join_with_same_code_shares_the_room() {
        let reg = registry();
        let a = reg.join(Uuid::new_v4(), Some("abc123".into())).unwrap();
        // Codes are case-insensitive on the way in
        let b = reg.join(Uuid::new_v4(), Some("ABC123".into())).unwrap();

        assert_eq!(a.code, "ABC123");
        assert_eq!(a.code, b.code);
        assert_eq!(reg.open_rooms(), 1);
        assert_eq!(reg.connected_players(), 2);
    }

    #[tokio::test]
    async fn generated_codes_are_unique_among_open_rooms() {
        let reg = registry();
        for _ in 0..50 {
            reg.join(Uuid::new_v4(), None).unwrap();
        }
        assert_eq!(reg.open_rooms(), 50);
    }

    #[tokio::test]
    async fn leave_forgets_the_player() {
        let reg = registry();
        let player = Uuid::new_v4();
        reg.join(player, Some("ROOM01".into())).unwrap();

        reg.leave(player).await;
        assert_eq!(reg.connected_players(), 0);
        assert!(reg.room_of(player).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_room_is_removed_from_the_registry() {
        let reg = registry();
        let player = Uuid::new_v4();
        let (_, mut rx) = join_room(&reg, "GONE01", player, "ada").await;

        recv_matching(&mut rx, |m| matches!(m, ServerMsg::RoomState { .. })).await;
        assert_eq!(reg.open_rooms(), 1);

        reg.leave(player).await;
        tokio::time::timeout(WAIT, async {
            while reg.open_rooms() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("room actor did not shut down");
    }

    #[tokio::test(start_paused = true)]
    async fn full_round_flow_ends_with_the_evader_winning() {
        let reg = Arc::new(RoomRegistry::new(3.0));
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        let (room, mut rx1) = join_room(&reg, "FLOW01", p1, "ada").await;
        let (_, mut rx2) = join_room(&reg, "FLOW01", p2, "bob").await;

        let state = recv_matching(&mut rx1, |m| {
            matches!(m, ServerMsg::RoomState { players, .. } if players.len() == 2)
        })
        .await;
        let ServerMsg::RoomState { players, host_id, .. } = state else { unreachable!() };
        assert_eq!(host_id, Some(p1));
        assert!(players[0].is_host);

        // Host starts: 3-2-1-0, then the round opens with the map
        room.send(RoomCommand::StartGame { player_id: p1 }).await.unwrap();
        for expected in [3, 2, 1, 0] {
            let msg = recv_matching(&mut rx2, |m| matches!(m, ServerMsg::Countdown { .. })).await;
            assert!(matches!(msg, ServerMsg::Countdown { seconds } if seconds == expected));
        }
        recv_matching(&mut rx2, |m| matches!(m, ServerMsg::GameStarted { .. })).await;

        // The first joiner opens as catcher
        let snap = recv_matching(&mut rx2, |m| matches!(m, ServerMsg::GameState { .. })).await;
        let ServerMsg::GameState { players, .. } = snap else { unreachable!() };
        assert_eq!(players.iter().find(|p| p.is_catcher).unwrap().id, p1);

        // Nobody moves; the clock runs out and the evader wins on survival time
        let end = recv_matching(&mut rx1, |m| matches!(m, ServerMsg::GameEnd { .. })).await;
        let ServerMsg::GameEnd { winner, scores } = end else { unreachable!() };
        assert_eq!(winner.id, p2);
        assert!(winner.score >= 2 && winner.score <= 3, "score {}", winner.score);
        assert_eq!(scores.iter().find(|s| s.id == p1).unwrap().score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_from_non_host_errors_only_the_requester() {
        let reg = registry();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        let (room, _rx1) = join_room(&reg, "HOST01", p1, "ada").await;
        let (_, mut rx2) = join_room(&reg, "HOST01", p2, "bob").await;

        room.send(RoomCommand::StartGame { player_id: p2 }).await.unwrap();

        let out = tokio::time::timeout(WAIT, async {
            loop {
                match rx2.recv().await {
                    Ok(out) if matches!(out.msg, ServerMsg::RoomError { .. }) => return out,
                    Ok(_) => {}
                    Err(e) => panic!("room channel failed: {e}"),
                }
            }
        })
        .await
        .expect("no error reply");
        assert_eq!(out.recipient, Recipient::Player(p2));
    }

    #[tokio::test(start_paused = true)]
    async fn mid_round_disconnect_force_ends_the_round() {
        let reg = registry();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        let (room, mut rx1) = join_room(&reg, "DROP01", p1, "ada").await;
        let (_, _rx2) = join_room(&reg, "DROP01", p2, "bob").await;

        room.send(RoomCommand::StartGame { player_id: p1 }).await.unwrap();
        recv_matching(&mut rx1, |m| matches!(m, ServerMsg::GameStarted { .. })).await;

        reg.leave(p2).await;

        // The force-end travels the normal end-of-round path
        recv_matching(&mut rx1, |m| matches!(m, ServerMsg::GameEnd { .. })).await;
        let state = recv_matching(&mut rx1, |m| matches!(m, ServerMsg::RoomState { .. })).await;
        let ServerMsg::RoomState { status, players, .. } = state else { unreachable!() };
        assert_eq!(status, crate::ws::protocol::RoomStatus::Ended);
        assert_eq!(players.len(), 1);
    }
}
