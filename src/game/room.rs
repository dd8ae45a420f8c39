//! Room lifecycle and the per-room actor task
//!
//! `Session` is the synchronous lobby-and-round state machine; `RoomActor`
//! wraps one `Session` in a tokio task that drains commands and broadcasts
//! events at the tick rate.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::map::MapGenerator;
use crate::game::simulation::{Simulation, TICK_RATE};
use crate::game::{Outbound, RoomCommand};
use crate::ws::protocol::{RoomStatus, RosterEntry, ServerMsg};

/// Minimum roster size to start a round
pub const MIN_PLAYERS: usize = 2;
/// Seconds counted down before a round begins
pub const COUNTDOWN_START: u32 = 3;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("only the host can start the game")]
    NotHost,

    #[error("at least 2 players are needed to start")]
    NotEnoughPlayers,

    #[error("the game has already started")]
    AlreadyStarted,
}

struct CountdownTimer {
    seconds_left: u32,
    next_at: Instant,
}

/// One room: roster, host, countdown and the running round
pub struct Session {
    code: String,
    players: Vec<RosterEntry>,
    host_id: Option<Uuid>,
    status: RoomStatus,
    countdown: Option<CountdownTimer>,
    simulation: Option<Simulation>,
    round_duration: f32,
}

impl Session {
    pub fn new(code: String, round_duration: f32) -> Self {
        Self {
            code,
            players: Vec::new(),
            host_id: None,
            status: RoomStatus::Waiting,
            countdown: None,
            simulation: None,
            round_duration,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Apply one command, producing the outbound traffic it caused
    pub fn apply(&mut self, cmd: RoomCommand, now: Instant) -> Vec<Outbound> {
        match cmd {
            RoomCommand::AddPlayer { player_id, name } => match self.add_player(player_id, name) {
                Ok(()) => vec![Outbound::all(self.room_state())],
                Err(e) => vec![Outbound::to(
                    player_id,
                    ServerMsg::RoomError { message: e.to_string() },
                )],
            },
            RoomCommand::RemovePlayer { player_id } => self
                .remove_player(player_id, now)
                .into_iter()
                .map(Outbound::all)
                .collect(),
            RoomCommand::StartGame { player_id } => match self.start_countdown(player_id, now) {
                Ok(seconds) => vec![Outbound::all(ServerMsg::Countdown { seconds })],
                Err(e) => vec![Outbound::to(
                    player_id,
                    ServerMsg::RoomError { message: e.to_string() },
                )],
            },
            RoomCommand::Input { player_id, direction } => {
                if let Some(sim) = &mut self.simulation {
                    sim.handle_input(player_id, direction);
                }
                Vec::new()
            }
            RoomCommand::UseAbility { player_id, ability } => {
                if let Some(sim) = &mut self.simulation {
                    sim.use_ability(player_id, ability, now);
                }
                Vec::new()
            }
        }
    }

    /// Add a player to the roster. Joining twice is a no-op; joining a live
    /// round is rejected. The first player becomes the host.
    pub fn add_player(&mut self, player_id: Uuid, name: String) -> Result<(), SessionError> {
        if self.players.iter().any(|p| p.id == player_id) {
            return Ok(());
        }
        if self.status != RoomStatus::Waiting {
            return Err(SessionError::AlreadyStarted);
        }

        let is_host = self.players.is_empty();
        self.players.push(RosterEntry { id: player_id, name, is_host });
        if is_host {
            self.host_id = Some(player_id);
        }
        Ok(())
    }

    /// Remove a player, migrating the host role and force-ending a round
    /// that drops below the minimum roster
    pub fn remove_player(&mut self, player_id: Uuid, now: Instant) -> Vec<ServerMsg> {
        let before = self.players.len();
        self.players.retain(|p| p.id != player_id);
        if self.players.len() == before {
            return Vec::new();
        }

        if self.host_id == Some(player_id) {
            self.host_id = self.players.first().map(|p| p.id);
            for (i, p) in self.players.iter_mut().enumerate() {
                p.is_host = i == 0;
            }
        }

        let mut msgs = Vec::new();
        if let Some(mut sim) = self.simulation.take() {
            sim.remove_player(player_id, now);
            if self.players.len() < MIN_PLAYERS {
                info!(room = %self.code, "roster below minimum, ending round");
                msgs.extend(sim.finalize());
                self.status = RoomStatus::Ended;
            } else {
                self.simulation = Some(sim);
            }
        }

        if self.players.len() < MIN_PLAYERS {
            self.countdown = None;
        }

        msgs.push(self.room_state());
        msgs
    }

    /// Begin the pre-round countdown; returns the first number to announce
    pub fn start_countdown(&mut self, requester: Uuid, now: Instant) -> Result<u32, SessionError> {
        if self.status != RoomStatus::Waiting || self.countdown.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        if self.host_id != Some(requester) {
            return Err(SessionError::NotHost);
        }
        if self.players.len() < MIN_PLAYERS {
            return Err(SessionError::NotEnoughPlayers);
        }

        self.countdown = Some(CountdownTimer {
            seconds_left: COUNTDOWN_START,
            next_at: now + Duration::from_secs(1),
        });
        Ok(COUNTDOWN_START)
    }

    /// Advance the room clock: tick the countdown, then the round
    pub fn advance(&mut self, now: Instant) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();

        let mut start_round = false;
        if let Some(cd) = &mut self.countdown {
            while cd.next_at <= now {
                cd.next_at += Duration::from_secs(1);
                cd.seconds_left -= 1;
                msgs.push(ServerMsg::Countdown { seconds: cd.seconds_left });
                if cd.seconds_left == 0 {
                    start_round = true;
                    break;
                }
            }
        }
        if start_round {
            self.countdown = None;
            msgs.push(self.begin_round(now));
        }

        if self.status == RoomStatus::Playing {
            if let Some(mut sim) = self.simulation.take() {
                msgs.extend(sim.step(now));
                if sim.is_finished() {
                    self.status = RoomStatus::Ended;
                    msgs.push(self.room_state());
                } else {
                    self.simulation = Some(sim);
                }
            }
        }

        msgs
    }

    fn begin_round(&mut self, now: Instant) -> ServerMsg {
        let seed = rand::random::<u64>();
        let map = MapGenerator::generate(seed);
        self.simulation = Some(Simulation::new(
            &self.players,
            map.clone(),
            self.round_duration,
            now,
        ));
        self.status = RoomStatus::Playing;
        info!(room = %self.code, seed, players = self.players.len(), "game started");
        ServerMsg::GameStarted { map }
    }

    pub fn room_state(&self) -> ServerMsg {
        ServerMsg::RoomState {
            code: self.code.clone(),
            players: self.players.clone(),
            status: self.status,
            host_id: self.host_id,
        }
    }
}

/// Cheaply cloneable handle to a running room actor
#[derive(Clone)]
pub struct RoomHandle {
    pub code: String,
    commands: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<Outbound>,
}

impl RoomHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events.subscribe()
    }

    pub async fn send(
        &self,
        cmd: RoomCommand,
    ) -> Result<(), mpsc::error::SendError<RoomCommand>> {
        self.commands.send(cmd).await
    }
}

/// Task that owns a `Session` and drives it at the tick rate
pub struct RoomActor {
    session: Session,
    commands: mpsc::Receiver<RoomCommand>,
    events: broadcast::Sender<Outbound>,
}

impl RoomActor {
    pub fn new(code: String, round_duration: f32) -> (Self, RoomHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let handle = RoomHandle {
            code: code.clone(),
            commands: cmd_tx,
            events: event_tx.clone(),
        };
        let actor = Self {
            session: Session::new(code, round_duration),
            commands: cmd_rx,
            events: event_tx,
        };
        (actor, handle)
    }

    /// Run until the room has been joined at least once and is empty again
    pub async fn run(mut self) {
        let mut ticker = interval(Duration::from_micros(1_000_000 / u64::from(TICK_RATE)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ever_joined = false;
        loop {
            ticker.tick().await;
            let now = Instant::now();

            while let Ok(cmd) = self.commands.try_recv() {
                ever_joined |= matches!(cmd, RoomCommand::AddPlayer { .. });
                for out in self.session.apply(cmd, now) {
                    // send only fails with no subscribers, which is fine
                    let _ = self.events.send(out);
                }
            }

            for msg in self.session.advance(now) {
                let _ = self.events.send(Outbound::all(msg));
            }

            if ever_joined && self.session.is_empty() {
                debug!(room = %self.session.code(), "room empty, shutting down");
                break;
            }
        }
    }
}
