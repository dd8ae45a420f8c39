//! Authoritative round simulation
//!
//! Owns all mutable round state and advances it one tick at a time. The
//! struct is fully synchronous; the room actor drives it with real
//! instants so tests can drive it with fabricated ones.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::physics::Physics;
use crate::ws::protocol::{
    AbilityKind, Direction, MapData, PlayerScore, PlayerSnapshot, RoomStatus, RosterEntry,
    ServerMsg, TrapSnapshot,
};

/// Simulation ticks per second
pub const TICK_RATE: u32 = 60;

/// Player hitbox radius
pub const PLAYER_RADIUS: f32 = 15.0;
/// Base movement speed in units per second
pub const PLAYER_SPEED: f32 = 200.0;

/// Speed multiplier while dashing
pub const DASH_MULTIPLIER: f32 = 3.0;
/// How long a dash lasts
pub const DASH_DURATION: Duration = Duration::from_millis(200);
/// Time between dashes
pub const DASH_COOLDOWN: Duration = Duration::from_secs(5);

/// How long a stun ability freezes the catcher
pub const STUN_DURATION: Duration = Duration::from_secs(1);
/// Maximum distance at which the stun ability connects
pub const STUN_RANGE: f32 = 60.0;
/// Time between stun attempts
pub const STUN_COOLDOWN: Duration = Duration::from_secs(10);

/// How long a triggered trap freezes the catcher
pub const TRAP_STUN_DURATION: Duration = Duration::from_millis(1500);
/// Trap trigger radius
pub const TRAP_RADIUS: f32 = 25.0;
/// Time between trap placements
pub const TRAP_COOLDOWN: Duration = Duration::from_secs(15);

/// Maximum distance at which a tag lands
pub const CATCH_DISTANCE: f32 = 30.0;
/// Grace period after being tagged during which a player cannot be re-tagged
pub const CATCH_IMMUNITY: Duration = Duration::from_secs(2);

/// Active trap count at which a room starts logging
const TRAP_GROWTH_WARN: usize = 64;

/// Per-player ability readiness, stored as ready-at instants
#[derive(Debug, Clone, Copy)]
struct Cooldowns {
    dash: Instant,
    stun: Instant,
    trap: Instant,
}

impl Cooldowns {
    /// All abilities immediately available
    fn ready(now: Instant) -> Self {
        Self { dash: now, stun: now, trap: now }
    }
}

/// Live state of one player inside a round
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: Uuid,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub is_catcher: bool,
    /// Accumulated evasion time in seconds
    pub score: f32,
    cooldowns: Cooldowns,
    stunned_until: Option<Instant>,
    dash_until: Option<Instant>,
}

impl PlayerState {
    fn is_stunned(&self, now: Instant) -> bool {
        self.stunned_until.map_or(false, |t| t > now)
    }

    fn is_dashing(&self, now: Instant) -> bool {
        self.dash_until.map_or(false, |t| t > now)
    }
}

/// A placed trap waiting for the catcher
#[derive(Debug, Clone)]
struct Trap {
    id: Uuid,
    x: f32,
    y: f32,
    placed_by: Uuid,
    radius: f32,
}

/// One round of the chase game
pub struct Simulation {
    map: MapData,
    /// Join order; the entry at index 0 starts as the catcher
    players: Vec<PlayerState>,
    traps: Vec<Trap>,
    /// Latest movement intent per player, persistent across ticks
    inputs: HashMap<Uuid, Direction>,
    /// Players that cannot be tagged until the stored instant
    catch_immunity: HashMap<Uuid, Instant>,
    time_remaining: f32,
    round_number: u32,
    last_tick: Instant,
    finished: bool,
}

impl Simulation {
    /// Start a round with the given roster; the first roster entry is the
    /// initial catcher and players spawn on the map's spawn points in order
    pub fn new(roster: &[RosterEntry], map: MapData, round_duration: f32, now: Instant) -> Self {
        let players = roster
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let spawn = map.spawn_points[i % map.spawn_points.len()];
                PlayerState {
                    id: entry.id,
                    name: entry.name.clone(),
                    x: spawn.x,
                    y: spawn.y,
                    velocity_x: 0.0,
                    velocity_y: 0.0,
                    is_catcher: i == 0,
                    score: 0.0,
                    cooldowns: Cooldowns::ready(now),
                    stunned_until: None,
                    dash_until: None,
                }
            })
            .collect();

        info!(players = roster.len(), round_duration, "round started");

        Self {
            map,
            players,
            traps: Vec::new(),
            inputs: HashMap::new(),
            catch_immunity: HashMap::new(),
            time_remaining: round_duration,
            round_number: 1,
            last_tick: now,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    /// Record the latest movement intent for a player; the last write before
    /// a tick wins and the intent persists until replaced
    pub fn handle_input(&mut self, player_id: Uuid, direction: Direction) {
        if self.players.iter().any(|p| p.id == player_id) {
            self.inputs.insert(player_id, direction);
        }
    }

    /// Attempt an ability. Requests from the catcher, from stunned players,
    /// and during cooldown are dropped without effect.
    pub fn use_ability(&mut self, player_id: Uuid, ability: AbilityKind, now: Instant) {
        let Some(idx) = self.players.iter().position(|p| p.id == player_id) else {
            return;
        };
        if self.players[idx].is_catcher || self.players[idx].is_stunned(now) {
            return;
        }

        match ability {
            AbilityKind::Dash => {
                if self.players[idx].cooldowns.dash > now {
                    return;
                }
                self.players[idx].dash_until = Some(now + DASH_DURATION);
                self.players[idx].cooldowns.dash = now + DASH_COOLDOWN;
            }
            AbilityKind::Stun => {
                if self.players[idx].cooldowns.stun > now {
                    return;
                }
                // The attempt consumes the cooldown whether or not it lands
                self.players[idx].cooldowns.stun = now + STUN_COOLDOWN;

                let (px, py) = (self.players[idx].x, self.players[idx].y);
                if let Some(catcher) = self.players.iter_mut().find(|p| p.is_catcher) {
                    if Physics::distance(px, py, catcher.x, catcher.y) <= STUN_RANGE {
                        catcher.stunned_until = Some(now + STUN_DURATION);
                    }
                }
            }
            AbilityKind::Trap => {
                if self.players[idx].cooldowns.trap > now {
                    return;
                }
                self.players[idx].cooldowns.trap = now + TRAP_COOLDOWN;
                let trap = Trap {
                    id: Uuid::new_v4(),
                    x: self.players[idx].x,
                    y: self.players[idx].y,
                    placed_by: player_id,
                    radius: TRAP_RADIUS,
                };
                self.traps.push(trap);
                if self.traps.len() >= TRAP_GROWTH_WARN {
                    warn!(traps = self.traps.len(), "trap count growing unbounded");
                }
            }
        }
    }

    /// Remove a player mid-round. If the catcher leaves, the earliest-joined
    /// survivor takes the role with fresh cooldowns.
    pub fn remove_player(&mut self, player_id: Uuid, now: Instant) {
        let Some(idx) = self.players.iter().position(|p| p.id == player_id) else {
            return;
        };
        let was_catcher = self.players[idx].is_catcher;
        self.players.remove(idx);
        self.inputs.remove(&player_id);
        self.catch_immunity.remove(&player_id);

        if was_catcher {
            if let Some(successor) = self.players.first_mut() {
                successor.is_catcher = true;
                successor.cooldowns = Cooldowns::ready(now);
                info!(player = %successor.id, "catcher left, role reassigned");
            }
        }
    }

    /// Advance the round to `now`, returning the events and snapshot for
    /// this tick
    pub fn step(&mut self, now: Instant) -> Vec<ServerMsg> {
        if self.finished {
            return Vec::new();
        }

        let delta = now.saturating_duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        self.time_remaining -= delta;
        if self.time_remaining <= 0.0 {
            return self.finalize();
        }

        self.decay_status(now);
        self.advance_movement(delta, now);
        self.accrue_scores(delta);
        self.resolve_traps(now);

        let mut events = Vec::new();
        if let Some(caught) = self.resolve_tag(now) {
            events.push(caught);
        }
        events.push(self.snapshot(now));
        events
    }

    /// End the round immediately and produce the final table
    pub fn finalize(&mut self) -> Vec<ServerMsg> {
        self.finished = true;

        if self.players.is_empty() {
            return Vec::new();
        }

        // Stable sort keeps join order for equal scores
        let mut scores: Vec<PlayerScore> = self
            .players
            .iter()
            .map(|p| PlayerScore { id: p.id, name: p.name.clone(), score: p.score as u32 })
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));

        let winner = scores[0].clone();
        info!(winner = %winner.id, score = winner.score, "round finished");

        vec![
            ServerMsg::RoundEnd { scores: scores.clone(), new_catcher_id: winner.id },
            ServerMsg::GameEnd { winner, scores },
        ]
    }

    /// Clear stun and dash markers that have expired
    fn decay_status(&mut self, now: Instant) {
        for player in &mut self.players {
            if player.stunned_until.map_or(false, |t| t <= now) {
                player.stunned_until = None;
            }
            if player.dash_until.map_or(false, |t| t <= now) {
                player.dash_until = None;
            }
        }
        self.catch_immunity.retain(|_, until| *until > now);
    }

    /// Apply stored intents, resolving each axis against the walls
    /// independently so players slide along surfaces
    fn advance_movement(&mut self, delta: f32, now: Instant) {
        for player in &mut self.players {
            if player.is_stunned(now) {
                player.velocity_x = 0.0;
                player.velocity_y = 0.0;
                continue;
            }

            let intent = self.inputs.get(&player.id).copied().unwrap_or_default();
            let (dx, dy) = Physics::normalize(intent.x, intent.y);
            let speed = if player.is_dashing(now) {
                PLAYER_SPEED * DASH_MULTIPLIER
            } else {
                PLAYER_SPEED
            };
            player.velocity_x = dx * speed;
            player.velocity_y = dy * speed;

            let next_x = player.x + player.velocity_x * delta;
            if !Physics::hits_any_wall(next_x, player.y, PLAYER_RADIUS, &self.map.walls) {
                player.x = next_x;
            }
            let next_y = player.y + player.velocity_y * delta;
            if !Physics::hits_any_wall(player.x, next_y, PLAYER_RADIUS, &self.map.walls) {
                player.y = next_y;
            }
        }
    }

    /// Evaders earn survival time; the catcher earns nothing
    fn accrue_scores(&mut self, delta: f32) {
        for player in &mut self.players {
            if !player.is_catcher {
                player.score += delta;
            }
        }
    }

    /// Trigger every trap overlapping the catcher; triggered traps are
    /// consumed
    fn resolve_traps(&mut self, now: Instant) {
        let Some(catcher) = self.players.iter().position(|p| p.is_catcher) else {
            return;
        };
        let (cx, cy) = (self.players[catcher].x, self.players[catcher].y);

        let mut triggered = false;
        self.traps.retain(|trap| {
            let hit = Physics::distance(trap.x, trap.y, cx, cy) <= trap.radius + PLAYER_RADIUS;
            triggered |= hit;
            !hit
        });

        if triggered {
            self.players[catcher].stunned_until = Some(now + TRAP_STUN_DURATION);
        }
    }

    /// Swap roles when the catcher reaches an evader. At most one tag lands
    /// per tick; immune and just-tagged players are skipped, and candidates
    /// are considered in join order.
    fn resolve_tag(&mut self, now: Instant) -> Option<ServerMsg> {
        let catcher = self.players.iter().position(|p| p.is_catcher)?;
        if self.players[catcher].is_stunned(now) {
            return None;
        }
        let (cx, cy) = (self.players[catcher].x, self.players[catcher].y);

        let caught = self.players.iter().position(|p| {
            !p.is_catcher
                && !self.catch_immunity.get(&p.id).map_or(false, |t| *t > now)
                && Physics::distance(cx, cy, p.x, p.y) <= CATCH_DISTANCE
        })?;

        let catcher_id = self.players[catcher].id;
        let caught_id = self.players[caught].id;

        self.players[catcher].is_catcher = false;
        self.catch_immunity.insert(catcher_id, now + CATCH_IMMUNITY);

        self.players[caught].is_catcher = true;
        self.players[caught].cooldowns = Cooldowns::ready(now);

        info!(catcher = %catcher_id, caught = %caught_id, "tag landed");
        Some(ServerMsg::PlayerCaught { catcher_id, caught_id })
    }

    fn snapshot(&self, now: Instant) -> ServerMsg {
        let remaining = |ready_at: Instant| ready_at.saturating_duration_since(now).as_secs_f32();

        let players = self
            .players
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.name.clone(),
                x: p.x,
                y: p.y,
                velocity_x: p.velocity_x,
                velocity_y: p.velocity_y,
                is_catcher: p.is_catcher,
                score: p.score,
                dash_cooldown: remaining(p.cooldowns.dash),
                stun_cooldown: remaining(p.cooldowns.stun),
                trap_cooldown: remaining(p.cooldowns.trap),
                stunned: p.is_stunned(now),
                stun_remaining: p.stunned_until.map_or(0.0, |t| remaining(t)),
                dashing: p.is_dashing(now),
            })
            .collect();

        let traps = self
            .traps
            .iter()
            .map(|t| TrapSnapshot {
                id: t.id,
                x: t.x,
                y: t.y,
                placed_by: t.placed_by,
                active: true,
                radius: t.radius,
            })
            .collect();

        ServerMsg::GameState {
            players,
            traps,
            time_remaining: self.time_remaining.max(0.0),
            round_number: self.round_number,
            status: RoomStatus::Playing,
        }
    }
}
