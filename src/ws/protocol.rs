//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Abilities a player can trigger mid-round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    /// Short speed burst (evaders only)
    Dash,
    /// Stun the catcher when in range (evaders only)
    Stun,
    /// Drop a trap at the current position (evaders only)
    Trap,
}

/// Lifecycle phase of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Ended,
}

/// Normalized movement intent from the client
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Direction {
    pub x: f32,
    pub y: f32,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join an existing room by code, or create a new one when the code is
    /// absent or empty
    JoinRoom {
        player_name: String,
        #[serde(default)]
        room_code: Option<String>,
    },

    /// Leave the current room
    LeaveRoom,

    /// Host requests the pre-round countdown to begin
    StartGame,

    /// Movement intent for the current tick
    PlayerInput {
        direction: Direction,
    },

    /// Trigger an ability
    UseAbility {
        ability: AbilityKind,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: Uuid,
        server_time: u64,
    },

    /// Current roster and lifecycle phase of the room
    RoomState {
        code: String,
        players: Vec<RosterEntry>,
        status: RoomStatus,
        host_id: Option<Uuid>,
    },

    /// Request-level failure, delivered only to the offending player
    RoomError {
        message: String,
    },

    /// Round begins; carries the generated map
    GameStarted {
        map: MapData,
    },

    /// Authoritative state snapshot (sent every tick)
    GameState {
        players: Vec<PlayerSnapshot>,
        traps: Vec<TrapSnapshot>,
        time_remaining: f32,
        round_number: u32,
        status: RoomStatus,
    },

    /// A tag landed
    PlayerCaught {
        catcher_id: Uuid,
        caught_id: Uuid,
    },

    /// Pre-round countdown tick
    Countdown {
        seconds: u32,
    },

    /// Round is over; final table plus who would catch next
    RoundEnd {
        scores: Vec<PlayerScore>,
        new_catcher_id: Uuid,
    },

    /// Game is over
    GameEnd {
        winner: PlayerScore,
        scores: Vec<PlayerScore>,
    },
}

/// Roster line for lobby display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub name: String,
    pub is_host: bool,
}

/// Final-table line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerScore {
    pub id: Uuid,
    pub name: String,
    /// Whole seconds survived as an evader
    pub score: u32,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub name: String,
    /// Position X
    pub x: f32,
    /// Position Y
    pub y: f32,
    /// Current velocity X
    pub velocity_x: f32,
    /// Current velocity Y
    pub velocity_y: f32,
    /// Is this player the catcher
    pub is_catcher: bool,
    /// Accumulated evasion time in seconds
    pub score: f32,
    /// Dash cooldown remaining (0 = ready)
    pub dash_cooldown: f32,
    /// Stun cooldown remaining (0 = ready)
    pub stun_cooldown: f32,
    /// Trap cooldown remaining (0 = ready)
    pub trap_cooldown: f32,
    pub stunned: bool,
    /// Stun time remaining (0 when not stunned)
    pub stun_remaining: f32,
    pub dashing: bool,
}

/// Trap state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapSnapshot {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub placed_by: Uuid,
    pub active: bool,
    pub radius: f32,
}

/// Axis-aligned wall rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Round-start position for a player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
}

/// Generated arena layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub width: f32,
    pub height: f32,
    pub walls: Vec<Wall>,
    pub spawn_points: Vec<SpawnPoint>,
    /// Seed the layout was generated from
    pub seed: u64,
}
