//! Game simulation modules

pub mod map;
pub mod physics;
pub mod registry;
pub mod room;
pub mod simulation;

pub use registry::{RegistryError, RoomRegistry};
pub use room::{RoomHandle, Session};

use uuid::Uuid;

use crate::ws::protocol::{AbilityKind, Direction, ServerMsg};

/// Command sent to a room actor, translated from a wire message
#[derive(Debug, Clone)]
pub enum RoomCommand {
    AddPlayer { player_id: Uuid, name: String },
    RemovePlayer { player_id: Uuid },
    StartGame { player_id: Uuid },
    Input { player_id: Uuid, direction: Direction },
    UseAbility { player_id: Uuid, ability: AbilityKind },
}

/// Who an outbound message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(Uuid),
}

impl Recipient {
    pub fn includes(&self, player_id: Uuid) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Player(id) => *id == player_id,
        }
    }
}

/// A server message leaving a room, tagged with its audience so each
/// connection can filter the shared broadcast
#[derive(Debug, Clone)]
pub struct Outbound {
    pub recipient: Recipient,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self { recipient: Recipient::All, msg }
    }

    pub fn to(player_id: Uuid, msg: ServerMsg) -> Self {
        Self { recipient: Recipient::Player(player_id), msg }
    }
}
