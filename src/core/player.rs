//! Handle for a connected player as seen by the game server.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A live player: the login name at connect time plus the account UUID,
/// which stays stable across renames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub uuid: Uuid,
}

impl Player {
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}
