//! Contracts for the two systems a player's group state is read from.
//!
//! Implementations live in [`crate::backends`]; the sync engine only sees
//! these traits.

use crate::core::error::BridgeError;
use crate::core::player::Player;

/// The web application's user and group database.
pub trait WebApplicationClient: Send + Sync {
    /// Resolves a player name to a web user id. `None` when the player has
    /// not linked an account.
    fn user_id_for(&self, player_name: &str) -> Result<Option<String>, BridgeError>;

    /// Primary group id of the user, `""` when there is none.
    fn user_primary_group_id(&self, user_id: &str) -> Result<String, BridgeError>;

    /// Secondary group ids of the user, in storage order.
    fn user_secondary_group_ids(&self, user_id: &str) -> Result<Vec<String>, BridgeError>;

    fn player_has_avatar(&self, user_id: &str) -> Result<bool, BridgeError>;

    fn user_post_count(&self, user_id: &str) -> Result<i64, BridgeError>;
}

/// The game server's permission system.
///
/// Backends differ in capability; callers query [`supports_primary_groups`]
/// instead of checking which backend they hold.
///
/// [`supports_primary_groups`]: PermissionHandler::supports_primary_groups
pub trait PermissionHandler: Send + Sync {
    fn supports_primary_groups(&self) -> bool;

    /// Primary group name, `""` when unset.
    fn primary_group(&self, player: &Player) -> Result<String, BridgeError>;

    fn groups(&self, player: &Player) -> Result<Vec<String>, BridgeError>;

    fn is_member(&self, player: &Player, group: &str) -> Result<bool, BridgeError> {
        Ok(self.groups(player)?.iter().any(|g| g == group))
    }

    fn add_to_group(&self, player: &Player, group: &str) -> Result<(), BridgeError>;

    fn remove_from_group(&self, player: &Player, group: &str) -> Result<(), BridgeError>;

    /// Fails with [`BridgeError::ValidationError`] on backends without
    /// primary group support.
    fn set_primary_group(&self, player: &Player, group: &str) -> Result<(), BridgeError>;
}
