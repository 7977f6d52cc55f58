//! Web user ids of the players currently online.
//!
//! Filled when a player connects, emptied when they leave. Owned by the
//! sync driver and passed by reference to whatever needs a lookup.

use crate::core::collaborators::WebApplicationClient;
use crate::core::error::BridgeError;
use crate::core::player::Player;
use rustc_hash::FxHashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    user_ids: RwLock<FxHashMap<String, String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, player_name: &str, user_id: impl Into<String>) {
        let user_id = user_id.into();
        tracing::debug!(player = player_name, user_id = %user_id, "Linked player session");
        self.user_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player_name.to_string(), user_id);
    }

    pub fn user_id(&self, player_name: &str) -> Option<String> {
        self.user_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(player_name)
            .cloned()
    }

    pub fn is_registered(&self, player_name: &str) -> bool {
        self.user_id(player_name).is_some_and(|id| !id.is_empty())
    }

    pub fn forget(&self, player_name: &str) -> Option<String> {
        self.user_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(player_name)
    }

    pub fn clear(&self) {
        self.user_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.user_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `player_name` in the web application and records the result.
    /// Unlinked players are removed from the registry.
    pub fn resolve(
        &self,
        player_name: &str,
        client: &dyn WebApplicationClient,
    ) -> Result<Option<String>, BridgeError> {
        match client.user_id_for(player_name)? {
            Some(user_id) => {
                self.link(player_name, user_id.clone());
                Ok(Some(user_id))
            }
            None => {
                tracing::debug!(player = player_name, "No web user linked");
                self.forget(player_name);
                Ok(None)
            }
        }
    }

    /// Rebuilds the registry for everyone online, usually after a reload.
    /// Players whose lookup fails are left out and reported in the result.
    pub fn populate_online(
        &self,
        players: &[Player],
        client: &dyn WebApplicationClient,
    ) -> Vec<(String, BridgeError)> {
        self.clear();
        let mut failures = Vec::new();
        for player in players {
            if let Err(e) = self.resolve(&player.name, client) {
                tracing::error!(player = %player.name, error = %e, "User id lookup failed");
                failures.push((player.name.clone(), e));
            }
        }
        failures
    }
}
