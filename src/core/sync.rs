//! Drives one synchronization pass per connecting player.
//!
//! The driver owns the session registry and the per-player locks. A pass
//! loads the player's record, keeps a copy as the "before" snapshot,
//! regenerates the live values, and saves the result. Deciding which group
//! changes to apply from the two snapshots is left to the caller.

use crate::core::collaborators::WebApplicationClient;
use crate::core::environment::Environment;
use crate::core::error::BridgeError;
use crate::core::locks::PlayerLocks;
use crate::core::player::Player;
use crate::core::player_state::PlayerState;
use crate::core::record::RecordLocation;
use crate::core::session::SessionRegistry;
use crate::core::statistics::{Presence, StatisticsDispatcher};
use crate::core::time;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub pass_id: String,
    /// Where the "before" snapshot was read from.
    pub location: RecordLocation,
    pub before: PlayerState,
    pub after: PlayerState,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    pub fn migrated(&self) -> bool {
        matches!(self.location, RecordLocation::Legacy(_))
    }
}

#[derive(Debug)]
pub struct SyncDriver {
    environment: Arc<Environment>,
    sessions: SessionRegistry,
    locks: PlayerLocks,
    statistics: Option<StatisticsDispatcher>,
}

impl SyncDriver {
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            sessions: SessionRegistry::new(),
            locks: PlayerLocks::new(),
            statistics: None,
        }
    }

    pub fn with_statistics(mut self, dispatcher: StatisticsDispatcher) -> Self {
        self.statistics = Some(dispatcher);
        self
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Resolves the player's web account, runs a pass and queues the
    /// statistics update.
    ///
    /// The player is online whether or not the pass succeeds, so the
    /// statistics update is queued and the session stays linked before a
    /// pass error is returned.
    pub fn on_join(&self, player: &Player) -> Result<SyncOutcome, BridgeError> {
        let web = self.environment.web_application();
        let user_id = self
            .sessions
            .resolve(&player.name, web.as_ref())
            .map_err(|e| e.into_dependency("web application"))?
            .unwrap_or_default();

        let outcome = self.sync_player(player, &user_id);
        self.dispatch_statistics(player, &user_id, Presence::Online);
        if let Err(e) = &outcome {
            tracing::warn!(player = %player.name, error = %e, "Join pass failed");
        }
        outcome
    }

    /// Drops the player's session. Returns the web user id they had.
    pub fn on_quit(&self, player: &Player) -> Option<String> {
        let user_id = self.sessions.forget(&player.name);
        if let Some(id) = &user_id {
            self.dispatch_statistics(player, id, Presence::Offline);
        }
        self.locks.prune();
        user_id
    }

    /// One pass for `player`. Unlinked players (`user_id == ""`) skip
    /// regeneration; their record is still rewritten so legacy records move
    /// to the UUID-keyed path.
    pub fn sync_player(&self, player: &Player, user_id: &str) -> Result<SyncOutcome, BridgeError> {
        let pass_id = time::new_pass_id();
        let span = tracing::info_span!("sync", pass = %pass_id, player = %player.name);
        let _entered = span.enter();

        self.locks.with_player(player.uuid, || {
            let mut state =
                PlayerState::for_player(Arc::clone(&self.environment), player.clone(), user_id);
            let location = state.load()?;
            let before = state.copy();

            if state.is_linked() {
                state.generate()?;
            }
            state.save()?;

            let outcome = SyncOutcome {
                pass_id: pass_id.clone(),
                location,
                before,
                after: state,
            };
            tracing::info!(
                new = outcome.after.is_new_file(),
                migrated = outcome.migrated(),
                changed = outcome.changed(),
                "Player synchronized"
            );
            Ok(outcome)
        })
    }

    /// Swaps in a new web application client and re-resolves everyone online.
    pub fn reload_web_application(
        &self,
        client: Arc<dyn WebApplicationClient>,
        online: &[Player],
    ) -> Vec<(String, BridgeError)> {
        self.environment.set_web_application(Arc::clone(&client));
        let failures = self.sessions.populate_online(online, client.as_ref());
        tracing::info!(
            online = online.len(),
            linked = self.sessions.len(),
            failed = failures.len(),
            "Reloaded web application client"
        );
        failures
    }

    fn dispatch_statistics(&self, player: &Player, user_id: &str, presence: Presence) {
        if user_id.is_empty() || !self.environment.configuration().statistics.enabled {
            return;
        }
        if let Some(dispatcher) = &self.statistics {
            dispatcher.dispatch(player.clone(), user_id.to_string(), presence);
        }
    }
}
