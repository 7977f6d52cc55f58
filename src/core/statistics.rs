//! Fire-and-forget statistics updates on join and quit.

use crate::core::error::BridgeError;
use crate::core::player::Player;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

const STATISTICS_THREADS: usize = 2;

/// Whether the update is for a connect or a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
}

pub trait StatisticsUpdater: Send + Sync {
    fn update(&self, player: &Player, user_id: &str, presence: Presence)
    -> Result<(), BridgeError>;
}

/// Runs statistics updates on a small worker pool so join and quit
/// handling never wait on the web database.
pub struct StatisticsDispatcher {
    pool: ThreadPool,
    updater: Arc<dyn StatisticsUpdater>,
}

impl StatisticsDispatcher {
    pub fn new(updater: Arc<dyn StatisticsUpdater>) -> Result<Self, BridgeError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(STATISTICS_THREADS)
            .thread_name(|i| format!("groupbridge-stats-{}", i))
            .build()
            .map_err(|e| BridgeError::ValidationError(format!("statistics pool: {}", e)))?;
        Ok(Self { pool, updater })
    }

    /// Queues an update; failures are logged, never returned.
    pub fn dispatch(&self, player: Player, user_id: String, presence: Presence) {
        let updater = Arc::clone(&self.updater);
        self.pool.spawn(move || {
            if let Err(e) = updater.update(&player, &user_id, presence) {
                tracing::warn!(player = %player.name, ?presence, error = %e, "Statistics update failed");
            }
        });
    }
}

impl std::fmt::Debug for StatisticsDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsDispatcher")
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}
