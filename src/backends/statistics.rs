//! Online status and last-seen time written to the web application database.

use crate::backends::db::db_connect;
use crate::core::config::{Config, StatisticsConfig};
use crate::core::error::BridgeError;
use crate::core::player::Player;
use crate::core::statistics::{Presence, StatisticsUpdater};
use crate::core::time;
use rusqlite::params;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SqlStatistics {
    db_path: PathBuf,
    config: StatisticsConfig,
}

impl SqlStatistics {
    pub fn from_config(config: &Config) -> Self {
        Self {
            db_path: config.webapp.database.clone(),
            config: config.statistics.clone(),
        }
    }
}

impl StatisticsUpdater for SqlStatistics {
    fn update(
        &self,
        player: &Player,
        user_id: &str,
        presence: Presence,
    ) -> Result<(), BridgeError> {
        let c = &self.config;
        let sql = format!(
            "UPDATE \"{}\" SET \"{}\" = ?1, \"{}\" = ?2 WHERE \"{}\" = ?3",
            c.table, c.online_status_column, c.last_online_column, c.user_id_column
        );
        let online = matches!(presence, Presence::Online);
        let now = time::now_epoch_secs() as i64;

        let conn = db_connect(&self.db_path)?;
        let changed = conn.execute(&sql, params![online, now, user_id])?;
        if changed == 0 {
            return Err(BridgeError::NotFound(format!(
                "web user {} for {}",
                user_id, player.name
            )));
        }
        tracing::debug!(player = %player.name, user_id, online, "Updated statistics");
        Ok(())
    }
}
