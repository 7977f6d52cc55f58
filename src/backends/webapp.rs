//! Web application client over the forum/CMS SQLite database.
//!
//! Table and column names come from [`Config`]; they are validated as plain
//! identifiers when the config is parsed, so they are spliced into the SQL
//! text while every value is bound as a parameter.

use crate::backends::db::{db_connect, value_to_string};
use crate::core::collaborators::WebApplicationClient;
use crate::core::config::{
    Config, LinkingConfig, PrimaryGroupConfig, RequirementsConfig, SecondaryGroupsConfig,
    SecondaryStorage,
};
use crate::core::error::BridgeError;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SqlWebApplication {
    db_path: PathBuf,
    linking: LinkingConfig,
    primary_group: PrimaryGroupConfig,
    secondary_groups: SecondaryGroupsConfig,
    requirements: RequirementsConfig,
}

impl SqlWebApplication {
    pub fn from_config(config: &Config) -> Self {
        Self {
            db_path: config.webapp.database.clone(),
            linking: config.linking.clone(),
            primary_group: config.webapp.primary_group.clone(),
            secondary_groups: config.webapp.secondary_groups.clone(),
            requirements: config.requirements.clone(),
        }
    }

    fn connect(&self) -> Result<Connection, BridgeError> {
        db_connect(&self.db_path)
    }

    fn query_value(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<String>, BridgeError> {
        tracing::trace!(sql, "web application query");
        let conn = self.connect()?;
        let value: Option<SqlValue> = conn
            .query_row(sql, params, |row| row.get(0))
            .optional()?;
        Ok(value.and_then(value_to_string))
    }

    fn linking_query(&self) -> String {
        let l = &self.linking;
        if l.uses_key {
            format!(
                "SELECT \"{uid}\" FROM \"{table}\" WHERE \"{key}\" = ?1 AND \"{value}\" = ?2 \
                 ORDER BY \"{uid}\" DESC LIMIT 1",
                uid = l.user_id_column,
                table = l.table,
                key = l.key_column,
                value = l.value_column,
            )
        } else {
            format!(
                "SELECT \"{uid}\" FROM \"{table}\" WHERE LOWER(\"{name}\") = LOWER(?1) \
                 ORDER BY \"{uid}\" DESC LIMIT 1",
                uid = l.user_id_column,
                table = l.table,
                name = l.player_name_column,
            )
        }
    }

    fn split_group_ids(&self, raw: &str) -> Vec<String> {
        raw.split(self.secondary_groups.delimiter.as_str())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl WebApplicationClient for SqlWebApplication {
    fn user_id_for(&self, player_name: &str) -> Result<Option<String>, BridgeError> {
        let sql = self.linking_query();
        let user_id = if self.linking.uses_key {
            self.query_value(&sql, params![self.linking.key_name, player_name])?
        } else {
            self.query_value(&sql, params![player_name])?
        };

        match &user_id {
            Some(id) => tracing::debug!(player = player_name, user_id = %id, "Resolved web user"),
            None => tracing::debug!(player = player_name, "Web user not found"),
        }
        Ok(user_id.filter(|id| !id.is_empty()))
    }

    fn user_primary_group_id(&self, user_id: &str) -> Result<String, BridgeError> {
        let p = &self.primary_group;
        if !p.enabled {
            return Ok(String::new());
        }
        let value = if p.uses_key {
            let sql = format!(
                "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1 AND \"{}\" = ?2",
                p.value_column, p.table, p.user_id_column, p.key_column
            );
            self.query_value(&sql, params![user_id, p.key_name])?
        } else {
            let sql = format!(
                "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
                p.group_id_column, p.table, p.user_id_column
            );
            self.query_value(&sql, params![user_id])?
        };
        Ok(value.unwrap_or_default())
    }

    fn user_secondary_group_ids(&self, user_id: &str) -> Result<Vec<String>, BridgeError> {
        let s = &self.secondary_groups;
        if !s.enabled {
            return Ok(Vec::new());
        }
        match s.storage {
            SecondaryStorage::Single => {
                let sql = format!(
                    "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
                    s.group_id_column, s.table, s.user_id_column
                );
                let raw = self.query_value(&sql, params![user_id])?;
                Ok(raw.map(|r| self.split_group_ids(&r)).unwrap_or_default())
            }
            SecondaryStorage::KeyValue => {
                let sql = format!(
                    "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1 AND \"{}\" = ?2",
                    s.value_column, s.table, s.user_id_column, s.key_column
                );
                let raw = self.query_value(&sql, params![user_id, s.key_name])?;
                Ok(raw.map(|r| self.split_group_ids(&r)).unwrap_or_default())
            }
            SecondaryStorage::Junction => {
                let sql = format!(
                    "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
                    s.group_id_column, s.table, s.user_id_column
                );
                tracing::trace!(sql = %sql, "web application query");
                let conn = self.connect()?;
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![user_id], |row| row.get::<_, SqlValue>(0))?;
                let mut ids = Vec::new();
                for value in rows {
                    if let Some(id) = value_to_string(value?).filter(|id| !id.is_empty()) {
                        ids.push(id);
                    }
                }
                Ok(ids)
            }
        }
    }

    fn player_has_avatar(&self, user_id: &str) -> Result<bool, BridgeError> {
        let a = &self.requirements.avatar;
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
            a.avatar_column, a.table, a.user_id_column
        );
        let avatar = self.query_value(&sql, params![user_id])?;
        Ok(avatar.is_some_and(|a| !a.is_empty()))
    }

    fn user_post_count(&self, user_id: &str) -> Result<i64, BridgeError> {
        let p = &self.requirements.posts;
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
            p.post_count_column, p.table, p.user_id_column
        );
        match self.query_value(&sql, params![user_id])? {
            None => Ok(0),
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                BridgeError::ValidationError(format!(
                    "post count for user {} is not a number: {:?}",
                    user_id, raw
                ))
            }),
        }
    }
}
