//! Bridge configuration loaded from `groupbridge.toml`.
//!
//! Every section is optional; missing keys fall back to the values in the
//! embedded template (see [`DEFAULT_CONFIG_TEMPLATE`]).

use crate::core::error::BridgeError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const CONFIG_FILE_NAME: &str = "groupbridge.toml";

/// Commented configuration written by `groupbridge init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../../assets/groupbridge.toml");

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub storage: StorageConfig,
    pub linking: LinkingConfig,
    pub webapp: WebappConfig,
    pub requirements: RequirementsConfig,
    pub statistics: StatisticsConfig,
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    pub players_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            players_dir: PathBuf::from("players"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LinkingConfig {
    pub table: String,
    pub user_id_column: String,
    pub uses_key: bool,
    pub key_column: String,
    pub key_name: String,
    pub value_column: String,
    pub player_name_column: String,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            table: "users".into(),
            user_id_column: "user_id".into(),
            uses_key: false,
            key_column: "field".into(),
            key_name: "minecraft_name".into(),
            value_column: "value".into(),
            player_name_column: "username".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WebappConfig {
    pub database: PathBuf,
    pub primary_group: PrimaryGroupConfig,
    pub secondary_groups: SecondaryGroupsConfig,
}

impl Default for WebappConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("webapp.db"),
            primary_group: PrimaryGroupConfig::default(),
            secondary_groups: SecondaryGroupsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PrimaryGroupConfig {
    pub enabled: bool,
    pub table: String,
    pub user_id_column: String,
    pub group_id_column: String,
    pub uses_key: bool,
    pub key_column: String,
    pub key_name: String,
    pub value_column: String,
}

impl Default for PrimaryGroupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: "users".into(),
            user_id_column: "user_id".into(),
            group_id_column: "group_id".into(),
            uses_key: false,
            key_column: "field".into(),
            key_name: "primary_group".into(),
            value_column: "value".into(),
        }
    }
}

/// How secondary group ids are laid out in the web application database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecondaryStorage {
    /// One delimited column on the user row.
    Single,
    /// One row per (user, group) pair.
    Junction,
    /// A delimited value stored under a key in a key/value table.
    KeyValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SecondaryGroupsConfig {
    pub enabled: bool,
    pub storage: SecondaryStorage,
    pub table: String,
    pub user_id_column: String,
    pub group_id_column: String,
    pub key_column: String,
    pub key_name: String,
    pub value_column: String,
    pub delimiter: String,
}

impl Default for SecondaryGroupsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: SecondaryStorage::Single,
            table: "users".into(),
            user_id_column: "user_id".into(),
            group_id_column: "secondary_group_ids".into(),
            key_column: "field".into(),
            key_name: "secondary_groups".into(),
            value_column: "value".into(),
            delimiter: ",".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RequirementsConfig {
    pub avatar: AvatarConfig,
    pub posts: PostsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AvatarConfig {
    pub table: String,
    pub user_id_column: String,
    pub avatar_column: String,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            table: "users".into(),
            user_id_column: "user_id".into(),
            avatar_column: "avatar".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PostsConfig {
    pub table: String,
    pub user_id_column: String,
    pub post_count_column: String,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            table: "users".into(),
            user_id_column: "user_id".into(),
            post_count_column: "post_count".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StatisticsConfig {
    pub enabled: bool,
    pub table: String,
    pub user_id_column: String,
    pub online_status_column: String,
    pub last_online_column: String,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            table: "users".into(),
            user_id_column: "user_id".into(),
            online_status_column: "online".into(),
            last_online_column: "last_online".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionBackend {
    PrimaryGroupFile,
    GroupListFile,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PermissionsConfig {
    pub backend: PermissionBackend,
    pub file: PathBuf,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            backend: PermissionBackend::PrimaryGroupFile,
            file: PathBuf::from("permissions.toml"),
        }
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

impl Config {
    pub fn parse(content: &str) -> Result<Self, BridgeError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects table and column names that are not plain SQL identifiers.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let pattern = identifier_pattern();
        for (key, value) in self.sql_identifiers() {
            if !pattern.is_match(value) {
                return Err(BridgeError::ConfigError(format!(
                    "{} must be a plain SQL identifier, got {:?}",
                    key, value
                )));
            }
        }
        if self.webapp.secondary_groups.enabled
            && self.webapp.secondary_groups.storage != SecondaryStorage::Junction
            && self.webapp.secondary_groups.delimiter.is_empty()
        {
            return Err(BridgeError::ConfigError(
                "webapp.secondary-groups.delimiter must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Identifiers that the active settings will splice into queries.
    fn sql_identifiers(&self) -> Vec<(&'static str, &String)> {
        let linking = &self.linking;
        let mut ids = vec![
            ("linking.table", &linking.table),
            ("linking.user-id-column", &linking.user_id_column),
        ];
        if linking.uses_key {
            ids.push(("linking.key-column", &linking.key_column));
            ids.push(("linking.value-column", &linking.value_column));
        } else {
            ids.push(("linking.player-name-column", &linking.player_name_column));
        }

        let primary = &self.webapp.primary_group;
        if primary.enabled {
            ids.push(("webapp.primary-group.table", &primary.table));
            ids.push(("webapp.primary-group.user-id-column", &primary.user_id_column));
            if primary.uses_key {
                ids.push(("webapp.primary-group.key-column", &primary.key_column));
                ids.push(("webapp.primary-group.value-column", &primary.value_column));
            } else {
                ids.push(("webapp.primary-group.group-id-column", &primary.group_id_column));
            }
        }

        let secondary = &self.webapp.secondary_groups;
        if secondary.enabled {
            ids.push(("webapp.secondary-groups.table", &secondary.table));
            ids.push(("webapp.secondary-groups.user-id-column", &secondary.user_id_column));
            match secondary.storage {
                SecondaryStorage::Single | SecondaryStorage::Junction => {
                    ids.push((
                        "webapp.secondary-groups.group-id-column",
                        &secondary.group_id_column,
                    ));
                }
                SecondaryStorage::KeyValue => {
                    ids.push(("webapp.secondary-groups.key-column", &secondary.key_column));
                    ids.push(("webapp.secondary-groups.value-column", &secondary.value_column));
                }
            }
        }

        let avatar = &self.requirements.avatar;
        ids.push(("requirements.avatar.table", &avatar.table));
        ids.push(("requirements.avatar.user-id-column", &avatar.user_id_column));
        ids.push(("requirements.avatar.avatar-column", &avatar.avatar_column));

        let posts = &self.requirements.posts;
        ids.push(("requirements.posts.table", &posts.table));
        ids.push(("requirements.posts.user-id-column", &posts.user_id_column));
        ids.push(("requirements.posts.post-count-column", &posts.post_count_column));

        let stats = &self.statistics;
        if stats.enabled {
            ids.push(("statistics.table", &stats.table));
            ids.push(("statistics.user-id-column", &stats.user_id_column));
            ids.push(("statistics.online-status-column", &stats.online_status_column));
            ids.push(("statistics.last-online-column", &stats.last_online_column));
        }
        ids
    }

    /// Resolves relative paths in the config against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.storage.players_dir,
            &mut self.webapp.database,
            &mut self.permissions.file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Loads `groupbridge.toml` from `dir`. A missing file yields the defaults.
pub fn load_config(dir: &Path) -> Result<Config, BridgeError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)?;
        Config::parse(&content)?
    } else {
        tracing::debug!(path = %config_path.display(), "No config file, using defaults");
        Config::default()
    };
    config.resolve_paths(dir);
    Ok(config)
}
