//! One player's group state on both sides of the bridge.
//!
//! A `PlayerState` lives for one synchronization pass. It can be filled from
//! the live systems ([`PlayerState::generate`]) or from the player's record
//! ([`PlayerState::load`]), written back with [`PlayerState::save`], and
//! duplicated with [`PlayerState::copy`] so a pass can compare the state it
//! started from with the state it ends with.
//!
//! Not meant for concurrent use: callers serialize passes for the same
//! player (see [`crate::core::locks::PlayerLocks`]).

use crate::core::environment::Environment;
use crate::core::error::BridgeError;
use crate::core::player::Player;
use crate::core::record::{self, RecordLocation};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toml::{Table, Value};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PlayerState {
    environment: Arc<Environment>,
    player: Player,
    web_user_id: String,
    document: Table,
    canonical_path: PathBuf,
    legacy_path: PathBuf,

    last_known_name: String,
    webapp_primary_group_id: String,
    webapp_group_ids: Vec<String>,
    permissions_primary_group_name: String,
    permissions_group_names: Vec<String>,
    is_new_file: bool,
}

impl PlayerState {
    pub fn new(
        environment: Arc<Environment>,
        player: Player,
        web_user_id: impl Into<String>,
        document: Table,
        canonical_path: PathBuf,
        legacy_path: PathBuf,
    ) -> Self {
        Self {
            environment,
            player,
            web_user_id: web_user_id.into(),
            document,
            canonical_path,
            legacy_path,
            last_known_name: String::new(),
            webapp_primary_group_id: String::new(),
            webapp_group_ids: Vec::new(),
            permissions_primary_group_name: String::new(),
            permissions_group_names: Vec::new(),
            is_new_file: false,
        }
    }

    /// Builds a state whose record paths come from the configured players
    /// directory.
    pub fn for_player(
        environment: Arc<Environment>,
        player: Player,
        web_user_id: impl Into<String>,
    ) -> Self {
        let players_dir = environment.configuration().storage.players_dir.clone();
        let canonical = record::canonical_record_path(&players_dir, &player.uuid);
        let legacy = record::legacy_record_path(&players_dir, &player.name);
        Self::new(environment, player, web_user_id, Table::new(), canonical, legacy)
    }

    /// Fills every group field from the web application and the permission
    /// system. Fields are left untouched if any lookup fails.
    pub fn generate(&mut self) -> Result<(), BridgeError> {
        let web = self.environment.web_application();
        let permissions = self.environment.permission_handler();

        let primary_group_id = web
            .user_primary_group_id(&self.web_user_id)
            .map_err(|e| as_dependency("web application", e))?;
        let group_ids = web
            .user_secondary_group_ids(&self.web_user_id)
            .map_err(|e| as_dependency("web application", e))?;

        let primary_group_name = if permissions.supports_primary_groups() {
            permissions
                .primary_group(&self.player)
                .map_err(|e| as_dependency("permission system", e))?
        } else {
            String::new()
        };
        let group_names = permissions
            .groups(&self.player)
            .map_err(|e| as_dependency("permission system", e))?;

        self.webapp_primary_group_id = primary_group_id;
        self.webapp_group_ids = group_ids;
        self.permissions_primary_group_name = primary_group_name;
        self.permissions_group_names = group_names;

        tracing::debug!(
            player = %self.player.name,
            user_id = %self.web_user_id,
            webapp_groups = self.webapp_group_ids.len(),
            permission_groups = self.permissions_group_names.len(),
            "Generated player state"
        );
        Ok(())
    }

    /// Fills the state from the player's record.
    ///
    /// Reads the canonical record, or the legacy name-keyed one when only
    /// that exists. With neither present the state is marked new and every
    /// field is empty. Keys missing from a record read as empty. Fields are
    /// left untouched when the record is corrupt or cannot be read.
    pub fn load(&mut self) -> Result<RecordLocation, BridgeError> {
        let record::ResolvedRecord { location, document } =
            record::open_record(&self.canonical_path, &self.legacy_path)?;

        let Some(path) = location.path() else {
            self.is_new_file = true;
            self.last_known_name.clear();
            self.webapp_primary_group_id.clear();
            self.webapp_group_ids.clear();
            self.permissions_primary_group_name.clear();
            self.permissions_group_names.clear();
            tracing::debug!(player = %self.player.name, uuid = %self.player.uuid, "No player record yet");
            return Ok(location);
        };

        let corrupt = |reason: String| BridgeError::corrupt(path, reason);

        let last_known_name =
            record::get_string(&document, record::KEY_LAST_KNOWN_NAME).map_err(corrupt)?;
        let primary_group_id =
            record::get_string(&document, record::KEY_WEBAPP_PRIMARY_GROUP_ID).map_err(corrupt)?;
        let group_ids =
            record::get_string_list(&document, record::KEY_WEBAPP_GROUP_IDS).map_err(corrupt)?;
        let primary_group_name =
            record::get_string(&document, record::KEY_PERMISSIONS_PRIMARY_GROUP_NAME)
                .map_err(corrupt)?;
        let group_names = record::get_string_list(&document, record::KEY_PERMISSIONS_GROUP_NAMES)
            .map_err(corrupt)?;

        self.document = document;
        self.last_known_name = last_known_name;
        self.webapp_primary_group_id = primary_group_id;
        self.webapp_group_ids = group_ids;
        self.permissions_primary_group_name = primary_group_name;
        self.permissions_group_names = group_names;
        self.is_new_file = false;

        if let RecordLocation::Legacy(legacy) = &location {
            tracing::info!(
                player = %self.player.name,
                uuid = %self.player.uuid,
                path = %legacy.display(),
                "Loaded legacy player record; next save moves it to the UUID-keyed path"
            );
        } else {
            tracing::debug!(player = %self.player.name, path = %path.display(), "Loaded player record");
        }
        Ok(location)
    }

    /// Writes the current values to the canonical record. Keys this state
    /// does not own are carried over from the loaded document.
    pub fn save(&mut self) -> Result<(), BridgeError> {
        let mut document = self.document.clone();
        record::set_value(
            &mut document,
            record::KEY_LAST_KNOWN_NAME,
            Value::String(self.player.name.clone()),
        );
        record::set_value(
            &mut document,
            record::KEY_WEBAPP_PRIMARY_GROUP_ID,
            Value::String(self.webapp_primary_group_id.clone()),
        );
        record::set_value(
            &mut document,
            record::KEY_WEBAPP_GROUP_IDS,
            record::string_list_value(&self.webapp_group_ids),
        );
        record::set_value(
            &mut document,
            record::KEY_PERMISSIONS_PRIMARY_GROUP_NAME,
            Value::String(self.permissions_primary_group_name.clone()),
        );
        record::set_value(
            &mut document,
            record::KEY_PERMISSIONS_GROUP_NAMES,
            record::string_list_value(&self.permissions_group_names),
        );

        record::write_document(&self.canonical_path, &document)?;

        self.document = document;
        tracing::debug!(
            player = %self.player.name,
            path = %self.canonical_path.display(),
            "Saved player record"
        );
        Ok(())
    }

    /// Independent duplicate; changes to either side never show in the other.
    pub fn copy(&self) -> PlayerState {
        self.clone()
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_name(&self) -> &str {
        &self.player.name
    }

    pub fn player_uuid(&self) -> Uuid {
        self.player.uuid
    }

    pub fn web_user_id(&self) -> &str {
        &self.web_user_id
    }

    pub fn is_linked(&self) -> bool {
        !self.web_user_id.is_empty()
    }

    /// Name stored in the record at the last load; `""` for new players.
    pub fn last_known_name(&self) -> &str {
        &self.last_known_name
    }

    /// True when the player was renamed since the record was written.
    pub fn was_renamed(&self) -> bool {
        !self.last_known_name.is_empty() && self.last_known_name != self.player.name
    }

    pub fn webapp_primary_group_id(&self) -> &str {
        &self.webapp_primary_group_id
    }

    pub fn webapp_group_ids(&self) -> &[String] {
        &self.webapp_group_ids
    }

    pub fn permissions_system_primary_group_name(&self) -> &str {
        &self.permissions_primary_group_name
    }

    pub fn permissions_system_group_names(&self) -> &[String] {
        &self.permissions_group_names
    }

    pub fn is_new_file(&self) -> bool {
        self.is_new_file
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    pub fn document(&self) -> &Table {
        &self.document
    }

    pub fn set_webapp_primary_group_id(&mut self, id: impl Into<String>) {
        self.webapp_primary_group_id = id.into();
    }

    pub fn webapp_group_ids_mut(&mut self) -> &mut Vec<String> {
        &mut self.webapp_group_ids
    }

    pub fn set_permissions_system_primary_group_name(&mut self, name: impl Into<String>) {
        self.permissions_primary_group_name = name.into();
    }

    pub fn permissions_system_group_names_mut(&mut self) -> &mut Vec<String> {
        &mut self.permissions_group_names
    }
}

/// Snapshots compare by identity and group values; the shared environment
/// and the backing document do not take part.
impl PartialEq for PlayerState {
    fn eq(&self, other: &Self) -> bool {
        self.player == other.player
            && self.web_user_id == other.web_user_id
            && self.webapp_primary_group_id == other.webapp_primary_group_id
            && self.webapp_group_ids == other.webapp_group_ids
            && self.permissions_primary_group_name == other.permissions_primary_group_name
            && self.permissions_group_names == other.permissions_group_names
            && self.is_new_file == other.is_new_file
    }
}

fn as_dependency(collaborator: &'static str, err: BridgeError) -> BridgeError {
    tracing::warn!(collaborator, error = %err, "Lookup failed during generate");
    err.into_dependency(collaborator)
}
