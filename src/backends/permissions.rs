//! File-backed permission systems.
//!
//! Two layouts are supported, one per backend:
//!
//! ```toml
//! # primary-group-file: player-centric, with a primary group
//! [players.5f0c2a1e-8a0b-4c4e-9d0f-6a3b2f1e7c11]
//! name = "Zaffre"
//! primary = "Builder"
//! groups = ["group1", "group2"]
//! ```
//!
//! ```toml
//! # group-list-file: group-centric, no primary group
//! [groups.builder]
//! members = ["5f0c2a1e-8a0b-4c4e-9d0f-6a3b2f1e7c11"]
//! ```
//!
//! Both re-read the file on every call so edits made by the game server
//! are picked up, and write back atomically.

use crate::core::collaborators::PermissionHandler;
use crate::core::config::{PermissionBackend, PermissionsConfig};
use crate::core::error::BridgeError;
use crate::core::player::Player;
use crate::core::record::write_atomic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub fn permission_handler_for(config: &PermissionsConfig) -> Arc<dyn PermissionHandler> {
    match config.backend {
        PermissionBackend::PrimaryGroupFile => Arc::new(PrimaryGroupFile::new(&config.file)),
        PermissionBackend::GroupListFile => Arc::new(GroupListFile::new(&config.file)),
    }
}

fn read_file<T: DeserializeOwned + Default>(path: &Path) -> Result<T, BridgeError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        BridgeError::ValidationError(format!("permissions file {}: {}", path.display(), e))
    })
}

fn write_file<T: Serialize>(path: &Path, data: &T) -> Result<(), BridgeError> {
    let content = toml::to_string(data).map_err(|e| {
        BridgeError::ValidationError(format!("permissions file {}: {}", path.display(), e))
    })?;
    write_atomic(path, &content)?;
    Ok(())
}

fn lock_writes<'a>(lock: &'a Mutex<()>, path: &Path) -> Result<MutexGuard<'a, ()>, BridgeError> {
    lock.lock().map_err(|_| {
        BridgeError::ValidationError(format!(
            "permissions file {} write lock poisoned",
            path.display()
        ))
    })
}

fn player_key(player: &Player) -> String {
    player.uuid.hyphenated().to_string()
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct PlayerEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    primary: String,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct PlayerCentricFile {
    #[serde(default)]
    players: BTreeMap<String, PlayerEntry>,
}

/// Player-centric permissions file with primary group support.
#[derive(Debug)]
pub struct PrimaryGroupFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PrimaryGroupFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn modify<F>(&self, player: &Player, f: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut PlayerEntry),
    {
        let _guard = lock_writes(&self.write_lock, &self.path)?;
        let mut file: PlayerCentricFile = read_file(&self.path)?;
        let entry = file.players.entry(player_key(player)).or_default();
        entry.name = player.name.clone();
        f(entry);
        write_file(&self.path, &file)
    }

    fn entry(&self, player: &Player) -> Result<Option<PlayerEntry>, BridgeError> {
        let mut file: PlayerCentricFile = read_file(&self.path)?;
        Ok(file.players.remove(&player_key(player)))
    }
}

impl PermissionHandler for PrimaryGroupFile {
    fn supports_primary_groups(&self) -> bool {
        true
    }

    fn primary_group(&self, player: &Player) -> Result<String, BridgeError> {
        Ok(self.entry(player)?.map(|e| e.primary).unwrap_or_default())
    }

    fn groups(&self, player: &Player) -> Result<Vec<String>, BridgeError> {
        Ok(self.entry(player)?.map(|e| e.groups).unwrap_or_default())
    }

    fn add_to_group(&self, player: &Player, group: &str) -> Result<(), BridgeError> {
        self.modify(player, |entry| {
            if !entry.groups.iter().any(|g| g == group) {
                entry.groups.push(group.to_string());
            }
        })
    }

    fn remove_from_group(&self, player: &Player, group: &str) -> Result<(), BridgeError> {
        self.modify(player, |entry| {
            entry.groups.retain(|g| g != group);
            if entry.primary == group {
                entry.primary.clear();
            }
        })
    }

    fn set_primary_group(&self, player: &Player, group: &str) -> Result<(), BridgeError> {
        self.modify(player, |entry| entry.primary = group.to_string())
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct GroupEntry {
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct GroupCentricFile {
    #[serde(default)]
    groups: BTreeMap<String, GroupEntry>,
}

/// Group-centric permissions file. Has no notion of a primary group.
#[derive(Debug)]
pub struct GroupListFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl GroupListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl PermissionHandler for GroupListFile {
    fn supports_primary_groups(&self) -> bool {
        false
    }

    fn primary_group(&self, _player: &Player) -> Result<String, BridgeError> {
        Ok(String::new())
    }

    fn groups(&self, player: &Player) -> Result<Vec<String>, BridgeError> {
        let file: GroupCentricFile = read_file(&self.path)?;
        let key = player_key(player);
        Ok(file
            .groups
            .into_iter()
            .filter(|(_, entry)| entry.members.contains(&key))
            .map(|(name, _)| name)
            .collect())
    }

    fn add_to_group(&self, player: &Player, group: &str) -> Result<(), BridgeError> {
        let _guard = lock_writes(&self.write_lock, &self.path)?;
        let mut file: GroupCentricFile = read_file(&self.path)?;
        let key = player_key(player);
        let entry = file.groups.entry(group.to_string()).or_default();
        if !entry.members.contains(&key) {
            entry.members.push(key);
        }
        write_file(&self.path, &file)
    }

    fn remove_from_group(&self, player: &Player, group: &str) -> Result<(), BridgeError> {
        let _guard = lock_writes(&self.write_lock, &self.path)?;
        let mut file: GroupCentricFile = read_file(&self.path)?;
        let key = player_key(player);
        if let Some(entry) = file.groups.get_mut(group) {
            entry.members.retain(|m| m != &key);
        }
        write_file(&self.path, &file)
    }

    fn set_primary_group(&self, _player: &Player, _group: &str) -> Result<(), BridgeError> {
        Err(BridgeError::ValidationError(
            "group-list-file backend has no primary groups".into(),
        ))
    }
}
