//! On-disk layout of per-player records.
//!
//! Each player owns one TOML document under the players directory:
//!
//! ```text
//! players/
//! ├── 5f0c2a1e-8a0b-4c4e-9d0f-6a3b2f1e7c11.toml   (canonical, keyed by UUID)
//! └── Zaffre.toml                                 (legacy, keyed by name)
//! ```
//!
//! Legacy name-keyed files predate UUID keying. They are read when no
//! canonical record exists and are never written or deleted here. A player
//! without a name has no legacy candidate.

use crate::core::error::BridgeError;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use uuid::Uuid;

pub const RECORD_EXTENSION: &str = "toml";

pub const KEY_LAST_KNOWN_NAME: &str = "last-known-name";
pub const KEY_WEBAPP_PRIMARY_GROUP_ID: &str = "webapp.primary-group-id";
pub const KEY_WEBAPP_GROUP_IDS: &str = "webapp.group-ids";
pub const KEY_PERMISSIONS_PRIMARY_GROUP_NAME: &str = "permissions-system.primary-group-name";
pub const KEY_PERMISSIONS_GROUP_NAMES: &str = "permissions-system.group-names";

/// Where a player's record was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLocation {
    Canonical(PathBuf),
    Legacy(PathBuf),
    Absent,
}

impl RecordLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            RecordLocation::Canonical(p) | RecordLocation::Legacy(p) => Some(p),
            RecordLocation::Absent => None,
        }
    }
}

pub fn canonical_record_path(players_dir: &Path, uuid: &Uuid) -> PathBuf {
    players_dir.join(format!("{}.{}", uuid.hyphenated(), RECORD_EXTENSION))
}

/// Legacy records are keyed by player name. Characters outside the
/// game's name alphabet are replaced so a name can never escape the directory.
/// An empty name yields an empty path, which [`open_record`] skips.
pub fn legacy_record_path(players_dir: &Path, player_name: &str) -> PathBuf {
    if player_name.is_empty() {
        return PathBuf::new();
    }
    let safe: String = player_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    players_dir.join(format!("{}.{}", safe, RECORD_EXTENSION))
}

/// A player's record together with where it was read from. `Absent`
/// carries an empty document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub location: RecordLocation,
    pub document: Table,
}

/// Resolves and reads the player's record in one step.
///
/// Each candidate is read directly rather than checked first, so a record
/// that vanishes (or is a dangling link) falls through to the next candidate.
/// Canonical wins when both exist. An empty `legacy` path means there is no
/// legacy candidate.
pub fn open_record(canonical: &Path, legacy: &Path) -> Result<ResolvedRecord, BridgeError> {
    if let Some(content) = read_if_present(canonical)? {
        return Ok(ResolvedRecord {
            location: RecordLocation::Canonical(canonical.to_path_buf()),
            document: parse_document(canonical, &content)?,
        });
    }
    if !legacy.as_os_str().is_empty() {
        if let Some(content) = read_if_present(legacy)? {
            return Ok(ResolvedRecord {
                location: RecordLocation::Legacy(legacy.to_path_buf()),
                document: parse_document(legacy, &content)?,
            });
        }
    }
    Ok(ResolvedRecord {
        location: RecordLocation::Absent,
        document: Table::new(),
    })
}

fn read_if_present(path: &Path) -> Result<Option<String>, BridgeError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound
                    | io::ErrorKind::IsADirectory
                    | io::ErrorKind::NotADirectory
            ) =>
        {
            Ok(None)
        }
        Err(e) => Err(read_error(path, e)),
    }
}

fn read_error(path: &Path, err: io::Error) -> BridgeError {
    if err.kind() == io::ErrorKind::InvalidData {
        return BridgeError::corrupt(path, err.to_string());
    }
    BridgeError::IoError(io::Error::new(
        err.kind(),
        format!("reading {}: {}", path.display(), err),
    ))
}

fn parse_document(path: &Path, content: &str) -> Result<Table, BridgeError> {
    content
        .parse::<Table>()
        .map_err(|e| BridgeError::corrupt(path, e.to_string().trim_end()))
}

/// Reads the record at a known path. Unparseable content is
/// `CorruptRecord`; failing to read it at all is an I/O error.
pub fn read_document(path: &Path) -> Result<Table, BridgeError> {
    let content = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    parse_document(path, &content)
}

/// Writes `content` through a sibling temp file that is synced to disk
/// before being renamed over `path`, so readers see the old or the new
/// record and never a partial one.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    written
        .and_then(|()| fs::rename(&temp_path, path))
        .inspect_err(|_| {
            let _ = fs::remove_file(&temp_path);
        })
}

pub fn write_document(path: &Path, doc: &Table) -> Result<(), BridgeError> {
    let content = toml::to_string(doc)
        .map_err(|e| BridgeError::persistence(path, io::Error::other(e)))?;
    write_atomic(path, &content).map_err(|e| BridgeError::persistence(path, e))
}

fn lookup<'a>(doc: &'a Table, dotted_key: &str) -> Option<&'a Value> {
    let mut parts = dotted_key.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

/// Reads a string at `dotted_key`. Missing keys read as `""`; numeric ids
/// written by hand are accepted as their decimal text.
pub fn get_string(doc: &Table, dotted_key: &str) -> Result<String, String> {
    match lookup(doc, dotted_key) {
        None => Ok(String::new()),
        Some(value) => scalar_to_string(value)
            .ok_or_else(|| format!("{} must be a string, found {}", dotted_key, value.type_str())),
    }
}

/// Reads a string sequence at `dotted_key`. Missing keys read as empty.
pub fn get_string_list(doc: &Table, dotted_key: &str) -> Result<Vec<String>, String> {
    match lookup(doc, dotted_key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| {
                    format!(
                        "{} must contain only strings, found {}",
                        dotted_key,
                        item.type_str()
                    )
                })
            })
            .collect(),
        Some(other) => Err(format!(
            "{} must be a list, found {}",
            dotted_key,
            other.type_str()
        )),
    }
}

/// Sets `value` at `dotted_key`, creating intermediate tables and replacing
/// any non-table value that sits where a table is needed.
pub fn set_value(doc: &mut Table, dotted_key: &str, value: Value) {
    let mut parts: Vec<&str> = dotted_key.split('.').collect();
    let leaf = parts.pop().unwrap_or(dotted_key);

    let mut current = doc;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        current = match entry {
            Value::Table(t) => t,
            _ => unreachable!("entry was just made a table"),
        };
    }
    current.insert(leaf.to_string(), value);
}

pub fn string_list_value(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}
