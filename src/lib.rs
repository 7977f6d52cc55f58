//! groupbridge: keeps a player's web-forum groups and in-game permission
//! groups in step.
//!
//! The web application (forum, CMS) owns user accounts with a primary group
//! id and a list of secondary group ids. The game server's permission system
//! owns group names for connected players. For one player at a time the
//! bridge reads both sides into a [`core::player_state::PlayerState`],
//! snapshots it to disk, and hands "before" and "after" copies to whoever
//! decides which group changes to apply.
//!
//! # Layout
//!
//! - [`core`]: the sync engine (player state, record store, environment,
//!   session registry, per-player locks, the join/quit driver)
//! - [`backends`]: SQLite web application client, file-backed permission
//!   systems, SQL statistics
//!
//! # Records
//!
//! One TOML document per player under `players/`, named by UUID. Records
//! written before UUID keying are named after the player and are still read
//! when no UUID-keyed record exists.
//!
//! ```bash
//! groupbridge init
//! groupbridge sync --name Zaffre --uuid 5f0c2a1e-8a0b-4c4e-9d0f-6a3b2f1e7c11
//! groupbridge show --uuid 5f0c2a1e-8a0b-4c4e-9d0f-6a3b2f1e7c11 --format json
//! ```

pub mod backends;
pub mod core;

use crate::backends::permissions::permission_handler_for;
use crate::backends::webapp::SqlWebApplication;
use crate::core::config::{self, Config};
use crate::core::environment::{Environment, ProcessContext};
use crate::core::error::BridgeError;
use crate::core::player::Player;
use crate::core::player_state::PlayerState;
use crate::core::record::RecordLocation;
use crate::core::sync::SyncDriver;
use crate::core::time;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[clap(
    name = "groupbridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Synchronize web application groups with game permission groups"
)]
struct Cli {
    /// Directory holding groupbridge.toml and the player records.
    #[clap(long, global = true, default_value = ".")]
    dir: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing configuration.
        #[clap(long)]
        force: bool,
    },
    /// Parse and validate the configuration.
    CheckConfig,
    /// Print a player's stored record.
    Show {
        #[clap(long)]
        uuid: Uuid,
        /// Player name, used to find records written before UUID keying.
        #[clap(long)]
        name: Option<String>,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Run a join pass for one player and save the result.
    Sync {
        #[clap(long)]
        name: String,
        #[clap(long)]
        uuid: Uuid,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
}

pub fn run() -> Result<(), BridgeError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { force } => init_config(&cli.dir, force),
        Command::CheckConfig => {
            let config = config::load_config(&cli.dir)?;
            println!("{} Configuration is valid", "✓".bright_green());
            println!("  players dir: {}", config.storage.players_dir.display());
            println!("  web database: {}", config.webapp.database.display());
            println!("  permissions: {:?}", config.permissions.backend);
            Ok(())
        }
        Command::Show { uuid, name, format } => {
            let environment = build_environment(&cli.dir)?;
            let player = Player::new(name.unwrap_or_default(), uuid);
            let mut state = PlayerState::for_player(environment, player, "");
            let location = state.load()?;
            print_state("show", &state, &location, &format)
        }
        Command::Sync { name, uuid, format } => {
            let environment = build_environment(&cli.dir)?;
            let driver = SyncDriver::new(environment);
            let outcome = driver.on_join(&Player::new(name, uuid))?;
            if format == "json" {
                let envelope = time::command_envelope(
                    "sync",
                    "ok",
                    serde_json::json!({
                        "pass_id": outcome.pass_id,
                        "migrated": outcome.migrated(),
                        "changed": outcome.changed(),
                        "before": state_json(&outcome.before),
                        "after": state_json(&outcome.after),
                    }),
                );
                print_json(&envelope)
            } else {
                if outcome.migrated() {
                    println!("{} Migrated legacy record", "▸".bright_yellow());
                }
                print_state("sync", &outcome.after, &outcome.location, &format)?;
                let verdict = if outcome.changed() {
                    "changed since last sync".bright_yellow()
                } else {
                    "unchanged".bright_green()
                };
                println!("  {}", verdict);
                Ok(())
            }
        }
    }
}

fn init_config(dir: &Path, force: bool) -> Result<(), BridgeError> {
    let path = dir.join(config::CONFIG_FILE_NAME);
    if path.exists() && !force {
        println!(
            "{} {} already exists (use {} to overwrite)",
            "⚠".bright_yellow(),
            path.display(),
            "--force".bright_cyan()
        );
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    fs::write(&path, config::DEFAULT_CONFIG_TEMPLATE)?;
    println!("{} Wrote {}", "✓".bright_green(), path.display());
    Ok(())
}

fn build_environment(dir: &Path) -> Result<Arc<Environment>, BridgeError> {
    let config: Config = config::load_config(dir)?;
    let web = Arc::new(SqlWebApplication::from_config(&config));
    let permissions = permission_handler_for(&config.permissions);
    Ok(Environment::new(
        config,
        permissions,
        web,
        ProcessContext::new(dir),
    ))
}

fn state_json(state: &PlayerState) -> serde_json::Value {
    serde_json::json!({
        "player": state.player_name(),
        "uuid": state.player_uuid().to_string(),
        "web_user_id": state.web_user_id(),
        "last_known_name": state.last_known_name(),
        "new": state.is_new_file(),
        "webapp": {
            "primary_group_id": state.webapp_primary_group_id(),
            "group_ids": state.webapp_group_ids(),
        },
        "permissions_system": {
            "primary_group_name": state.permissions_system_primary_group_name(),
            "group_names": state.permissions_system_group_names(),
        },
    })
}

fn print_json(value: &serde_json::Value) -> Result<(), BridgeError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| BridgeError::ValidationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn print_state(
    cmd: &str,
    state: &PlayerState,
    location: &RecordLocation,
    format: &str,
) -> Result<(), BridgeError> {
    match format {
        "json" => {
            let source = match location {
                RecordLocation::Canonical(_) => "canonical",
                RecordLocation::Legacy(_) => "legacy",
                RecordLocation::Absent => "absent",
            };
            let envelope = time::command_envelope(
                cmd,
                "ok",
                serde_json::json!({ "source": source, "state": state_json(state) }),
            );
            print_json(&envelope)
        }
        "text" => {
            let source = match location.path() {
                Some(path) => path.display().to_string(),
                None => "no record".to_string(),
            };
            println!(
                "{} {} {}",
                state.player_uuid().to_string().bright_white(),
                state.player_name().bright_cyan(),
                format!("({})", source).dimmed()
            );
            if state.is_new_file() {
                println!("  {}", "new player".bright_blue());
            }
            if state.was_renamed() {
                println!("  previously known as {}", state.last_known_name().bright_cyan());
            }
            println!(
                "  webapp primary group:      {}",
                or_none(state.webapp_primary_group_id())
            );
            println!(
                "  webapp groups:             {}",
                state.webapp_group_ids().join(", ")
            );
            println!(
                "  permissions primary group: {}",
                or_none(state.permissions_system_primary_group_name())
            );
            println!(
                "  permissions groups:        {}",
                state.permissions_system_group_names().join(", ")
            );
            Ok(())
        }
        other => Err(BridgeError::ValidationError(format!(
            "unknown format {:?}, expected 'text' or 'json'",
            other
        ))),
    }
}

fn or_none(value: &str) -> String {
    if value.is_empty() {
        "-".dimmed().to_string()
    } else {
        value.to_string()
    }
}
