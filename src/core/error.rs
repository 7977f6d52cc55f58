use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{collaborator} lookup failed: {reason}")]
    DependencyFailure {
        collaborator: &'static str,
        reason: String,
    },
    #[error("Corrupt player record {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },
    #[error("Failed to write player record {}: {source}", path.display())]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl BridgeError {
    pub fn dependency(collaborator: &'static str, err: impl std::fmt::Display) -> Self {
        Self::DependencyFailure {
            collaborator,
            reason: err.to_string(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            source,
        }
    }

    /// Wraps a collaborator error as a dependency failure, leaving errors
    /// that already are one untouched.
    pub fn into_dependency(self, collaborator: &'static str) -> Self {
        match self {
            Self::DependencyFailure { .. } => self,
            other => Self::dependency(collaborator, other),
        }
    }

    /// Whether repeating the failed call can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DependencyFailure { .. } | Self::PersistenceFailure { .. } | Self::IoError(_)
        )
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}
