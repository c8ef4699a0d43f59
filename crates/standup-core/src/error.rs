use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StandupError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config:\n  {}", .0.join("\n  "))]
    InvalidConfig(Vec<String>),

    #[error("invalid schedule for {phase} phase '{expr}': {reason}")]
    InvalidSchedule {
        phase: String,
        expr: String,
        reason: String,
    },

    #[error("invalid member name '{0}': must be a valid IRC nickname")]
    InvalidMember(String),

    #[error("membership store unavailable at {}: {source}", path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reset membership store at {} ({removed} markers removed): {source}", path.display())]
    ResetFailure {
        path: PathBuf,
        removed: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StandupError>;
