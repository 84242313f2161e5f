use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] waypoint_core::Error),
    #[error(transparent)]
    Sync(#[from] waypoint_core::SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyId,
    #[error("{kind} not found for id/prefix: {query}")]
    NotFound { kind: String, query: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Background task failed: {0}")]
    Task(String),
    #[error(
        "Sync is not configured. Set supabase_url, anon_key and user_id in the config file or WAYPOINT_* environment variables, or pass --offline-demo."
    )]
    SyncNotConfigured,
    #[error("Authentication expired. Refresh WAYPOINT_ACCESS_TOKEN and run `waypoint sync` again.")]
    AuthRequired,
}
