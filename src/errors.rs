// dbrestore/src/errors.rs
use thiserror::Error;

/// Faults that end a restore run in the `Failed` state.
///
/// Expected early exits (missing fields, absent backup file, existing
/// database) are not errors; see `restore::AbortReason`.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Failed to create database '{database}': {source}")]
    CreateDatabase {
        database: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to start restore tool {tool}: {source}")]
    RestoreToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed while waiting for restore tool: {0}")]
    RestoreToolWait(#[source] std::io::Error),

    #[error("Restore process exited with code {code}")]
    RestoreToolExit { code: i32 },

    #[error("Restore process was terminated by signal")]
    RestoreToolKilled,

    #[error("Failed to list scripts folder {folder}: {source}")]
    ScriptFolder {
        folder: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to connect to database '{database}' for script execution: {source}")]
    ScriptConnection {
        database: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Restore worker stopped unexpectedly: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, RestoreError>;
