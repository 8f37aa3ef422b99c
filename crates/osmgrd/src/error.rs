//! Error types for osmgrd

use std::io;

use sonic_osmgr_db::DbError;
use thiserror::Error;

/// OS manager daemon errors
#[derive(Error, Debug)]
pub enum OsmgrError {
    /// Netlink socket creation, bind or receive failed
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// Startup enumeration of kernel links failed
    #[error("Link enumeration failed: {0}")]
    Enumerate(String),

    /// Kernel actuation command could not be started
    #[error("Failed to execute '{command}': {source}")]
    ActuatorSpawn {
        /// The command line that failed to start.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Kernel actuation command returned non-zero
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    ActuatorFailed {
        /// The command line.
        command: String,
        /// The exit code, -1 if killed by a signal.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Replication stream error
    #[error("Replication error: {0}")]
    Replication(String),

    /// Table operation error
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Malformed JSON record
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl OsmgrError {
    /// Returns true for errors that leave the daemon unable to do its job.
    ///
    /// Only the kernel event channel and the startup enumeration are fatal;
    /// everything else is handled per event.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OsmgrError::Netlink(_) | OsmgrError::Enumerate(_))
    }
}

/// Result type for osmgrd operations
pub type Result<T> = std::result::Result<T, OsmgrError>;
