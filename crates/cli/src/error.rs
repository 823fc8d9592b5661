//! Error types for wdtctl

use std::path::PathBuf;
use thiserror::Error;
use wdt_supervisor::SupervisorError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Supervisor(SupervisorError::Calibration(_)) => 3,
            Self::InvalidArgument(_)
            | Self::ConfigRead { .. }
            | Self::JsonError(_)
            | Self::Supervisor(SupervisorError::InvalidConfiguration(_)) => 4,
            Self::Supervisor(SupervisorError::ResourceBusy(_)) => 5,
            Self::Supervisor(_) => 1,
        }
    }
}
