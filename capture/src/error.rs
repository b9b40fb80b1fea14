//! Error types for capture preparation
//!
//! Job-level failures (a dome that fails to park, a declined cover request) are
//! not errors in this sense: they surface as a fatal check result together with an
//! abort command. `PrepareError` covers the failures of the Rust plumbing around
//! the state machine: the options file, the device adaptor and the dispatch channel.

use crate::JobId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the capture preparation plumbing
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Failed to read options file {path}: {source}")]
    OptionsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid options file {path}: {source}")]
    OptionsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A device adaptor could not execute a command
    #[error("Device command '{command}' failed: {message}")]
    Device { command: String, message: String },

    #[error("Unknown capture job: {0}")]
    UnknownJob(JobId),

    #[error("No active capture job")]
    NoActiveJob,

    /// The dispatch loop is gone
    #[error("Preparation driver channel closed: {0}")]
    ChannelClosed(String),
}

impl PrepareError {
    /// Shorthand for adaptor implementations
    pub fn device(command: impl Into<String>, message: impl Into<String>) -> Self {
        PrepareError::Device {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<PrepareError> for String {
    fn from(err: PrepareError) -> String {
        err.to_string()
    }
}

/// Result type for capture preparation plumbing
pub type PrepareResult<T> = Result<T, PrepareError>;
