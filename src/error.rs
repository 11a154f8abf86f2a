//! Error handling module for miniarch
//!
//! Provides the installer's error taxonomy using thiserror. Every fallible
//! library operation returns [`Result`], and every failure is fatal to the
//! run: nothing is retried and nothing already done on disk is rolled back.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallError {
    /// The operator aborted at a prompt. No further side effects are attempted.
    #[error("Installation cancelled by operator")]
    Cancelled,

    /// A required environment capability or enumeration is missing.
    /// Raised before any destructive action.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// An external command exited non-zero.
    #[error("Command `{command}` failed (exit code {}): {}", exit_label(.exit_code), .stderr.trim())]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// An external command could not be started at all.
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A destructive disk step failed part way through.
    #[error(
        "Disk {} is in an indeterminate state and must be wiped again before retrying: {source}",
        .device.display()
    )]
    DeviceIndeterminate {
        device: PathBuf,
        #[source]
        source: Box<InstallError>,
    },

    /// Configuration errors (missing or invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Terminal/UI errors
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// IO errors (target root files, terminal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallError>;

impl InstallError {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a terminal error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Returns true if the operator cancelled the run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Captured stderr of the failing command, if this error came from one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            Self::DeviceIndeterminate { source, .. } => source.stderr(),
            _ => None,
        }
    }

    /// Process exit code to use when this error terminates the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}
