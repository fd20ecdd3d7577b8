//! Error types for roster fetches, device operations and configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Failure fetching the occupancy roster.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid roster address '{0}'")]
    InvalidAddress(String),

    #[error("roster request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("roster service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("roster response is not a valid occupant list: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("roster request timed out after {secs} seconds")]
    Timeout { secs: u64 },
}

impl FetchError {
    /// Whether the failure is likely to clear up on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::InvalidAddress(_) | FetchError::Decode(_) => false,
        }
    }
}

/// Failure talking to the access-control device.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid device address '{0}'")]
    InvalidAddress(String),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device rejected login: {0}")]
    Authentication(String),

    #[error("device rejected {command}: {message}")]
    Rejected { command: String, message: String },

    #[error("device closed the session: {0}")]
    Fatal(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("device call timed out after {secs} seconds")]
    Timeout { secs: u64 },
}

impl DirectoryError {
    /// Whether the failure is likely to clear up on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::Connect { .. }
                | DirectoryError::Io(_)
                | DirectoryError::Fatal(_)
                | DirectoryError::Timeout { .. }
        )
    }
}

/// Failure reading or validating the persisted settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why one target's cycle stopped early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("target task aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_transient(),
            SyncError::Directory(e) => e.is_transient(),
            SyncError::Aborted(_) => false,
        }
    }
}

/// Errors that carry a timeout variant, so remote calls can be bounded uniformly.
pub trait TimeoutError {
    fn timed_out(secs: u64) -> Self;
}

impl TimeoutError for FetchError {
    fn timed_out(secs: u64) -> Self {
        FetchError::Timeout { secs }
    }
}

impl TimeoutError for DirectoryError {
    fn timed_out(secs: u64) -> Self {
        DirectoryError::Timeout { secs }
    }
}
