//! Error taxonomy for talking to the control authority.
//!
//! Network and protocol failures during polling are recovered by the sync
//! loop; validation and remote failures on user commands are handed back to
//! the caller unchanged.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Remote errors
// ---------------------------------------------------------------------------

/// The request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// The backend answered, but not with what we asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("backend returned {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error("malformed payload: {0}")]
    Malformed(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network: {0}")]
    Network(#[from] NetworkError),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout.into()
        } else if e.is_connect() {
            NetworkError::Connect(e.to_string()).into()
        } else if e.is_decode() {
            ProtocolError::Malformed(e.to_string()).into()
        } else {
            NetworkError::Request(e.to_string()).into()
        }
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be between 0 and 100, got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("low_threshold ({low}) must not exceed high_threshold ({high})")]
    InvertedBand { low: f64, high: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationError),
    #[error("write failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("pump can only be toggled in manual mode")]
    AutomaticMode,
    #[error("no configuration confirmed by the backend yet")]
    NotSynced,
}

// ===========================================================================
// Tests
// ===========================================================================
