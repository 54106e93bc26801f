//! Error types surfaced by the session core

use std::time::Duration;
use thiserror::Error;

use crate::domain::aggregates::{FailurePhase, TransitionError};
use crate::domain::entities::ProviderKind;

/// Credential exchange with the backend failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// 4xx from the backend
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 5xx from the backend
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The attempt was cancelled or superseded before the response arrived
    #[error("Request cancelled")]
    Cancelled,
}

impl NetworkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetworkError::Timeout(_))
    }
}

/// Push connection failed or dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server answered the namespace CONNECT with CONNECT_ERROR
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    Closed,
}

impl From<shared::socketio::PacketError> for ConnectionError {
    fn from(err: shared::socketio::PacketError) -> Self {
        ConnectionError::Protocol(err.to_string())
    }
}

/// Video provider rejected initialize or join
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("{provider} initialize failed: {message}")]
    Initialize {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} join failed: {message}")]
    Join {
        provider: ProviderKind,
        message: String,
    },

    /// Caller bug: join was attempted before initialize completed
    #[error("{provider} join called before initialize completed")]
    NotInitialized { provider: ProviderKind },

    #[error("{provider} cannot join with {actual} credentials")]
    CredentialMismatch {
        provider: ProviderKind,
        actual: ProviderKind,
    },
}

impl JoinError {
    pub fn phase(&self) -> FailurePhase {
        match self {
            JoinError::Initialize { .. } => FailurePhase::Initialize,
            JoinError::Join { .. }
            | JoinError::NotInitialized { .. }
            | JoinError::CredentialMismatch { .. } => FailurePhase::Join,
        }
    }
}

/// Cookie storage failure. Absorbed by the token store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable")]
    Unavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a call attempt driven by the call controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("No adapter registered for {0}")]
    NoProvider(ProviderKind),

    /// The hosting screen went away while the attempt was in flight
    #[error("Call screen unmounted")]
    Unmounted,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
