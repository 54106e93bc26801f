use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{CallCredential, ProviderKind};
use crate::domain::events::CallTransitioned;

/// Call session aggregate root.
///
/// One value per hosting screen. Every credential request starts a new
/// attempt; `Ended` and `Failed` close the attempt and `reset` returns to
/// `Idle` for a retry.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub provider: ProviderKind,
    pub state: CallState,
    attempt: Option<CallAttemptId>,
    credential: Option<CallCredential>,
    pub created_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            state: CallState::Idle,
            attempt: None,
            credential: None,
            created_at: Utc::now(),
            joined_at: None,
            ended_at: None,
        }
    }

    pub fn attempt(&self) -> Option<&CallAttemptId> {
        self.attempt.as_ref()
    }

    pub fn credential(&self) -> Option<&CallCredential> {
        self.credential.as_ref()
    }

    /// Idle → CredentialsRequested. Opens a new attempt.
    pub fn request_credentials(&mut self) -> Result<CallTransitioned, TransitionError> {
        self.expect(CallStateKind::Idle, "request credentials")?;
        self.attempt = Some(CallAttemptId::generate());
        self.credential = None;
        Ok(self.move_to(CallState::CredentialsRequested))
    }

    /// CredentialsRequested → CredentialsReady
    pub fn credentials_received(
        &mut self,
        credential: CallCredential,
    ) -> Result<CallTransitioned, TransitionError> {
        self.expect(CallStateKind::CredentialsRequested, "accept credentials")?;
        if credential.provider() != self.provider {
            return Err(TransitionError::ProviderMismatch {
                expected: self.provider,
                actual: credential.provider(),
            });
        }
        self.credential = Some(credential);
        Ok(self.move_to(CallState::CredentialsReady))
    }

    /// CredentialsReady → Joining. Hands out the credential to join with and
    /// refuses when none is present.
    pub fn begin_join(&mut self) -> Result<(CallCredential, CallTransitioned), TransitionError> {
        self.expect(CallStateKind::CredentialsReady, "join")?;
        let credential = self
            .credential
            .clone()
            .ok_or(TransitionError::MissingCredentials)?;
        Ok((credential, self.move_to(CallState::Joining)))
    }

    /// Joining → InCall
    pub fn joined(&mut self) -> Result<CallTransitioned, TransitionError> {
        self.expect(CallStateKind::Joining, "mark joined")?;
        self.joined_at = Some(Utc::now());
        Ok(self.move_to(CallState::InCall))
    }

    /// Joining | InCall → Ended
    pub fn end(&mut self) -> Result<CallTransitioned, TransitionError> {
        match self.state.kind() {
            CallStateKind::Joining | CallStateKind::InCall => {
                self.credential = None;
                self.ended_at = Some(Utc::now());
                Ok(self.move_to(CallState::Ended))
            }
            other => Err(TransitionError::Invalid {
                action: "end",
                state: other,
            }),
        }
    }

    /// Any in-flight state → Failed. Credentials are single use and dropped.
    pub fn fail(&mut self, reason: FailureReason) -> Result<CallTransitioned, TransitionError> {
        match self.state.kind() {
            CallStateKind::CredentialsRequested
            | CallStateKind::CredentialsReady
            | CallStateKind::Joining
            | CallStateKind::InCall => {
                self.credential = None;
                self.ended_at = Some(Utc::now());
                Ok(self.move_to(CallState::Failed(reason)))
            }
            other => Err(TransitionError::Invalid {
                action: "fail",
                state: other,
            }),
        }
    }

    /// Ended | Failed → Idle
    pub fn reset(&mut self) -> Result<CallTransitioned, TransitionError> {
        if !self.state.is_terminal() {
            return Err(TransitionError::Invalid {
                action: "reset",
                state: self.state.kind(),
            });
        }
        self.attempt = None;
        self.credential = None;
        self.joined_at = None;
        self.ended_at = None;
        Ok(self.move_to(CallState::Idle))
    }

    fn expect(&self, kind: CallStateKind, action: &'static str) -> Result<(), TransitionError> {
        if self.state.kind() == kind {
            Ok(())
        } else {
            Err(TransitionError::Invalid {
                action,
                state: self.state.kind(),
            })
        }
    }

    fn move_to(&mut self, next: CallState) -> CallTransitioned {
        let from = self.state.kind();
        self.state = next;
        CallTransitioned {
            attempt: self.attempt.clone(),
            from,
            to: self.state.kind(),
        }
    }
}

/// Call lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    CredentialsRequested,
    CredentialsReady,
    Joining,
    InCall,
    Ended,
    Failed(FailureReason),
}

impl CallState {
    pub fn kind(&self) -> CallStateKind {
        match self {
            CallState::Idle => CallStateKind::Idle,
            CallState::CredentialsRequested => CallStateKind::CredentialsRequested,
            CallState::CredentialsReady => CallStateKind::CredentialsReady,
            CallState::Joining => CallStateKind::Joining,
            CallState::InCall => CallStateKind::InCall,
            CallState::Ended => CallStateKind::Ended,
            CallState::Failed(_) => CallStateKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStateKind {
    Idle,
    CredentialsRequested,
    CredentialsReady,
    Joining,
    InCall,
    Ended,
    Failed,
}

/// Which step of the attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePhase {
    Credentials,
    Initialize,
    Join,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub phase: FailurePhase,
    pub message: String,
}

impl FailureReason {
    pub fn new(phase: FailurePhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} while {state:?}")]
    Invalid {
        action: &'static str,
        state: CallStateKind,
    },
    #[error("join attempted without credentials")]
    MissingCredentials,
    #[error("credentials for {actual} delivered to a {expected} call")]
    ProviderMismatch {
        expected: ProviderKind,
        actual: ProviderKind,
    },
}

/// Identifies one credential request → join attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallAttemptId(String);

impl CallAttemptId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
