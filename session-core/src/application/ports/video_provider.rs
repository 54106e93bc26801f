use async_trait::async_trait;

use crate::domain::entities::{CallCredential, ProviderKind};
use crate::error::JoinError;

/// Where the provider mounts its native video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEnvironment {
    pub container: String,
}

impl ProviderEnvironment {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }
}

/// One video SDK behind the common initialize / join / leave surface.
///
/// `initialize` is idempotent. `join` before `initialize` has completed
/// fails with [`JoinError::NotInitialized`]. `leave` releases the mounted
/// surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn is_initialized(&self) -> bool;
    async fn initialize(&self, environment: ProviderEnvironment) -> Result<(), JoinError>;
    async fn join(&self, credential: CallCredential) -> Result<(), JoinError>;
    async fn leave(&self) -> Result<(), JoinError>;
}
