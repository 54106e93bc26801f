//! Shared holder of the credentials for the call attempt in progress.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::aggregates::CallAttemptId;
use crate::domain::entities::CallCredential;

/// "Not loaded yet" is `Empty` or `Pending`, never a sentinel inside the
/// credential.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallConfigSlot {
    #[default]
    Empty,
    Pending {
        attempt: CallAttemptId,
    },
    Ready {
        attempt: CallAttemptId,
        credential: CallCredential,
    },
}

impl CallConfigSlot {
    pub fn attempt(&self) -> Option<&CallAttemptId> {
        match self {
            CallConfigSlot::Empty => None,
            CallConfigSlot::Pending { attempt } | CallConfigSlot::Ready { attempt, .. } => {
                Some(attempt)
            }
        }
    }

    pub fn credential(&self) -> Option<&CallCredential> {
        match self {
            CallConfigSlot::Ready { credential, .. } => Some(credential),
            _ => None,
        }
    }
}

/// Observable call-config slot. Only the attempt currently holding the slot
/// may fill it.
#[derive(Clone)]
pub struct CallConfigStore {
    tx: Arc<watch::Sender<CallConfigSlot>>,
}

impl Default for CallConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CallConfigStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CallConfigSlot::Empty);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> CallConfigSlot {
        self.tx.borrow().clone()
    }

    pub fn credential(&self) -> Option<CallCredential> {
        self.tx.borrow().credential().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallConfigSlot> {
        self.tx.subscribe()
    }

    /// Claim the slot for `attempt`, superseding whatever held it
    pub fn begin(&self, attempt: CallAttemptId) {
        self.tx.send_replace(CallConfigSlot::Pending { attempt });
    }

    /// Fill the slot. Returns false, leaving the slot alone, when `attempt`
    /// no longer holds it.
    pub fn fulfil(&self, attempt: &CallAttemptId, credential: CallCredential) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            CallConfigSlot::Pending { attempt: current } if current == attempt => {
                *slot = CallConfigSlot::Ready {
                    attempt: attempt.clone(),
                    credential,
                };
                true
            }
            _ => {
                debug!(%attempt, "slot no longer held by attempt");
                false
            }
        })
    }

    /// Release the slot if `attempt` still holds it
    pub fn abandon(&self, attempt: &CallAttemptId) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.attempt() == Some(attempt) {
                *slot = CallConfigSlot::Empty;
                true
            } else {
                false
            }
        })
    }

    pub fn clear(&self) {
        self.tx.send_replace(CallConfigSlot::Empty);
    }
}
