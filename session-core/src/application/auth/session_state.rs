//! Observable, versioned view of the decoded session.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::auth_events::Unsubscribe;
use super::session_decoder::{self, SessionStatus};
use super::token_store::TokenStore;
use crate::domain::entities::DecodedClaims;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Bumped on every auth event, even when the status is unchanged
    pub version: u64,
    pub status: SessionStatus,
}

impl SessionSnapshot {
    pub fn claims(&self) -> Option<&DecodedClaims> {
        self.status.claims()
    }
}

/// Re-decodes the stored token every time the auth bus fires and publishes
/// the result on a watch channel.
pub struct SessionState {
    store: TokenStore,
    tx: Arc<watch::Sender<SessionSnapshot>>,
    subscription: Mutex<Option<Unsubscribe>>,
}

impl SessionState {
    pub fn attach(store: TokenStore) -> Self {
        let initial = SessionSnapshot {
            version: 0,
            status: session_decoder::resolve(store.access_token().as_deref()),
        };
        let (tx, _rx) = watch::channel(initial);
        let tx = Arc::new(tx);

        let listener_store = store.clone();
        let listener_tx = tx.clone();
        let subscription = store.events().subscribe(move || {
            publish(&listener_store, &listener_tx);
        });

        Self {
            store,
            tx,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn current(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Re-read the store without waiting for an auth event
    pub fn refresh(&self) {
        publish(&self.store, &self.tx);
    }

    /// Stop following the auth bus. Later token changes are not observed.
    pub fn detach(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.detach();
    }
}

fn publish(store: &TokenStore, tx: &watch::Sender<SessionSnapshot>) {
    let status = session_decoder::resolve(store.access_token().as_deref());
    tx.send_modify(|snapshot| {
        snapshot.version += 1;
        if snapshot.status.is_authenticated() != status.is_authenticated() {
            info!(
                version = snapshot.version,
                authenticated = status.is_authenticated(),
                "session changed"
            );
        }
        snapshot.status = status;
    });
}
