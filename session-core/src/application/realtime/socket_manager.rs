//! One push connection per endpoint, shared by every screen that asks.

use parking_lot::Mutex;
use shared::HandshakeAuth;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use super::connection::Connection;
use super::reconnect::{NoReconnect, ReconnectPolicy};
use crate::application::ports::SocketConnector;
use crate::error::ConnectionError;

/// Owns the push connections. Not a global: the composition root creates
/// one and hands it to whoever needs it.
pub struct SocketConnectionManager {
    connector: Arc<dyn SocketConnector>,
    policy: Arc<dyn ReconnectPolicy>,
    handshake_timeout: Duration,
    connections: Mutex<HashMap<String, Connection>>,
}

impl SocketConnectionManager {
    pub fn new(connector: Arc<dyn SocketConnector>) -> Self {
        Self {
            connector,
            policy: Arc::new(NoReconnect),
            handshake_timeout: Duration::from_secs(10),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// The connection for `url`, created on first demand with `token` as
    /// handshake auth. Later calls return the same instance and ignore
    /// `token`; the connection never re-authenticates.
    ///
    /// Must be called inside a tokio runtime.
    pub fn get_connection(&self, url: &str, token: &str) -> Result<Connection, ConnectionError> {
        let endpoint = normalize(url)?;
        let key = endpoint.to_string();

        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(&key) {
            return Ok(existing.clone());
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ConnectionError::Transport(
                "no async runtime to drive the connection".to_string(),
            ));
        }

        info!(url = %key, "opening push connection");
        let connection = Connection::open(
            endpoint,
            HandshakeAuth {
                access_token: token.to_string(),
            },
            self.connector.clone(),
            self.policy.clone(),
            self.handshake_timeout,
        );
        connections.insert(key, connection.clone());
        Ok(connection)
    }

    pub fn connection(&self, url: &str) -> Option<Connection> {
        let key = normalize(url).ok()?.to_string();
        self.connections.lock().get(&key).cloned()
    }

    /// Close and forget the connection for `url`
    pub fn close(&self, url: &str) -> bool {
        let Ok(endpoint) = normalize(url) else {
            return false;
        };
        match self.connections.lock().remove(endpoint.as_str()) {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<Connection> = self.connections.lock().drain().map(|(_, c)| c).collect();
        for connection in drained {
            connection.close();
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

impl Drop for SocketConnectionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn normalize(url: &str) -> Result<Url, ConnectionError> {
    let parsed = Url::parse(url).map_err(|e| ConnectionError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(parsed),
        other => Err(ConnectionError::InvalidUrl(format!(
            "unsupported scheme {}",
            other
        ))),
    }
}
