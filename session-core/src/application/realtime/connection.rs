//! A single shared push connection and its listener table.

use parking_lot::Mutex;
use serde_json::{json, Value};
use shared::socketio::{SocketPacket, DEFAULT_NAMESPACE};
use shared::HandshakeAuth;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::reconnect::ReconnectPolicy;
use crate::application::ports::{LinkCommand, LinkEvent, SocketConnector, SocketLink};
use crate::error::ConnectionError;

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_RECONNECT_ATTEMPT: &str = "reconnect_attempt";

/// Connection state of the push link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    Connected,
    /// Waiting before retry number `attempt`
    Reconnecting { attempt: u32 },
    /// Gave up, or the server refused or ended the session
    Disconnected,
    /// Closed by the owner
    Closed,
}

impl ConnectionState {
    /// No further transitions happen from here
    pub fn is_final(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Closed)
    }
}

/// Handler for an inbound event; receives the first event argument
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

struct Inner {
    url: Url,
    auth: HandshakeAuth,
    state: watch::Sender<ConnectionState>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventHandler)>>>,
    commands: Mutex<Option<mpsc::UnboundedSender<LinkCommand>>>,
    outbox: Mutex<Vec<SocketPacket>>,
    last_error: Mutex<Option<ConnectionError>>,
    sid: Mutex<Option<String>>,
    shutdown: CancellationToken,
}

/// Handle to a push connection.
///
/// Cheap to clone; every clone refers to the same underlying link. Emits made
/// before the handshake completes are buffered and flushed on connect.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Start the link driver on the current runtime
    pub(crate) fn open(
        url: Url,
        auth: HandshakeAuth,
        connector: Arc<dyn SocketConnector>,
        policy: Arc<dyn ReconnectPolicy>,
        handshake_timeout: Duration,
    ) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Connecting);
        let inner = Arc::new(Inner {
            url,
            auth,
            state,
            listeners: Mutex::new(HashMap::new()),
            commands: Mutex::new(None),
            outbox: Mutex::new(Vec::new()),
            last_error: Mutex::new(None),
            sid: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(drive(inner.clone(), connector, policy, handshake_timeout));

        Self { inner }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// True when both handles refer to the same connection
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn sid(&self) -> Option<String> {
        self.inner.sid.lock().clone()
    }

    pub fn last_error(&self) -> Option<ConnectionError> {
        self.inner.last_error.lock().clone()
    }

    /// Register a listener. Many listeners may share an event name; each is
    /// removed independently with [`Connection::off`].
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        self.inner
            .listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let Some(handlers) = listeners.get_mut(event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Send an application event
    pub fn emit(&self, event: &str, data: Value) -> Result<(), ConnectionError> {
        if matches!(
            self.state(),
            ConnectionState::Closed | ConnectionState::Disconnected
        ) {
            return Err(ConnectionError::Closed);
        }

        let packet = SocketPacket::event(event, data);
        let commands = self.inner.commands.lock();
        match commands.as_ref() {
            Some(tx) => tx
                .send(LinkCommand::Send(packet))
                .map_err(|_| ConnectionError::Closed),
            None => {
                self.inner.outbox.lock().push(packet);
                Ok(())
            }
        }
    }

    /// Wait until connected, failing on refusal, give-up or timeout
    pub async fn wait_connected(&self, limit: Duration) -> Result<(), ConnectionError> {
        let mut rx = self.state_receiver();
        let wait = async {
            loop {
                let state = *rx.borrow_and_update();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Closed => return Err(ConnectionError::Closed),
                    ConnectionState::Disconnected => {
                        return Err(self.last_error().unwrap_or(ConnectionError::Closed))
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(ConnectionError::Closed);
                }
            }
        };
        timeout(limit, wait)
            .await
            .map_err(|_| ConnectionError::Timeout(limit))?
    }

    /// Close the link. Further emits fail; listeners stay registered but
    /// never fire again.
    pub fn close(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!(url = %self.inner.url, "closing push connection");
        self.inner.shutdown.cancel();
        if let Some(tx) = self.inner.commands.lock().take() {
            let _ = tx.send(LinkCommand::Close);
        }
        self.inner.state.send_replace(ConnectionState::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Inner {
    /// Closed is final
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn dispatch(&self, event: &str, data: &Value) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .get(event)
            .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        debug!(event, listeners = handlers.len(), "dispatching");
        for handler in handlers {
            handler(data);
        }
    }

    fn record_error(&self, error: &ConnectionError) {
        *self.last_error.lock() = Some(error.clone());
    }

    fn attach(&self, link: &SocketLink) {
        *self.sid.lock() = link.sid.clone();
        *self.last_error.lock() = None;

        let mut commands = self.commands.lock();
        for packet in self.outbox.lock().drain(..) {
            let _ = link.commands.send(LinkCommand::Send(packet));
        }
        *commands = Some(link.commands.clone());
        drop(commands);

        self.set_state(ConnectionState::Connected);
    }

    fn detach(&self) {
        self.commands.lock().take();
        self.sid.lock().take();
    }
}

enum LinkOutcome {
    /// Owner closed the connection
    Shutdown,
    /// Server ended the session; do not retry
    ServerDisconnect,
    /// Link dropped or failed
    Dropped(Option<ConnectionError>),
}

async fn drive(
    inner: Arc<Inner>,
    connector: Arc<dyn SocketConnector>,
    policy: Arc<dyn ReconnectPolicy>,
    handshake_timeout: Duration,
) {
    let mut attempt: u32 = 0;

    loop {
        let connecting = timeout(handshake_timeout, connector.connect(&inner.url, &inner.auth));
        let result = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            result = connecting => result.unwrap_or(Err(ConnectionError::Timeout(handshake_timeout))),
        };

        let outcome = match result {
            Ok(link) => {
                attempt = 0;
                info!(url = %inner.url, sid = ?link.sid, "push connection established");
                inner.attach(&link);
                inner.dispatch(EVENT_CONNECT, &Value::Null);
                pump(&inner, link).await
            }
            Err(error) => {
                warn!(url = %inner.url, error = %error, "push connection failed");
                inner.record_error(&error);
                inner.dispatch(EVENT_CONNECT_ERROR, &json!({ "message": error.to_string() }));
                if matches!(error, ConnectionError::Refused(_)) {
                    inner.set_state(ConnectionState::Disconnected);
                    return;
                }
                LinkOutcome::Dropped(Some(error))
            }
        };

        match outcome {
            LinkOutcome::Shutdown => return,
            LinkOutcome::ServerDisconnect => {
                inner.set_state(ConnectionState::Disconnected);
                return;
            }
            LinkOutcome::Dropped(_) => {}
        }

        attempt += 1;
        let Some(delay) = policy.next_delay(attempt) else {
            info!(url = %inner.url, "giving up on push connection");
            inner.set_state(ConnectionState::Disconnected);
            return;
        };

        inner.set_state(ConnectionState::Reconnecting { attempt });
        inner.dispatch(EVENT_RECONNECT_ATTEMPT, &json!(attempt));
        debug!(attempt, ?delay, "reconnecting");

        tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        inner.set_state(ConnectionState::Connecting);
    }
}

async fn pump(inner: &Arc<Inner>, mut link: SocketLink) -> LinkOutcome {
    let outcome = loop {
        let event = tokio::select! {
            _ = inner.shutdown.cancelled() => {
                let _ = link.commands.send(LinkCommand::Close);
                break LinkOutcome::Shutdown;
            }
            event = link.events.recv() => event,
        };

        match event {
            Some(LinkEvent::Packet(packet)) if packet.namespace() != DEFAULT_NAMESPACE => {
                debug!(namespace = packet.namespace(), "ignoring packet for another namespace");
            }
            Some(LinkEvent::Packet(packet)) => match packet {
                SocketPacket::Event { name, args, .. } => {
                    let data = match args.len() {
                        0 => Value::Null,
                        1 => args.into_iter().next().unwrap_or(Value::Null),
                        _ => Value::Array(args),
                    };
                    inner.dispatch(&name, &data);
                }
                SocketPacket::Disconnect { .. } => {
                    info!(url = %inner.url, "server ended the push session");
                    break LinkOutcome::ServerDisconnect;
                }
                SocketPacket::ConnectError { data, .. } => {
                    let error = ConnectionError::Refused(refusal_message(&data));
                    inner.record_error(&error);
                    inner.dispatch(EVENT_CONNECT_ERROR, &data);
                    break LinkOutcome::ServerDisconnect;
                }
                other => debug!(packet = ?other, "ignoring packet"),
            },
            Some(LinkEvent::Closed(None)) => break LinkOutcome::Dropped(None),
            Some(LinkEvent::Closed(Some(error))) => {
                warn!(url = %inner.url, error = %error, "push connection dropped");
                inner.record_error(&error);
                break LinkOutcome::Dropped(Some(error));
            }
            None => break LinkOutcome::Dropped(None),
        }
    };

    inner.detach();
    if !matches!(outcome, LinkOutcome::Shutdown) {
        let reason = match &outcome {
            LinkOutcome::ServerDisconnect => "io server disconnect".to_string(),
            LinkOutcome::Dropped(Some(error)) => error.to_string(),
            _ => "transport close".to_string(),
        };
        inner.dispatch(EVENT_DISCONNECT, &json!({ "reason": reason }));
    }
    outcome
}

/// Message of a CONNECT_ERROR payload (`{"message": ...}` or a bare string)
pub(crate) fn refusal_message(data: &Value) -> String {
    match data {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        other => other.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;
    use crate::application::realtime::reconnect::{ExponentialBackoff, NoReconnect};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn url() -> Url {
        Url::parse("http://push.test").unwrap()
    }

    fn auth() -> HandshakeAuth {
        HandshakeAuth {
            access_token: "tok".to_string(),
        }
    }

    fn open(connector: Arc<FakeConnector>, policy: Arc<dyn ReconnectPolicy>) -> Connection {
        Connection::open(url(), auth(), connector, policy, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_connect_fires_connect_listeners() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(connector.clone(), Arc::new(NoReconnect));

        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let fired = fired.clone();
            connection.on(EVENT_CONNECT, move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let _peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(connector.auths.lock()[0].access_token, "tok");
        assert_eq!(connection.sid().as_deref(), Some("sid-1"));
    }

    #[tokio::test]
    async fn test_inbound_events_reach_listeners_until_removed() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(connector, Arc::new(NoReconnect));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let first_tx = tx.clone();
        let first = connection.on("receive_message", move |data| {
            let _ = first_tx.send(("first", data.clone()));
        });
        connection.on("receive_message", move |data| {
            let _ = tx.send(("second", data.clone()));
        });

        let peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        peer.push_event("receive_message", json!({"text": "hi"}));
        assert_eq!(rx.recv().await.unwrap(), ("first", json!({"text": "hi"})));
        assert_eq!(rx.recv().await.unwrap(), ("second", json!({"text": "hi"})));

        assert!(connection.off("receive_message", first));
        assert!(!connection.off("receive_message", first));
        peer.push_event("receive_message", json!({"text": "again"}));
        assert_eq!(rx.recv().await.unwrap(), ("second", json!({"text": "again"})));
        assert_eq!(connection.listener_count("receive_message"), 1);
    }

    #[tokio::test]
    async fn test_emit_before_connect_is_flushed() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(connector, Arc::new(NoReconnect));

        connection
            .emit("join_conversations", json!({"conversations": ["c1"]}))
            .unwrap();

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(
            peer.next_command().await,
            Some(LinkCommand::Send(SocketPacket::event(
                "join_conversations",
                json!({"conversations": ["c1"]})
            )))
        );

        connection.wait_connected(Duration::from_secs(2)).await.unwrap();
        connection.emit("mark_read", json!({"id": "n1"})).unwrap();
        assert_eq!(
            peer.next_command().await,
            Some(LinkCommand::Send(SocketPacket::event("mark_read", json!({"id": "n1"}))))
        );
    }

    #[tokio::test]
    async fn test_refused_handshake_surfaces_connect_error_without_retry() {
        let (connector, _peers) = FakeConnector::new();
        connector.push_outcome(Err(ConnectionError::Refused("invalid token".into())));

        let connection = open(
            connector.clone(),
            Arc::new(ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5))),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.on(EVENT_CONNECT_ERROR, move |data| {
            let _ = tx.send(data.clone());
        });

        let err = connection
            .wait_connected(Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, ConnectionError::Refused("invalid token".into()));
        assert_eq!(
            rx.recv().await.unwrap(),
            json!({"message": "Connection refused: invalid token"})
        );
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connector.call_count(), 1);
        assert!(connection.emit("x", Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_drop_notifies_listeners_and_reconnects_per_policy() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(
            connector.clone(),
            Arc::new(
                ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(10))
                    .without_jitter(),
            ),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        for event in [EVENT_CONNECT, EVENT_DISCONNECT, EVENT_RECONNECT_ATTEMPT] {
            let tx = tx.clone();
            connection.on(event, move |data| {
                let _ = tx.send((event, data.clone()));
            });
        }

        let peer = peers.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().0, EVENT_CONNECT);

        peer.drop_link(ConnectionError::Transport("reset by peer".into()));
        let (event, data) = rx.recv().await.unwrap();
        assert_eq!(event, EVENT_DISCONNECT);
        assert_eq!(data, json!({"reason": "Transport error: reset by peer"}));
        assert_eq!(rx.recv().await.unwrap(), (EVENT_RECONNECT_ATTEMPT, json!(1)));

        let _second = peers.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().0, EVENT_CONNECT);
        assert_eq!(connector.call_count(), 2);
        assert_eq!(connection.last_error(), None);
    }

    #[tokio::test]
    async fn test_no_reconnect_policy_gives_up_after_drop() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(connector.clone(), Arc::new(NoReconnect));
        let peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        let mut state = connection.state_receiver();
        peer.drop_link(ConnectionError::Transport("gone".into()));
        while *state.borrow_and_update() != ConnectionState::Disconnected {
            state.changed().await.unwrap();
        }
        assert_eq!(
            connection.last_error(),
            Some(ConnectionError::Transport("gone".into()))
        );
        assert_eq!(connector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_close_sends_close_and_stops() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(connector, Arc::new(NoReconnect));
        let mut peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        connection.close();
        assert_eq!(peer.next_command().await, Some(LinkCommand::Close));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.emit("x", Value::Null), Err(ConnectionError::Closed));
    }

    async fn wait_for_state(connection: &Connection, wanted: ConnectionState) {
        let mut state = connection.state_receiver();
        timeout(Duration::from_secs(2), async {
            while *state.borrow_and_update() != wanted {
                state.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_handshake_timeout_surfaces_connect_error() {
        let limit = Duration::from_millis(50);
        let connection = Connection::open(
            url(),
            auth(),
            Arc::new(HangingConnector),
            Arc::new(NoReconnect),
            limit,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.on(EVENT_CONNECT_ERROR, move |data| {
            let _ = tx.send(data.clone());
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            json!({ "message": ConnectionError::Timeout(limit).to_string() })
        );
        wait_for_state(&connection, ConnectionState::Disconnected).await;
        assert_eq!(connection.last_error(), Some(ConnectionError::Timeout(limit)));
    }

    #[tokio::test]
    async fn test_server_disconnect_ends_without_retry() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(
            connector.clone(),
            Arc::new(ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5))),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.on(EVENT_DISCONNECT, move |data| {
            let _ = tx.send(data.clone());
        });

        let peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        peer.push_packet(SocketPacket::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        });
        assert_eq!(rx.recv().await.unwrap(), json!({"reason": "io server disconnect"}));
        wait_for_state(&connection, ConnectionState::Disconnected).await;
        assert_eq!(connection.sid(), None);
        assert_eq!(connector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_error_mid_session_is_a_refusal() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(
            connector.clone(),
            Arc::new(ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5))),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.on(EVENT_CONNECT_ERROR, move |data| {
            let _ = tx.send(data.clone());
        });

        let peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        peer.push_packet(SocketPacket::ConnectError {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: json!({"message": "session revoked"}),
        });
        assert_eq!(rx.recv().await.unwrap(), json!({"message": "session revoked"}));
        wait_for_state(&connection, ConnectionState::Disconnected).await;
        assert_eq!(
            connection.last_error(),
            Some(ConnectionError::Refused("session revoked".into()))
        );
        assert_eq!(connector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_other_namespaces_are_ignored() {
        let (connector, mut peers) = FakeConnector::new();
        let connection = open(connector, Arc::new(NoReconnect));
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.on("notification", move |data| {
            let _ = tx.send(data.clone());
        });

        let peer = peers.recv().await.unwrap();
        connection.wait_connected(Duration::from_secs(2)).await.unwrap();

        peer.push_packet(SocketPacket::Event {
            namespace: "/admin".to_string(),
            id: None,
            name: "notification".to_string(),
            args: vec![json!({"id": "admin"})],
        });
        peer.push_packet(SocketPacket::Disconnect {
            namespace: "/admin".to_string(),
        });
        peer.push_event("notification", json!({"id": "n1"}));

        assert_eq!(rx.recv().await.unwrap(), json!({"id": "n1"}));
        assert_eq!(connection.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_refusal_message_shapes() {
        assert_eq!(refusal_message(&json!({"message": "nope"})), "nope");
        assert_eq!(refusal_message(&json!("bare")), "bare");
        assert_eq!(refusal_message(&json!(3)), "3");
    }
}
