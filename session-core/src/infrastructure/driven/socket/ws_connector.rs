//! Socket.IO client transport over tokio-tungstenite. Websocket only, no
//! long-polling fallback.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use shared::socketio::{EnginePacket, OpenPayload, SocketPacket, DEFAULT_NAMESPACE, DEFAULT_PATH, ENGINE_IO_VERSION};
use shared::HandshakeAuth;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::ports::{LinkCommand, LinkEvent, SocketConnector, SocketLink};
use crate::application::realtime::connection::refusal_message;
use crate::error::ConnectionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Stand-in deadline for windows too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Engine.IO websocket endpoint for a configured socket url
pub fn socket_endpoint(url: &Url, path: &str) -> Result<Url, ConnectionError> {
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectionError::InvalidUrl(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };

    let mut endpoint = url.clone();
    endpoint
        .set_scheme(scheme)
        .map_err(|_| ConnectionError::InvalidUrl(url.to_string()))?;
    endpoint.set_path(path);
    endpoint.set_fragment(None);
    endpoint
        .query_pairs_mut()
        .clear()
        .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
        .append_pair("transport", "websocket");
    Ok(endpoint)
}

pub struct TungsteniteConnector {
    path: String,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url, auth: &HandshakeAuth) -> Result<SocketLink, ConnectionError> {
        let endpoint = socket_endpoint(url, &self.path)?;
        debug!(%endpoint, "opening websocket");

        let (mut ws, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let open = loop {
            match next_packet(&mut ws).await? {
                EnginePacket::Open(open) => break open,
                EnginePacket::Noop => continue,
                other => {
                    return Err(ConnectionError::Protocol(format!(
                        "expected open packet, got {:?}",
                        other
                    )))
                }
            }
        };

        let auth = serde_json::to_value(auth).map_err(|e| ConnectionError::Protocol(e.to_string()))?;
        send_text(&mut ws, SocketPacket::connect(Some(auth)).to_frame()).await?;

        let sid = loop {
            match next_packet(&mut ws).await? {
                EnginePacket::Ping(data) => {
                    send_text(&mut ws, EnginePacket::Pong(data).encode()).await?;
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect { data, .. } => {
                        break data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .map(str::to_string);
                    }
                    SocketPacket::ConnectError { data, .. } => {
                        let _ = ws.close(None).await;
                        return Err(ConnectionError::Refused(refusal_message(&data)));
                    }
                    other => debug!(?other, "packet before namespace connect, skipped"),
                },
                EnginePacket::Close => return Err(ConnectionError::Closed),
                _ => {}
            }
        };

        info!(engine_sid = %open.sid, socket_sid = ?sid, "socket connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, heartbeat_window(&open), commands_rx, events_tx));

        Ok(SocketLink {
            sid,
            commands: commands_tx,
            events: events_rx,
        })
    }
}

/// Longest silence tolerated before the server is presumed gone
fn heartbeat_window(open: &OpenPayload) -> Duration {
    Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout))
}

fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window).unwrap_or(now + FAR_FUTURE)
}

async fn send_text(ws: &mut WsStream, frame: String) -> Result<(), ConnectionError> {
    ws.send(Message::Text(frame))
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))
}

async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, ConnectionError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(&text)?),
            Some(Ok(Message::Binary(_))) => {
                return Err(ConnectionError::Protocol("unexpected binary frame".to_string()))
            }
            Some(Ok(Message::Close(_))) | None => return Err(ConnectionError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
        }
    }
}

async fn pump(
    ws: WsStream,
    window: Duration,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut deadline = deadline_after(window);

    let outcome = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send(packet)) => {
                    if let Err(e) = sink.send(Message::Text(packet.to_frame())).await {
                        break Some(ConnectionError::Transport(e.to_string()));
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let goodbye = SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    };
                    let _ = sink.send(Message::Text(goodbye.to_frame())).await;
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                }
            },
            frame = stream.next() => {
                deadline = deadline_after(window);
                match frame {
                    Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text) {
                        Ok(EnginePacket::Ping(data)) => {
                            if let Err(e) = sink.send(Message::Text(EnginePacket::Pong(data).encode())).await {
                                break Some(ConnectionError::Transport(e.to_string()));
                            }
                        }
                        Ok(EnginePacket::Message(body)) => match SocketPacket::decode(&body) {
                            Ok(packet) => {
                                if events.send(LinkEvent::Packet(packet)).is_err() {
                                    let _ = sink.send(Message::Close(None)).await;
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "undecodable socket packet dropped"),
                        },
                        Ok(EnginePacket::Close) => break Some(ConnectionError::Closed),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "undecodable engine packet dropped"),
                    },
                    Some(Ok(Message::Close(_))) | None => break Some(ConnectionError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(ConnectionError::Transport(e.to_string())),
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(?window, "no heartbeat from server");
                break Some(ConnectionError::Timeout(window));
            }
        }
    };

    debug!(error = ?outcome, "socket link finished");
    let _ = events.send(LinkEvent::Closed(outcome));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
    use axum::extract::{Query, State};
    use axum::response::Response;
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use std::collections::HashMap;

    const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    async fn recv_text(socket: &mut WebSocket) -> Option<String> {
        while let Some(Ok(message)) = socket.recv().await {
            if let WsMessage::Text(text) = message {
                return Some(text);
            }
        }
        None
    }

    // Minimal Socket.IO server. The access token selects the behaviour.
    async fn session(mut socket: WebSocket, frames: mpsc::UnboundedSender<String>) {
        socket.send(WsMessage::Text(OPEN.to_string())).await.unwrap();

        let connect = recv_text(&mut socket).await.unwrap();
        let auth: Value = serde_json::from_str(&connect[2..]).unwrap();
        let token = auth["access_token"].as_str().unwrap_or_default().to_string();

        if token == "refuse" {
            let _ = socket
                .send(WsMessage::Text(r#"44{"message":"Not authorized"}"#.to_string()))
                .await;
            return;
        }
        socket
            .send(WsMessage::Text(r#"40{"sid":"sock-1"}"#.to_string()))
            .await
            .unwrap();
        if token == "drop" {
            return;
        }

        socket.send(WsMessage::Text("2".to_string())).await.unwrap();
        if let Some(pong) = recv_text(&mut socket).await {
            let _ = frames.send(pong);
        }
        let welcome = SocketPacket::event("welcome", json!({ "token": token })).to_frame();
        socket.send(WsMessage::Text(welcome)).await.unwrap();

        while let Some(text) = recv_text(&mut socket).await {
            let _ = frames.send(text);
        }
    }

    async fn upgrade(
        ws: WebSocketUpgrade,
        Query(query): Query<HashMap<String, String>>,
        State(frames): State<mpsc::UnboundedSender<String>>,
    ) -> Response {
        let _ = frames.send(format!(
            "query:{}:{}",
            query.get("EIO").cloned().unwrap_or_default(),
            query.get("transport").cloned().unwrap_or_default()
        ));
        ws.on_upgrade(move |socket| session(socket, frames))
    }

    async fn serve() -> (Url, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Router::new()
            .route("/socket.io/", get(upgrade))
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (Url::parse(&format!("http://{}", addr)).unwrap(), rx)
    }

    fn auth(token: &str) -> HandshakeAuth {
        HandshakeAuth {
            access_token: token.to_string(),
        }
    }

    #[test]
    fn test_socket_endpoint() {
        let url = Url::parse("https://api.example.com/app?x=1#frag").unwrap();
        let endpoint = socket_endpoint(&url, DEFAULT_PATH).unwrap();
        assert_eq!(
            endpoint.as_str(),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket"
        );

        let url = Url::parse("http://localhost:8000").unwrap();
        assert_eq!(
            socket_endpoint(&url, DEFAULT_PATH).unwrap().as_str(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );

        let url = Url::parse("ftp://files.example.com").unwrap();
        assert!(matches!(
            socket_endpoint(&url, DEFAULT_PATH),
            Err(ConnectionError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_and_traffic() {
        let (url, mut frames) = serve().await;
        let connector = TungsteniteConnector::new();

        let mut link = connector.connect(&url, &auth("tok")).await.unwrap();
        assert_eq!(link.sid.as_deref(), Some("sock-1"));
        assert_eq!(frames.recv().await.unwrap(), "query:4:websocket");

        // pong answered by the link itself
        assert_eq!(frames.recv().await.unwrap(), "3");
        assert_eq!(
            link.events.recv().await,
            Some(LinkEvent::Packet(SocketPacket::event(
                "welcome",
                json!({ "token": "tok" })
            )))
        );

        link.commands
            .send(LinkCommand::Send(SocketPacket::event("mark_read", json!({"id": "n1"}))))
            .unwrap();
        assert_eq!(frames.recv().await.unwrap(), r#"42["mark_read",{"id":"n1"}]"#);

        link.commands.send(LinkCommand::Close).unwrap();
        assert_eq!(link.events.recv().await, Some(LinkEvent::Closed(None)));
        assert_eq!(frames.recv().await.unwrap(), "41");
    }

    #[tokio::test]
    async fn test_connect_error_is_refusal() {
        let (url, _frames) = serve().await;
        let result = TungsteniteConnector::new().connect(&url, &auth("refuse")).await;
        assert_eq!(
            result.err(),
            Some(ConnectionError::Refused("Not authorized".to_string()))
        );
    }

    #[tokio::test]
    async fn test_server_drop_reports_closed() {
        let (url, _frames) = serve().await;
        let mut link = TungsteniteConnector::new()
            .connect(&url, &auth("drop"))
            .await
            .unwrap();

        match link.events.recv().await {
            Some(LinkEvent::Closed(Some(ConnectionError::Closed)))
            | Some(LinkEvent::Closed(Some(ConnectionError::Transport(_)))) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_window_saturates() {
        let open = OpenPayload {
            sid: "eio-1".to_string(),
            upgrades: Vec::new(),
            ping_interval: u64::MAX,
            ping_timeout: 20000,
            max_payload: None,
        };
        let window = heartbeat_window(&open);
        assert_eq!(window, Duration::from_millis(u64::MAX));
        assert!(deadline_after(window) > Instant::now());

        let open = OpenPayload {
            ping_interval: 25000,
            ..open
        };
        assert_eq!(heartbeat_window(&open), Duration::from_millis(45000));
    }

    #[tokio::test]
    async fn test_secure_url_reaches_tls_handshake() {
        // accepts then hangs up, so the TLS handshake itself fails
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let url = Url::parse(&format!("https://{}", addr)).unwrap();
        match TungsteniteConnector::new().connect(&url, &auth("tok")).await {
            Err(ConnectionError::Transport(message)) => {
                assert!(!message.contains("TLS support not compiled in"), "{}", message);
                assert!(!message.starts_with("URL error"), "{}", message);
            }
            other => panic!("unexpected result: {:?}", other.map(|link| link.sid)),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        let result = TungsteniteConnector::new().connect(&url, &auth("tok")).await;
        assert!(matches!(result, Err(ConnectionError::Transport(_))));
    }
}
