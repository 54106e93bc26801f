use async_trait::async_trait;
use shared::socketio::SocketPacket;
use shared::HandshakeAuth;
use tokio::sync::mpsc;
use url::Url;

use crate::error::ConnectionError;

/// Instruction for an established link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    Send(SocketPacket),
    Close,
}

/// What an established link reports back
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Packet(SocketPacket),
    /// Link is gone. `None` when closed on request.
    Closed(Option<ConnectionError>),
}

/// A handshaken duplex link: the namespace CONNECT was acknowledged.
pub struct SocketLink {
    pub sid: Option<String>,
    pub commands: mpsc::UnboundedSender<LinkCommand>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens authenticated push links. Transport keep-alive stays inside the
/// implementation.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &Url, auth: &HandshakeAuth) -> Result<SocketLink, ConnectionError>;
}
