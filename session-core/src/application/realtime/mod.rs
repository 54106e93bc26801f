pub mod connection;
pub mod reconnect;
pub mod socket_manager;

pub use connection::{
    Connection, ConnectionState, ListenerId, EVENT_CONNECT, EVENT_CONNECT_ERROR,
    EVENT_DISCONNECT, EVENT_RECONNECT_ATTEMPT,
};
pub use reconnect::{ExponentialBackoff, NoReconnect, ReconnectPolicy};
pub use socket_manager::SocketConnectionManager;
