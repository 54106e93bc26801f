//! Wire types shared between the session core and its test servers.

pub mod protocol;
pub mod socketio;

pub use protocol::*;
