mod agora;
mod zoom;

pub use agora::{remote_container, AgoraProvider, RemoteUser};
pub use zoom::ZoomProvider;
