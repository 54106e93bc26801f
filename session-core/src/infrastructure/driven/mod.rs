// Driven adapters: cookie storage, backend HTTP client, websocket transport,
// video SDK providers

pub mod http;
pub mod providers;
pub mod socket;
pub mod storage;

pub use http::HttpCredentialBackend;
pub use providers::{AgoraProvider, ZoomProvider};
pub use socket::TungsteniteConnector;
