mod ws_connector;

pub use ws_connector::{socket_endpoint, TungsteniteConnector};
