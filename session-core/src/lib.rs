//! Real-time session core: persisted token session, auth change signal,
//! shared push connection, and video call credential brokering.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use config::CoreConfig;
pub use error::{CallError, ConfigError, ConnectionError, JoinError, NetworkError};
pub use infrastructure::{SdkBindings, SessionCore};
