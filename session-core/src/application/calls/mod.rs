pub mod call_config;
pub mod call_controller;
pub mod credential_broker;

pub use call_config::{CallConfigSlot, CallConfigStore};
pub use call_controller::CallController;
pub use credential_broker::{CallConfigRequest, CallCredentialBroker};
