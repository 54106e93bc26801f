// Infrastructure layer - adapters for the outside world and the composition
// root that wires them into the application services

pub mod driven;
pub mod driving;
mod session_core;

pub use session_core::{SdkBindings, SessionCore};
