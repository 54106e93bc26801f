pub mod auth_events;
pub mod session_decoder;
pub mod session_state;
pub mod token_store;

pub use auth_events::{AuthEventBus, Unsubscribe};
pub use session_decoder::SessionStatus;
pub use session_state::{SessionSnapshot, SessionState};
pub use token_store::{TokenStore, ACCESS_TOKEN, PASS_RESET_TOKEN};
