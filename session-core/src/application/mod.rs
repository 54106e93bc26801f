// Application layer: session tracking, push connection, call orchestration.
// Depends on the domain layer and on ports only

pub mod auth;
pub mod calls;
pub mod ports;
pub mod realtime;
