// Domain layer: claims, call credentials, call lifecycle, route gate.
// No dependencies on other layers

pub mod entities;
pub mod aggregates;
pub mod value_objects;
pub mod events;
pub mod access_policy;

pub use entities::*;
pub use aggregates::*;
pub use value_objects::*;
pub use events::*;
pub use access_policy::{AccessDecision, VerificationNotice};
