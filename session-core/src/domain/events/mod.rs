pub mod domain_event;
pub mod call_transitioned;

pub use domain_event::DomainEvent;
pub use call_transitioned::CallTransitioned;
