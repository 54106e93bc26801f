use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Envelope for events published by the core
#[derive(Debug, Clone)]
pub struct DomainEvent<T> {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub data: T,
}

impl<T> DomainEvent<T> {
    pub fn new(data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            data,
        }
    }
}
