use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
}

/// A named value with an absolute expiry, stored in plain text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub path: String,
    pub same_site: SameSite,
}

impl StoredCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires_at,
            path: "/".to_string(),
            same_site: SameSite::Strict,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Browser-like cookie storage.
///
/// `is_available` is false outside a context that can hold cookies; callers
/// treat every operation as a no-op then.
pub trait CookieStorage: Send + Sync {
    fn is_available(&self) -> bool;

    fn load(&self, name: &str) -> Result<Option<StoredCookie>, StorageError>;

    /// Insert or replace the cookie with the same name
    fn store(&self, cookie: StoredCookie) -> Result<(), StorageError>;
}
