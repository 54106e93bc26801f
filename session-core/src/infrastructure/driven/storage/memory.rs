use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::application::ports::{CookieStorage, StoredCookie};
use crate::error::StorageError;

/// Process-local jar
#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, StoredCookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStorage for MemoryCookieJar {
    fn is_available(&self) -> bool {
        true
    }

    fn load(&self, name: &str) -> Result<Option<StoredCookie>, StorageError> {
        Ok(self.cookies.lock().get(name).cloned())
    }

    fn store(&self, cookie: StoredCookie) -> Result<(), StorageError> {
        let mut cookies = self.cookies.lock();
        if cookie.is_expired_at(Utc::now()) {
            cookies.remove(&cookie.name);
        } else {
            cookies.insert(cookie.name.clone(), cookie);
        }
        Ok(())
    }
}

/// No cookie-capable context: reads find nothing, writes are refused
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStorage;

impl CookieStorage for UnavailableStorage {
    fn is_available(&self) -> bool {
        false
    }

    fn load(&self, _name: &str) -> Result<Option<StoredCookie>, StorageError> {
        Ok(None)
    }

    fn store(&self, _cookie: StoredCookie) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expired_write_removes_entry() {
        let jar = MemoryCookieJar::new();
        jar.store(StoredCookie::new("a", "1", Utc::now() + Duration::days(1)))
            .unwrap();
        assert!(jar.load("a").unwrap().is_some());

        jar.store(StoredCookie::new("a", "", Utc::now() - Duration::seconds(1)))
            .unwrap();
        assert!(jar.load("a").unwrap().is_none());
    }

    #[test]
    fn test_unavailable_refuses_writes() {
        let storage = UnavailableStorage;
        assert!(!storage.is_available());
        assert!(matches!(
            storage.store(StoredCookie::new("a", "1", Utc::now())),
            Err(StorageError::Unavailable)
        ));
        assert!(storage.load("a").unwrap().is_none());
    }
}
