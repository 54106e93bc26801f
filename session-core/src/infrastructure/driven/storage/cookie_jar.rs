//! Cookie jar persisted as a JSON file.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::application::ports::{CookieStorage, StoredCookie};
use crate::error::StorageError;

type Jar = BTreeMap<String, StoredCookie>;

pub struct FileCookieJar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> Result<Jar, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Jar::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Jar::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, jar: &Jar) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(jar)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CookieStorage for FileCookieJar {
    fn is_available(&self) -> bool {
        true
    }

    fn load(&self, name: &str) -> Result<Option<StoredCookie>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(name))
    }

    fn store(&self, cookie: StoredCookie) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let now = Utc::now();
        let mut jar = match self.read() {
            Ok(jar) => jar,
            Err(StorageError::Serialization(e)) => {
                warn!(path = %self.path.display(), error = %e, "cookie jar unreadable, starting over");
                Jar::new()
            }
            Err(e) => return Err(e),
        };
        jar.retain(|_, existing| !existing.is_expired_at(now));

        if cookie.is_expired_at(now) {
            jar.remove(&cookie.name);
        } else {
            jar.insert(cookie.name.clone(), cookie);
        }

        debug!(path = %self.path.display(), cookies = jar.len(), "writing cookie jar");
        self.write(&jar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::SameSite;
    use chrono::Duration;

    fn temp_jar() -> FileCookieJar {
        FileCookieJar::new(
            std::env::temp_dir().join(format!("session-core-jar-{}.json", uuid::Uuid::new_v4())),
        )
    }

    #[test]
    fn test_round_trip_through_file() {
        let jar = temp_jar();
        jar.store(StoredCookie::new("access_token", "abc", Utc::now() + Duration::days(7)))
            .unwrap();

        let reopened = FileCookieJar::new(jar.path().clone());
        let cookie = reopened.load("access_token").unwrap().unwrap();
        assert_eq!(cookie.value, "abc");
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.same_site, SameSite::Strict);

        fs::remove_file(jar.path()).ok();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let jar = temp_jar();
        assert!(jar.load("access_token").unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_are_pruned_on_write() {
        let jar = temp_jar();
        jar.store(StoredCookie::new("passResetToken", "r", Utc::now() + Duration::days(1)))
            .unwrap();
        jar.store(StoredCookie::new("passResetToken", "", Utc::now() - Duration::days(1)))
            .unwrap();
        assert!(jar.load("passResetToken").unwrap().is_none());

        let raw = fs::read_to_string(jar.path()).unwrap();
        assert!(!raw.contains("passResetToken"));
        fs::remove_file(jar.path()).ok();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let jar = temp_jar();
        fs::write(jar.path(), b"{not json").unwrap();
        assert!(matches!(jar.load("x"), Err(StorageError::Serialization(_))));
        fs::remove_file(jar.path()).ok();
    }

    #[test]
    fn test_corrupt_file_is_replaced_on_write() {
        let jar = temp_jar();
        fs::write(jar.path(), b"{not json").unwrap();

        jar.store(StoredCookie::new("access_token", "abc", Utc::now() + Duration::days(7)))
            .unwrap();
        assert_eq!(jar.load("access_token").unwrap().unwrap().value, "abc");
        fs::remove_file(jar.path()).ok();
    }

    #[test]
    fn test_login_recovers_from_corrupt_file() {
        use crate::application::auth::{AuthEventBus, TokenStore};
        use std::sync::Arc;

        let jar = Arc::new(temp_jar());
        fs::write(jar.path(), b"{not json").unwrap();
        let tokens = TokenStore::new(jar.clone(), AuthEventBus::new());

        tokens.login("first");
        assert_eq!(tokens.access_token().as_deref(), Some("first"));
        tokens.login("second");
        assert_eq!(tokens.access_token().as_deref(), Some("second"));
        fs::remove_file(jar.path()).ok();
    }
}
