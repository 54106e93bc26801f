//! Named bearer values persisted in cookie storage.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::auth_events::AuthEventBus;
use crate::application::ports::{CookieStorage, StoredCookie};

pub const ACCESS_TOKEN: &str = "access_token";
pub const PASS_RESET_TOKEN: &str = "passResetToken";
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Reads and writes tokens. Writes to `access_token` fire the auth bus.
///
/// Storage failures are logged and absorbed: a value that cannot be read is
/// treated as absent.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn CookieStorage>,
    events: AuthEventBus,
    default_ttl_days: i64,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn CookieStorage>, events: AuthEventBus) -> Self {
        Self {
            storage,
            events,
            default_ttl_days: DEFAULT_TTL_DAYS,
        }
    }

    pub fn with_default_ttl(mut self, days: i64) -> Self {
        self.default_ttl_days = days;
        self
    }

    pub fn events(&self) -> &AuthEventBus {
        &self.events
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_available()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.set_with_ttl(name, value, self.default_ttl_days);
    }

    /// Store with an explicit lifetime. Lifetimes past the calendar's range
    /// are clamped to its end.
    pub fn set_with_ttl(&self, name: &str, value: &str, ttl_days: i64) {
        let now = Utc::now();
        let expires_at = Duration::try_days(ttl_days)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or_else(|| {
                warn!(name, ttl_days, "cookie lifetime out of range, clamping");
                if ttl_days < 0 {
                    DateTime::<Utc>::MIN_UTC
                } else {
                    DateTime::<Utc>::MAX_UTC
                }
            });
        self.write(StoredCookie::new(name, value, expires_at));
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.get_at(name, Utc::now())
    }

    pub fn get_at(&self, name: &str, now: DateTime<Utc>) -> Option<String> {
        if !self.storage.is_available() {
            return None;
        }
        match self.storage.load(name) {
            Ok(Some(cookie)) if !cookie.is_expired_at(now) => Some(cookie.value),
            Ok(_) => None,
            Err(e) => {
                warn!(name, error = %e, "failed to read cookie");
                None
            }
        }
    }

    /// Expire the value immediately
    pub fn remove(&self, name: &str) {
        self.write(StoredCookie::new(name, "", DateTime::<Utc>::MIN_UTC));
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN)
    }

    pub fn login(&self, token: &str) {
        self.set(ACCESS_TOKEN, token);
    }

    pub fn logout(&self) {
        self.remove(ACCESS_TOKEN);
    }

    fn write(&self, cookie: StoredCookie) {
        if !self.storage.is_available() {
            debug!(name = %cookie.name, "cookie storage unavailable, skipping write");
            return;
        }

        let notify = cookie.name == ACCESS_TOKEN;
        let name = cookie.name.clone();
        if let Err(e) = self.storage.store(cookie) {
            warn!(name = %name, error = %e, "failed to write cookie");
            return;
        }

        if notify {
            self.events.emit();
        }
    }
}
