//! Layered configuration: defaults, then `session-core.toml`, then
//! `SESSION_CORE__*` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::ProviderKind;
use crate::error::ConfigError;

pub const DEFAULT_FILE: &str = "session-core";
pub const ENV_PREFIX: &str = "SESSION_CORE";
/// Ten years
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub realtime: RealtimeConfig,
    pub calls: CallsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
    Unavailable,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub cookie_jar_path: PathBuf,
    pub token_ttl_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            cookie_jar_path: PathBuf::from("session-core-cookies.json"),
            token_ttl_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectKind {
    None,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub policy: ReconnectKind,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectKind::None,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub socket_url: String,
    pub handshake_timeout_secs: u64,
    pub close_on_logout: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            socket_url: "http://localhost:8000".to_string(),
            handshake_timeout_secs: 10,
            close_on_logout: false,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub sdk_key: String,
    pub leave_url: String,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            sdk_key: String::new(),
            leave_url: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgoraConfig {
    pub mode: String,
    pub codec: String,
}

impl Default for AgoraConfig {
    fn default() -> Self {
        Self {
            mode: "rtc".to_string(),
            codec: "vp8".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallsConfig {
    pub provider: ProviderKind,
    pub join_timeout_secs: u64,
    pub zoom: ZoomConfig,
    pub agora: AgoraConfig,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Agora,
            join_timeout_secs: 30,
            zoom: ZoomConfig::default(),
            agora: AgoraConfig::default(),
        }
    }
}

impl CallsConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

impl CoreConfig {
    /// Load from `.env`, `session-core.toml` (optional) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(DEFAULT_FILE, ENV_PREFIX)
    }

    pub fn load_from(file: &str, env_prefix: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CoreConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.backend.base_url)
            .map_err(|e| ConfigError::Invalid(format!("backend.base_url: {}", e)))?;
        url::Url::parse(&self.realtime.socket_url)
            .map_err(|e| ConfigError::Invalid(format!("realtime.socket_url: {}", e)))?;
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&self.storage.token_ttl_days) {
            return Err(ConfigError::Invalid(format!(
                "storage.token_ttl_days must be between 1 and {}",
                MAX_TOKEN_TTL_DAYS
            )));
        }
        if self.realtime.reconnect.initial_delay_ms > self.realtime.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(
                "realtime.reconnect.initial_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
