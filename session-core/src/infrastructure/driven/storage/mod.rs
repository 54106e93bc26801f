mod cookie_jar;
mod memory;

pub use cookie_jar::FileCookieJar;
pub use memory::{MemoryCookieJar, UnavailableStorage};

use std::sync::Arc;

use crate::application::ports::CookieStorage;
use crate::config::{StorageBackend, StorageConfig};

pub fn from_config(config: &StorageConfig) -> Arc<dyn CookieStorage> {
    match config.backend {
        StorageBackend::File => Arc::new(FileCookieJar::new(config.cookie_jar_path.clone())),
        StorageBackend::Memory => Arc::new(MemoryCookieJar::new()),
        StorageBackend::Unavailable => Arc::new(UnavailableStorage),
    }
}
