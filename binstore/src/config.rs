use crate::client::{DocumentStore, JsonBinStore, StoreError};
use crate::memory::MemoryStore;
use crate::write::RetryPolicy;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 400;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Which backing store to talk to.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Jsonbin {
        url: Url,
        master_key: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Memory,
}

impl StoreConfig {
    pub fn build(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        match self {
            StoreConfig::Jsonbin {
                url,
                master_key,
                timeout_secs,
            } => Ok(Arc::new(JsonBinStore::new(
                url.clone(),
                master_key.clone(),
                Duration::from_secs(*timeout_secs),
            )?)),
            StoreConfig::Memory => {
                tracing::warn!("Using the in-memory store, data is lost on restart");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}
