//! Engine configuration.
//!
//! # Responsibility
//! - Carry tunables shared by stores and conduits.
//! - Load them from JSON documents with per-field defaults.

use crate::service::linking_service::LinkPolicy;
use crate::storage::path::RootedPathAllocator;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_STORAGE_ROOT: &str = "/var/lib/contentsync/content";
const DEFAULT_ASSOCIATION_PAGE_SIZE: u32 = 500;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config document: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Absolute directory under which unit payload paths are allocated.
    pub storage_root: PathBuf,
    pub link_policy: LinkPolicy,
    /// Rows fetched per round trip when walking a repository.
    pub association_page_size: u32,
    /// How long a writer waits on the database lock.
    pub busy_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            link_policy: LinkPolicy::default(),
            association_page_size: DEFAULT_ASSOCIATION_PAGE_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document. Missing fields default.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.storage_root.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "storage_root must be an absolute path, got `{}`",
                self.storage_root.display()
            )));
        }
        if self.association_page_size == 0 {
            return Err(ConfigError::Invalid(
                "association_page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn path_allocator(&self) -> RootedPathAllocator {
        RootedPathAllocator::new(self.storage_root.clone())
    }
}
