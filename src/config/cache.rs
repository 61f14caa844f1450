use super::traits::ConfigSection;
use crate::error::{Result, SimtuneError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backing store for memoized fitness results. Survives restarts; a
    /// run that cannot open it does not start.
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fitness_cache.db"),
        }
    }
}

impl ConfigSection for CacheConfig {
    fn section_name() -> &'static str {
        "cache"
    }

    fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(SimtuneError::Configuration(
                "Cache path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
