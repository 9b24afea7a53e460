use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How a transition acquires the locks of every place it touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// Try-lock every place in turn; on contention release everything held
    /// and start over.
    #[default]
    RetryAll,
    /// Block on each place in ascending creation order.
    Ordered,
}

/// Runtime settings shared by a net and all of its transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub lock_strategy: LockStrategy,
    /// Failed `RetryAll` rounds after which a worker yields between rounds.
    pub retry_yield_after: u32,
    pub worker_name_prefix: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            lock_strategy: LockStrategy::default(),
            retry_yield_after: 16,
            worker_name_prefix: String::from("petri"),
        }
    }
}

impl NetConfig {
    pub fn lock_strategy(mut self, lock_strategy: LockStrategy) -> Self {
        self.lock_strategy = lock_strategy;

        self
    }

    pub fn retry_yield_after(mut self, rounds: u32) -> Self {
        self.retry_yield_after = rounds;

        self
    }

    pub fn worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();

        self
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NetConfig::from_toml("lock_strategy = \"ordered\"").unwrap();
        assert_eq!(config.lock_strategy, LockStrategy::Ordered);
        assert_eq!(config.retry_yield_after, 16);
        assert_eq!(config.worker_name_prefix, "petri");
    }

    #[test]
    fn test_empty_toml() {
        assert_eq!(NetConfig::from_toml("").unwrap(), NetConfig::default());
    }

    #[test]
    fn test_bad_toml() {
        assert!(NetConfig::from_toml("lock_strategy = \"sideways\"").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = NetConfig::load_from_file("this/file/does/not/exist.toml").unwrap();
        assert_eq!(config, NetConfig::default());
    }
}
