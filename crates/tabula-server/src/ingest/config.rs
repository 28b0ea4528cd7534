//! Ingestion configuration
//!
//! Batch sizing and worker pool limits for the file ingestion queue
//! (`INGEST_*` environment variables).

use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    /// Rows persisted per transaction
    pub batch_size: usize,
    /// Files ingested at the same time
    pub worker_concurrency: usize,
    /// Jobs buffered before `submit` reports the queue as full
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            batch_size: env_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            worker_concurrency: env_or("INGEST_WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY)?,
            queue_capacity: env_or("INGEST_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("INGEST_BATCH_SIZE must be greater than 0");
        }
        if self.worker_concurrency == 0 {
            anyhow::bail!("INGEST_WORKER_CONCURRENCY must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("INGEST_QUEUE_CAPACITY must be greater than 0");
        }
        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

fn env_or(key: &str, default: usize) -> anyhow::Result<usize> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a positive integer, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in ["INGEST_BATCH_SIZE", "INGEST_WORKER_CONCURRENCY", "INGEST_QUEUE_CAPACITY"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        clear_env();
        std::env::set_var("INGEST_BATCH_SIZE", "25");
        std::env::set_var("INGEST_WORKER_CONCURRENCY", "2");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();
        std::env::set_var("INGEST_BATCH_SIZE", "0");
        assert!(IngestConfig::from_env().is_err());

        std::env::set_var("INGEST_BATCH_SIZE", "lots");
        assert!(IngestConfig::from_env().is_err());

        clear_env();
    }
}
