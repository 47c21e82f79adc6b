//! Streaming configuration loaded from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::Error;
use super::types::Result;

/// Configuration for the chunk streaming manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Extent of the cached region in chunks (x, y, z), centred on the viewpoint.
    pub cached_chunks: [u32; 3],
    /// Extent of the visible region in chunks (x, y, z). Should not exceed `cached_chunks`.
    pub visible_chunks: [u32; 3],
    /// Worker threads for build and notification jobs (0 = one per core).
    pub worker_threads: usize,
    /// Upper bound on a single fork-join barrier, in milliseconds.
    pub join_timeout_ms: u64,
    /// Number of traversal contexts created up front.
    pub context_pool_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            cached_chunks: [8, 4, 8],
            visible_chunks: [6, 4, 6],
            worker_threads: 0,
            join_timeout_ms: 30_000,
            context_pool_size: 8,
        }
    }
}

impl StreamingConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject extents that would make the manager enumerate nothing.
    pub fn validate(&self) -> Result<()> {
        if self.cached_chunks.contains(&0) {
            return Err(Error::Config("cached_chunks must be non-zero on every axis".into()));
        }
        if self.visible_chunks.iter().zip(self.cached_chunks.iter()).any(|(v, c)| v > c) {
            return Err(Error::Config("visible_chunks must fit inside cached_chunks".into()));
        }
        Ok(())
    }

    /// Join timeout as a `Duration`.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
