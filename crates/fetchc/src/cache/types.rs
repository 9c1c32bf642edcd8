//! # Cache Types
//!
//! This module defines common types used across the caching system.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata field holding the identity (origin URL) of a cached resource
pub const META_URL: &str = "url";
/// Metadata field holding the expiry time in milliseconds since the epoch
pub const META_EXPIRE: &str = "expire";
/// Metadata field holding the `Last-Modified` time in milliseconds since the epoch
pub const META_LAST_MODIFIED: &str = "lastModified";

/// Metadata record describing one cached blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Slot key, also the file name of the blob on disk
    pub key: String,
    /// Size of the blob in bytes
    pub file_size: u64,
    /// Last access time, milliseconds since the Unix epoch
    pub last_access: u64,
    /// Creation time of the first version, milliseconds since the Unix epoch
    pub create_time: u64,
    /// Caller-level metadata, opaque to the store
    pub meta: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Look up a caller-level metadata field
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    /// Look up a caller-level metadata field holding a millisecond timestamp
    pub fn meta_millis(&self, name: &str) -> Option<u64> {
        self.meta(name).and_then(|v| v.trim().parse().ok())
    }

    /// Identity marker used for key collision detection
    pub fn identity(&self) -> Option<&str> {
        self.meta(META_URL)
    }
}

/// Configuration for the disk cache
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Root directory of the cache
    pub root: PathBuf,
    /// Maximum occupied bytes, 0 means unbounded
    pub max_size: u64,
    /// Fraction of `max_size` targeted after an eviction pass
    pub evict_factor: f64,
    /// Period of the eviction worker
    pub evict_interval: Duration,
    /// Period of the access-time flush worker
    pub flush_interval: Duration,
}

impl DiskCacheConfig {
    pub const DEFAULT_EVICT_FACTOR: f64 = 0.75;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

    /// Create a configuration rooted at `root` with default tuning
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_size: 0,
            evict_factor: Self::DEFAULT_EVICT_FACTOR,
            evict_interval: Self::DEFAULT_INTERVAL,
            flush_interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn builder(root: impl Into<PathBuf>) -> DiskCacheConfigBuilder {
        DiskCacheConfigBuilder {
            config: Self::new(root),
        }
    }

    /// Occupancy target of an eviction pass, in bytes
    pub fn eviction_target(&self) -> u64 {
        (self.max_size as f64 * self.evict_factor) as u64
    }

    pub(crate) fn validate(&self) -> CacheResult<()> {
        if !(self.evict_factor > 0.0 && self.evict_factor <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "evict factor must be in (0, 1], got {}",
                self.evict_factor
            )));
        }
        if self.evict_interval.is_zero() || self.flush_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "cache worker intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("fetchc-cache"))
    }
}

/// Builder for [`DiskCacheConfig`]
#[derive(Debug, Clone)]
pub struct DiskCacheConfigBuilder {
    config: DiskCacheConfig,
}

impl DiskCacheConfigBuilder {
    /// Set the maximum cache size in bytes (0 disables eviction)
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.config.max_size = bytes;
        self
    }

    /// Set the post-eviction occupancy fraction
    pub fn evict_factor(mut self, factor: f64) -> Self {
        self.config.evict_factor = factor;
        self
    }

    /// Set the eviction interval.
    ///
    /// If too large, the cache may exceed its limit for longer.
    /// If too small, more I/O is spent walking the cache tree.
    pub fn evict_interval(mut self, interval: Duration) -> Self {
        self.config.evict_interval = interval;
        self
    }

    /// Set the interval at which access times are flushed to disk
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn build(self) -> DiskCacheConfig {
        self.config
    }
}

/// Errors raised by the disk cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key collision chain for {identity} exhausted after {attempts} probes")]
    KeyCollision { identity: String, attempts: usize },

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Result of a cache operation
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    system_time_millis(SystemTime::now())
}

pub(crate) fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
