//! # Fetchc Engine
//!
//! An HTTP fetch layer with a persistent, size-bounded disk cache.
//!
//! ## Features
//!
//! - Two-tier LRU cache (memory index over blob + metadata files) with
//!   lazy access-time persistence and background eviction
//! - Single-request executor over a pluggable transport engine
//! - Cache-first loading with `If-Modified-Since` revalidation, manual
//!   redirect resolution and loop detection
//! - reqwest-backed default transport with proxy and IP version control

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod proxy;
pub mod request;
pub mod transport;

pub use builder::FetcherConfigBuilder;
pub use cache::{CacheEntry, CacheError, DiskCache, DiskCacheConfig, EvictionReport};
pub use config::FetcherConfig;
pub use error::FetchError;
pub use fetcher::{Fetcher, LoadResponse, RequestCustomizer, ResponseBody};
pub use request::{HttpResponse, RequestExecutor};

// Re-export transport boundary
pub use transport::{
    IpVersion, ProxySetting, ReqwestEngine, TransportCode, TransportEngine, TransportHandle,
    TransportStatus,
};

// Re-export proxy utilities
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
