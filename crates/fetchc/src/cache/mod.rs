//! # Cache System
//!
//! Persistent two-tier cache used by the fetcher: an in-memory index in
//! front of blob and metadata files sharded under a root directory.
//!
//! Slots are addressed by an opaque key. The identity-aware wrappers
//! ([`DiskCache::lookup`], [`DiskCache::store`]) derive keys from a URL and
//! resolve hash collisions through a bounded probe chain.

mod disk;
mod key;
mod locks;
mod meta;
mod types;

pub use disk::{DiskCache, EvictionReport};
pub use key::{MAX_KEY_PROBES, key_for, next_probe};
pub use types::{
    CacheEntry, CacheError, CacheResult, DiskCacheConfig, DiskCacheConfigBuilder, META_EXPIRE,
    META_LAST_MODIFIED, META_URL,
};

pub(crate) use types::now_millis;
