//! # Builder for FetcherConfig
//!
//! Fluent construction of [`FetcherConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use fetchc_engine::FetcherConfig;
//! use fetchc_engine::proxy::{ProxyConfig, ProxyType};
//!
//! let config = FetcherConfig::builder()
//!     .with_cache_dir("/tmp/fetchc-cache")
//!     .with_max_cache_size(512 * 1024 * 1024)
//!     .with_timeout(Duration::from_secs(60))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .build();
//!
//! let config_with_proxy = FetcherConfig::builder()
//!     .with_proxy(
//!         ProxyConfig::new("127.0.0.1:1080", ProxyType::Socks5).with_auth("user", "pass"),
//!     )
//!     .build();
//! # let _ = (config, config_with_proxy);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::cache::DiskCacheConfig;
use crate::{FetcherConfig, proxy::ProxyConfig};

/// Builder for creating FetcherConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct FetcherConfigBuilder {
    config: FetcherConfig,
}

impl FetcherConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: FetcherConfig::default(),
        }
    }

    /// Set the cache configuration
    pub fn with_cache_config(mut self, cache_config: DiskCacheConfig) -> Self {
        self.config.cache_config = Some(cache_config);
        self
    }

    /// Cache under `root`, keeping any tuning already set
    pub fn with_cache_dir(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        match &mut self.config.cache_config {
            Some(cache) => cache.root = root,
            None => self.config.cache_config = Some(DiskCacheConfig::new(root)),
        }
        self
    }

    /// Set the cache size cap in bytes; ignored until a cache directory is set
    pub fn with_max_cache_size(mut self, bytes: u64) -> Self {
        if let Some(cache) = &mut self.config.cache_config {
            cache.max_size = bytes;
        }
        self
    }

    /// Disable the disk cache
    pub fn without_cache(mut self) -> Self {
        self.config.cache_config = None;
        self
    }

    /// Set the overall timeout for one request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Set all HTTP headers, replacing any existing headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Set the proxy configuration
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false; // Explicit proxy overrides system proxy
        self
    }

    /// Set whether to use system proxy settings if available
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn with_force_ipv4(mut self, force: bool) -> Self {
        self.config.force_ipv4 = force;
        self
    }

    pub fn with_force_ipv6(mut self, force: bool) -> Self {
        self.config.force_ipv6 = force;
        self
    }

    /// Set how many redirect hops one load may follow
    pub fn with_max_redirect_hops(mut self, hops: usize) -> Self {
        self.config.max_redirect_hops = hops;
        self
    }

    /// Build the FetcherConfig instance
    pub fn build(self) -> FetcherConfig {
        self.config
    }
}

impl Default for FetcherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyType;
    use crate::request::default_user_agent;

    #[test]
    fn test_builder_defaults() {
        let config = FetcherConfigBuilder::new().build();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.user_agent, default_user_agent());
        assert_eq!(
            config.max_redirect_hops,
            crate::config::DEFAULT_MAX_REDIRECT_HOPS
        );
        assert!(config.use_system_proxy);
        assert!(config.cache_config.is_none());
    }

    #[test]
    fn test_builder_customization() {
        let config = FetcherConfigBuilder::new()
            .with_timeout(Duration::from_secs(60))
            .with_connect_timeout(Duration::from_secs(20))
            .with_user_agent("CustomUserAgent/1.0")
            .with_header("X-Custom-Header", "CustomValue")
            .with_system_proxy(false)
            .with_max_redirect_hops(2)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.user_agent, "CustomUserAgent/1.0");
        assert!(!config.use_system_proxy);
        assert_eq!(config.max_redirect_hops, 2);

        let header_value = config.headers.get("X-Custom-Header").unwrap();
        assert_eq!(header_value.to_str().unwrap(), "CustomValue");
    }

    #[test]
    fn test_cache_options() {
        let config = FetcherConfigBuilder::new()
            .with_max_cache_size(10)
            .with_cache_dir("/tmp/cache-a")
            .with_max_cache_size(1024)
            .build();
        let cache = config.cache_config.unwrap();
        assert_eq!(cache.root, PathBuf::from("/tmp/cache-a"));
        assert_eq!(cache.max_size, 1024);

        let config = FetcherConfigBuilder::new()
            .with_cache_dir("/tmp/cache-b")
            .without_cache()
            .build();
        assert!(config.cache_config.is_none());
    }

    #[test]
    fn test_proxy_configuration() {
        let proxy_config = ProxyConfig::new("http://proxy.example.com:8080", ProxyType::Http)
            .with_auth("user", "pass");

        let config = FetcherConfigBuilder::new()
            .with_proxy(proxy_config.clone())
            .with_system_proxy(true)
            .build();

        assert!(!config.use_system_proxy);
        let stored_proxy = config.proxy.unwrap();
        assert_eq!(stored_proxy, proxy_config);
        assert_eq!(stored_proxy.auth.as_ref().unwrap().username, "user");
    }
}
