use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::cache::DiskCacheConfig;
use crate::proxy::ProxyConfig;
use crate::request::{RequestExecutor, default_user_agent};
use crate::transport::{IpVersion, ProxySetting};

/// Redirect hops the fetcher follows before giving up
pub const DEFAULT_MAX_REDIRECT_HOPS: usize = 10;

/// Configurable options for the fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Disk cache configuration; `None` disables caching
    pub cache_config: Option<DiskCacheConfig>,

    /// Overall timeout for one request, zero for none
    pub timeout: Duration,

    /// Connection timeout, zero for none
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if no explicit proxy is set
    pub use_system_proxy: bool,

    pub force_ipv4: bool,

    pub force_ipv6: bool,

    /// Redirect hops followed by one load
    pub max_redirect_hops: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_config: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: default_user_agent(),
            headers: FetcherConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            force_ipv4: false,
            force_ipv6: false,
            max_redirect_hops: DEFAULT_MAX_REDIRECT_HOPS,
        }
    }
}

impl FetcherConfig {
    pub fn builder() -> crate::builder::FetcherConfigBuilder {
        crate::builder::FetcherConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers
    }

    pub fn ip_version(&self) -> IpVersion {
        match (self.force_ipv4, self.force_ipv6) {
            (true, false) => IpVersion::V4,
            (false, true) => IpVersion::V6,
            _ => IpVersion::Any,
        }
    }

    pub fn proxy_setting(&self) -> ProxySetting {
        match &self.proxy {
            Some(proxy) => ProxySetting::Explicit(proxy.clone()),
            None if self.use_system_proxy => ProxySetting::System,
            None => ProxySetting::Disabled,
        }
    }

    /// Apply the request-level defaults to an executor
    pub fn apply(&self, executor: &mut RequestExecutor) {
        executor
            .header("User-Agent", self.user_agent.as_str())
            .proxy(self.proxy_setting())
            .ip_version(self.ip_version());
        for (name, value) in &self.headers {
            if let Ok(value) = value.to_str() {
                executor.header(name.as_str(), value);
            }
        }
        if !self.timeout.is_zero() {
            executor.timeout(self.timeout);
        }
        if !self.connect_timeout.is_zero() {
            executor.connect_timeout(self.connect_timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyType;

    #[test]
    fn test_ip_version() {
        let mut config = FetcherConfig::default();
        assert_eq!(config.ip_version(), IpVersion::Any);
        config.force_ipv4 = true;
        assert_eq!(config.ip_version(), IpVersion::V4);
        config.force_ipv6 = true;
        assert_eq!(config.ip_version(), IpVersion::Any);
        config.force_ipv4 = false;
        assert_eq!(config.ip_version(), IpVersion::V6);
    }

    #[test]
    fn test_proxy_setting() {
        let mut config = FetcherConfig::default();
        assert_eq!(config.proxy_setting(), ProxySetting::System);
        config.use_system_proxy = false;
        assert_eq!(config.proxy_setting(), ProxySetting::Disabled);

        let proxy = ProxyConfig::new("127.0.0.1:1080", ProxyType::Socks5);
        config.proxy = Some(proxy.clone());
        assert_eq!(config.proxy_setting(), ProxySetting::Explicit(proxy));
    }
}
