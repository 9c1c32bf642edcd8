use reqwest::Proxy;

use crate::transport::{TransportCode, TransportStatus};

/// Proxy protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyType {
    /// HTTP proxy, used for plain-HTTP targets only
    Http,
    /// HTTPS proxy, used for HTTPS targets only
    Https,
    /// SOCKS5 proxy
    Socks5,
    /// Proxy for every scheme
    All,
}

/// Proxy credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Explicit proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyConfig {
    /// Proxy server, as `host:port` or a full URL (e.g. "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            url: url.into(),
            proxy_type,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Proxy URL with the scheme implied by the proxy type filled in
    pub fn normalized_url(&self) -> String {
        if self.url.contains("://") {
            return self.url.clone();
        }
        let scheme = match self.proxy_type {
            ProxyType::Socks5 => "socks5",
            ProxyType::Http | ProxyType::Https | ProxyType::All => "http",
        };
        format!("{scheme}://{}", self.url)
    }
}

/// Build a reqwest proxy from an explicit configuration
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, TransportStatus> {
    let proxy_url = config.normalized_url();
    let invalid = |kind: &str, e: reqwest::Error| {
        TransportStatus::failed(
            TransportCode::COULDNT_RESOLVE_PROXY,
            format!("Invalid {kind} proxy URL {proxy_url}: {e}"),
        )
    };

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(&proxy_url).map_err(|e| invalid("HTTP", e))?,
        ProxyType::Https => Proxy::https(&proxy_url).map_err(|e| invalid("HTTPS", e))?,
        ProxyType::Socks5 => Proxy::all(&proxy_url).map_err(|e| invalid("SOCKS5", e))?,
        ProxyType::All => Proxy::all(&proxy_url).map_err(|e| invalid("generic", e))?,
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}
