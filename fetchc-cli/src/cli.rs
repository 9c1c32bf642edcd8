use clap::Parser;
use fetchc_engine::ProxyType;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Fetch HTTP resources through a persistent disk cache",
    long_about = "Fetch one or more HTTP resources, serving fresh copies from a local\n\
                  disk cache and revalidating stale ones with If-Modified-Since.\n\
                  \n\
                  Bodies are written to stdout, or to one file per URL when an output\n\
                  directory is given."
)]
pub struct CliArgs {
    /// URL(s) to fetch
    #[arg(required = true, help = "URL(s) to fetch")]
    pub urls: Vec<String>,

    /// Output directory for fetched bodies
    #[arg(
        short,
        long,
        help = "Directory where bodies are saved, named after the last URL path segment (default: stdout)"
    )]
    pub output_dir: Option<PathBuf>,

    /// Cache root directory
    #[arg(long, help = "Root directory of the disk cache (default: <tmp>/fetchc-cache)")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum cache size with optional unit (B, KB, MB, GB, TB)
    #[arg(
        long,
        default_value = "0",
        help = "Maximum cache size with optional unit (B, KB, MB, GB, TB). Examples: \"500MB\", \"2GB\". Use 0 for unlimited."
    )]
    pub max_cache_size: String,

    /// Fraction of the maximum size kept after eviction
    #[arg(
        long,
        default_value = "0.75",
        help = "Fraction of the maximum cache size targeted by an eviction pass, in (0, 1]"
    )]
    pub evict_factor: f64,

    /// Eviction period with optional unit (s, m, h)
    #[arg(
        long,
        default_value = "120s",
        help = "Period of the background eviction pass (s, m, h). Examples: \"90s\", \"5m\""
    )]
    pub evict_interval: String,

    /// Access time flush period with optional unit (s, m, h)
    #[arg(
        long,
        default_value = "120s",
        help = "Period of the background access-time flush (s, m, h)"
    )]
    pub flush_interval: String,

    /// Disable the disk cache
    #[arg(long, conflicts_with = "offline", help = "Fetch without the disk cache")]
    pub no_cache: bool,

    /// Serve from cache only
    #[arg(long, help = "Never touch the network; serve cached copies, fresh or stale")]
    pub offline: bool,

    /// Custom HTTP headers
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// User agent override
    #[arg(long, help = "User-Agent sent with every request")]
    pub user_agent: Option<String>,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for each HTTP request (0 for none)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Redirect hop limit
    #[arg(
        long,
        default_value = "10",
        help = "Maximum number of redirects followed for one URL"
    )]
    pub max_redirects: usize,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type
    #[arg(long, value_enum, default_value = "http", help = "Proxy type")]
    pub proxy_type: ProxyType,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy)"
    )]
    pub no_proxy: bool,

    /// Force IPv4
    #[arg(long, conflicts_with = "ipv6", help = "Connect over IPv4 only")]
    pub ipv4: bool,

    /// Force IPv6
    #[arg(long, help = "Connect over IPv6 only")]
    pub ipv6: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["fetchc", "http://example.test/a"]).unwrap();
        assert_eq!(args.urls, vec!["http://example.test/a"]);
        assert_eq!(args.max_cache_size, "0");
        assert_eq!(args.evict_factor, 0.75);
        assert_eq!(args.evict_interval, "120s");
        assert_eq!(args.timeout, 30);
        assert_eq!(args.max_redirects, 10);
        assert_eq!(args.proxy_type, ProxyType::Http);
        assert!(!args.offline && !args.no_cache);
    }

    #[test]
    fn test_repeated_headers_and_proxy() {
        let args = CliArgs::try_parse_from([
            "fetchc",
            "-H",
            "X-One: 1",
            "--header",
            "X-Two: 2",
            "--proxy",
            "127.0.0.1:1080",
            "--proxy-type",
            "socks5",
            "http://example.test/a",
            "http://example.test/b",
        ])
        .unwrap();
        assert_eq!(args.headers, vec!["X-One: 1", "X-Two: 2"]);
        assert_eq!(args.proxy_type, ProxyType::Socks5);
        assert_eq!(args.urls.len(), 2);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(CliArgs::try_parse_from(["fetchc", "--ipv4", "--ipv6", "http://a.test/"]).is_err());
        assert!(
            CliArgs::try_parse_from(["fetchc", "--no-cache", "--offline", "http://a.test/"])
                .is_err()
        );
        assert!(CliArgs::try_parse_from(["fetchc"]).is_err());
    }
}
