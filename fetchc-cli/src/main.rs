use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fetchc_engine::{
    DiskCacheConfig, Fetcher, FetcherConfig, ProxyConfig, ReqwestEngine, TransportEngine,
};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use error::AppError;
use utils::{format_bytes, output_file_name, parse_headers, parse_interval, parse_size};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    init_logging(args.verbose)?;

    let config = build_config(&args)?;
    match &config.cache_config {
        Some(cache) => info!(
            root = %cache.root.display(),
            max_size = %format_bytes(cache.max_size),
            "Using disk cache"
        ),
        None => info!("Disk cache disabled"),
    }

    let engine: Arc<dyn TransportEngine> = Arc::new(ReqwestEngine::new());
    let fetcher = Fetcher::open(engine, config)?;

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)?;
    }

    let total = args.urls.len();
    let mut failed = 0;
    for url in &args.urls {
        if let Err(e) = fetch_one(&fetcher, url, args.offline, args.output_dir.as_deref()) {
            error!(url = %url, error = %e, "Fetch failed");
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(AppError::Failed { failed, total });
    }
    Ok(())
}

/// Log to stderr so bodies written to stdout stay clean
fn init_logging(verbose: bool) -> Result<(), AppError> {
    let builder = FmtSubscriber::builder()
        .with_writer(io::stderr)
        .with_ansi(true);

    let result = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        let log_level = if verbose { Level::DEBUG } else { Level::INFO };
        tracing::subscriber::set_global_default(builder.with_max_level(log_level).finish())
    };
    result.map_err(|e| AppError::Initialization(e.to_string()))
}

fn build_config(args: &CliArgs) -> Result<FetcherConfig, AppError> {
    let mut headers = FetcherConfig::get_default_headers();
    headers.extend(parse_headers(&args.headers));

    let mut builder = FetcherConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_max_redirect_hops(args.max_redirects)
        .with_headers(headers)
        .with_force_ipv4(args.ipv4)
        .with_force_ipv6(args.ipv6);

    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent);
    }

    if args.ipv4 {
        info!("Using IPv4 for network connections");
    } else if args.ipv6 {
        info!("Using IPv6 for network connections");
    }

    builder = if args.no_cache {
        builder.without_cache()
    } else {
        let root = args
            .cache_dir
            .clone()
            .unwrap_or_else(|| DiskCacheConfig::default().root);
        let cache = DiskCacheConfig::builder(root)
            .max_size(parse_size(&args.max_cache_size)?)
            .evict_factor(args.evict_factor)
            .evict_interval(parse_interval(&args.evict_interval)?)
            .flush_interval(parse_interval(&args.flush_interval)?)
            .build();
        builder.with_cache_config(cache)
    };

    // Handle proxy configuration
    builder = if args.no_proxy {
        // No proxy flag overrides everything else
        info!("All proxy settings disabled (--no-proxy flag)");
        builder.with_system_proxy(false)
    } else if let Some(proxy_url) = &args.proxy {
        let mut proxy = ProxyConfig::new(proxy_url.clone(), args.proxy_type);
        match (&args.proxy_user, &args.proxy_pass) {
            (Some(username), Some(password)) => {
                proxy = proxy.with_auth(username.clone(), password.clone());
            }
            (None, None) => {}
            _ => {
                return Err(AppError::InvalidInput(
                    "--proxy-user and --proxy-pass must be given together".to_string(),
                ));
            }
        }
        info!(
            proxy_url = %proxy_url,
            proxy_type = ?args.proxy_type,
            has_auth = proxy.auth.is_some(),
            "Using explicit proxy configuration"
        );
        builder.with_proxy(proxy)
    } else {
        builder.with_system_proxy(true)
    };

    Ok(builder.build())
}

fn fetch_one(
    fetcher: &Fetcher,
    url: &str,
    offline: bool,
    output_dir: Option<&Path>,
) -> Result<(), AppError> {
    let Some(mut response) = fetcher.load(url, offline)? else {
        warn!(url = %url, "Not cached and running offline");
        return Err(AppError::NotAvailable(url.to_string()));
    };

    let written = match output_dir {
        Some(dir) => {
            let path = dir.join(output_file_name(url)?);
            let mut file = File::create(&path)?;
            let written = io::copy(&mut response.body, &mut file)?;
            file.flush()?;
            info!(path = %path.display(), "Saved");
            written
        }
        None => {
            let mut stdout = io::stdout().lock();
            let written = io::copy(&mut response.body, &mut stdout)?;
            stdout.flush()?;
            written
        }
    };

    info!(
        url = %url,
        from_cache = response.from_cache,
        size = %format_bytes(written),
        "Fetched"
    );
    Ok(())
}
