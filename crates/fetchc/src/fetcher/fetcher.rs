//! # Fetcher
//!
//! Cache-first loading of HTTP resources.
//!
//! A fresh cache entry is served without touching the network. A stale one
//! is revalidated with `If-Modified-Since`; `304` keeps the cached body and
//! `200` replaces it. Redirects are resolved here rather than by the
//! transport so that loops can be rejected before the looping request is
//! issued.

use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::freshness::{Freshness, format_http_date};
use super::response::LoadResponse;
use crate::cache::{CacheEntry, DiskCache, META_EXPIRE, META_LAST_MODIFIED, now_millis};
use crate::config::FetcherConfig;
use crate::error::FetchError;
use crate::request::{HttpResponse, RequestExecutor};
use crate::transport::TransportEngine;

/// Hook invoked on every executor before it is performed
pub type RequestCustomizer = Arc<dyn Fn(&mut RequestExecutor) + Send + Sync>;

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Loads resources through an optional disk cache
pub struct Fetcher {
    engine: Arc<dyn TransportEngine>,
    cache: Option<Arc<DiskCache>>,
    config: FetcherConfig,
    customizer: Option<RequestCustomizer>,
}

impl Fetcher {
    pub fn new(
        engine: Arc<dyn TransportEngine>,
        cache: Option<Arc<DiskCache>>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            config,
            customizer: None,
        }
    }

    /// Create a fetcher, opening the disk cache described by `config`
    pub fn open(
        engine: Arc<dyn TransportEngine>,
        config: FetcherConfig,
    ) -> Result<Self, FetchError> {
        let cache = match &config.cache_config {
            Some(cache_config) => Some(Arc::new(DiskCache::open(cache_config.clone())?)),
            None => None,
        };
        Ok(Self::new(engine, cache, config))
    }

    pub fn with_customizer<F>(mut self, customizer: F) -> Self
    where
        F: Fn(&mut RequestExecutor) + Send + Sync + 'static,
    {
        self.customizer = Some(Arc::new(customizer));
        self
    }

    pub fn cache(&self) -> Option<&Arc<DiskCache>> {
        self.cache.as_ref()
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Load `url`, preferring the cache.
    ///
    /// With `offline_only` no request is issued: any cached entry is served,
    /// fresh or stale, and `Ok(None)` is returned when there is none.
    pub fn load(
        &self,
        url: &str,
        offline_only: bool,
    ) -> Result<Option<LoadResponse>, FetchError> {
        let mut cached = None;
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.lookup(url)? {
                let now = now_millis();
                let fresh = entry
                    .meta_millis(META_EXPIRE)
                    .is_none_or(|expire| expire > now);
                if fresh || offline_only {
                    if let Some(file) = cache.open_stream(&entry)? {
                        debug!(url, key = %entry.key, fresh, "Serving from cache");
                        return Ok(Some(cached_response(file, &entry)));
                    }
                } else {
                    cached = Some(entry);
                }
            }
        }

        if offline_only {
            debug!(url, "Offline and not cached");
            return Ok(None);
        }

        let if_modified_since = cached.as_ref().map(|entry| {
            entry
                .meta_millis(META_LAST_MODIFIED)
                .unwrap_or(entry.create_time)
        });
        let (final_url, response) = self.fetch(url, if_modified_since)?;

        match (response.status(), &self.cache, cached) {
            (304, Some(cache), Some(entry)) => self.revalidated(cache, url, entry, &response),
            (200, _, _) => self.fetched(url, &response).map(Some),
            (status, _, _) => Err(status_error(final_url, status, &response)),
        }
    }

    /// Keep the cached body after a `304`
    fn revalidated(
        &self,
        cache: &DiskCache,
        url: &str,
        entry: CacheEntry,
        response: &HttpResponse,
    ) -> Result<Option<LoadResponse>, FetchError> {
        if let Some(file) = cache.open_stream(&entry)? {
            let freshness = Freshness::from_headers(response.headers(), now_millis());
            if freshness.expire.is_some() {
                if let Err(e) = cache.refresh(&entry.key, freshness.to_meta()) {
                    warn!(url, error = %e, "Failed to refresh cache entry");
                }
            }
            debug!(url, key = %entry.key, "Not modified, serving from cache");
            return Ok(Some(cached_response(file, &entry)));
        }

        warn!(url, "Cached body lost after revalidation, fetching again");
        let (final_url, response) = self.fetch(url, None)?;
        match response.status() {
            200 => self.fetched(url, &response).map(Some),
            status => Err(status_error(final_url, status, &response)),
        }
    }

    /// Serve a `200` body, caching it when the response allows
    fn fetched(&self, url: &str, response: &HttpResponse) -> Result<LoadResponse, FetchError> {
        let body = response.decoded_body()?;
        let received_at = now_millis();
        let freshness = Freshness::from_headers(response.headers(), received_at);

        if let Some(cache) = &self.cache {
            if freshness.is_cacheable(received_at) {
                match cache.store(url, &body, freshness.to_meta()) {
                    Ok(entry) => debug!(
                        url,
                        key = %entry.key,
                        size = entry.file_size,
                        "Stored in cache"
                    ),
                    Err(e) => warn!(url, error = %e, "Failed to store response in cache"),
                }
            } else {
                debug!(url, no_store = freshness.no_store, "Response not cacheable");
            }
        }
        Ok(LoadResponse::fetched(body))
    }

    /// Issue requests for `url` until a non-redirect response arrives.
    ///
    /// Returns the final URL along with its response.
    fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<u64>,
    ) -> Result<(String, HttpResponse), FetchError> {
        let mut current = Url::parse(url)?;
        let mut visited = HashSet::from([current.to_string()]);
        let mut if_modified_since = if_modified_since;
        let mut hops = 0;

        loop {
            let response = self.execute(current.as_str(), if_modified_since.take())?;
            let status = response.status();
            if !is_redirect(status) {
                return Ok((current.into(), response));
            }

            let location = response
                .header("Location")
                .map(str::trim)
                .filter(|location| !location.is_empty())
                .ok_or_else(|| FetchError::MissingLocation {
                    url: current.to_string(),
                    status,
                })?;
            let next = current.join(location)?;
            if !visited.insert(next.to_string()) {
                return Err(FetchError::RedirectLoop {
                    url: next.to_string(),
                });
            }
            hops += 1;
            if hops > self.config.max_redirect_hops {
                return Err(FetchError::TooManyRedirects {
                    url: url.to_string(),
                    hops: self.config.max_redirect_hops,
                });
            }

            info!(from = %current, to = %next, status, "Following redirect");
            current = next;
        }
    }

    fn execute(
        &self,
        url: &str,
        if_modified_since: Option<u64>,
    ) -> Result<HttpResponse, FetchError> {
        let mut executor = RequestExecutor::new(self.engine.clone());
        self.config.apply(&mut executor);
        if let Some(customize) = &self.customizer {
            customize(&mut executor);
        }
        executor
            .get_url(url)?
            .header("Accept-Encoding", "gzip")
            .follow_location(false);
        if let Some(since) = if_modified_since {
            executor.header("If-Modified-Since", format_http_date(since));
        }
        executor.perform()
    }
}

fn cached_response(file: File, entry: &CacheEntry) -> LoadResponse {
    // The blob may have been replaced by a newer version since the entry was read.
    let length = file
        .metadata()
        .map(|metadata| metadata.len())
        .unwrap_or(entry.file_size);
    LoadResponse::cached(file, length)
}

fn status_error(url: String, status: u16, response: &HttpResponse) -> FetchError {
    FetchError::Status {
        url,
        status,
        status_line: response.status_line().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs::OpenOptions;
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    use super::*;
    use crate::cache::DiskCacheConfig;
    use crate::transport::scripted::{Reply, ScriptedEngine};
    use crate::transport::{PreparedRequest, TransportCode};

    const URL: &str = "http://example.test/a";
    const LAST_MODIFIED: u64 = 1_423_069_569_000;
    const LAST_MODIFIED_HTTP: &str = "Wed, 04 Feb 2015 17:06:09 GMT";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    struct Harness {
        _dir: TempDir,
        engine: ScriptedEngine,
        cache: Arc<DiskCache>,
        fetcher: Fetcher,
    }

    fn harness(replies: Vec<Reply>) -> Harness {
        harness_with(replies, FetcherConfig::default())
    }

    fn harness_with(replies: Vec<Reply>, config: FetcherConfig) -> Harness {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(DiskCache::open(DiskCacheConfig::new(dir.path())).unwrap());
        let engine = ScriptedEngine::new(replies);
        let fetcher = Fetcher::new(engine.shared(), Some(cache.clone()), config);
        Harness {
            _dir: dir,
            engine,
            cache,
            fetcher,
        }
    }

    fn has_header(request: &PreparedRequest, line: &str) -> bool {
        request.header_lines.iter().any(|l| l == line)
    }

    fn has_header_named(request: &PreparedRequest, name: &str) -> bool {
        let prefix = format!("{name}:");
        request.header_lines.iter().any(|l| l.starts_with(&prefix))
    }

    fn stale_meta(last_modified: Option<u64>) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::from([(
            META_EXPIRE.to_string(),
            (now_millis() - 1_000).to_string(),
        )]);
        if let Some(last_modified) = last_modified {
            meta.insert(META_LAST_MODIFIED.to_string(), last_modified.to_string());
        }
        meta
    }

    fn truncate_blob(cache: &DiskCache, entry: &CacheEntry) {
        let key = &entry.key;
        let path = cache
            .config()
            .root()
            .join(&key[0..1])
            .join(&key[1..2])
            .join(key);
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .unwrap();
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_fresh_response_cached_and_served_without_request() {
        let h = harness(vec![Reply::http(
            200,
            &[("Cache-Control", "max-age=60")],
            b"hello",
        )]);

        let before = now_millis();
        let first = h.fetcher.load(URL, false).unwrap().unwrap();
        let after = now_millis();
        assert!(!first.from_cache);
        assert_eq!(first.length, 5);
        assert_eq!(first.into_bytes().unwrap(), b"hello");

        let entry = h.cache.lookup(URL).unwrap().unwrap();
        let expire = entry.meta_millis(META_EXPIRE).unwrap();
        assert!(expire >= before + 60_000 && expire <= after + 60_000);

        let second = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(second.from_cache);
        assert_eq!(second.length, 5);
        assert_eq!(second.into_bytes().unwrap(), b"hello");
        assert_eq!(h.engine.requests().len(), 1);
    }

    #[test]
    fn test_request_shape() {
        let h = harness(vec![Reply::http(200, &[], b"x")]);
        h.fetcher.load(URL, false).unwrap().unwrap();

        let requests = h.engine.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert!(!request.follow_location);
        assert!(has_header(request, "Accept-Encoding: gzip"));
        assert!(!has_header_named(request, "If-Modified-Since"));
        assert_eq!(h.engine.acquired(), h.engine.released());
    }

    #[test]
    fn test_response_without_freshness_not_cached() {
        let h = harness(vec![
            Reply::http(200, &[], b"one"),
            Reply::http(200, &[], b"two"),
        ]);
        h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(h.cache.lookup(URL).unwrap().is_none());

        let second = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(!second.from_cache);
        assert_eq!(second.into_bytes().unwrap(), b"two");
    }

    #[test]
    fn test_max_age_overrides_expires() {
        let h = harness(vec![Reply::http(
            200,
            &[
                ("Cache-Control", "public, max-age=3600"),
                ("Date", "Wed, 04 Feb 2015 17:06:09 GMT"),
                ("Expires", "Wed, 04 Feb 2015 17:06:10 GMT"),
            ],
            b"body",
        )]);

        let before = now_millis();
        h.fetcher.load(URL, false).unwrap().unwrap();
        let after = now_millis();

        let entry = h.cache.lookup(URL).unwrap().unwrap();
        let expire = entry.meta_millis(META_EXPIRE).unwrap();
        assert!(expire >= before + 3_600_000 && expire <= after + 3_600_000);
    }

    #[test]
    fn test_last_modified_recorded() {
        let h = harness(vec![Reply::http(
            200,
            &[
                ("Cache-Control", "max-age=60"),
                ("Last-Modified", LAST_MODIFIED_HTTP),
            ],
            b"body",
        )]);
        h.fetcher.load(URL, false).unwrap().unwrap();

        let entry = h.cache.lookup(URL).unwrap().unwrap();
        assert_eq!(entry.meta_millis(META_LAST_MODIFIED), Some(LAST_MODIFIED));
        assert_eq!(entry.identity(), Some(URL));
    }

    #[test]
    fn test_no_store_not_cached() {
        let h = harness(vec![Reply::http(
            200,
            &[("Cache-Control", "no-store, max-age=60")],
            b"secret",
        )]);
        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert_eq!(response.into_bytes().unwrap(), b"secret");
        assert!(h.cache.lookup(URL).unwrap().is_none());
    }

    #[test]
    fn test_gzip_body_decoded_and_stored_decoded() {
        let h = harness(vec![Reply::http(
            200,
            &[("Content-Encoding", "gzip"), ("Cache-Control", "max-age=60")],
            &gzip(b"hello world"),
        )]);

        let first = h.fetcher.load(URL, false).unwrap().unwrap();
        assert_eq!(first.length, 11);
        assert_eq!(first.into_bytes().unwrap(), b"hello world");

        let entry = h.cache.lookup(URL).unwrap().unwrap();
        assert_eq!(entry.file_size, 11);

        let second = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(second.from_cache);
        assert_eq!(second.into_bytes().unwrap(), b"hello world");
    }

    #[test]
    fn test_stale_entry_revalidated_with_not_modified() {
        let h = harness(vec![Reply::http(
            304,
            &[("Cache-Control", "max-age=120")],
            b"",
        )]);
        let stored = h
            .cache
            .store(URL, b"old body", stale_meta(Some(LAST_MODIFIED)))
            .unwrap();

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(response.from_cache);
        assert_eq!(response.length, 8);
        assert_eq!(response.into_bytes().unwrap(), b"old body");

        let requests = h.engine.requests();
        assert_eq!(requests.len(), 1);
        assert!(has_header(
            &requests[0],
            &format!("If-Modified-Since: {LAST_MODIFIED_HTTP}")
        ));

        // The blob is untouched and only the bookkeeping moved forward.
        let entry = h.cache.lookup(URL).unwrap().unwrap();
        assert_eq!(entry.key, stored.key);
        assert_eq!(entry.file_size, stored.file_size);
        assert_eq!(entry.create_time, stored.create_time);
        assert!(entry.meta_millis(META_EXPIRE).unwrap() > now_millis());
        assert_eq!(entry.meta_millis(META_LAST_MODIFIED), Some(LAST_MODIFIED));

        let again = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(again.from_cache);
        assert_eq!(h.engine.requests().len(), 1);
    }

    #[test]
    fn test_if_modified_since_falls_back_to_create_time() {
        let h = harness(vec![Reply::http(304, &[], b"")]);
        let stored = h.cache.store(URL, b"old", stale_meta(None)).unwrap();

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(response.from_cache);

        let expected = format!(
            "If-Modified-Since: {}",
            format_http_date(stored.create_time)
        );
        assert!(has_header(&h.engine.requests()[0], &expected));

        // Without freshness headers the entry stays stale.
        let entry = h.cache.lookup(URL).unwrap().unwrap();
        assert!(entry.meta_millis(META_EXPIRE).unwrap() < now_millis());
    }

    #[test]
    fn test_stale_entry_replaced_on_ok() {
        let h = harness(vec![Reply::http(
            200,
            &[("Cache-Control", "max-age=60")],
            b"new body",
        )]);
        h.cache
            .store(URL, b"old", stale_meta(Some(LAST_MODIFIED)))
            .unwrap();

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(!response.from_cache);
        assert_eq!(response.into_bytes().unwrap(), b"new body");

        let entry = h.cache.lookup(URL).unwrap().unwrap();
        assert_eq!(entry.file_size, 8);
        assert!(entry.meta_millis(META_EXPIRE).unwrap() > now_millis());
    }

    #[test]
    fn test_not_modified_without_entry_is_error() {
        let h = harness(vec![Reply::http(304, &[], b"")]);
        let err = h.fetcher.load(URL, false).unwrap_err();
        assert_eq!(err.status(), Some(304));
    }

    #[test]
    fn test_error_status_not_cached() {
        let h = harness(vec![Reply::http(
            404,
            &[("Cache-Control", "max-age=60")],
            b"missing",
        )]);
        let err = h.fetcher.load(URL, false).unwrap_err();
        match err {
            FetchError::Status { url, status, .. } => {
                assert_eq!(url, URL);
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(h.cache.lookup(URL).unwrap().is_none());
    }

    #[test]
    fn test_transport_failure_surfaces() {
        let h = harness(vec![Reply::failure(TransportCode::COULDNT_CONNECT)]);
        let err = h.fetcher.load(URL, false).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport {
                code: TransportCode::COULDNT_CONNECT,
                ..
            }
        ));
        assert_eq!(h.engine.acquired(), 1);
        assert_eq!(h.engine.released(), 1);
    }

    #[test]
    fn test_relative_redirect_followed() {
        let h = harness(vec![
            Reply::http(302, &[("Location", "/b")], b""),
            Reply::http(200, &[("Cache-Control", "max-age=60")], b"moved"),
        ]);

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert_eq!(response.into_bytes().unwrap(), b"moved");

        let requests = h.engine.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].url.as_str(), "http://example.test/b");
        assert!(!requests[1].follow_location);

        // Cached under the requested URL, not the redirect target.
        assert!(h.cache.lookup(URL).unwrap().is_some());
        assert!(h.cache.lookup("http://example.test/b").unwrap().is_none());
    }

    #[test]
    fn test_if_modified_since_only_on_first_hop() {
        let h = harness(vec![
            Reply::http(301, &[("Location", "http://example.test/b")], b""),
            Reply::http(304, &[], b""),
        ]);
        h.cache
            .store(URL, b"old", stale_meta(Some(LAST_MODIFIED)))
            .unwrap();

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(response.from_cache);

        let requests = h.engine.requests();
        assert!(has_header_named(&requests[0], "If-Modified-Since"));
        assert!(!has_header_named(&requests[1], "If-Modified-Since"));
    }

    #[test]
    fn test_redirect_loop_rejected_before_third_request() {
        let h = harness(vec![
            Reply::http(302, &[("Location", "http://example.test/b")], b""),
            Reply::http(301, &[("Location", "/a")], b""),
            Reply::http(200, &[], b"unreachable"),
        ]);

        let err = h.fetcher.load(URL, false).unwrap_err();
        assert!(matches!(&err, FetchError::RedirectLoop { url } if url == URL));
        assert!(err.is_io_class());
        assert_eq!(h.engine.requests().len(), 2);
    }

    #[test]
    fn test_self_redirect_rejected() {
        let h = harness(vec![Reply::http(307, &[("Location", URL)], b"")]);
        let err = h.fetcher.load(URL, false).unwrap_err();
        assert!(matches!(err, FetchError::RedirectLoop { .. }));
        assert_eq!(h.engine.requests().len(), 1);
    }

    #[test]
    fn test_redirect_without_location_rejected() {
        let h = harness(vec![Reply::http(302, &[], b"")]);
        let err = h.fetcher.load(URL, false).unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingLocation { status: 302, .. }
        ));
        assert!(err.is_io_class());
    }

    #[test]
    fn test_too_many_redirects() {
        let config = FetcherConfig::builder().with_max_redirect_hops(2).build();
        let h = harness_with(
            vec![
                Reply::http(302, &[("Location", "/b")], b""),
                Reply::http(302, &[("Location", "/c")], b""),
                Reply::http(302, &[("Location", "/d")], b""),
                Reply::http(200, &[], b"unreachable"),
            ],
            config,
        );

        let err = h.fetcher.load(URL, false).unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects { hops: 2, .. }));
        assert_eq!(h.engine.requests().len(), 3);
    }

    #[test]
    fn test_offline_without_entry() {
        let h = harness(vec![]);
        assert!(h.fetcher.load(URL, true).unwrap().is_none());
        assert_eq!(h.engine.acquired(), 0);
    }

    #[test]
    fn test_offline_serves_stale_entry() {
        let h = harness(vec![]);
        h.cache.store(URL, b"stale", stale_meta(None)).unwrap();

        let response = h.fetcher.load(URL, true).unwrap().unwrap();
        assert!(response.from_cache);
        assert_eq!(response.into_bytes().unwrap(), b"stale");
        assert_eq!(h.engine.acquired(), 0);
    }

    #[test]
    fn test_corrupt_fresh_entry_treated_as_miss() {
        let h = harness(vec![Reply::http(200, &[], b"fresh copy")]);
        let entry = h
            .cache
            .store(
                URL,
                b"cached body",
                BTreeMap::from([(META_LAST_MODIFIED.to_string(), LAST_MODIFIED.to_string())]),
            )
            .unwrap();
        truncate_blob(&h.cache, &entry);

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(!response.from_cache);
        assert_eq!(response.into_bytes().unwrap(), b"fresh copy");
        assert!(!has_header_named(
            &h.engine.requests()[0],
            "If-Modified-Since"
        ));
    }

    #[test]
    fn test_corrupt_entry_refetched_after_not_modified() {
        let h = harness(vec![
            Reply::http(304, &[("Cache-Control", "max-age=60")], b""),
            Reply::http(200, &[("Cache-Control", "max-age=60")], b"refetched"),
        ]);
        let entry = h
            .cache
            .store(URL, b"old body", stale_meta(Some(LAST_MODIFIED)))
            .unwrap();
        truncate_blob(&h.cache, &entry);

        let response = h.fetcher.load(URL, false).unwrap().unwrap();
        assert!(!response.from_cache);
        assert_eq!(response.into_bytes().unwrap(), b"refetched");

        let requests = h.engine.requests();
        assert_eq!(requests.len(), 2);
        assert!(has_header_named(&requests[0], "If-Modified-Since"));
        assert!(!has_header_named(&requests[1], "If-Modified-Since"));

        let entry = h.cache.lookup(URL).unwrap().unwrap();
        assert_eq!(entry.file_size, 9);
    }

    #[test]
    fn test_without_cache_always_fetches() {
        let engine = ScriptedEngine::new(vec![
            Reply::http(200, &[("Cache-Control", "max-age=60")], b"one"),
            Reply::http(200, &[("Cache-Control", "max-age=60")], b"two"),
        ]);
        let fetcher = Fetcher::new(engine.shared(), None, FetcherConfig::default());
        assert!(fetcher.cache().is_none());

        let first = fetcher.load(URL, false).unwrap().unwrap();
        assert_eq!(first.into_bytes().unwrap(), b"one");
        let second = fetcher.load(URL, false).unwrap().unwrap();
        assert!(!second.from_cache);
        assert_eq!(second.into_bytes().unwrap(), b"two");
        assert!(fetcher.load(URL, true).unwrap().is_none());
    }

    #[test]
    fn test_open_uses_cache_config() {
        let dir = TempDir::new().unwrap();
        let config = FetcherConfig::builder().with_cache_dir(dir.path()).build();
        let engine = ScriptedEngine::new(vec![Reply::http(
            200,
            &[("Cache-Control", "max-age=60")],
            b"hello",
        )]);
        let fetcher = Fetcher::open(engine.shared(), config).unwrap();
        assert_eq!(fetcher.cache().unwrap().config().root(), dir.path());

        fetcher.load(URL, false).unwrap().unwrap();
        assert!(fetcher.load(URL, false).unwrap().unwrap().from_cache);
    }

    #[test]
    fn test_config_and_customizer_applied() {
        let config = FetcherConfig::builder()
            .with_user_agent("Agent/2.0")
            .with_header("X-Api-Key", "secret")
            .build();
        let h = harness_with(vec![Reply::http(200, &[], b"ok")], config);
        let fetcher = Fetcher::new(
            h.engine.shared(),
            Some(h.cache.clone()),
            FetcherConfig::default(),
        )
        .with_customizer(|executor| {
            executor.header("X-Trace", "1");
        });

        h.fetcher.load(URL, false).unwrap().unwrap();
        let request = &h.engine.requests()[0];
        assert!(has_header(request, "User-Agent: Agent/2.0"));
        assert!(has_header(request, "x-api-key: secret"));

        h.engine.push(Reply::http(200, &[], b"ok"));
        fetcher.load(URL, false).unwrap().unwrap();
        let request = &h.engine.requests()[1];
        assert!(has_header(request, "X-Trace: 1"));
        assert!(has_header(request, "Accept-Encoding: gzip"));
    }
}
