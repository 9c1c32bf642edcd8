//! Freshness computation from response headers.
//!
//! `Cache-Control: max-age` overrides `Expires` even when `Expires` is more
//! restrictive. `Expires` is interpreted relative to the server's `Date` so
//! a skewed server clock does not shift the lifetime.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::cache::{META_EXPIRE, META_LAST_MODIFIED};
use crate::request::Headers;

static MAX_AGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[,\s])max-age\s*=\s*(\d+)").unwrap());
static NO_STORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[,\s])no-store(?:$|[,\s])").unwrap());

/// Parse an HTTP date (RFC 1123, RFC 850 or asctime) into epoch milliseconds
pub fn parse_http_date(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT").map(|n| n.and_utc())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y").map(|n| n.and_utc())
        })
        .ok()?;
    u64::try_from(parsed.timestamp_millis()).ok()
}

/// Format epoch milliseconds as an RFC 1123 HTTP date
pub fn format_http_date(millis: u64) -> String {
    let time = i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `max-age` of a `Cache-Control` value, in seconds
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    MAX_AGE
        .captures(cache_control)
        .and_then(|caps| caps[1].parse().ok())
}

pub fn is_no_store(cache_control: &str) -> bool {
    NO_STORE.is_match(cache_control)
}

/// Cache policy derived from one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Freshness {
    /// Expiry, epoch milliseconds
    pub expire: Option<u64>,
    /// `Last-Modified`, epoch milliseconds
    pub last_modified: Option<u64>,
    pub no_store: bool,
}

impl Freshness {
    /// Evaluate `headers` of a response received at `received_at`
    pub fn from_headers(headers: &Headers, received_at: u64) -> Self {
        let cache_control = headers.get("Cache-Control").unwrap_or_default();
        let last_modified = headers.get("Last-Modified").and_then(parse_http_date);

        let expire = match parse_max_age(cache_control) {
            Some(seconds) => Some(received_at.saturating_add(seconds.saturating_mul(1000))),
            None => headers
                .get("Expires")
                .and_then(parse_http_date)
                .and_then(|expires| {
                    let server_now = headers
                        .get("Date")
                        .and_then(parse_http_date)
                        .unwrap_or(received_at);
                    expires
                        .checked_sub(server_now)
                        .map(|lifetime| received_at.saturating_add(lifetime))
                }),
        };

        Self {
            expire,
            last_modified,
            no_store: is_no_store(cache_control),
        }
    }

    /// Whether the response may be stored, judged at `now`
    pub fn is_cacheable(&self, now: u64) -> bool {
        !self.no_store && self.expire.is_some_and(|expire| expire > now)
    }

    /// Metadata recorded with a stored response
    pub fn to_meta(&self) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        if let Some(expire) = self.expire {
            meta.insert(META_EXPIRE.to_string(), expire.to_string());
        }
        if let Some(last_modified) = self.last_modified {
            meta.insert(META_LAST_MODIFIED.to_string(), last_modified.to_string());
        }
        meta
    }
}
