//! # Fetcher
//!
//! Cache-aware loading of HTTP resources on top of
//! [`RequestExecutor`](crate::request::RequestExecutor) and
//! [`DiskCache`](crate::cache::DiskCache).

#[allow(clippy::module_inception)]
mod fetcher;
mod freshness;
mod response;

pub use fetcher::{Fetcher, RequestCustomizer};
pub use freshness::{Freshness, format_http_date, is_no_store, parse_http_date, parse_max_age};
pub use response::{LoadResponse, ResponseBody};
