use std::collections::HashMap;
use std::io::Read;
use std::sync::OnceLock;

use bytes::Bytes;
use flate2::read::GzDecoder;

use crate::error::FetchError;

/// Response headers, keyed case-insensitively; later values replace earlier ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, (String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries.insert(
            name.to_ascii_lowercase(),
            (name.to_string(), value.to_string()),
        );
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Headers as received, `(name, value)`
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Outcome of one executed request.
///
/// Immutable apart from the decoded body, which is inflated on first access
/// when the response carries `Content-Encoding: gzip`.
#[derive(Debug)]
pub struct HttpResponse {
    status: u16,
    status_line: String,
    headers: Headers,
    body: Bytes,
    decoded: OnceLock<Result<Bytes, String>>,
}

impl HttpResponse {
    pub fn new(status: u16, status_line: String, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            status_line,
            headers,
            body,
            decoded: OnceLock::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Body bytes as received on the wire
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_gzip(&self) -> bool {
        self.header("Content-Encoding").is_some_and(|encoding| {
            encoding
                .split(',')
                .any(|e| matches!(e.trim().to_ascii_lowercase().as_str(), "gzip" | "x-gzip"))
        })
    }

    /// Body with the content encoding removed
    pub fn decoded_body(&self) -> Result<Bytes, FetchError> {
        if !self.is_gzip() {
            return Ok(self.body.clone());
        }
        self.decoded
            .get_or_init(|| {
                let mut out = Vec::with_capacity(self.body.len() * 4);
                GzDecoder::new(&self.body[..])
                    .read_to_end(&mut out)
                    .map(|_| Bytes::from(out))
                    .map_err(|e| format!("gzip body could not be inflated: {e}"))
            })
            .clone()
            .map_err(FetchError::Encoding)
    }

    /// Decoded body as text, replacing invalid UTF-8 sequences
    pub fn body_as_string(&self) -> Result<String, FetchError> {
        Ok(String::from_utf8_lossy(&self.decoded_body()?).into_owned())
    }
}
