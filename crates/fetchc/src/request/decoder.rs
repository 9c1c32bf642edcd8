//! Streaming decoder for the transport's two callback channels.

use std::sync::LazyLock;

use bytes::{Bytes, BytesMut};
use regex::Regex;
use tracing::trace;

use super::response::{Headers, HttpResponse};

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HTTP/\d+(?:\.\d+)?\s+(\d{3})\b").unwrap());

/// Header-line half of the decoder.
///
/// A `100 Continue` status line is skipped. Any other status line starts a
/// new header block, so headers of an earlier (redirect or provisional)
/// response do not leak into the final one.
#[derive(Debug, Default)]
pub struct HeadDecoder {
    status: Option<u16>,
    status_line: String,
    headers: Headers,
}

impl HeadDecoder {
    pub fn feed_line(&mut self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        if let Some(caps) = STATUS_LINE.captures(line) {
            let Ok(code) = caps[1].parse::<u16>() else {
                return;
            };
            if code == 100 {
                trace!(line, "Skipping provisional status line");
                return;
            }
            self.status = Some(code);
            self.status_line = line.to_string();
            self.headers.clear();
            return;
        }

        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                self.headers.insert(name, value.trim());
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Body half of the decoder
#[derive(Debug, Default)]
pub struct BodyDecoder {
    buf: BytesMut,
}

impl BodyDecoder {
    pub fn feed_chunk(&mut self, chunk: &[u8]) {
        // Zero-length chunks carry nothing, they do not end the stream.
        if chunk.is_empty() {
            return;
        }
        self.buf.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Both halves, fed independently while a request runs
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    pub head: HeadDecoder,
    pub body: BodyDecoder,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the response; `None` if no final status line was seen
    pub fn finish(self) -> Option<HttpResponse> {
        let status = self.head.status?;
        let body: Bytes = self.body.buf.freeze();
        Some(HttpResponse::new(
            status,
            self.head.status_line,
            self.head.headers,
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(lines: &[&str], chunks: &[&[u8]]) -> Option<HttpResponse> {
        let mut decoder = ResponseDecoder::new();
        for line in lines {
            decoder.head.feed_line(line);
        }
        for chunk in chunks {
            decoder.body.feed_chunk(chunk);
        }
        decoder.finish()
    }

    #[test]
    fn test_status_and_headers() {
        let response = decode(
            &[
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: text/plain\r\n",
                "X-Empty:\r\n",
                "\r\n",
            ],
            &[b"hel", b"lo"],
        )
        .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.status_line(), "HTTP/1.1 200 OK");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("x-empty"), Some(""));
        assert_eq!(response.body().as_ref(), b"hello");
    }

    #[test]
    fn test_continue_is_ignored() {
        let response = decode(
            &["HTTP/1.1 100 Continue", "", "HTTP/1.1 201 Created", "Location: /x"],
            &[],
        )
        .unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.status_line(), "HTTP/1.1 201 Created");
    }

    #[test]
    fn test_only_continue_yields_nothing() {
        assert!(decode(&["HTTP/1.1 100 Continue"], &[]).is_none());
    }

    #[test]
    fn test_later_header_overwrites() {
        let response = decode(&["HTTP/2 200", "Set-Cookie: a=1", "set-cookie: b=2"], &[]).unwrap();
        assert_eq!(response.header("Set-Cookie"), Some("b=2"));
    }

    #[test]
    fn test_new_status_line_resets_headers() {
        let response = decode(
            &[
                "HTTP/1.1 302 Found",
                "Location: http://example.test/b",
                "",
                "HTTP/1.1 200 OK",
                "Content-Length: 0",
            ],
            &[],
        )
        .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.header("Location").is_none());
        assert_eq!(response.header("Content-Length"), Some("0"));
    }

    #[test]
    fn test_empty_chunk_is_a_no_op() {
        let mut decoder = ResponseDecoder::new();
        decoder.head.feed_line("HTTP/1.0 200 OK");
        decoder.body.feed_chunk(b"ab");
        decoder.body.feed_chunk(b"");
        decoder.body.feed_chunk(b"cd");
        assert_eq!(decoder.body.len(), 4);
        assert_eq!(decoder.finish().unwrap().body().as_ref(), b"abcd");
    }

    #[test]
    fn test_status_like_header_value_is_a_header() {
        let response = decode(&["HTTP/1.1 200 OK", "Via: HTTP/1.1 proxy"], &[]).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("Via"), Some("HTTP/1.1 proxy"));
    }
}
