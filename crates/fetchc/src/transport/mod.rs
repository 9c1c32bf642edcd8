//! # Transport Boundary
//!
//! The fetch layer never touches sockets itself. It drives a
//! [`TransportEngine`], a process-wide object created once and shared by
//! reference, which hands out one [`TransportHandle`] per request.
//!
//! A handle is configured with a [`PreparedRequest`], performs it while
//! feeding raw response header lines and body chunks to two callbacks, and
//! reports a [`TransportStatus`] that is distinct from the HTTP status.
//! Every acquired handle must be released exactly once.

mod reqwest_engine;
#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::proxy::ProxyConfig;

pub use reqwest_engine::ReqwestEngine;

/// Transport-level result code, numerically compatible with libcurl's `CURLcode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportCode(pub i32);

impl TransportCode {
    pub const OK: Self = Self(0);
    pub const UNSUPPORTED_PROTOCOL: Self = Self(1);
    pub const FAILED_INIT: Self = Self(2);
    pub const URL_MALFORMAT: Self = Self(3);
    pub const COULDNT_RESOLVE_PROXY: Self = Self(5);
    pub const COULDNT_RESOLVE_HOST: Self = Self(6);
    pub const COULDNT_CONNECT: Self = Self(7);
    pub const WEIRD_SERVER_REPLY: Self = Self(8);
    pub const PARTIAL_FILE: Self = Self(18);
    pub const WRITE_ERROR: Self = Self(23);
    pub const READ_ERROR: Self = Self(26);
    pub const OPERATION_TIMEDOUT: Self = Self(28);
    pub const SSL_CONNECT_ERROR: Self = Self(35);
    pub const ABORTED_BY_CALLBACK: Self = Self(42);
    pub const TOO_MANY_REDIRECTS: Self = Self(47);
    pub const GOT_NOTHING: Self = Self(52);
    pub const SEND_ERROR: Self = Self(55);
    pub const RECV_ERROR: Self = Self(56);
    pub const BAD_CONTENT_ENCODING: Self = Self(61);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Symbolic name of well-known codes
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OK => "OK",
            Self::UNSUPPORTED_PROTOCOL => "UNSUPPORTED_PROTOCOL",
            Self::FAILED_INIT => "FAILED_INIT",
            Self::URL_MALFORMAT => "URL_MALFORMAT",
            Self::COULDNT_RESOLVE_PROXY => "COULDNT_RESOLVE_PROXY",
            Self::COULDNT_RESOLVE_HOST => "COULDNT_RESOLVE_HOST",
            Self::COULDNT_CONNECT => "COULDNT_CONNECT",
            Self::WEIRD_SERVER_REPLY => "WEIRD_SERVER_REPLY",
            Self::PARTIAL_FILE => "PARTIAL_FILE",
            Self::WRITE_ERROR => "WRITE_ERROR",
            Self::READ_ERROR => "READ_ERROR",
            Self::OPERATION_TIMEDOUT => "OPERATION_TIMEDOUT",
            Self::SSL_CONNECT_ERROR => "SSL_CONNECT_ERROR",
            Self::ABORTED_BY_CALLBACK => "ABORTED_BY_CALLBACK",
            Self::TOO_MANY_REDIRECTS => "TOO_MANY_REDIRECTS",
            Self::GOT_NOTHING => "GOT_NOTHING",
            Self::SEND_ERROR => "SEND_ERROR",
            Self::RECV_ERROR => "RECV_ERROR",
            Self::BAD_CONTENT_ENCODING => "BAD_CONTENT_ENCODING",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}/{}", self.0),
            None => write!(f, "code {}", self.0),
        }
    }
}

/// Outcome reported by the engine for one configured or performed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStatus {
    pub code: TransportCode,
    /// Engine-provided description of a failure
    pub detail: Option<String>,
}

impl TransportStatus {
    pub fn ok() -> Self {
        Self {
            code: TransportCode::OK,
            detail: None,
        }
    }

    pub fn failed(code: TransportCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Address family used to resolve and connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum IpVersion {
    #[default]
    Any,
    V4,
    V6,
}

/// Proxy selection for a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ProxySetting {
    /// Honor the environment's proxy settings
    #[default]
    System,
    /// Connect directly
    Disabled,
    Explicit(ProxyConfig),
}

/// One multipart form part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// Encoded request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes { content_type: String, data: Bytes },
    Multipart(Vec<MultiPart>),
}

/// A fully encoded request, ready to be handed to a transport handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub url: String,
    pub method: HttpMethod,
    /// Serialized `Name: value` lines; a bare `Name:` suppresses a default header
    pub header_lines: Vec<String>,
    pub body: RequestBody,
    pub proxy: ProxySetting,
    pub connect_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub follow_location: bool,
    pub max_redirects: usize,
    pub ip_version: IpVersion,
}

/// Process-wide request engine
pub trait TransportEngine: Send + Sync {
    /// Acquire a handle for exactly one request
    fn acquire(&self) -> Result<Box<dyn TransportHandle>, TransportStatus>;
}

/// A handle bound to one request.
///
/// Callers must call [`release`](TransportHandle::release) exactly once,
/// whatever the outcome of `configure` or `perform`.
pub trait TransportHandle {
    fn configure(&mut self, request: &PreparedRequest) -> Result<(), TransportStatus>;

    /// Execute the configured request, synchronously feeding raw header lines
    /// (status lines included) and body chunks to the callbacks
    fn perform(
        &mut self,
        on_header_line: &mut dyn FnMut(&str),
        on_body_chunk: &mut dyn FnMut(&[u8]),
    ) -> TransportStatus;

    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_display() {
        assert_eq!(TransportCode::COULDNT_CONNECT.to_string(), "COULDNT_CONNECT/7");
        assert_eq!(TransportCode(99).to_string(), "code 99");
        assert!(TransportCode::OK.is_ok());
        assert!(!TransportStatus::failed(TransportCode::RECV_ERROR, "reset").is_ok());
    }
}
