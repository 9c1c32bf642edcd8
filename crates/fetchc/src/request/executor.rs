//! # Request Executor
//!
//! Builds one outbound request and drives it against a [`TransportEngine`].
//!
//! The executor owns the request description until [`RequestExecutor::perform`]
//! consumes it. A transport handle is acquired at the start of `perform` and
//! released on every exit path by a guard. HTTP statuses are never turned
//! into errors here; only transport failures are.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};
use url::Url;

use super::decoder::ResponseDecoder;
use super::form::{
    self, DEFAULT_FILENAME, FORM_URLENCODED, ParamValue, Params, append_query, encode_form,
};
use super::response::HttpResponse;
use crate::error::FetchError;
use crate::transport::{
    HttpMethod, IpVersion, MultiPart, PreparedRequest, ProxySetting, RequestBody, TransportCode,
    TransportEngine, TransportHandle,
};

/// Redirect limit applied when the transport follows `Location` itself
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

/// `User-Agent` sent unless overridden or suppressed
pub fn default_user_agent() -> String {
    format!("fetchc/{}", env!("CARGO_PKG_VERSION"))
}

/// Releases the wrapped handle exactly once when dropped
struct HandleGuard {
    handle: Box<dyn TransportHandle>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.handle.release();
    }
}

/// One outbound HTTP request
pub struct RequestExecutor {
    engine: Arc<dyn TransportEngine>,
    target: Option<(HttpMethod, String)>,
    headers: Vec<(String, Option<String>)>,
    params: Params,
    raw_body: Option<(String, Bytes)>,
    parts: Vec<MultiPart>,
    proxy: ProxySetting,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    follow_location: bool,
    max_redirects: usize,
    ip_version: IpVersion,
}

impl RequestExecutor {
    pub fn new(engine: Arc<dyn TransportEngine>) -> Self {
        Self {
            engine,
            target: None,
            headers: vec![("User-Agent".to_string(), Some(default_user_agent()))],
            params: Vec::new(),
            raw_body: None,
            parts: Vec::new(),
            proxy: ProxySetting::default(),
            connect_timeout: None,
            timeout: None,
            follow_location: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            ip_version: IpVersion::Any,
        }
    }

    /// Target `url` with a GET request
    pub fn get_url(&mut self, url: impl Into<String>) -> Result<&mut Self, FetchError> {
        self.set_target(HttpMethod::Get, url.into())
    }

    /// Target `url` with a POST request
    pub fn post_url(&mut self, url: impl Into<String>) -> Result<&mut Self, FetchError> {
        self.set_target(HttpMethod::Post, url.into())
    }

    fn set_target(&mut self, method: HttpMethod, url: String) -> Result<&mut Self, FetchError> {
        if let Some((existing, _)) = &self.target {
            if *existing != method {
                return Err(FetchError::InvalidRequest(format!(
                    "a {} URL is already set",
                    existing.as_str()
                )));
            }
        }
        self.target = Some((method, url));
        Ok(self)
    }

    pub fn url(&self) -> Option<&str> {
        self.target.as_ref().map(|(_, url)| url.as_str())
    }

    /// Set a request header, replacing any header of the same name
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put_header(name.into(), Some(value.into()))
    }

    /// Ask the transport to leave out a header it would otherwise send.
    ///
    /// Only headers this executor adds itself, such as `User-Agent`, can be
    /// left out. Defaults the transport library inserts on its own (reqwest
    /// always sends `Accept: */*` when no `Accept` is set) are still sent.
    pub fn suppress_header(&mut self, name: impl Into<String>) -> &mut Self {
        self.put_header(name.into(), None)
    }

    fn put_header(&mut self, name: String, value: Option<String>) -> &mut Self {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => *slot = (name, value),
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Add a simple parameter, replacing one with the same name
    pub fn param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put_param(name.into(), ParamValue::Single(value.into()))
    }

    /// Add a list parameter, sent as repeated `name[]` fields
    pub fn param_list<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.put_param(name.into(), ParamValue::List(values))
    }

    fn put_param(&mut self, name: String, value: ParamValue) -> &mut Self {
        match self.params.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Send `data` as the request body with the given MIME type
    pub fn raw_body(
        &mut self,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> &mut Self {
        self.raw_body = Some((content_type.into(), data.into()));
        self
    }

    /// Add a multipart file part; the request is then sent as multipart
    pub fn multipart(
        &mut self,
        name: impl Into<String>,
        filename: Option<&str>,
        content_type: Option<&str>,
        content: impl Into<Bytes>,
    ) -> Result<&mut Self, FetchError> {
        let name = name.into();
        let content = content.into();
        if name.trim().is_empty() {
            return Err(FetchError::InvalidRequest(
                "multipart name is required".to_string(),
            ));
        }
        if content.is_empty() {
            return Err(FetchError::InvalidRequest(format!(
                "multipart content is required for {name}"
            )));
        }
        self.parts.push(MultiPart {
            name,
            filename: Some(filename.unwrap_or(DEFAULT_FILENAME).to_string()),
            content_type: content_type.map(str::to_string),
            content,
        });
        Ok(self)
    }

    pub fn proxy(&mut self, proxy: ProxySetting) -> &mut Self {
        self.proxy = proxy;
        self
    }

    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Overall timeout of the request, including the body transfer
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let the transport follow redirects itself (default true)
    pub fn follow_location(&mut self, follow: bool) -> &mut Self {
        self.follow_location = follow;
        self
    }

    pub fn max_redirects(&mut self, max: usize) -> &mut Self {
        self.max_redirects = max;
        self
    }

    pub fn ip_version(&mut self, version: IpVersion) -> &mut Self {
        self.ip_version = version;
        self
    }

    /// Serialized header lines, `Name: value` or `Name:` for suppressed headers
    pub fn header_lines(&self) -> Result<Vec<String>, FetchError> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let value = value.as_deref().unwrap_or_default();
                if name.contains([':', '\r', '\n']) || value.contains(['\r', '\n']) {
                    return Err(FetchError::Encoding(format!(
                        "header {name:?} cannot be encoded on one line"
                    )));
                }
                Ok(if value.is_empty() {
                    format!("{name}:")
                } else {
                    format!("{name}: {value}")
                })
            })
            .collect()
    }

    /// Encode the request without performing it
    pub fn prepare(&self) -> Result<PreparedRequest, FetchError> {
        let Some((method, url)) = &self.target else {
            return Err(FetchError::InvalidRequest("no URL set".to_string()));
        };
        Url::parse(url)?;

        let (url, body) = match method {
            HttpMethod::Get => {
                if self.raw_body.is_some() || !self.parts.is_empty() {
                    return Err(FetchError::InvalidRequest(
                        "a GET request cannot carry a body".to_string(),
                    ));
                }
                (append_query(url, &self.params)?, RequestBody::Empty)
            }
            HttpMethod::Post => (url.clone(), self.post_body()?),
        };

        Ok(PreparedRequest {
            url,
            method: *method,
            header_lines: self.header_lines()?,
            body,
            proxy: self.proxy.clone(),
            connect_timeout: self.connect_timeout,
            timeout: self.timeout,
            follow_location: self.follow_location,
            max_redirects: self.max_redirects,
            ip_version: self.ip_version,
        })
    }

    fn post_body(&self) -> Result<RequestBody, FetchError> {
        if let Some((content_type, data)) = &self.raw_body {
            if !self.params.is_empty() || !self.parts.is_empty() {
                return Err(FetchError::InvalidRequest(
                    "a raw body cannot be combined with parameters".to_string(),
                ));
            }
            return Ok(RequestBody::Bytes {
                content_type: content_type.clone(),
                data: data.clone(),
            });
        }
        if !self.parts.is_empty() {
            return Ok(RequestBody::Multipart(form::multipart_parts(
                &self.params,
                &self.parts,
            )?));
        }
        if !self.params.is_empty() {
            return Ok(RequestBody::Bytes {
                content_type: FORM_URLENCODED.to_string(),
                data: Bytes::from(encode_form(&self.params)),
            });
        }
        Ok(RequestBody::Empty)
    }

    /// Perform the request, consuming the executor
    pub fn perform(self) -> Result<HttpResponse, FetchError> {
        let request = self.prepare()?;
        let started = Instant::now();

        let mut guard = HandleGuard {
            handle: self.engine.acquire()?,
        };
        for line in &request.header_lines {
            trace!(line = %line, "Request header");
        }
        debug!(method = request.method.as_str(), url = %request.url, "Performing request");
        guard.handle.configure(&request)?;

        let mut decoder = ResponseDecoder::new();
        let ResponseDecoder { head, body } = &mut decoder;
        let status = guard.handle.perform(
            &mut |line| head.feed_line(line),
            &mut |chunk| body.feed_chunk(chunk),
        );
        drop(guard);

        if !status.is_ok() {
            debug!(url = %request.url, code = %status.code, "Transport failure");
            return Err(status.into());
        }

        let response = decoder.finish().ok_or_else(|| FetchError::Transport {
            code: TransportCode::GOT_NOTHING,
            detail: format!("no HTTP status line received from {}", request.url),
        })?;

        debug!(
            url = %request.url,
            status = response.status(),
            bytes = response.body().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request finished"
        );
        Ok(response)
    }
}
