//! Default transport engine over `reqwest::blocking`.
//!
//! Clients are cached per connection-level setting (redirect policy, proxy,
//! connect timeout, address family). Responses are replayed to the handle's
//! callbacks as a synthesized status line, one line per header and the body
//! in fixed-size chunks. Automatic decompression is disabled so the caller
//! sees `Content-Encoding` and the encoded bytes untouched.

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::{Client, multipart};
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use rustls::{ClientConfig, crypto::aws_lc_rs};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::{debug, info};

use super::{
    HttpMethod, IpVersion, PreparedRequest, ProxySetting, RequestBody, TransportCode,
    TransportEngine, TransportHandle, TransportStatus,
};
use crate::proxy::build_proxy_from_config;

const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    follow_location: bool,
    max_redirects: usize,
    proxy: ProxySetting,
    connect_timeout: Option<Duration>,
    ip_version: IpVersion,
}

impl ClientKey {
    fn of(request: &PreparedRequest) -> Self {
        Self {
            follow_location: request.follow_location,
            max_redirects: request.max_redirects,
            proxy: request.proxy.clone(),
            connect_timeout: request.connect_timeout,
            ip_version: request.ip_version,
        }
    }
}

/// Transport engine backed by a pool of blocking reqwest clients
#[derive(Default)]
pub struct ReqwestEngine {
    clients: Arc<Mutex<HashMap<ClientKey, Client>>>,
}

impl ReqwestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(
        clients: &Mutex<HashMap<ClientKey, Client>>,
        key: &ClientKey,
    ) -> Result<Client, TransportStatus> {
        if let Some(client) = clients.lock().get(key) {
            return Ok(client.clone());
        }
        let client = create_client(key)?;
        clients.lock().insert(key.clone(), client.clone());
        Ok(client)
    }
}

impl TransportEngine for ReqwestEngine {
    fn acquire(&self) -> Result<Box<dyn TransportHandle>, TransportStatus> {
        Ok(Box::new(ReqwestHandle {
            clients: self.clients.clone(),
            request: None,
        }))
    }
}

struct ReqwestHandle {
    clients: Arc<Mutex<HashMap<ClientKey, Client>>>,
    request: Option<reqwest::blocking::RequestBuilder>,
}

impl TransportHandle for ReqwestHandle {
    fn configure(&mut self, request: &PreparedRequest) -> Result<(), TransportStatus> {
        let client = ReqwestEngine::client_for(&self.clients, &ClientKey::of(request))?;
        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };

        for line in &request.header_lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            // A bare "Name:" only asks for the header to be left out.
            if value.is_empty() {
                continue;
            }
            let malformed = |what: &str, e: &dyn std::fmt::Display| {
                TransportStatus::failed(
                    TransportCode::URL_MALFORMAT,
                    format!("Invalid header {what} in {line:?}: {e}"),
                )
            };
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| malformed("name", &e))?;
            let value = HeaderValue::from_str(value).map_err(|e| malformed("value", &e))?;
            builder = builder.header(name, value);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes { content_type, data } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.to_vec()),
            RequestBody::Multipart(parts) => {
                let mut form = multipart::Form::new();
                for part in parts {
                    let mut field = multipart::Part::bytes(part.content.to_vec());
                    if let Some(filename) = &part.filename {
                        field = field.file_name(filename.clone());
                    }
                    if let Some(content_type) = &part.content_type {
                        field = field.mime_str(content_type).map_err(|e| {
                            TransportStatus::failed(
                                TransportCode::URL_MALFORMAT,
                                format!("Invalid content type {content_type:?}: {e}"),
                            )
                        })?;
                    }
                    form = form.part(part.name.clone(), field);
                }
                builder.multipart(form)
            }
        };

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        debug!(method = request.method.as_str(), url = %request.url, "Configured request");
        self.request = Some(builder);
        Ok(())
    }

    fn perform(
        &mut self,
        on_header_line: &mut dyn FnMut(&str),
        on_body_chunk: &mut dyn FnMut(&[u8]),
    ) -> TransportStatus {
        let Some(builder) = self.request.take() else {
            return TransportStatus::failed(
                TransportCode::FAILED_INIT,
                "Request was not configured",
            );
        };

        let mut response = match builder.send() {
            Ok(response) => response,
            Err(e) => return status_from_error(&e),
        };

        let status = response.status();
        on_header_line(&format!(
            "{:?} {} {}",
            response.version(),
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ));
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes());
            on_header_line(&format!("{name}: {value}"));
        }
        on_header_line("");

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => on_body_chunk(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let code = if e.kind() == io::ErrorKind::TimedOut {
                        TransportCode::OPERATION_TIMEDOUT
                    } else {
                        TransportCode::RECV_ERROR
                    };
                    return TransportStatus::failed(code, e.to_string());
                }
            }
        }
        TransportStatus::ok()
    }

    fn release(&mut self) {
        self.request = None;
    }
}

/// Create a blocking client for one connection-level setting
fn create_client(key: &ClientKey) -> Result<Client, TransportStatus> {
    let init_failed = |e: rustls::Error| {
        TransportStatus::failed(
            TransportCode::SSL_CONNECT_ERROR,
            format!("TLS setup failed: {e}"),
        )
    };

    let provider = Arc::new(aws_lc_rs::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(init_failed)?
        .with_platform_verifier()
        .map_err(init_failed)?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .use_preconfigured_tls(tls_config)
        .no_gzip()
        .no_deflate()
        .timeout(None::<Duration>)
        .redirect(if key.follow_location {
            reqwest::redirect::Policy::limited(key.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        });

    if let Some(connect_timeout) = key.connect_timeout {
        client_builder = client_builder.connect_timeout(connect_timeout);
    }

    client_builder = match key.ip_version {
        IpVersion::Any => client_builder,
        IpVersion::V4 => client_builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        IpVersion::V6 => client_builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
    };

    match &key.proxy {
        ProxySetting::Explicit(proxy_config) => {
            client_builder = client_builder.proxy(build_proxy_from_config(proxy_config)?);
            info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
        }
        ProxySetting::System => {
            // reqwest reads the environment's proxy settings unless no_proxy() is called
            debug!("Using system proxy settings");
        }
        ProxySetting::Disabled => {
            client_builder = client_builder.no_proxy();
            debug!("Proxy disabled");
        }
    }

    client_builder
        .build()
        .map_err(|e| TransportStatus::failed(TransportCode::FAILED_INIT, e.to_string()))
}

fn status_from_error(e: &reqwest::Error) -> TransportStatus {
    let code = if e.is_timeout() {
        TransportCode::OPERATION_TIMEDOUT
    } else if e.is_connect() {
        TransportCode::COULDNT_CONNECT
    } else if e.is_redirect() {
        TransportCode::TOO_MANY_REDIRECTS
    } else if e.is_builder() {
        TransportCode::URL_MALFORMAT
    } else if e.is_body() || e.is_decode() {
        TransportCode::RECV_ERROR
    } else {
        TransportCode::SEND_ERROR
    };
    TransportStatus::failed(code, e.to_string())
}
