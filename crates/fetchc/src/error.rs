use crate::cache::CacheError;
use crate::transport::TransportCode;

// Custom error type for fetch operations
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Transport failure ({code}): {detail}")]
    Transport { code: TransportCode, detail: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("Redirect response {status} from {url} has no Location header")]
    MissingLocation { url: String, status: u16 },

    #[error("Too many redirects ({hops}) starting from {url}")]
    TooManyRedirects { url: String, hops: usize },

    #[error("Load {url} failed: {status_line}")]
    Status {
        url: String,
        status: u16,
        status_line: String,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether this error belongs to the I/O class (redirect failures and
    /// local I/O), as opposed to transport, status or misuse errors.
    pub fn is_io_class(&self) -> bool {
        matches!(
            self,
            FetchError::RedirectLoop { .. }
                | FetchError::MissingLocation { .. }
                | FetchError::TooManyRedirects { .. }
                | FetchError::Io(_)
        )
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } | FetchError::MissingLocation { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<FetchError> for std::io::Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Io(e) => e,
            other => std::io::Error::other(format!("Fetch error: {other}")),
        }
    }
}

impl From<crate::transport::TransportStatus> for FetchError {
    fn from(status: crate::transport::TransportStatus) -> Self {
        let code = status.code;
        FetchError::Transport {
            code,
            detail: status.detail.unwrap_or_else(|| code.to_string()),
        }
    }
}
