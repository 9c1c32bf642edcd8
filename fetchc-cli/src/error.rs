use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetchc_engine::FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] fetchc_engine::CacheError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("{0} is not available offline")]
    NotAvailable(String),

    #[error("{failed} of {total} fetches failed")]
    Failed { failed: usize, total: usize },
}
