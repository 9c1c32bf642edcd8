//! # Request
//!
//! A single HTTP exchange: request encoding, execution against the transport
//! engine and decoding of the raw response stream.

mod decoder;
mod executor;
mod form;
mod response;

pub use decoder::{BodyDecoder, HeadDecoder, ResponseDecoder};
pub use executor::{DEFAULT_MAX_REDIRECTS, RequestExecutor, default_user_agent};
pub use form::{DEFAULT_FILENAME, FORM_URLENCODED, ParamValue};
pub use response::{Headers, HttpResponse};
