//! Request body encoding: URL-encoded parameters and multipart parts.

use bytes::Bytes;
use url::{Url, form_urlencoded};

use crate::error::FetchError;
use crate::transport::MultiPart;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
/// File name used for file parts added without one
pub const DEFAULT_FILENAME: &str = "file.dat";

/// Value of one request parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    /// Sent as repeated `name[]=value` pairs
    List(Vec<String>),
}

/// Ordered parameter list
pub type Params = Vec<(String, ParamValue)>;

fn pairs(params: &Params) -> impl Iterator<Item = (String, &str)> {
    params.iter().flat_map(|(name, value)| {
        let expanded: Vec<(String, &str)> = match value {
            ParamValue::Single(v) => vec![(name.clone(), v.as_str())],
            ParamValue::List(values) => values
                .iter()
                .map(|v| (format!("{name}[]"), v.as_str()))
                .collect(),
        };
        expanded
    })
}

/// `application/x-www-form-urlencoded` serialization of `params`
pub fn encode_form(params: &Params) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs(params) {
        serializer.append_pair(&name, value);
    }
    serializer.finish()
}

/// Append `params` to the query string of `url`
pub fn append_query(url: &str, params: &Params) -> Result<String, FetchError> {
    if params.is_empty() {
        return Ok(url.to_string());
    }
    let mut parsed = Url::parse(url)?;
    {
        let mut query = parsed.query_pairs_mut();
        for (name, value) in pairs(params) {
            query.append_pair(&name, value);
        }
    }
    Ok(parsed.into())
}

/// Fold simple parameters into multipart text parts, ahead of the explicit parts
pub fn multipart_parts(
    params: &Params,
    parts: &[MultiPart],
) -> Result<Vec<MultiPart>, FetchError> {
    let mut out = Vec::with_capacity(params.len() + parts.len());
    for (name, value) in params {
        match value {
            ParamValue::Single(v) => out.push(MultiPart {
                name: name.clone(),
                filename: None,
                content_type: None,
                content: Bytes::from(v.clone()),
            }),
            ParamValue::List(_) => {
                return Err(FetchError::InvalidRequest(format!(
                    "list parameter {name} cannot be sent as multipart"
                )));
            }
        }
    }
    for part in parts {
        if out.iter().any(|p| p.name == part.name) {
            return Err(FetchError::InvalidRequest(format!(
                "multipart field {} declared twice",
                part.name
            )));
        }
        out.push(part.clone());
    }
    Ok(out)
}
