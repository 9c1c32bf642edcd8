use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Parse a header string in format "Name: Value" and add it to the HeaderMap
pub fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) {
    // Find the first colon which separates name and value
    let Some((name, value)) = header_str.split_once(':') else {
        tracing::warn!(
            "Invalid header format: '{}'. Expected 'Name: Value'",
            header_str
        );
        return;
    };

    let name = name.trim();
    let value = value.trim();

    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        tracing::warn!("Invalid header name: '{}'", name);
        return;
    };

    let Ok(header_value) = HeaderValue::from_str(value) else {
        tracing::warn!("Invalid header value: '{}'", value);
        return;
    };

    debug!("Adding header: {}: {}", name, value);
    headers.insert(header_name, header_value);
}

/// Parse a collection of header strings and return a HeaderMap
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str);
    }

    headers
}
