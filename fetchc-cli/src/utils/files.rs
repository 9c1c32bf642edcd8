use crate::error::AppError;

/// File name used when a URL has no usable last path segment
const FALLBACK_NAME: &str = "index";

/// Derive an output file name from the last path segment of a URL.
///
/// Characters that are unsafe in file names are replaced with `_`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(output_file_name("https://example.com/a/video.mp4")?, "video.mp4");
/// assert_eq!(output_file_name("https://example.com/")?, "index");
/// ```
pub fn output_file_name(url_str: &str) -> Result<String, AppError> {
    let url = url_str
        .parse::<reqwest::Url>()
        .map_err(|e| AppError::InvalidInput(format!("{url_str}: {e}")))?;

    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let name: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        return Ok(FALLBACK_NAME.to_string());
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_segment() {
        assert_eq!(
            output_file_name("https://example.com/a/video.mp4?x=1").unwrap(),
            "video.mp4"
        );
        assert_eq!(output_file_name("http://example.com/data").unwrap(), "data");
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(output_file_name("https://example.com").unwrap(), "index");
        assert_eq!(output_file_name("https://example.com/dir/").unwrap(), "index");
    }

    #[test]
    fn test_unsafe_characters_replaced() {
        assert_eq!(
            output_file_name("https://example.com/a%3Ab").unwrap(),
            "a%3Ab"
        );
        assert_eq!(output_file_name("https://example.com/a:b").unwrap(), "a_b");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            output_file_name("not a url"),
            Err(AppError::InvalidInput(_))
        ));
    }
}
