use crate::error::AppError;

/// Function to parse size with units
pub fn parse_size(size_str: &str) -> Result<u64, AppError> {
    // Trim whitespace and handle case-insensitivity
    let size_str = size_str.trim().to_lowercase();

    if size_str.is_empty() {
        return Err(AppError::ParseError("Invalid format: empty string".to_string()));
    }

    // Split the numeric part and the unit
    let split = size_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size_str.len());
    let (numeric_part, unit_part) = size_str.split_at(split);

    // Handle cases with no unit (assume bytes)
    if unit_part.is_empty() {
        return numeric_part
            .parse::<u64>()
            .map_err(|_| AppError::ParseError(format!("Invalid number: '{numeric_part}'")));
    }

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number: '{numeric_part}'")))?;

    // Parse the unit and convert to bytes
    let multiplier: f64 = match unit_part.trim() {
        "b" => 1.0,
        "kb" | "k" => 1024.0,
        "mb" | "m" => 1024.0 * 1024.0,
        "gb" | "g" => 1024.0 * 1024.0 * 1024.0,
        "tb" | "t" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        unit => return Err(AppError::ParseError(format!("Invalid unit: '{unit}'"))),
    };
    Ok((value * multiplier) as u64)
}

/// Convert bytes to a human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
