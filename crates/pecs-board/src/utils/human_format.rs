//! Human-readable formatting for byte sizes

/// Formats a size in bytes to a human-readable string with appropriate units
#[must_use]
pub fn format_memory(bytes: f64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0.0 {
        return "0B".to_string();
    }

    let mut size = bytes.abs();
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    let sign = if bytes < 0.0 { "-" } else { "" };

    if unit_index == 0 {
        format!("{}{:.0}{}", sign, size, UNITS[unit_index])
    } else if size >= 10.0 {
        format!("{}{:.1}{}", sign, size, UNITS[unit_index])
    } else {
        format!("{}{:.2}{}", sign, size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(0.0), "0B");
        assert_eq!(format_memory(512.0), "512B");
        assert_eq!(format_memory(1536.0), "1.50KB");
        assert_eq!(format_memory(256.0 * 1024.0 * 1024.0), "256.0MB");
    }
}
