//! Utility functions and helpers for configuration

/// Default functions for serde
pub fn default_true() -> bool {
    true
}

pub fn default_false() -> bool {
    false
}

/// Parse a byte size written as a plain number or with a K, M or G suffix
pub fn parse_byte_size(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    let (digits, multiplier) = match trimmed.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('M') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('G') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed, 1),
    };

    digits
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid size '{}': {}", value, e))?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_size() {
        assert_eq!(parse_byte_size("512").unwrap(), 512);
        assert_eq!(parse_byte_size("200K").unwrap(), 200 * 1024);
        assert_eq!(parse_byte_size("10m").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_byte_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_byte_size("lots").is_err());
        assert!(parse_byte_size("").is_err());
    }
}
