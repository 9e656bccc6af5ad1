use thiserror::Error;
use url::Url;

/// Input rejected before it reaches the crawler
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("{name} must be at least 1")]
    NotPositive { name: &'static str },

    #[error("quality must be between 1 and 100, got {0}")]
    QualityOutOfRange(u8),
}

/// Trim a user-supplied URL and default its scheme to https
pub fn normalize_seed(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingUrl);
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(ValidationError::InvalidUrl(input.to_string())),
    }
}

pub fn positive<T: PartialOrd + From<u8>>(name: &'static str, value: T) -> Result<T, ValidationError> {
    if value >= T::from(1) {
        Ok(value)
    } else {
        Err(ValidationError::NotPositive { name })
    }
}

pub fn quality(value: u8) -> Result<u8, ValidationError> {
    if (1..=100).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::QualityOutOfRange(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_seed() {
        assert_eq!(normalize_seed("example.com").unwrap(), "https://example.com/");
        assert_eq!(normalize_seed("  http://example.com/a ").unwrap(), "http://example.com/a");
        assert_eq!(normalize_seed(""), Err(ValidationError::MissingUrl));
        assert_eq!(normalize_seed("   "), Err(ValidationError::MissingUrl));
        assert!(matches!(normalize_seed("exa mple.com"), Err(ValidationError::InvalidUrl(_))));
    }

    #[test]
    fn test_numeric_bounds() {
        assert_eq!(positive("limit", 5usize), Ok(5));
        assert_eq!(positive("limit", 0usize), Err(ValidationError::NotPositive { name: "limit" }));
        assert_eq!(quality(80), Ok(80));
        assert_eq!(quality(0), Err(ValidationError::QualityOutOfRange(0)));
        assert_eq!(quality(101), Err(ValidationError::QualityOutOfRange(101)));
    }
}
