//! Error types for the link prober
//!
//! Network failures never show up here: they are classified into verdicts.
//! These errors cover configuration, CLI I/O and malformed protocol messages.

use std::fmt;

pub type Result<T> = std::result::Result<T, ProberError>;

#[derive(Debug)]
pub enum ProberError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP client could not be constructed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for ProberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProberError::Io(err) => write!(f, "IO error: {}", err),
            ProberError::Http(err) => write!(f, "HTTP client error: {}", err),
            ProberError::Json(err) => write!(f, "JSON error: {}", err),
            ProberError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProberError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for ProberError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProberError::Io(err) => Some(err),
            ProberError::Http(err) => Some(err),
            ProberError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProberError {
    fn from(err: std::io::Error) -> Self {
        ProberError::Io(err)
    }
}

impl From<reqwest::Error> for ProberError {
    fn from(err: reqwest::Error) -> Self {
        ProberError::Http(err)
    }
}

impl From<serde_json::Error> for ProberError {
    fn from(err: serde_json::Error) -> Self {
        ProberError::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let err = ProberError::Other("no URLs given".to_string());
        assert_eq!(err.to_string(), "Error: no URLs given");

        let err = ProberError::Config("max_retries must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_retries must be at least 1"
        );
    }

    #[test]
    fn test_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "urls.txt");
        let err: ProberError = io.into();
        assert!(err.source().is_some());

        let err = ProberError::Other("boom".to_string());
        assert!(err.source().is_none());
    }
}
