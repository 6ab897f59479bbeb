use std::fmt;
use std::time::Duration;

use crate::validate::ValidationReport;

pub type Result<T> = std::result::Result<T, KeytreeError>;

/// Error type for user-supplied resolvers and fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum KeytreeError {
    #[error("Validation error: {0}")]
    Validation(ValidationReport),
    #[error("Tree build error: {0}")]
    Build(String),
    #[error("Load error: {0}")]
    Load(#[from] LoadError),
    #[error("Navigation error: {0}")]
    Navigation(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error: {0}")]
    Generic(String),
}

impl From<String> for KeytreeError {
    fn from(error: String) -> Self {
        KeytreeError::Generic(error)
    }
}

impl From<&str> for KeytreeError {
    fn from(error: &str) -> Self {
        KeytreeError::Generic(error.to_string())
    }
}

/// Why a single load attempt sequence gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// The last attempt did not settle within the timeout.
    Timeout,
    /// The last attempt returned an error.
    Fetch,
    /// A fetch succeeded but its result failed validation.
    Invalid,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadErrorKind::Timeout => write!(f, "timeout"),
            LoadErrorKind::Fetch => write!(f, "fetch failed"),
            LoadErrorKind::Invalid => write!(f, "invalid result"),
        }
    }
}

/// A load that did not produce a value. Returned as data, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key}: {kind} after {attempts} attempt(s): {message}")]
pub struct LoadError {
    pub key: String,
    pub kind: LoadErrorKind,
    pub message: String,
    pub attempts: u32,
}

impl LoadError {
    pub fn timeout(key: &str, after: Duration, attempts: u32) -> Self {
        Self {
            key: key.to_string(),
            kind: LoadErrorKind::Timeout,
            message: format!("no result within {:?}", after),
            attempts,
        }
    }

    pub fn fetch(key: &str, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            key: key.to_string(),
            kind: LoadErrorKind::Fetch,
            message: message.into(),
            attempts,
        }
    }

    pub fn invalid(key: &str, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            key: key.to_string(),
            kind: LoadErrorKind::Invalid,
            message: message.into(),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display_names_key_and_attempts() {
        let err = LoadError::fetch("tools/remote", "connection refused", 3);
        let text = err.to_string();
        assert!(text.contains("tools/remote"));
        assert!(text.contains("3 attempt(s)"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_string_conversions_are_generic() {
        let err: KeytreeError = "boom".into();
        assert!(matches!(err, KeytreeError::Generic(ref m) if m == "boom"));
    }

    #[test]
    fn test_load_error_converts_into_keytree_error() {
        let err: KeytreeError = LoadError::timeout("k", Duration::from_millis(5), 1).into();
        assert!(err.to_string().starts_with("Load error: k: timeout"));
    }
}
