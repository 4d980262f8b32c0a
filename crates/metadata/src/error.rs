//! Entry store error types.

use thiserror::Error;

/// Entry store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<pathmend_core::Error> for MetadataError {
    fn from(err: pathmend_core::Error) -> Self {
        match err {
            pathmend_core::Error::InvalidIdentifier(name) => Self::InvalidIdentifier(name),
            other => Self::Config(other.to_string()),
        }
    }
}

/// Result type for entry store operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_identifier_error_maps_to_invalid_identifier() {
        let err: MetadataError = pathmend_core::Error::InvalidIdentifier("x y".to_string()).into();
        assert!(matches!(err, MetadataError::InvalidIdentifier(ref n) if n == "x y"));
        assert_eq!(err.to_string(), "invalid SQL identifier: x y");
    }

    #[test]
    fn test_core_config_error_maps_to_config() {
        let err: MetadataError =
            pathmend_core::Error::InvalidConfig("missing database".to_string()).into();
        assert!(matches!(err, MetadataError::Config(_)));
    }
}
