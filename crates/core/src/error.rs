#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{key} must be positive")]
    NonPositive { key: &'static str },

    #[error("{key} is not an http(s) URL: {value:?}")]
    InvalidUrl { key: &'static str, value: String },
}

/// A response body that matched none of the recognized shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized response shape: {0}")]
pub struct NormalizationError(pub String);
