use thiserror::Error;

/// Login API failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// Transport failure, or the API refused the request
    #[error("network error: {0}")]
    Network(String),

    /// Response did not have the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for LoginError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
