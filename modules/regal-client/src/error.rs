use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegalError>;

#[derive(Debug, Error)]
pub enum RegalError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialize error: {0}")]
    Serialize(String),
}

impl RegalError {
    /// HTTP status of the rejected request, if the sink answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RegalError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RegalError {
    fn from(err: reqwest::Error) -> Self {
        RegalError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for RegalError {
    fn from(err: serde_json::Error) -> Self {
        RegalError::Serialize(err.to_string())
    }
}
