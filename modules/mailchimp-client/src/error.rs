use thiserror::Error;

pub type Result<T> = std::result::Result<T, MailchimpError>;

#[derive(Debug, Error)]
pub enum MailchimpError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for MailchimpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MailchimpError::Parse(err.to_string())
        } else {
            MailchimpError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MailchimpError {
    fn from(err: serde_json::Error) -> Self {
        MailchimpError::Parse(err.to_string())
    }
}
