use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mailchimp error: {0}")]
    Mailchimp(#[from] mailchimp_client::MailchimpError),

    #[error("Regal error: {0}")]
    Regal(#[from] regal_client::RegalError),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
