pub mod error;

pub use error::{RegalError, Result};

use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_EVENTS_URL: &str = "https://events.regalvoice.com/events";

pub struct RegalClient {
    client: reqwest::Client,
    events_url: String,
    api_key: String,
}

impl RegalClient {
    pub fn new(events_url: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            events_url: events_url.to_string(),
            api_key,
        })
    }

    pub fn events_url(&self) -> &str {
        &self.events_url
    }

    /// Post one custom event. Returns the response body on success.
    ///
    /// The events API authenticates with the raw key in `Authorization`,
    /// not a bearer scheme.
    pub async fn send_event<E: Serialize + ?Sized>(&self, event: &E) -> Result<String> {
        let body = serde_json::to_vec(event)?;

        let resp = self
            .client
            .post(&self.events_url)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RegalError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        tracing::debug!(status = status.as_u16(), "Regal accepted event");
        Ok(text)
    }
}
