// Trait seams for the two external platforms.
//
// ReportSource: everything read from the campaign platform. Implementations
//   contain their own failures: a failing endpoint yields an empty or default
//   contribution, never an error.
// EventSink: the single write call to the event platform.
//
// MockReportSource / MockEventSink in `testing` implement these for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::builder::OutboundEvent;
use crate::types::{CampaignMetadata, ListMetadata, PartialSource, ProfileDirectory};

#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Settings joined with the aggregate report. Unknown campaigns degrade
    /// to [`CampaignMetadata::unknown`].
    async fn campaign_metadata(&self, campaign_id: &str) -> CampaignMetadata;

    /// Recipients the campaign was sent to (presence, with bounce status).
    async fn recipients(&self, campaign_id: &str) -> PartialSource;

    /// Per-recipient open counts.
    async fn opens(&self, campaign_id: &str, since: Option<DateTime<Utc>>) -> PartialSource;

    /// Link-click occurrences: one presence source per tracked link.
    async fn clicks(&self, campaign_id: &str) -> Vec<PartialSource>;

    /// Per-recipient action log; registers every recipient and counts bounces.
    async fn activity(&self, campaign_id: &str, since: Option<DateTime<Utc>>) -> PartialSource;

    async fn list_metadata(&self, list_id: &str) -> Option<ListMetadata>;

    /// Ids of campaigns sent to a list, optionally only those sent after `since`.
    async fn list_campaigns(&self, list_id: &str, since: Option<DateTime<Utc>>) -> Vec<String>;

    async fn list_profiles(&self, list_id: &str) -> ProfileDirectory;

    /// One member's activity across campaigns, as an event log.
    async fn member_activity(&self, list_id: &str, email: &str) -> PartialSource;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Returns the sink's response body.
    async fn send(&self, event: &OutboundEvent) -> regal_client::Result<String>;
}

#[async_trait]
impl EventSink for regal_client::RegalClient {
    async fn send(&self, event: &OutboundEvent) -> regal_client::Result<String> {
        self.send_event(event).await
    }
}
