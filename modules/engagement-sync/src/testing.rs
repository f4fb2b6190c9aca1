// Test mocks for the sync pipeline.
//
// Two mocks matching the two trait boundaries:
// - MockReportSource (ReportSource): HashMap-based id → canned source
// - MockEventSink (EventSink): records every attempt, fails on chosen indices
//
// Plus helpers for building partial sources by hand.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regal_client::RegalError;
use tokio::time::Instant;

use crate::builder::{EventBuilder, OutboundEvent};
use crate::delivery::{DeliveryWorker, PacingPolicy};
use crate::pipeline::{PipelineSettings, SyncPipeline};
use crate::traits::{EventSink, ReportSource};
use crate::types::{
    CampaignMetadata, ListMetadata, Metric, Observation, PartialSource, ProfileDirectory,
    SourceShape,
};

// ---------------------------------------------------------------------------
// Source helpers
// ---------------------------------------------------------------------------

/// Email-activity source: registers each recipient, plus one bounce entry
/// per `(email, bounce_type)` pair.
pub fn activity_source(recipients: &[&str], bounces: &[(&str, &str)]) -> PartialSource {
    let mut source = PartialSource::new("activity", SourceShape::EventLog);
    for email in recipients {
        source.push(Observation::recipient(email));
    }
    for (email, kind) in bounces {
        source.push(
            Observation::event(email, Metric::Bounces, 1).with_bounce_type(Some(kind.to_string())),
        );
    }
    source
}

pub fn opens_source(counts: &[(&str, u64)]) -> PartialSource {
    let mut source = PartialSource::new("opens", SourceShape::EventLog);
    for (email, n) in counts {
        source.push(Observation::event(email, Metric::Opens, *n));
    }
    source
}

/// Members of one clicked link.
pub fn link_clicks(link_id: &str, members: &[&str]) -> PartialSource {
    let mut source = PartialSource::new(format!("clicks:{link_id}"), SourceShape::Presence);
    for email in members {
        source.push(Observation::event(email, Metric::Clicks, 1));
    }
    source
}

pub fn recipients_source(emails: &[&str]) -> PartialSource {
    let mut source = PartialSource::new("recipients", SourceShape::Presence);
    for email in emails {
        source.push(Observation::recipient(email));
    }
    source
}

// ---------------------------------------------------------------------------
// MockReportSource
// ---------------------------------------------------------------------------

/// Canned campaign-platform reads. Unregistered ids yield empty sources,
/// the same as a failing endpoint would.
#[derive(Default)]
pub struct MockReportSource {
    campaigns: HashMap<String, CampaignMetadata>,
    recipients: HashMap<String, PartialSource>,
    opens: HashMap<String, PartialSource>,
    clicks: HashMap<String, Vec<PartialSource>>,
    activity: HashMap<String, PartialSource>,
    lists: HashMap<String, ListMetadata>,
    list_campaigns: HashMap<String, Vec<String>>,
    profiles: HashMap<String, ProfileDirectory>,
    members: HashMap<String, PartialSource>,
    calls: Mutex<Vec<String>>,
}

impl MockReportSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_campaign(mut self, metadata: CampaignMetadata) -> Self {
        self.campaigns.insert(metadata.id.clone(), metadata);
        self
    }

    pub fn on_recipients(mut self, campaign_id: &str, source: PartialSource) -> Self {
        self.recipients.insert(campaign_id.to_string(), source);
        self
    }

    pub fn on_opens(mut self, campaign_id: &str, source: PartialSource) -> Self {
        self.opens.insert(campaign_id.to_string(), source);
        self
    }

    pub fn on_clicks(mut self, campaign_id: &str, sources: Vec<PartialSource>) -> Self {
        self.clicks.insert(campaign_id.to_string(), sources);
        self
    }

    pub fn on_activity(mut self, campaign_id: &str, source: PartialSource) -> Self {
        self.activity.insert(campaign_id.to_string(), source);
        self
    }

    pub fn on_list(mut self, metadata: ListMetadata, campaign_ids: &[&str]) -> Self {
        self.list_campaigns.insert(
            metadata.id.clone(),
            campaign_ids.iter().map(|id| id.to_string()).collect(),
        );
        self.lists.insert(metadata.id.clone(), metadata);
        self
    }

    pub fn on_profiles(mut self, list_id: &str, directory: ProfileDirectory) -> Self {
        self.profiles.insert(list_id.to_string(), directory);
        self
    }

    pub fn on_member(mut self, email: &str, source: PartialSource) -> Self {
        self.members.insert(email.to_string(), source);
        self
    }

    /// Every read made so far, as `endpoint:id` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn source_or_empty(
        map: &HashMap<String, PartialSource>,
        key: &str,
        label: &str,
        shape: SourceShape,
    ) -> PartialSource {
        map.get(key)
            .cloned()
            .unwrap_or_else(|| PartialSource::new(label, shape))
    }
}

fn since_suffix(since: Option<DateTime<Utc>>) -> String {
    since.map(|s| format!("@{}", s.to_rfc3339())).unwrap_or_default()
}

#[async_trait]
impl ReportSource for MockReportSource {
    async fn campaign_metadata(&self, campaign_id: &str) -> CampaignMetadata {
        self.record(format!("campaign:{campaign_id}"));
        self.campaigns
            .get(campaign_id)
            .cloned()
            .unwrap_or_else(|| CampaignMetadata::unknown(campaign_id))
    }

    async fn recipients(&self, campaign_id: &str) -> PartialSource {
        self.record(format!("recipients:{campaign_id}"));
        Self::source_or_empty(&self.recipients, campaign_id, "recipients", SourceShape::Presence)
    }

    async fn opens(&self, campaign_id: &str, since: Option<DateTime<Utc>>) -> PartialSource {
        self.record(format!("opens:{campaign_id}{}", since_suffix(since)));
        Self::source_or_empty(&self.opens, campaign_id, "opens", SourceShape::EventLog)
    }

    async fn clicks(&self, campaign_id: &str) -> Vec<PartialSource> {
        self.record(format!("clicks:{campaign_id}"));
        self.clicks.get(campaign_id).cloned().unwrap_or_default()
    }

    async fn activity(&self, campaign_id: &str, since: Option<DateTime<Utc>>) -> PartialSource {
        self.record(format!("activity:{campaign_id}{}", since_suffix(since)));
        Self::source_or_empty(&self.activity, campaign_id, "activity", SourceShape::EventLog)
    }

    async fn list_metadata(&self, list_id: &str) -> Option<ListMetadata> {
        self.record(format!("list:{list_id}"));
        self.lists.get(list_id).cloned()
    }

    async fn list_campaigns(&self, list_id: &str, since: Option<DateTime<Utc>>) -> Vec<String> {
        self.record(format!("list-campaigns:{list_id}{}", since_suffix(since)));
        self.list_campaigns.get(list_id).cloned().unwrap_or_default()
    }

    async fn list_profiles(&self, list_id: &str) -> ProfileDirectory {
        self.record(format!("profiles:{list_id}"));
        self.profiles.get(list_id).cloned().unwrap_or_default()
    }

    async fn member_activity(&self, list_id: &str, email: &str) -> PartialSource {
        self.record(format!("member:{list_id}:{email}"));
        Self::source_or_empty(&self.members, email, "member-activity", SourceShape::EventLog)
    }
}

// ---------------------------------------------------------------------------
// MockEventSink
// ---------------------------------------------------------------------------

/// Records every delivery attempt with the (tokio) time it was made.
/// Attempts whose 0-based index is in `fail_on` get a simulated 500.
#[derive(Default)]
pub struct MockEventSink {
    fail_on: HashSet<usize>,
    attempts: Mutex<Vec<(OutboundEvent, Instant)>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(indices: &[usize]) -> Self {
        Self {
            fail_on: indices.iter().copied().collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl EventSink for MockEventSink {
    async fn send(&self, event: &OutboundEvent) -> regal_client::Result<String> {
        let index = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push((event.clone(), Instant::now()));
            attempts.len() - 1
        };

        if self.fail_on.contains(&index) {
            Err(RegalError::Api {
                status: 500,
                message: "simulated failure".to_string(),
            })
        } else {
            Ok("ok".to_string())
        }
    }
}

/// Pipeline over the two mocks with the given pacing and settings.
pub fn mock_pipeline(
    source: Arc<MockReportSource>,
    sink: Arc<MockEventSink>,
    pacing: PacingPolicy,
    settings: PipelineSettings,
) -> SyncPipeline {
    SyncPipeline::new(
        source,
        DeliveryWorker::new(sink, pacing),
        EventBuilder::new("MailChimp"),
        settings,
    )
}
