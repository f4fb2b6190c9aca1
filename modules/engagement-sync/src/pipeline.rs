//! Pull and push orchestration: Fetch → Aggregate → Build → Deliver.
//!
//! Runs are strictly sequential and keep no state between them. Every run
//! gets its own `sync_run` span with a fresh run id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::EngagementAggregator;
use crate::builder::{EventBuilder, EventName, OutboundEvent};
use crate::config::Config;
use crate::delivery::{DeliveryOutcome, DeliveryReport, DeliveryWorker, PacingPolicy};
use crate::error::{Result, SyncError};
use crate::fetcher::ReportFetcher;
use crate::traits::{EventSink, ReportSource};
use crate::types::{
    normalize_email, CampaignMetadata, ListMetadata, PartialSource, ProfileDirectory,
    UnifiedEngagementRecord,
};
use crate::webhook::{dispatch, WebhookAction, WebhookEvent};

pub const NO_CONTACTS_MESSAGE: &str = "No contacts found for the campaign";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Partial,
    Error,
}

/// Result of one run, shaped for the trigger response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub message: String,
    pub records: usize,
    pub delivery: DeliveryReport,
}

impl SyncOutcome {
    fn no_contacts(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Error,
            message: message.into(),
            records: 0,
            delivery: DeliveryReport::default(),
        }
    }

    fn from_delivery(target: &str, records: usize, delivery: DeliveryReport) -> Self {
        let (status, message) = match delivery.outcome() {
            DeliveryOutcome::Empty => (SyncStatus::Error, NO_CONTACTS_MESSAGE.to_string()),
            DeliveryOutcome::Complete => {
                (SyncStatus::Success, format!("Contacts updated for {target}"))
            }
            DeliveryOutcome::Partial => (
                SyncStatus::Partial,
                format!(
                    "{} of {} contacts updated for {target}",
                    delivery.sent, delivery.attempted
                ),
            ),
            DeliveryOutcome::Failed => (
                SyncStatus::Error,
                format!("Delivery failed for all {} contacts of {target}", delivery.attempted),
            ),
        };
        Self {
            status,
            message,
            records,
            delivery,
        }
    }
}

/// Identifiers the pipeline falls back to when a trigger names none.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub list_id: Option<String>,
    pub campaign_id: Option<String>,
    pub lookback_hours: u32,
}

pub struct SyncPipeline {
    source: Arc<dyn ReportSource>,
    worker: DeliveryWorker,
    builder: EventBuilder,
    settings: PipelineSettings,
}

impl SyncPipeline {
    pub fn new(
        source: Arc<dyn ReportSource>,
        worker: DeliveryWorker,
        builder: EventBuilder,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            worker,
            builder,
            settings,
        }
    }

    /// Wire the Mailchimp fetcher and Regal sink from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mailchimp = mailchimp_client::MailchimpClient::new(
            &config.mailchimp_api_base,
            config.mailchimp_api_key.clone(),
        );
        let regal =
            regal_client::RegalClient::new(&config.regal_events_url, config.regal_api_key.clone())?;
        let sink: Arc<dyn EventSink> = Arc::new(regal);

        Ok(Self::new(
            Arc::new(ReportFetcher::new(mailchimp, config.page_size)),
            DeliveryWorker::new(sink, PacingPolicy::fixed(config.delivery_interval)),
            EventBuilder::new(config.event_source.clone()),
            PipelineSettings {
                list_id: config.mailchimp_list_id.clone(),
                campaign_id: config.mailchimp_campaign_id.clone(),
                lookback_hours: config.lookback_hours,
            },
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start of the configured lookback window ending at `now`. A window
    /// reaching past the representable date range is an invalid request.
    pub fn lookback_since(
        &self,
        now: DateTime<Utc>,
        hours: Option<u32>,
    ) -> Result<DateTime<Utc>> {
        let hours = hours.unwrap_or(self.settings.lookback_hours);
        chrono::Duration::try_hours(i64::from(hours))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                SyncError::InvalidRequest(format!("lookback of {hours} hours is out of range"))
            })
    }

    // -----------------------------------------------------------------------
    // Pull path
    // -----------------------------------------------------------------------

    /// Recompute and deliver engagement for one campaign. `since` narrows the
    /// open and activity reports to a time window.
    pub async fn sync_campaign(
        &self,
        campaign_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncOutcome {
        let span = info_span!(
            "sync_run",
            run_id = %Uuid::new_v4(),
            trigger = "campaign",
            campaign_id
        );
        async {
            info!("Updating contacts for campaign");
            let metadata = self.source.campaign_metadata(campaign_id).await;
            let directory = match metadata.list_id.as_deref() {
                Some(list_id) => Some(self.source.list_profiles(list_id).await),
                None => None,
            };
            let records = self
                .campaign_records(&metadata, since, directory.as_ref())
                .await;
            if records.is_empty() {
                info!("No contacts found for this campaign");
                return SyncOutcome::no_contacts(NO_CONTACTS_MESSAGE);
            }

            let events = self.build_all(
                &records,
                Some(&metadata),
                None,
                EventName::CampaignEngagementUpdate,
            );
            let delivery = self.worker.deliver(&events).await;
            SyncOutcome::from_delivery(&format!("campaign {campaign_id}"), records.len(), delivery)
        }
        .instrument(span)
        .await
    }

    /// Sync every campaign sent to a list since `since`, one after another.
    pub async fn sync_list(&self, list_id: &str, since: Option<DateTime<Utc>>) -> SyncOutcome {
        let span = info_span!("sync_run", run_id = %Uuid::new_v4(), trigger = "list", list_id);
        async {
            let list = self.source.list_metadata(list_id).await;
            let campaigns = self.source.list_campaigns(list_id, since).await;
            info!(campaigns = campaigns.len(), "Syncing campaigns for list");
            if campaigns.is_empty() {
                return SyncOutcome::no_contacts(format!("No campaigns found for list {list_id}"));
            }

            let directory = self.source.list_profiles(list_id).await;
            let mut records = 0;
            let mut delivery = DeliveryReport::default();

            for campaign_id in &campaigns {
                let metadata = self.source.campaign_metadata(campaign_id).await;
                let campaign_records = self
                    .campaign_records(&metadata, None, Some(&directory))
                    .await;
                if campaign_records.is_empty() {
                    info!(campaign_id = %campaign_id, "No contacts found for this campaign");
                    continue;
                }

                let events = self.build_all(
                    &campaign_records,
                    Some(&metadata),
                    list.as_ref(),
                    EventName::CampaignEngagementUpdate,
                );
                records += campaign_records.len();
                delivery.absorb(self.worker.deliver(&events).await);
            }

            SyncOutcome::from_delivery(&format!("list {list_id}"), records, delivery)
        }
        .instrument(span)
        .await
    }

    /// Lifetime engagement for one member of the configured list.
    pub async fn sync_member(&self, email: &str) -> Result<SyncOutcome> {
        let list_id = self.settings.list_id.as_deref().ok_or_else(|| {
            SyncError::Config("MAILCHIMP_LIST_ID is required for member sync".to_string())
        })?;
        let email = normalize_email(email)
            .ok_or_else(|| SyncError::InvalidRequest("email must not be empty".to_string()))?;

        let span = info_span!("sync_run", run_id = %Uuid::new_v4(), trigger = "member", list_id);
        let outcome = async {
            let source = self.source.member_activity(list_id, &email).await;
            let records = merge_records([&source], None);
            if records.is_empty() {
                return SyncOutcome::no_contacts(format!("No activity found for {email}"));
            }

            let events =
                self.build_all(&records, None, None, EventName::MemberEngagementUpdate);
            let delivery = self.worker.deliver(&events).await;
            SyncOutcome::from_delivery(&format!("member {email}"), records.len(), delivery)
        }
        .instrument(span)
        .await;

        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Push path
    // -----------------------------------------------------------------------

    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<SyncOutcome> {
        let action = dispatch(event)?;
        let span = info_span!(
            "sync_run",
            run_id = %Uuid::new_v4(),
            trigger = "webhook",
            kind = %event.kind
        );

        let outcome = async {
            match action {
                WebhookAction::Single(record) => {
                    let built = self.builder.from_inline(&record, event.kind.event_name());
                    let delivery = self.worker.deliver(std::slice::from_ref(&built)).await;
                    SyncOutcome::from_delivery(&format!("{} webhook", event.kind), 1, delivery)
                }
                WebhookAction::CampaignSent {
                    campaign_id,
                    list_id,
                } => self.fan_out_campaign(&campaign_id, list_id.as_deref()).await,
            }
        }
        .instrument(span)
        .await;

        Ok(outcome)
    }

    /// One event per recipient of a freshly sent campaign.
    async fn fan_out_campaign(&self, campaign_id: &str, list_id: Option<&str>) -> SyncOutcome {
        let metadata = self.source.campaign_metadata(campaign_id).await;

        let directory = match list_id.or(metadata.list_id.as_deref()) {
            Some(list_id) => Some(self.source.list_profiles(list_id).await),
            None => None,
        };

        let recipients = self.source.recipients(campaign_id).await;
        let opens = self.source.opens(campaign_id, None).await;
        let clicks = self.source.clicks(campaign_id).await;

        let sources = [&recipients, &opens].into_iter().chain(clicks.iter());
        let records = merge_records(sources, directory.as_ref());
        if records.is_empty() {
            info!(campaign_id, "No recipients found for sent campaign");
            return SyncOutcome::no_contacts(NO_CONTACTS_MESSAGE);
        }

        let events = self.build_all(&records, Some(&metadata), None, EventName::CampaignSent);
        let delivery = self.worker.deliver(&events).await;
        SyncOutcome::from_delivery(&format!("campaign {campaign_id}"), records.len(), delivery)
    }

    // -----------------------------------------------------------------------
    // Shared steps
    // -----------------------------------------------------------------------

    /// Fetch and merge: email-activity for the recipient base and bounces,
    /// open-details for opens, the click-detail fan-out for clicks.
    async fn campaign_records(
        &self,
        metadata: &CampaignMetadata,
        since: Option<DateTime<Utc>>,
        directory: Option<&ProfileDirectory>,
    ) -> Vec<UnifiedEngagementRecord> {
        let campaign_id = metadata.id.as_str();
        let activity = self.source.activity(campaign_id, since).await;
        let opens = self.source.opens(campaign_id, since).await;
        let clicks = self.source.clicks(campaign_id).await;

        if activity.is_empty() {
            warn!(campaign_id, "Email activity returned no recipients");
        }

        let sources = [&activity, &opens].into_iter().chain(clicks.iter());
        merge_records(sources, directory)
    }

    fn build_all(
        &self,
        records: &[UnifiedEngagementRecord],
        campaign: Option<&CampaignMetadata>,
        list: Option<&ListMetadata>,
        name: EventName,
    ) -> Vec<OutboundEvent> {
        records
            .iter()
            .map(|record| self.builder.from_record(record, campaign, list, name))
            .collect()
    }
}

fn merge_records<'a, I>(
    sources: I,
    directory: Option<&ProfileDirectory>,
) -> Vec<UnifiedEngagementRecord>
where
    I: IntoIterator<Item = &'a PartialSource>,
{
    let mut aggregator = EngagementAggregator::new();
    for source in sources {
        aggregator.merge(source);
    }
    info!(recipients = aggregator.len(), "Aggregated engagement");

    aggregator
        .finish()
        .into_iter()
        .map(|activity| UnifiedEngagementRecord::new(activity).with_directory(directory))
        .collect()
}
