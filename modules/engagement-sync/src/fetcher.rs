//! ReportFetcher: the Mailchimp-backed [`ReportSource`].
//!
//! Each method walks one endpoint through the client's lazy paginator and
//! maps raw records into [`Observation`]s. A failing page ends that
//! endpoint's walk; whatever was accumulated is kept and the failure logged.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailchimp_client::{Listed, MailchimpClient, Paginated};
use serde_json::Value;
use tracing::{info, warn};

use crate::traits::ReportSource;
use crate::types::{
    normalize_email, CampaignMetadata, ListMetadata, MemberProfile, Metric, Observation,
    PartialSource, Profile, ProfileDirectory, SourceShape, UNKNOWN_CAMPAIGN,
};

pub struct ReportFetcher {
    client: MailchimpClient,
    page_size: u32,
}

impl ReportFetcher {
    pub fn new(client: MailchimpClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    async fn walk<T: Listed>(&self, pages: Paginated<T>, what: &str) -> Vec<T> {
        let partial = pages.collect_partial().await;
        match &partial.error {
            Some(e) => warn!(
                endpoint = what,
                path = pages.path(),
                fetched = partial.items.len(),
                error = %e,
                "Fetch aborted, using partial results"
            ),
            None => info!(
                endpoint = what,
                pages = partial.pages,
                fetched = partial.items.len(),
                "Fetched"
            ),
        }
        partial.items
    }
}

#[async_trait]
impl ReportSource for ReportFetcher {
    async fn campaign_metadata(&self, campaign_id: &str) -> CampaignMetadata {
        let mut metadata = CampaignMetadata::unknown(campaign_id);

        match self.client.campaign(campaign_id).await {
            Ok(campaign) => {
                metadata.title = campaign
                    .settings
                    .title
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| UNKNOWN_CAMPAIGN.to_string());
                metadata.subject = campaign.settings.subject_line;
                metadata.list_id = campaign.recipients.list_id;
                metadata.send_time = campaign.send_time;
            }
            Err(e) => warn!(campaign_id, error = %e, "Error fetching campaign settings"),
        }

        match self.client.campaign_report(campaign_id).await {
            Ok(report) => {
                metadata.emails_sent = report.emails_sent;
                metadata.open_rate = report.opens.open_rate;
                metadata.click_rate = report.clicks.click_rate;
                metadata.bounce_count = report.bounces.hard_bounces + report.bounces.soft_bounces;
                if metadata.subject.is_none() {
                    metadata.subject = report.subject_line;
                }
                if metadata.list_id.is_none() {
                    metadata.list_id = report.list_id;
                }
            }
            Err(e) => warn!(campaign_id, error = %e, "Error fetching campaign report"),
        }

        metadata
    }

    async fn recipients(&self, campaign_id: &str) -> PartialSource {
        let rows = self
            .walk(self.client.sent_to(campaign_id, self.page_size), "sent-to")
            .await;

        let mut source = PartialSource::new("recipients", SourceShape::Presence);
        for row in rows {
            source.push(Observation::recipient(&row.email_address));
            if let Some(status @ ("hard" | "soft")) = row.status.as_deref() {
                source.push(
                    Observation::event(&row.email_address, Metric::Bounces, 1)
                        .with_bounce_type(Some(status.to_string())),
                );
            }
        }
        source
    }

    async fn opens(&self, campaign_id: &str, since: Option<DateTime<Utc>>) -> PartialSource {
        let members = self
            .walk(
                self.client.open_details(campaign_id, since, self.page_size),
                "open-details",
            )
            .await;

        let mut source = PartialSource::new("opens", SourceShape::EventLog);
        for member in members {
            source.push(Observation::event(
                &member.email_address,
                Metric::Opens,
                member.open_count(),
            ));
        }
        source
    }

    async fn clicks(&self, campaign_id: &str) -> Vec<PartialSource> {
        let links = self
            .walk(
                self.client.click_links(campaign_id, self.page_size),
                "click-details",
            )
            .await;

        let mut sources = Vec::new();
        for link in links.into_iter().filter(|l| !l.id.is_empty()) {
            let members = self
                .walk(
                    self.client
                        .click_link_members(campaign_id, &link.id, self.page_size),
                    "click-details-members",
                )
                .await;

            let mut source =
                PartialSource::new(format!("clicks:{}", link.id), SourceShape::Presence);
            for member in members {
                source.push(Observation::event(&member.email_address, Metric::Clicks, 1));
            }
            sources.push(source);
        }
        sources
    }

    async fn activity(&self, campaign_id: &str, since: Option<DateTime<Utc>>) -> PartialSource {
        let rows = self
            .walk(
                self.client.email_activity(campaign_id, since, self.page_size),
                "email-activity",
            )
            .await;

        let mut source = PartialSource::new("activity", SourceShape::EventLog);
        for row in rows {
            source.push(Observation::recipient(&row.email_address));
            for action in row.activity.iter().filter(|a| a.action == "bounce") {
                source.push(
                    Observation::event(&row.email_address, Metric::Bounces, 1)
                        .with_bounce_type(action.kind.clone()),
                );
            }
        }
        source
    }

    async fn list_metadata(&self, list_id: &str) -> Option<ListMetadata> {
        match self.client.list(list_id).await {
            Ok(list) => Some(ListMetadata {
                id: list.id,
                name: list.name,
                from_name: list.campaign_defaults.from_name,
                from_email: list.campaign_defaults.from_email,
                default_subject: list.campaign_defaults.subject,
                member_count: list.stats.member_count,
                campaign_count: list.stats.campaign_count,
                open_rate: list.stats.open_rate,
                click_rate: list.stats.click_rate,
            }),
            Err(e) => {
                warn!(list_id, error = %e, "Error fetching list metadata");
                None
            }
        }
    }

    async fn list_campaigns(&self, list_id: &str, since: Option<DateTime<Utc>>) -> Vec<String> {
        self.walk(
            self.client.list_campaigns(list_id, since, self.page_size),
            "campaigns",
        )
        .await
        .into_iter()
        .map(|c| c.id)
        .filter(|id| !id.is_empty())
        .collect()
    }

    async fn list_profiles(&self, list_id: &str) -> ProfileDirectory {
        let members = self
            .walk(self.client.list_members(list_id, self.page_size), "list-members")
            .await;

        let mut directory = ProfileDirectory::new();
        for member in members {
            let Some(email) = normalize_email(&member.email_address) else {
                continue;
            };
            directory.insert(
                email,
                MemberProfile {
                    user_id: member.unique_email_id.filter(|id| !id.is_empty()),
                    profile: profile_from_merge_fields(&member.merge_fields),
                },
            );
        }
        directory
    }

    async fn member_activity(&self, list_id: &str, email: &str) -> PartialSource {
        let mut source = PartialSource::new("member-activity", SourceShape::EventLog);
        let actions = match self.client.member_activity(list_id, email).await {
            Ok(actions) => actions,
            Err(e) => {
                warn!(list_id, error = %e, "Error fetching member activity");
                return source;
            }
        };

        source.push(Observation::recipient(email));
        for action in actions {
            let observation = match action.action.as_str() {
                "open" => Observation::event(email, Metric::Opens, 1),
                "click" => Observation::event(email, Metric::Clicks, 1),
                "bounce" => {
                    Observation::event(email, Metric::Bounces, 1).with_bounce_type(action.kind)
                }
                _ => continue,
            };
            source.push(observation);
        }
        source
    }
}

/// Read profile fields from list merge fields. `ADDRESS` is an object with
/// `zip` and `state`; flat `ZIP` / `STATE` fields take precedence.
pub fn profile_from_merge_fields(fields: &HashMap<String, Value>) -> Profile {
    let text = |v: &Value| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    let field = |key: &str| fields.get(key).and_then(text);
    let address = |key: &str| {
        fields
            .get("ADDRESS")
            .and_then(|a| a.get(key))
            .and_then(text)
    };

    Profile {
        first_name: field("FNAME"),
        last_name: field("LNAME"),
        phone: field("PHONE"),
        zip: field("ZIP").or_else(|| address("zip")),
        state: field("STATE").or_else(|| address("state")),
    }
}
