//! Mapping from engagement records to the Regal event wire shape.
//!
//! This is the only module that knows what an outbound event looks like.
//! Two pure mappings feed it: report-derived records
//! ([`EventBuilder::from_record`]) and inline webhook records
//! ([`EventBuilder::from_inline`]).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::types::{CampaignMetadata, InlineRecord, ListMetadata, Profile, UnifiedEngagementRecord};

// ---------------------------------------------------------------------------
// Event-name catalogue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    CampaignEngagementUpdate,
    MemberEngagementUpdate,
    Subscribed,
    Unsubscribed,
    ProfileUpdated,
    EmailCleaned,
    EmailChanged,
    CampaignSent,
    EmailOpened,
    LinkClicked,
    EmailBounced,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::CampaignEngagementUpdate => "Campaign Engagement Update",
            EventName::MemberEngagementUpdate => "Member Engagement Update",
            EventName::Subscribed => "Mailchimp Subscribed",
            EventName::Unsubscribed => "Mailchimp Unsubscribed",
            EventName::ProfileUpdated => "Mailchimp Profile Updated",
            EventName::EmailCleaned => "Mailchimp Email Cleaned",
            EventName::EmailChanged => "Mailchimp Email Changed",
            EventName::CampaignSent => "Mailchimp Campaign Sent",
            EventName::EmailOpened => "Email Opened",
            EventName::LinkClicked => "Email Link Clicked",
            EventName::EmailBounced => "Email Bounced",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lenient numeric coercion
// ---------------------------------------------------------------------------

/// A payload value after lenient coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    fn is_positive(&self) -> bool {
        match self {
            FieldValue::Int(n) => *n > 0,
            FieldValue::Float(n) => *n > 0.0,
            FieldValue::Text(_) => false,
        }
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

/// Upstream formats are inconsistent about numbers. A value containing `.`
/// becomes a float, anything else an integer; values that parse as neither
/// are passed through unchanged.
pub fn coerce_numeric(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Float(n),
            _ => FieldValue::Text(raw.to_string()),
        }
    } else {
        match trimmed.parse::<i64>() {
            Ok(n) => FieldValue::Int(n),
            Err(_) => FieldValue::Text(raw.to_string()),
        }
    }
}

fn coerce_count(raw: Option<&str>) -> FieldValue {
    raw.map(coerce_numeric).unwrap_or(FieldValue::Int(0))
}

// ---------------------------------------------------------------------------
// Outbound schema
// ---------------------------------------------------------------------------

/// Engagement counters, carried in both traits and properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementCounters {
    pub total_opens: FieldValue,
    pub total_clicks: FieldValue,
    pub total_bounces: FieldValue,
    pub opened_email: bool,
    pub clicked_link: bool,
    pub bounced: bool,
}

impl EngagementCounters {
    pub fn new(opens: FieldValue, clicks: FieldValue, bounces: FieldValue) -> Self {
        Self {
            opened_email: opens.is_positive(),
            clicked_link: clicks.is_positive(),
            bounced: bounces.is_positive(),
            total_opens: opens,
            total_clicks: clicks,
            total_bounces: bounces,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Traits {
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub phone: String,
    pub zip: String,
    pub state: String,
    #[serde(flatten)]
    pub engagement: EngagementCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Properties {
    #[serde(flatten)]
    pub engagement: EngagementCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_open_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_click_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_type: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub spam_complaint: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub traits: Traits,
    pub name: EventName,
    pub properties: Properties,
    #[serde(rename = "eventSource")]
    pub event_source: String,
}

impl OutboundEvent {
    pub fn email(&self) -> &str {
        &self.traits.email
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventBuilder {
    event_source: String,
}

impl EventBuilder {
    pub fn new(event_source: impl Into<String>) -> Self {
        Self {
            event_source: event_source.into(),
        }
    }

    /// Build from a merged report record. All-zero engagement is still an
    /// event: it says the recipient has done nothing yet.
    pub fn from_record(
        &self,
        record: &UnifiedEngagementRecord,
        campaign: Option<&CampaignMetadata>,
        list: Option<&ListMetadata>,
        name: EventName,
    ) -> OutboundEvent {
        let activity = &record.activity;
        let engagement = EngagementCounters::new(
            activity.opens.into(),
            activity.clicks.into(),
            activity.bounces.into(),
        );

        OutboundEvent {
            user_id: record.user_id.clone(),
            traits: traits(&activity.email, &record.profile, engagement.clone()),
            name,
            properties: Properties {
                engagement,
                campaign_id: campaign.map(|c| c.id.clone()),
                campaign_title: campaign.map(|c| c.title.clone()),
                campaign_subject: campaign.and_then(|c| c.subject.clone()),
                campaign_open_rate: campaign.map(|c| c.open_rate),
                campaign_click_rate: campaign.map(|c| c.click_rate),
                list_id: list
                    .map(|l| l.id.clone())
                    .or_else(|| campaign.and_then(|c| c.list_id.clone())),
                list_name: list.map(|l| l.name.clone()),
                bounce_type: activity.bounce_type.clone(),
                spam_complaint: activity.spam,
                extra: BTreeMap::new(),
            },
            event_source: self.event_source.clone(),
        }
    }

    /// Build from a single webhook record. Counter strings are coerced
    /// leniently; missing counters become 0.
    pub fn from_inline(&self, record: &InlineRecord, name: EventName) -> OutboundEvent {
        let engagement = EngagementCounters::new(
            coerce_count(record.opens.as_deref()),
            coerce_count(record.clicks.as_deref()),
            coerce_count(record.bounces.as_deref()),
        );

        OutboundEvent {
            user_id: record.user_id.clone(),
            traits: traits(&record.email, &record.profile, engagement.clone()),
            name,
            properties: Properties {
                engagement,
                campaign_id: record.campaign_id.clone(),
                campaign_title: None,
                campaign_subject: None,
                campaign_open_rate: None,
                campaign_click_rate: None,
                list_id: record.list_id.clone(),
                list_name: None,
                bounce_type: record.bounce_type.clone(),
                spam_complaint: record.spam,
                extra: record
                    .extra
                    .iter()
                    .map(|(k, v)| (k.clone(), coerce_numeric(v)))
                    .collect(),
            },
            event_source: self.event_source.clone(),
        }
    }
}

fn traits(email: &str, profile: &Profile, engagement: EngagementCounters) -> Traits {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    Traits {
        email: email.to_string(),
        first_name: field(&profile.first_name),
        last_name: field(&profile.last_name),
        phone: field(&profile.phone),
        zip: field(&profile.zip),
        state: field(&profile.state),
        engagement,
    }
}
