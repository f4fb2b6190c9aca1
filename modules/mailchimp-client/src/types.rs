use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// A record type returned inside a paginated collection response.
///
/// Mailchimp wraps every collection in an object whose item array lives
/// under an endpoint-specific key (`members`, `emails`, `sent_to`, ...).
pub trait Listed: DeserializeOwned + Send + 'static {
    /// JSON key holding the item array.
    const KEY: &'static str;
}

// --- Campaigns ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub send_time: Option<String>,
    #[serde(default)]
    pub settings: CampaignSettings,
    #[serde(default)]
    pub recipients: CampaignRecipients,
}

impl Listed for Campaign {
    const KEY: &'static str = "campaigns";
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignSettings {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subject_line: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignRecipients {
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub list_name: Option<String>,
}

/// Aggregate report for one sent campaign (`/reports/{id}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignReport {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub campaign_title: Option<String>,
    #[serde(default)]
    pub subject_line: Option<String>,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub emails_sent: u64,
    #[serde(default)]
    pub opens: ReportOpens,
    #[serde(default)]
    pub clicks: ReportClicks,
    #[serde(default)]
    pub bounces: ReportBounces,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportOpens {
    #[serde(default)]
    pub opens_total: u64,
    #[serde(default)]
    pub unique_opens: u64,
    #[serde(default)]
    pub open_rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportClicks {
    #[serde(default)]
    pub clicks_total: u64,
    #[serde(default)]
    pub unique_clicks: u64,
    #[serde(default)]
    pub click_rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportBounces {
    #[serde(default)]
    pub hard_bounces: u64,
    #[serde(default)]
    pub soft_bounces: u64,
    #[serde(default)]
    pub syntax_errors: u64,
}

// --- Report detail collections ---

/// One member row from `/reports/{id}/open-details`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenMember {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub opens_count: Option<u64>,
    #[serde(default)]
    pub opens: Vec<OpenEvent>,
}

impl OpenMember {
    /// Number of opens recorded for this member. Prefers the explicit
    /// counter and falls back to the length of the event list.
    pub fn open_count(&self) -> u64 {
        self.opens_count.unwrap_or(self.opens.len() as u64)
    }
}

impl Listed for OpenMember {
    const KEY: &'static str = "members";
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenEvent {
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One tracked link from `/reports/{id}/click-details`.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlClicked {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub total_clicks: u64,
    #[serde(default)]
    pub unique_clicks: u64,
}

impl Listed for UrlClicked {
    const KEY: &'static str = "urls_clicked";
}

/// One member who clicked a given link (`/reports/{id}/click-details/{link}/members`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClickMember {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub clicks: Option<u64>,
}

impl Listed for ClickMember {
    const KEY: &'static str = "members";
}

/// Per-recipient action log from `/reports/{id}/email-activity`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailActivity {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub activity: Vec<ActivityAction>,
}

impl Listed for EmailActivity {
    const KEY: &'static str = "emails";
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityAction {
    #[serde(default)]
    pub action: String,
    /// Bounce type (`hard` / `soft`) for bounce actions.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One recipient from `/reports/{id}/sent-to`.
#[derive(Debug, Clone, Deserialize)]
pub struct SentTo {
    #[serde(default)]
    pub email_address: String,
    /// `sent`, `hard` or `soft`.
    #[serde(default)]
    pub status: Option<String>,
}

impl Listed for SentTo {
    const KEY: &'static str = "sent_to";
}

// --- Lists and members ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct List {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub campaign_defaults: CampaignDefaults,
    #[serde(default)]
    pub stats: ListStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignDefaults {
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListStats {
    #[serde(default)]
    pub member_count: u64,
    #[serde(default)]
    pub campaign_count: u64,
    #[serde(default)]
    pub open_rate: f64,
    #[serde(default)]
    pub click_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListMember {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub unique_email_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Audience merge fields (`FNAME`, `LNAME`, `PHONE`, `ADDRESS`, ...).
    #[serde(default)]
    pub merge_fields: HashMap<String, serde_json::Value>,
}

impl Listed for ListMember {
    const KEY: &'static str = "members";
}

/// One entry of `/lists/{list}/members/{hash}/activity`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberActivity {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MemberActivityResponse {
    #[serde(default)]
    pub activity: Vec<MemberActivity>,
}
