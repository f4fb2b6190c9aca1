pub mod error;
pub mod pagination;
pub mod types;

pub use error::{MailchimpError, Result};
pub use pagination::{Paginated, Partial, DEFAULT_PAGE_SIZE};
pub use types::{
    ActivityAction, Campaign, CampaignReport, ClickMember, EmailActivity, List, ListMember,
    Listed, MemberActivity, OpenMember, SentTo, UrlClicked,
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use types::MemberActivityResponse;

/// Base URL for a Mailchimp data center, e.g. `us21`.
pub fn base_url_for_dc(dc: &str) -> String {
    format!("https://{dc}.api.mailchimp.com/3.0")
}

/// Mailchimp addresses list members by the MD5 hex digest of the
/// lowercased email address.
pub fn subscriber_hash(email: &str) -> String {
    format!("{:x}", md5::compute(email.trim().to_lowercase().as_bytes()))
}

/// ISO-8601 timestamp in the form Mailchimp's `since` filters accept.
pub fn format_since(since: DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[derive(Clone)]
pub struct MailchimpClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl MailchimpClient {
    pub fn new(base_url: &str, token: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailchimpError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Campaign settings and recipients (`/campaigns/{id}`).
    pub async fn campaign(&self, campaign_id: &str) -> Result<Campaign> {
        tracing::debug!(campaign_id, "Fetching campaign");
        self.get_json(&format!("/campaigns/{campaign_id}"), &[]).await
    }

    /// Aggregate open/click/bounce report (`/reports/{id}`).
    pub async fn campaign_report(&self, campaign_id: &str) -> Result<CampaignReport> {
        tracing::debug!(campaign_id, "Fetching campaign report");
        self.get_json(&format!("/reports/{campaign_id}"), &[]).await
    }

    /// Audience list metadata (`/lists/{id}`).
    pub async fn list(&self, list_id: &str) -> Result<List> {
        tracing::debug!(list_id, "Fetching list");
        self.get_json(&format!("/lists/{list_id}"), &[]).await
    }

    /// Recent activity for one list member, addressed by subscriber hash.
    pub async fn member_activity(&self, list_id: &str, email: &str) -> Result<Vec<MemberActivity>> {
        let hash = subscriber_hash(email);
        tracing::debug!(list_id, subscriber_hash = %hash, "Fetching member activity");
        let resp: MemberActivityResponse = self
            .get_json(&format!("/lists/{list_id}/members/{hash}/activity"), &[])
            .await?;
        Ok(resp.activity)
    }

    /// Sent campaigns for a list, optionally only those sent after `since`.
    pub fn list_campaigns(
        &self,
        list_id: &str,
        since: Option<DateTime<Utc>>,
        page_size: u32,
    ) -> Paginated<Campaign> {
        let pages = Paginated::new(self.clone(), "/campaigns".to_string(), page_size)
            .with_param("list_id", list_id)
            .with_param("status", "sent");
        match since {
            Some(since) => pages.with_param("since_send_time", format_since(since)),
            None => pages,
        }
    }

    pub fn open_details(
        &self,
        campaign_id: &str,
        since: Option<DateTime<Utc>>,
        page_size: u32,
    ) -> Paginated<OpenMember> {
        let pages = Paginated::new(
            self.clone(),
            format!("/reports/{campaign_id}/open-details"),
            page_size,
        );
        match since {
            Some(since) => pages.with_param("since", format_since(since)),
            None => pages,
        }
    }

    pub fn email_activity(
        &self,
        campaign_id: &str,
        since: Option<DateTime<Utc>>,
        page_size: u32,
    ) -> Paginated<EmailActivity> {
        let pages = Paginated::new(
            self.clone(),
            format!("/reports/{campaign_id}/email-activity"),
            page_size,
        );
        match since {
            Some(since) => pages.with_param("since", format_since(since)),
            None => pages,
        }
    }

    /// Tracked links of a campaign. First level of the click-detail fan-out.
    pub fn click_links(&self, campaign_id: &str, page_size: u32) -> Paginated<UrlClicked> {
        Paginated::new(
            self.clone(),
            format!("/reports/{campaign_id}/click-details"),
            page_size,
        )
    }

    /// Members who clicked one link. Second level of the click-detail fan-out.
    pub fn click_link_members(
        &self,
        campaign_id: &str,
        link_id: &str,
        page_size: u32,
    ) -> Paginated<ClickMember> {
        Paginated::new(
            self.clone(),
            format!("/reports/{campaign_id}/click-details/{link_id}/members"),
            page_size,
        )
    }

    pub fn sent_to(&self, campaign_id: &str, page_size: u32) -> Paginated<SentTo> {
        Paginated::new(
            self.clone(),
            format!("/reports/{campaign_id}/sent-to"),
            page_size,
        )
    }

    pub fn list_members(&self, list_id: &str, page_size: u32) -> Paginated<ListMember> {
        Paginated::new(self.clone(), format!("/lists/{list_id}/members"), page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn subscriber_hash_ignores_case_and_whitespace() {
        assert_eq!(
            subscriber_hash(" Urist.McVankab@Freddiesjokes.com "),
            subscriber_hash("urist.mcvankab@freddiesjokes.com")
        );
        assert_eq!(
            subscriber_hash("urist.mcvankab@freddiesjokes.com"),
            "62eeb292278cc15f5817cb78f7790b08"
        );
    }

    #[test]
    fn since_uses_offset_form() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_since(ts), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn base_url_is_per_data_center() {
        assert_eq!(base_url_for_dc("us21"), "https://us21.api.mailchimp.com/3.0");
    }

    #[test]
    fn open_count_falls_back_to_event_list() {
        let member: OpenMember = serde_json::from_value(serde_json::json!({
            "email_address": "a@example.com",
            "opens": [{ "timestamp": "x" }, { "timestamp": "y" }]
        }))
        .unwrap();
        assert_eq!(member.open_count(), 2);

        let member: OpenMember = serde_json::from_value(serde_json::json!({
            "email_address": "a@example.com",
            "opens_count": 5
        }))
        .unwrap();
        assert_eq!(member.open_count(), 5);
    }
}
