//! Inbound Mailchimp webhooks.
//!
//! Mailchimp posts form-encoded bodies: `type=subscribe&fired_at=...` plus
//! nested `data[...]` keys such as `data[merges][FNAME]`. A payload is parsed
//! into a [`WebhookEvent`] whose `data` keys are flattened with dots
//! (`merges.FNAME`), then routed through the handler for its kind.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::builder::EventName;
use crate::error::{Result, SyncError};
use crate::types::{normalize_email, InlineRecord, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    Subscribe,
    Unsubscribe,
    Profile,
    Cleaned,
    UpEmail,
    Campaign,
    Open,
    Click,
    Bounce,
}

impl WebhookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookKind::Subscribe => "subscribe",
            WebhookKind::Unsubscribe => "unsubscribe",
            WebhookKind::Profile => "profile",
            WebhookKind::Cleaned => "cleaned",
            WebhookKind::UpEmail => "upemail",
            WebhookKind::Campaign => "campaign",
            WebhookKind::Open => "open",
            WebhookKind::Click => "click",
            WebhookKind::Bounce => "bounce",
        }
    }

    pub fn event_name(self) -> EventName {
        match self {
            WebhookKind::Subscribe => EventName::Subscribed,
            WebhookKind::Unsubscribe => EventName::Unsubscribed,
            WebhookKind::Profile => EventName::ProfileUpdated,
            WebhookKind::Cleaned => EventName::EmailCleaned,
            WebhookKind::UpEmail => EventName::EmailChanged,
            WebhookKind::Campaign => EventName::CampaignSent,
            WebhookKind::Open => EventName::EmailOpened,
            WebhookKind::Click => EventName::LinkClicked,
            WebhookKind::Bounce => EventName::EmailBounced,
        }
    }

    /// Dispatch table: kind → handler.
    fn handler(self) -> Handler {
        match self {
            WebhookKind::Subscribe | WebhookKind::Profile => member_change,
            WebhookKind::Unsubscribe => unsubscribe,
            WebhookKind::Cleaned => cleaned,
            WebhookKind::UpEmail => email_changed,
            WebhookKind::Campaign => campaign_sent,
            WebhookKind::Open => opened,
            WebhookKind::Click => clicked,
            WebhookKind::Bounce => bounced,
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "subscribe" => Ok(WebhookKind::Subscribe),
            "unsubscribe" => Ok(WebhookKind::Unsubscribe),
            "profile" => Ok(WebhookKind::Profile),
            "cleaned" => Ok(WebhookKind::Cleaned),
            "upemail" => Ok(WebhookKind::UpEmail),
            "campaign" => Ok(WebhookKind::Campaign),
            "open" => Ok(WebhookKind::Open),
            "click" => Ok(WebhookKind::Click),
            "bounce" => Ok(WebhookKind::Bounce),
            other => Err(SyncError::Webhook(format!("unknown webhook type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub fired_at: Option<String>,
    pub data: BTreeMap<String, String>,
}

impl WebhookEvent {
    /// Parse a decoded form body.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self> {
        let kind = form
            .get("type")
            .ok_or_else(|| SyncError::Webhook("missing webhook type".to_string()))?
            .parse()?;

        let data = form
            .iter()
            .filter_map(|(key, value)| data_key(key).map(|k| (k, value.trim().to_string())))
            .collect();

        Ok(Self {
            kind,
            fired_at: form.get("fired_at").cloned(),
            data,
        })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn owned(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.owned(k))
    }

    fn email(&self, key: &str) -> Result<String> {
        self.get(key)
            .and_then(normalize_email)
            .ok_or_else(|| SyncError::Webhook(format!("{} webhook without data[{key}]", self.kind)))
    }

    fn profile(&self) -> Profile {
        Profile {
            first_name: self.owned("merges.FNAME"),
            last_name: self.owned("merges.LNAME"),
            phone: self.owned("merges.PHONE"),
            zip: self.first(&["merges.ZIP", "merges.ADDRESS.zip"]),
            state: self.first(&["merges.STATE", "merges.ADDRESS.state"]),
        }
    }

    /// Scalar top-level fields not consumed by a handler.
    fn extra(&self, consumed: &[&str]) -> BTreeMap<String, String> {
        self.data
            .iter()
            .filter(|(k, v)| !k.contains('.') && !consumed.contains(&k.as_str()) && !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// `data[merges][FNAME]` → `merges.FNAME`. Keys outside `data[...]` → `None`.
fn data_key(key: &str) -> Option<String> {
    let rest = key.strip_prefix("data[")?;
    let segments: Vec<&str> = rest
        .split('[')
        .map(|s| s.trim_end_matches(']'))
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// What a webhook asks the pipeline to do.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    /// Build and deliver exactly one event from the inline record.
    Single(InlineRecord),
    /// Fan out over the campaign's recipients.
    CampaignSent {
        campaign_id: String,
        list_id: Option<String>,
    },
}

type Handler = fn(&WebhookEvent) -> Result<WebhookAction>;

/// Route an event to its kind's handler.
pub fn dispatch(event: &WebhookEvent) -> Result<WebhookAction> {
    (event.kind.handler())(event)
}

const MEMBER_KEYS: &[&str] = &["email", "id", "list_id", "campaign_id"];

fn member_record(event: &WebhookEvent, email_key: &str) -> Result<InlineRecord> {
    let mut record = InlineRecord::new(event.email(email_key)?);
    record.user_id = event.owned("id");
    record.profile = event.profile();
    record.list_id = event.owned("list_id");
    record.campaign_id = event.owned("campaign_id");
    Ok(record)
}

fn member_change(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = member_record(event, "email")?;
    record.extra = event.extra(MEMBER_KEYS);
    Ok(WebhookAction::Single(record))
}

fn unsubscribe(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = member_record(event, "email")?;
    record.spam = event.get("reason") == Some("abuse");
    record.extra = event.extra(MEMBER_KEYS);
    Ok(WebhookAction::Single(record))
}

fn cleaned(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = member_record(event, "email")?;
    match event.get("reason") {
        Some("abuse") => record.spam = true,
        reason => {
            record.bounces = Some("1".to_string());
            record.bounce_type = Some(reason.unwrap_or("hard").to_string());
        }
    }
    record.extra = event.extra(&[MEMBER_KEYS, &["reason"]].concat());
    Ok(WebhookAction::Single(record))
}

fn email_changed(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = InlineRecord::new(event.email("new_email")?);
    record.user_id = event.first(&["new_id", "id"]);
    record.list_id = event.owned("list_id");
    record.extra = event.extra(&["new_email", "new_id", "id", "list_id"]);
    Ok(WebhookAction::Single(record))
}

fn campaign_sent(event: &WebhookEvent) -> Result<WebhookAction> {
    let campaign_id = event
        .owned("id")
        .ok_or_else(|| SyncError::Webhook("campaign webhook without data[id]".to_string()))?;
    Ok(WebhookAction::CampaignSent {
        campaign_id,
        list_id: event.owned("list_id"),
    })
}

const ENGAGEMENT_KEYS: &[&str] = &[
    "email", "id", "list_id", "campaign_id", "count", "opens", "clicks", "bounces", "type",
];

fn engagement_record(event: &WebhookEvent) -> Result<InlineRecord> {
    let mut record = member_record(event, "email")?;
    record.extra = event.extra(ENGAGEMENT_KEYS);
    Ok(record)
}

// An open/click/bounce notification implies at least one occurrence.

fn opened(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = engagement_record(event)?;
    record.opens = Some(event.first(&["opens", "count"]).unwrap_or_else(|| "1".to_string()));
    Ok(WebhookAction::Single(record))
}

fn clicked(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = engagement_record(event)?;
    record.clicks = Some(event.first(&["clicks", "count"]).unwrap_or_else(|| "1".to_string()));
    Ok(WebhookAction::Single(record))
}

fn bounced(event: &WebhookEvent) -> Result<WebhookAction> {
    let mut record = engagement_record(event)?;
    record.bounces = Some(event.first(&["bounces", "count"]).unwrap_or_else(|| "1".to_string()));
    record.bounce_type = event.owned("type");
    Ok(WebhookAction::Single(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn single(action: WebhookAction) -> InlineRecord {
        match action {
            WebhookAction::Single(record) => record,
            other => panic!("expected single record, got {other:?}"),
        }
    }

    #[test]
    fn flattens_nested_data_keys() {
        assert_eq!(data_key("data[email]").as_deref(), Some("email"));
        assert_eq!(data_key("data[merges][FNAME]").as_deref(), Some("merges.FNAME"));
        assert_eq!(
            data_key("data[merges][ADDRESS][zip]").as_deref(),
            Some("merges.ADDRESS.zip")
        );
        assert_eq!(data_key("type"), None);
        assert_eq!(data_key("data[]"), None);
    }

    #[test]
    fn subscribe_maps_profile_and_id() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "subscribe"),
            ("fired_at", "2009-03-26 21:35:57"),
            ("data[id]", "8a25ff1d98"),
            ("data[list_id]", "a6b5da1054"),
            ("data[email]", "Api@MailChimp.com"),
            ("data[email_type]", "html"),
            ("data[merges][EMAIL]", "api@mailchimp.com"),
            ("data[merges][FNAME]", "Mailchimp"),
            ("data[merges][LNAME]", "API"),
            ("data[merges][PHONE]", "555-0100"),
            ("data[merges][ADDRESS][zip]", "30308"),
            ("data[merges][ADDRESS][state]", "GA"),
            ("data[ip_opt]", "10.20.10.30"),
        ]))
        .unwrap();

        assert_eq!(event.kind, WebhookKind::Subscribe);
        assert_eq!(event.kind.event_name(), EventName::Subscribed);

        let record = single(dispatch(&event).unwrap());
        assert_eq!(record.email, "api@mailchimp.com");
        assert_eq!(record.user_id.as_deref(), Some("8a25ff1d98"));
        assert_eq!(record.list_id.as_deref(), Some("a6b5da1054"));
        assert_eq!(record.profile.first_name.as_deref(), Some("Mailchimp"));
        assert_eq!(record.profile.zip.as_deref(), Some("30308"));
        assert_eq!(record.profile.state.as_deref(), Some("GA"));
        assert_eq!(record.opens, None);
        assert_eq!(record.extra.get("email_type").map(String::as_str), Some("html"));
        assert_eq!(record.extra.get("ip_opt").map(String::as_str), Some("10.20.10.30"));
        assert!(!record.extra.contains_key("email"));
    }

    #[test]
    fn unsubscribe_for_abuse_is_spam() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "unsubscribe"),
            ("data[email]", "a@example.com"),
            ("data[reason]", "abuse"),
            ("data[campaign_id]", "cb398d21d2"),
        ]))
        .unwrap();

        let record = single(dispatch(&event).unwrap());
        assert!(record.spam);
        assert_eq!(record.campaign_id.as_deref(), Some("cb398d21d2"));
    }

    #[test]
    fn cleaned_hard_is_a_bounce() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "cleaned"),
            ("data[email]", "gone@example.com"),
            ("data[reason]", "hard"),
        ]))
        .unwrap();

        let record = single(dispatch(&event).unwrap());
        assert_eq!(record.bounces.as_deref(), Some("1"));
        assert_eq!(record.bounce_type.as_deref(), Some("hard"));
        assert!(!record.spam);
        assert!(!record.extra.contains_key("reason"));
    }

    #[test]
    fn upemail_uses_new_address() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "upemail"),
            ("data[list_id]", "a6b5da1054"),
            ("data[new_id]", "51da8c3259"),
            ("data[new_email]", "new@example.com"),
            ("data[old_email]", "old@example.com"),
        ]))
        .unwrap();

        let record = single(dispatch(&event).unwrap());
        assert_eq!(record.email, "new@example.com");
        assert_eq!(record.user_id.as_deref(), Some("51da8c3259"));
        assert_eq!(
            record.extra.get("old_email").map(String::as_str),
            Some("old@example.com")
        );
    }

    #[test]
    fn campaign_fans_out() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "campaign"),
            ("data[id]", "5aa2102003"),
            ("data[subject]", "Test Campaign Subject"),
            ("data[status]", "sent"),
            ("data[list_id]", "a6b5da1054"),
        ]))
        .unwrap();

        assert_eq!(
            dispatch(&event).unwrap(),
            WebhookAction::CampaignSent {
                campaign_id: "5aa2102003".to_string(),
                list_id: Some("a6b5da1054".to_string()),
            }
        );
    }

    #[test]
    fn open_defaults_to_one_occurrence() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "open"),
            ("data[email]", "a@example.com"),
            ("data[campaign_id]", "cmp1"),
        ]))
        .unwrap();
        assert_eq!(single(dispatch(&event).unwrap()).opens.as_deref(), Some("1"));

        let event = WebhookEvent::from_form(&form(&[
            ("type", "click"),
            ("data[email]", "a@example.com"),
            ("data[count]", "4"),
        ]))
        .unwrap();
        assert_eq!(single(dispatch(&event).unwrap()).clicks.as_deref(), Some("4"));
    }

    #[test]
    fn bounce_carries_type() {
        let event = WebhookEvent::from_form(&form(&[
            ("type", "bounce"),
            ("data[email]", "a@example.com"),
            ("data[type]", "soft"),
        ]))
        .unwrap();

        let record = single(dispatch(&event).unwrap());
        assert_eq!(record.bounces.as_deref(), Some("1"));
        assert_eq!(record.bounce_type.as_deref(), Some("soft"));
    }

    #[test]
    fn missing_email_is_rejected() {
        let event = WebhookEvent::from_form(&form(&[("type", "subscribe")])).unwrap();
        assert!(matches!(dispatch(&event), Err(SyncError::Webhook(_))));
    }

    #[test]
    fn unknown_or_missing_type_is_rejected() {
        assert!(WebhookEvent::from_form(&form(&[("type", "teleport")])).is_err());
        assert!(WebhookEvent::from_form(&form(&[("data[email]", "a@example.com")])).is_err());
    }
}
