use std::collections::{BTreeMap, HashMap};

/// Join key for every source: trimmed and ASCII-lowercased.
/// Returns `None` for addresses that are empty after trimming.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}

// ---------------------------------------------------------------------------
// Campaign platform metadata
// ---------------------------------------------------------------------------

pub const UNKNOWN_CAMPAIGN: &str = "Unknown Campaign";

/// Campaign settings joined with the aggregate report. Fetched fresh every run.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignMetadata {
    pub id: String,
    pub title: String,
    pub subject: Option<String>,
    pub list_id: Option<String>,
    pub send_time: Option<String>,
    pub emails_sent: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub bounce_count: u64,
}

impl CampaignMetadata {
    /// Metadata for a campaign whose settings and report could not be read.
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: UNKNOWN_CAMPAIGN.to_string(),
            subject: None,
            list_id: None,
            send_time: None,
            emails_sent: 0,
            open_rate: 0.0,
            click_rate: 0.0,
            bounce_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListMetadata {
    pub id: String,
    pub name: String,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub default_subject: Option<String>,
    pub member_count: u64,
    pub campaign_count: u64,
    pub open_rate: f64,
    pub click_rate: f64,
}

// ---------------------------------------------------------------------------
// Partial per-recipient sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Opens,
    Clicks,
    Bounces,
}

/// How a source expresses its counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// Repeated discrete events; counts are summed.
    EventLog,
    /// Membership only; an (email, metric) pair counts once per source.
    Presence,
}

/// One fact about one recipient, as read from a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub email: String,
    /// `None` registers the recipient without contributing to any counter.
    pub metric: Option<Metric>,
    pub count: u64,
    pub bounce_type: Option<String>,
    pub spam: bool,
}

impl Observation {
    pub fn recipient(email: &str) -> Self {
        Self {
            email: email.to_string(),
            metric: None,
            count: 0,
            bounce_type: None,
            spam: false,
        }
    }

    pub fn event(email: &str, metric: Metric, count: u64) -> Self {
        Self {
            email: email.to_string(),
            metric: Some(metric),
            count,
            bounce_type: None,
            spam: false,
        }
    }

    pub fn with_bounce_type(mut self, bounce_type: Option<String>) -> Self {
        self.bounce_type = bounce_type.filter(|t| !t.is_empty());
        self
    }
}

/// Everything one endpoint said about a campaign's recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSource {
    pub label: String,
    pub shape: SourceShape,
    pub observations: Vec<Observation>,
}

impl PartialSource {
    pub fn new(label: impl Into<String>, shape: SourceShape) -> Self {
        Self {
            label: label.into(),
            shape,
            observations: Vec::new(),
        }
    }

    pub fn push(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Merged records
// ---------------------------------------------------------------------------

/// Engagement counts for one (campaign, recipient) pair. Counts only grow
/// while sources are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientActivity {
    pub email: String,
    pub opens: u64,
    pub clicks: u64,
    pub bounces: u64,
    pub bounce_type: Option<String>,
    pub spam: bool,
}

impl RecipientActivity {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            ..Default::default()
        }
    }
}

/// Contact fields from the audience list or an inline webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub zip: Option<String>,
    pub state: Option<String>,
}

/// Profile plus the stable external id of one list member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberProfile {
    pub user_id: Option<String>,
    pub profile: Profile,
}

/// Normalized email → member profile for one audience list.
pub type ProfileDirectory = HashMap<String, MemberProfile>;

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedEngagementRecord {
    pub activity: RecipientActivity,
    pub user_id: Option<String>,
    pub profile: Profile,
}

impl UnifiedEngagementRecord {
    pub fn new(activity: RecipientActivity) -> Self {
        Self {
            activity,
            user_id: None,
            profile: Profile::default(),
        }
    }

    /// Attach profile fields for this recipient, if the directory knows them.
    pub fn with_directory(mut self, directory: Option<&ProfileDirectory>) -> Self {
        if let Some(member) = directory.and_then(|d| d.get(&self.activity.email)) {
            self.user_id = member.user_id.clone();
            self.profile = member.profile.clone();
        }
        self
    }

    pub fn email(&self) -> &str {
        &self.activity.email
    }
}

// ---------------------------------------------------------------------------
// Inline (webhook) records
// ---------------------------------------------------------------------------

/// A single-recipient record read straight from a webhook payload.
/// Counter values stay as the raw strings the platform sent.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineRecord {
    pub email: String,
    pub user_id: Option<String>,
    pub profile: Profile,
    pub opens: Option<String>,
    pub clicks: Option<String>,
    pub bounces: Option<String>,
    pub bounce_type: Option<String>,
    pub spam: bool,
    pub campaign_id: Option<String>,
    pub list_id: Option<String>,
    /// Remaining scalar payload fields, passed on as properties.
    pub extra: BTreeMap<String, String>,
}

impl InlineRecord {
    pub fn new(email: String) -> Self {
        Self {
            email,
            user_id: None,
            profile: Profile::default(),
            opens: None,
            clicks: None,
            bounces: None,
            bounce_type: None,
            spam: false,
            campaign_id: None,
            list_id: None,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(
            normalize_email("  Jane.Doe@Example.COM "),
            Some("jane.doe@example.com".to_string())
        );
    }

    #[test]
    fn normalize_rejects_blank() {
        assert_eq!(normalize_email(""), None);
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn directory_join_fills_profile() {
        let mut directory = ProfileDirectory::new();
        directory.insert(
            "a@example.com".to_string(),
            MemberProfile {
                user_id: Some("u-1".to_string()),
                profile: Profile {
                    first_name: Some("Ada".to_string()),
                    ..Default::default()
                },
            },
        );

        let joined = UnifiedEngagementRecord::new(RecipientActivity::new("a@example.com"))
            .with_directory(Some(&directory));
        assert_eq!(joined.user_id.as_deref(), Some("u-1"));
        assert_eq!(joined.profile.first_name.as_deref(), Some("Ada"));

        let stranger = UnifiedEngagementRecord::new(RecipientActivity::new("b@example.com"))
            .with_directory(Some(&directory));
        assert_eq!(stranger.profile, Profile::default());
    }
}
