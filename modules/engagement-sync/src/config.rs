use std::time::Duration;

use crate::error::{Result, SyncError};

const DEFAULT_EVENT_SOURCE: &str = "MailChimp";

/// Application configuration, built once at process start.
///
/// Holds credentials, identifiers and tuning knobs. Nothing below the
/// binary reads the environment; everything is handed this struct.
#[derive(Debug, Clone)]
pub struct Config {
    // Mailchimp
    pub mailchimp_api_key: String,
    pub mailchimp_dc: String,
    pub mailchimp_api_base: String,
    pub mailchimp_list_id: Option<String>,
    pub mailchimp_campaign_id: Option<String>,

    // Regal
    pub regal_api_key: String,
    pub regal_events_url: String,
    pub event_source: String,

    // Pipeline
    pub page_size: u32,
    pub delivery_interval: Duration,
    pub lookback_hours: u32,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load from the process environment (after reading `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                SyncError::Config(format!("{key} environment variable is required"))
            })
        };

        let mailchimp_dc = required("MAILCHIMP_DC")?;
        let mailchimp_api_base = get("MAILCHIMP_API_BASE")
            .unwrap_or_else(|| mailchimp_client::base_url_for_dc(&mailchimp_dc));

        Ok(Self {
            mailchimp_api_key: required("MAILCHIMP_API_KEY")?,
            mailchimp_dc,
            mailchimp_api_base,
            mailchimp_list_id: get("MAILCHIMP_LIST_ID"),
            mailchimp_campaign_id: get("MAILCHIMP_CAMPAIGN_ID"),
            regal_api_key: required("REGAL_IO_API_KEY")?,
            regal_events_url: get("REGAL_EVENTS_URL")
                .unwrap_or_else(|| regal_client::DEFAULT_EVENTS_URL.to_string()),
            event_source: get("EVENT_SOURCE").unwrap_or_else(|| DEFAULT_EVENT_SOURCE.to_string()),
            page_size: parse_or(
                get("PAGE_SIZE"),
                "PAGE_SIZE",
                mailchimp_client::DEFAULT_PAGE_SIZE,
            )?,
            delivery_interval: Duration::from_millis(parse_or(
                get("DELIVERY_INTERVAL_MS"),
                "DELIVERY_INTERVAL_MS",
                1000u64,
            )?),
            lookback_hours: parse_or(get("LOOKBACK_HOURS"), "LOOKBACK_HOURS", 24)?,
            web_host: get("WEB_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            web_port: parse_or(get("WEB_PORT"), "WEB_PORT", 10000)?,
        })
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => v.clone(),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  MAILCHIMP_API_KEY: {}", preview(&self.mailchimp_api_key));
        tracing::info!("  MAILCHIMP_API_BASE: {}", self.mailchimp_api_base);
        tracing::info!("  MAILCHIMP_LIST_ID: {}", preview_opt(&self.mailchimp_list_id));
        tracing::info!("  MAILCHIMP_CAMPAIGN_ID: {}", preview_opt(&self.mailchimp_campaign_id));
        tracing::info!("  REGAL_IO_API_KEY: {}", preview(&self.regal_api_key));
        tracing::info!("  REGAL_EVENTS_URL: {}", self.regal_events_url);
    }
}

/// First characters of a secret plus its length, safe to log.
fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{head}...({} chars)", val.chars().count())
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => v
            .parse()
            .map_err(|_| SyncError::Config(format!("{key} must be a number, got {v:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("MAILCHIMP_API_KEY", "mc-key"),
        ("MAILCHIMP_DC", "us21"),
        ("REGAL_IO_API_KEY", "regal-key"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.mailchimp_api_base, "https://us21.api.mailchimp.com/3.0");
        assert_eq!(config.regal_events_url, "https://events.regalvoice.com/events");
        assert_eq!(config.event_source, "MailChimp");
        assert_eq!(config.page_size, 100);
        assert_eq!(config.delivery_interval, Duration::from_secs(1));
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.web_port, 10000);
        assert!(config.mailchimp_list_id.is_none());
    }

    #[test]
    fn missing_credential_is_fatal() {
        let err = Config::from_lookup(lookup(&[("MAILCHIMP_DC", "us21")])).unwrap_err();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("MAILCHIMP_API_KEY")));
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("REGAL_IO_API_KEY", "   ");
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("REGAL_IO_API_KEY")));
    }

    #[test]
    fn malformed_number_is_config_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WEB_PORT", "ten thousand"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("WEB_PORT")));
    }

    #[test]
    fn key_preview_handles_multibyte_characters() {
        assert_eq!(preview("abcdefgh"), "abcde...(8 chars)");
        assert_eq!(preview("ключ-секрет"), "ключ-...(11 chars)");
        assert_eq!(preview("é"), "é...(1 chars)");
    }

    #[test]
    fn overrides_are_respected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("MAILCHIMP_API_BASE", "http://localhost:9999/3.0"),
            ("MAILCHIMP_LIST_ID", "2960f1c6f4"),
            ("DELIVERY_INTERVAL_MS", "0"),
            ("LOOKBACK_HOURS", "48"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.mailchimp_api_base, "http://localhost:9999/3.0");
        assert_eq!(config.mailchimp_list_id.as_deref(), Some("2960f1c6f4"));
        assert_eq!(config.delivery_interval, Duration::ZERO);
        assert_eq!(config.lookback_hours, 48);
    }
}
