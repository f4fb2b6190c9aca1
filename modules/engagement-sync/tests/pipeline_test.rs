//! End-to-end pipeline runs over mock report sources and a recording sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use engagement_sync::pipeline::NO_CONTACTS_MESSAGE;
use engagement_sync::testing::{
    activity_source, link_clicks, mock_pipeline, opens_source, recipients_source, MockEventSink,
    MockReportSource,
};
use engagement_sync::{
    CampaignMetadata, ListMetadata, MemberProfile, PacingPolicy, PipelineSettings, Profile,
    ProfileDirectory, SyncError, SyncPipeline, SyncStatus, WebhookEvent,
};
use serde_json::{json, Value};

fn campaign(id: &str) -> CampaignMetadata {
    CampaignMetadata {
        title: "Spring Newsletter".to_string(),
        subject: Some("Hello spring".to_string()),
        list_id: Some("L1".to_string()),
        open_rate: 0.5,
        click_rate: 0.25,
        ..CampaignMetadata::unknown(id)
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        list_id: Some("L1".to_string()),
        campaign_id: Some("C1".to_string()),
        lookback_hours: 24,
    }
}

fn pipeline(source: MockReportSource, sink: &Arc<MockEventSink>) -> SyncPipeline {
    mock_pipeline(Arc::new(source), sink.clone(), PacingPolicy::none(), settings())
}

fn wire(sink: &MockEventSink) -> Vec<Value> {
    sink.events()
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect()
}

fn directory(entries: &[(&str, &str, &str)]) -> ProfileDirectory {
    entries
        .iter()
        .map(|(email, user_id, first_name)| {
            (
                email.to_string(),
                MemberProfile {
                    user_id: Some(user_id.to_string()),
                    profile: Profile {
                        first_name: Some(first_name.to_string()),
                        ..Profile::default()
                    },
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Campaign pull
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn campaign_sync_emits_one_event_per_recipient() {
    let source = MockReportSource::new()
        .on_campaign(campaign("C1"))
        .on_activity("C1", activity_source(&["a@x.com", "b@x.com"], &[]))
        .on_opens("C1", opens_source(&[("a@x.com", 1)]))
        .on_clicks(
            "C1",
            vec![link_clicks("link-1", &["a@x.com"]), link_clicks("link-2", &["a@x.com"])],
        );
    let sink = Arc::new(MockEventSink::new());
    let pipeline = mock_pipeline(
        Arc::new(source),
        sink.clone(),
        PacingPolicy::default(),
        settings(),
    );

    let outcome = pipeline.sync_campaign("C1", None).await;

    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.records, 2);
    assert_eq!(outcome.delivery.sent, 2);

    let events = wire(&sink);
    assert_eq!(events.len(), 2);

    let a = &events[0];
    assert_eq!(a["traits"]["email"], "a@x.com");
    assert_eq!(a["name"], "Campaign Engagement Update");
    assert_eq!(a["eventSource"], "MailChimp");
    assert_eq!(a["properties"]["total_opens"], 1);
    assert_eq!(a["properties"]["total_clicks"], 2);
    assert_eq!(a["properties"]["total_bounces"], 0);
    assert_eq!(a["properties"]["campaign_id"], "C1");
    assert_eq!(a["properties"]["campaign_title"], "Spring Newsletter");

    let b = &events[1];
    assert_eq!(b["traits"]["email"], "b@x.com");
    assert_eq!(b["properties"]["total_opens"], 0);
    assert_eq!(b["properties"]["total_clicks"], 0);
    assert_eq!(b["properties"]["total_bounces"], 0);

    let times = sink.call_times();
    assert!(times[1] - times[0] >= Duration::from_secs(1));
}

#[tokio::test]
async fn campaign_without_contacts_reports_error_and_sends_nothing() {
    let sink = Arc::new(MockEventSink::new());
    let pipeline = pipeline(MockReportSource::new(), &sink);

    let outcome = pipeline.sync_campaign("C404", None).await;

    assert_eq!(outcome.status, SyncStatus::Error);
    assert_eq!(outcome.message, NO_CONTACTS_MESSAGE);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn unknown_campaign_metadata_still_delivers() {
    let source = MockReportSource::new()
        .on_activity("C9", activity_source(&["a@x.com"], &[]));
    let sink = Arc::new(MockEventSink::new());

    let outcome = pipeline(source, &sink).sync_campaign("C9", None).await;

    assert_eq!(outcome.status, SyncStatus::Success);
    let events = wire(&sink);
    assert_eq!(events[0]["properties"]["campaign_id"], "C9");
}

#[tokio::test]
async fn bounces_and_partial_delivery_surface_in_outcome() {
    let source = MockReportSource::new()
        .on_campaign(campaign("C1"))
        .on_activity(
            "C1",
            activity_source(&["a@x.com", "b@x.com"], &[("b@x.com", "hard")]),
        );
    let sink = Arc::new(MockEventSink::failing_on(&[0]));

    let outcome = pipeline(source, &sink).sync_campaign("C1", None).await;

    assert_eq!(outcome.status, SyncStatus::Partial);
    assert_eq!(outcome.delivery.failures[0].email, "a@x.com");

    let events = wire(&sink);
    assert_eq!(events[1]["properties"]["total_bounces"], 1);
    assert_eq!(events[1]["properties"]["bounce_type"], "hard");
    assert_eq!(events[1]["properties"]["bounced"], true);
}

#[tokio::test]
async fn campaign_sync_enriches_from_the_campaign_list() {
    let source = MockReportSource::new()
        .on_campaign(campaign("C1"))
        .on_activity("C1", activity_source(&["a@x.com"], &[]))
        .on_profiles("L1", directory(&[("a@x.com", "u-a", "Ada")]));
    let sink = Arc::new(MockEventSink::new());

    pipeline(source, &sink).sync_campaign("C1", None).await;

    let events = wire(&sink);
    assert_eq!(events[0]["userId"], "u-a");
    assert_eq!(events[0]["traits"]["firstName"], "Ada");
    assert_eq!(events[0]["properties"]["list_id"], "L1");
}

#[tokio::test]
async fn lookback_window_is_forwarded_to_time_filtered_reports() {
    let source = Arc::new(MockReportSource::new());
    let sink = Arc::new(MockEventSink::new());
    let pipeline = mock_pipeline(source.clone(), sink, PacingPolicy::none(), settings());

    let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
    let since = pipeline.lookback_since(now, None).unwrap();
    assert_eq!(since, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

    pipeline.sync_campaign("C1", Some(since)).await;

    let calls = source.calls();
    assert!(calls.contains(&format!("opens:C1@{}", since.to_rfc3339())));
    assert!(calls.contains(&format!("activity:C1@{}", since.to_rfc3339())));
}

#[test]
fn lookback_past_the_date_range_is_invalid_request() {
    let pipeline = mock_pipeline(
        Arc::new(MockReportSource::new()),
        Arc::new(MockEventSink::new()),
        PacingPolicy::none(),
        settings(),
    );

    let result = pipeline.lookback_since(Utc::now(), Some(u32::MAX));

    assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
}

// ---------------------------------------------------------------------------
// List pull
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_sync_covers_each_campaign_with_profiles() {
    let list = ListMetadata {
        id: "L1".to_string(),
        name: "Customers".to_string(),
        ..ListMetadata::default()
    };
    let source = MockReportSource::new()
        .on_list(list, &["C1", "C2", "C3"])
        .on_campaign(campaign("C1"))
        .on_activity("C1", activity_source(&["a@x.com"], &[]))
        .on_activity("C3", activity_source(&["a@x.com", "b@x.com"], &[]))
        .on_profiles("L1", directory(&[("a@x.com", "u-a", "Ada")]));
    let sink = Arc::new(MockEventSink::new());

    let outcome = pipeline(source, &sink).sync_list("L1", None).await;

    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.records, 3);

    let events = wire(&sink);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["userId"], "u-a");
    assert_eq!(events[0]["traits"]["firstName"], "Ada");
    assert_eq!(events[0]["properties"]["list_name"], "Customers");
    assert_eq!(events[1]["properties"]["campaign_id"], "C3");
    assert!(events[2].get("userId").is_none());
}

#[tokio::test(start_paused = true)]
async fn list_sync_keeps_pacing_between_campaigns() {
    let list = ListMetadata {
        id: "L1".to_string(),
        ..ListMetadata::default()
    };
    let source = MockReportSource::new()
        .on_list(list, &["C1", "C2"])
        .on_activity("C1", activity_source(&["a@x.com"], &[]))
        .on_activity("C2", activity_source(&["b@x.com"], &[]));
    let sink = Arc::new(MockEventSink::new());
    let pipeline = mock_pipeline(
        Arc::new(source),
        sink.clone(),
        PacingPolicy::default(),
        settings(),
    );

    let outcome = pipeline.sync_list("L1", None).await;

    assert_eq!(outcome.delivery.sent, 2);
    let times = sink.call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_secs(1));
}

#[tokio::test]
async fn list_without_campaigns_reports_error() {
    let sink = Arc::new(MockEventSink::new());

    let outcome = pipeline(MockReportSource::new(), &sink)
        .sync_list("L404", None)
        .await;

    assert_eq!(outcome.status, SyncStatus::Error);
    assert!(outcome.message.contains("L404"));
    assert!(sink.events().is_empty());
}

// ---------------------------------------------------------------------------
// Member sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn member_sync_normalizes_email_and_names_event() {
    let source = Arc::new(
        MockReportSource::new().on_member("a@x.com", opens_source(&[("a@x.com", 3)])),
    );
    let sink = Arc::new(MockEventSink::new());
    let pipeline = mock_pipeline(source.clone(), sink.clone(), PacingPolicy::none(), settings());

    let outcome = pipeline.sync_member("  A@X.com ").await.unwrap();

    assert_eq!(outcome.status, SyncStatus::Success);
    assert!(source.calls().contains(&"member:L1:a@x.com".to_string()));

    let events = wire(&sink);
    assert_eq!(events[0]["name"], "Member Engagement Update");
    assert_eq!(events[0]["properties"]["total_opens"], 3);
    assert_eq!(events[0]["properties"]["opened_email"], true);
}

#[tokio::test]
async fn member_sync_requires_list_and_email() {
    let sink = Arc::new(MockEventSink::new());
    let no_list = mock_pipeline(
        Arc::new(MockReportSource::new()),
        sink.clone(),
        PacingPolicy::none(),
        PipelineSettings::default(),
    );
    assert!(matches!(
        no_list.sync_member("a@x.com").await,
        Err(SyncError::Config(_))
    ));

    let with_list = pipeline(MockReportSource::new(), &sink);
    assert!(matches!(
        with_list.sync_member("   ").await,
        Err(SyncError::InvalidRequest(_))
    ));
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

fn webhook(pairs: &[(&str, &str)]) -> WebhookEvent {
    let form: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    WebhookEvent::from_form(&form).unwrap()
}

#[tokio::test]
async fn subscribe_webhook_delivers_single_event() {
    let sink = Arc::new(MockEventSink::new());
    let event = webhook(&[
        ("type", "subscribe"),
        ("data[id]", "8a25ff1d98"),
        ("data[email]", "Ada@Example.com"),
        ("data[merges][FNAME]", "Ada"),
        ("data[ip_opt]", "10.20.10.30"),
    ]);

    let outcome = pipeline(MockReportSource::new(), &sink)
        .handle_webhook(&event)
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncStatus::Success);
    let events = wire(&sink);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["name"], "Mailchimp Subscribed");
    assert_eq!(events[0]["userId"], "8a25ff1d98");
    assert_eq!(events[0]["traits"]["email"], "ada@example.com");
    assert_eq!(events[0]["traits"]["firstName"], "Ada");
    assert_eq!(events[0]["properties"]["ip_opt"], "10.20.10.30");
    assert_eq!(events[0]["properties"]["total_opens"], 0);
}

#[tokio::test]
async fn open_webhook_coerces_counts() {
    let sink = Arc::new(MockEventSink::new());
    let event = webhook(&[
        ("type", "open"),
        ("data[email]", "a@x.com"),
        ("data[opens]", "4"),
        ("data[score]", "2.5"),
    ]);

    pipeline(MockReportSource::new(), &sink)
        .handle_webhook(&event)
        .await
        .unwrap();

    let events = wire(&sink);
    assert_eq!(events[0]["name"], "Email Opened");
    assert_eq!(events[0]["properties"]["total_opens"], json!(4));
    assert_eq!(events[0]["properties"]["score"], json!(2.5));
}

#[tokio::test]
async fn webhook_without_email_is_rejected_before_delivery() {
    let sink = Arc::new(MockEventSink::new());
    let event = webhook(&[("type", "subscribe"), ("data[id]", "8a25ff1d98")]);

    let result = pipeline(MockReportSource::new(), &sink)
        .handle_webhook(&event)
        .await;

    assert!(matches!(result, Err(SyncError::Webhook(_))));
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn campaign_webhook_fans_out_over_recipients() {
    let source = Arc::new(
        MockReportSource::new()
            .on_campaign(campaign("C1"))
            .on_recipients("C1", recipients_source(&["a@x.com", "b@x.com"]))
            .on_opens("C1", opens_source(&[("b@x.com", 2)]))
            .on_profiles("L1", directory(&[("b@x.com", "u-b", "Bo")])),
    );
    let sink = Arc::new(MockEventSink::new());
    let pipeline = mock_pipeline(source.clone(), sink.clone(), PacingPolicy::none(), settings());
    let event = webhook(&[
        ("type", "campaign"),
        ("data[id]", "C1"),
        ("data[list_id]", "L1"),
        ("data[status]", "sent"),
    ]);

    let outcome = pipeline.handle_webhook(&event).await.unwrap();

    assert_eq!(outcome.status, SyncStatus::Success);
    assert!(source.calls().contains(&"profiles:L1".to_string()));

    let events = wire(&sink);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e["name"] == "Mailchimp Campaign Sent"));
    assert_eq!(events[1]["userId"], "u-b");
    assert_eq!(events[1]["properties"]["total_opens"], 2);
}
