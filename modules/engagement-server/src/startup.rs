use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engagement_sync::SyncPipeline;

use crate::routes::build_router;

/// Plain text logs by default, JSON when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Bind, optionally kick off the configured campaign sync, then serve until
/// the listener fails.
pub async fn serve(pipeline: Arc<SyncPipeline>, addr: &str, trigger_on_start: bool) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Engagement sync listening on http://{addr}");

    if trigger_on_start {
        spawn_startup_sync(pipeline.clone());
    }

    axum::serve(listener, build_router(pipeline)).await?;
    Ok(())
}

/// One background run of the configured campaign. The server keeps serving
/// whatever the run's result.
pub fn spawn_startup_sync(pipeline: Arc<SyncPipeline>) -> Option<JoinHandle<()>> {
    let Some(campaign_id) = pipeline.settings().campaign_id.clone() else {
        warn!("MAILCHIMP_CAMPAIGN_ID not set, skipping startup sync");
        return None;
    };

    Some(tokio::spawn(async move {
        let outcome = pipeline.sync_campaign(&campaign_id, None).await;
        info!(
            status = ?outcome.status,
            message = %outcome.message,
            "Startup sync finished"
        );
    }))
}
