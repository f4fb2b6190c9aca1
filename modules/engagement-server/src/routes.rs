use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use engagement_sync::{SyncError, SyncOutcome, SyncPipeline, WebhookEvent};

pub struct AppState {
    pub pipeline: Arc<SyncPipeline>,
}

pub fn build_router(pipeline: Arc<SyncPipeline>) -> Router {
    let state = Arc::new(AppState { pipeline });

    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "ok" }))
        // Pull triggers
        .route("/update-contacts", get(update_contacts))
        .route("/update-list", get(update_list))
        .route("/contacts/{email}/sync", post(sync_contact))
        // Push
        .route("/webhook", get(webhook_validation).post(webhook))
        .with_state(state)
        // Method + path only; query strings can carry ids we don't want in logs.
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

async fn index() -> &'static str {
    "Mailchimp to Regal engagement sync is running"
}

#[derive(Deserialize)]
pub struct CampaignParams {
    campaign_id: Option<String>,
}

async fn update_contacts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CampaignParams>,
) -> Response {
    let campaign_id = params
        .campaign_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| state.pipeline.settings().campaign_id.clone());
    let Some(campaign_id) = campaign_id else {
        return error_response(StatusCode::BAD_REQUEST, "Missing campaign_id");
    };

    info!(%campaign_id, "Campaign sync triggered");
    let outcome = state.pipeline.sync_campaign(&campaign_id, None).await;
    outcome_response(outcome)
}

#[derive(Deserialize)]
pub struct ListParams {
    list_id: Option<String>,
    since_hours: Option<u32>,
}

async fn update_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let list_id = params
        .list_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| state.pipeline.settings().list_id.clone());
    let Some(list_id) = list_id else {
        return error_response(StatusCode::BAD_REQUEST, "Missing list_id");
    };

    let since = match state.pipeline.lookback_since(Utc::now(), params.since_hours) {
        Ok(since) => since,
        Err(e) => return sync_error_response(e),
    };
    info!(%list_id, %since, "List sync triggered");
    let outcome = state.pipeline.sync_list(&list_id, Some(since)).await;
    outcome_response(outcome)
}

async fn sync_contact(State(state): State<Arc<AppState>>, Path(email): Path<String>) -> Response {
    match state.pipeline.sync_member(&email).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => sync_error_response(e),
    }
}

/// Mailchimp checks the webhook URL with a GET before saving it.
async fn webhook_validation() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let event = match WebhookEvent::from_form(&form) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Rejected webhook payload");
            return sync_error_response(e);
        }
    };

    match state.pipeline.handle_webhook(&event).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            warn!(kind = %event.kind, error = %e, "Webhook not processed");
            sync_error_response(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Every completed run is a 200; `status` in the body says how it went.
fn outcome_response(outcome: SyncOutcome) -> Response {
    Json(outcome).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"status": "error", "message": message})),
    )
        .into_response()
}

fn sync_error_response(e: SyncError) -> Response {
    let status = match e {
        SyncError::Webhook(_) | SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &e.to_string())
}
