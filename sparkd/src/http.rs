//! The HTTP ingest surface (spec.md §6): exactly three routes. `/ingest`
//! always appends to the queue; for a `pre_tool` event it additionally and
//! synchronously runs the advisory engine on the same request, per §4.6
//! ("runs inline on the ingest thread when a pre_tool event arrives") —
//! there is no separate advisory-query endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use spark_core::advisory::{AdvisoryOutcome, AdvisoryRequest};
use spark_core::event::{Event, EventKind};
use spark_core::retrieval::RetrievalSources;

use crate::state::AppState;

/// Above this many pending (unprocessed-by-the-bridge-cycle) events the
/// daemon refuses new ingests with 429 rather than let the queue grow
/// unbounded (spec.md §5 "Backpressure": default high-water mark 20k).
const QUEUE_HIGH_WATER_MARK: u64 = 20_000;

const MAX_BODY_BYTES: usize = 256 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/health", get(health))
        .route("/v1/stats", get(stats))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.token.as_deref() else {
        return true;
    };
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = header.to_str() else {
        return false;
    };
    value
        .strip_prefix("Bearer ")
        .map(|got| got == expected)
        .unwrap_or(false)
}

#[derive(Serialize, Default)]
struct IngestResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    advisory: Option<AdvisoryResponse>,
}

#[derive(Serialize)]
struct AdvisoryResponse {
    trace_id: String,
    emitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authority: Option<f64>,
    /// The resolved source tag of the emitted advice (spec.md §3 "Advice
    /// item"), e.g. `"baseline"`, `"cognitive"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suppress_reason: Option<String>,
}

impl From<AdvisoryOutcome> for AdvisoryResponse {
    fn from(outcome: AdvisoryOutcome) -> Self {
        match outcome {
            AdvisoryOutcome::Emitted {
                trace_id,
                text,
                category,
                authority,
                source,
            } => AdvisoryResponse {
                trace_id,
                emitted: true,
                text: Some(text),
                category: Some(category),
                authority: Some(authority),
                source: Some(source.as_str().to_string()),
                suppress_reason: None,
            },
            AdvisoryOutcome::Suppressed { trace_id, reason } => AdvisoryResponse {
                trace_id,
                emitted: false,
                text: None,
                category: None,
                authority: None,
                source: None,
                suppress_reason: Some(reason.code().to_string()),
            },
        }
    }
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let queue_stats = match state.queue.stats() {
        Ok(s) => s,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    if queue_stats.pending_estimate >= QUEUE_HIGH_WATER_MARK {
        return (StatusCode::TOO_MANY_REQUESTS, "queue backlog exceeds high-water mark").into_response();
    }

    let event = match spark_core::adapters::validate_ingest_event(&body) {
        Ok(event) => event,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    if !matches!(event.kind, EventKind::PreTool) {
        if let Err(e) = state.queue.append(&event) {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
        return Json(IngestResponse {
            accepted: true,
            advisory: None,
        })
        .into_response();
    }

    let advisory = handle_pre_tool(&state, &event).await;

    if let Err(e) = state.queue.append(&event) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    Json(IngestResponse {
        accepted: true,
        advisory: Some(advisory.into()),
    })
    .into_response()
}

/// Builds `recent` from the session's own tail of the queue (excluding the
/// event currently being handled, which has not been appended yet) and
/// runs the advisory engine under its own deadline.
async fn handle_pre_tool(state: &AppState, event: &Event) -> AdvisoryOutcome {
    let recent: Vec<Event> = state
        .queue
        .tail_recent(64)
        .unwrap_or_default()
        .into_iter()
        .map(|q| q.event)
        .filter(|e| e.session_id() == event.session_id())
        .collect();

    let insights = state.insight_store.snapshot();
    let chip_insights: Vec<_> = insights
        .iter()
        .filter(|i| i.source_chip.is_some())
        .cloned()
        .collect();
    let distillations = state.distillations.snapshot();

    let sources = RetrievalSources {
        insights: &insights,
        distillations: &distillations,
        chip_insights: &chip_insights,
        baseline: &state.baseline,
    };

    let request = AdvisoryRequest {
        event,
        recent: &recent,
        sources,
    };

    let engine = state.engine.read().await;
    engine.handle(request).await
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct StatsResponse {
    queue_pending: u64,
    queue_truncated: u64,
    insights_total: usize,
    distillations_total: usize,
    gate_quality: u64,
    gate_needs_work: u64,
    gate_primitive: u64,
    gate_noise_filtered: u64,
    last_bridge_events_processed: u64,
    last_bridge_errors: usize,
}

async fn stats(State(state): State<Arc<AppState>>) -> Response {
    let queue_stats = match state.queue.stats() {
        Ok(s) => s,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let (quality, needs_work, primitive, noise_filtered) = state.insight_store.stats();
    let last = state
        .last_bridge_stats
        .lock()
        .map(|g| g.clone())
        .unwrap_or_default();

    Json(StatsResponse {
        queue_pending: queue_stats.pending_estimate,
        queue_truncated: queue_stats.truncated,
        insights_total: state.insight_store.len(),
        distillations_total: state.distillations.len(),
        gate_quality: quality,
        gate_needs_work: needs_work,
        gate_primitive: primitive,
        gate_noise_filtered: noise_filtered,
        last_bridge_events_processed: last.events_processed,
        last_bridge_errors: last.errors.len(),
    })
    .into_response()
}
