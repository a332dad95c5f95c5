use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

use crate::config::WorkloadKind;

const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Whether the webhook can take admission traffic. Flipped once, after the
/// HTTPS listener is bound.
#[derive(Debug, Clone)]
pub struct Readiness {
    kind: WorkloadKind,
    serving: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new(kind: WorkloadKind) -> Self {
        Self {
            kind,
            serving: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_serving(&self) {
        self.serving.store(true, Ordering::Release);
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }
}

pub struct HealthState {
    pub registry: Arc<Registry>,
    pub readiness: Readiness,
}

pub type SharedHealthState = Arc<HealthState>;

pub fn health_router(state: SharedHealthState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn readyz(State(state): State<SharedHealthState>) -> Response {
    let readiness = &state.readiness;
    if readiness.is_serving() {
        format!("injecting secrets into {} objects", readiness.kind).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "webhook listener not bound").into_response()
    }
}

async fn metrics_handler(State(state): State<SharedHealthState>) -> Response {
    let mut buffer = String::new();
    match encode(&mut buffer, &state.registry) {
        Ok(()) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], buffer).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}
