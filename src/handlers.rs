use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use tracing::{debug, error, warn};

use crate::engine::{errored_response, InjectionEngine};
use crate::metrics::{InjectorMetrics, RejectionLabels, RequestLabels, ResponseLabels};
use crate::scheme::{DecodeError, DecodedReview, Scheme};

pub const MUTATE_PATH: &str = "/mutate";
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const JSON_CONTENT_TYPE: &str = "application/json";

pub struct AppState {
    pub engine: InjectionEngine,
    pub scheme: Scheme,
    pub metrics: InjectorMetrics,
}

pub type SharedState = Arc<AppState>;

/// Every path reaches [`handle_review`]; only [`MUTATE_PATH`] is answered
/// with a decision, anything else gets an empty review envelope.
pub fn webhook_router(state: SharedState) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(handle_review))
        .fallback(handle_review)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn handle_review(
    State(state): State<SharedState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();

    if body.is_empty() {
        error!("empty body");
        record_rejection(&state, "empty_body");
        return (StatusCode::BAD_REQUEST, "empty body").into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != JSON_CONTENT_TYPE {
        error!(content_type, "unexpected Content-Type, expect {JSON_CONTENT_TYPE}");
        record_rejection(&state, "content_type");
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "invalid Content-Type, expect `application/json`",
        )
            .into_response();
    }

    let review = match state.scheme.decode(&body) {
        Ok(DecodedReview { types, .. }) | Err(DecodeError::MalformedRequest { types, .. })
            if uri.path() != MUTATE_PATH =>
        {
            debug!(path = uri.path(), "no mutation served on path");
            AdmissionReview {
                types,
                request: None,
                response: None,
            }
        }
        Ok(DecodedReview { request, .. }) => {
            record_request(&state, &request);
            let response = state.engine.review(&request);
            record_response(&state, &response);
            response.into_review()
        }
        Err(e) => {
            warn!("can't decode body: {e}");
            let response = match &e {
                DecodeError::MalformedRequest { types, uid, .. } => {
                    errored_response(types, uid, e.to_string())
                }
                _ => AdmissionResponse::invalid(e.to_string()),
            };
            record_response(&state, &response);
            response.into_review()
        }
    };

    state
        .metrics
        .admission_request_duration_seconds
        .observe(start.elapsed().as_secs_f64());

    encode_review(&state, &review)
}

fn encode_review(state: &AppState, review: &AdmissionReview<DynamicObject>) -> Response {
    match serde_json::to_vec(review) {
        Ok(bytes) => ([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => {
            error!("can't encode response: {e}");
            record_rejection(state, "encode");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not encode response: {e}"),
            )
                .into_response()
        }
    }
}

fn record_request(state: &AppState, request: &AdmissionRequest<DynamicObject>) {
    state
        .metrics
        .admission_requests_total
        .get_or_create(&RequestLabels {
            kind: request.kind.kind.clone(),
            operation: format!("{:?}", request.operation).to_uppercase(),
        })
        .inc();
}

fn record_response(state: &AppState, response: &AdmissionResponse) {
    let outcome = if !response.allowed {
        "errored"
    } else if response.patch.is_some() {
        "patched"
    } else {
        "passed_through"
    };
    state
        .metrics
        .admission_responses_total
        .get_or_create(&ResponseLabels { outcome })
        .inc();
}

fn record_rejection(state: &AppState, reason: &'static str) {
    state
        .metrics
        .rejected_requests_total
        .get_or_create(&RejectionLabels { reason })
        .inc();
}
