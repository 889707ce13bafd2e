// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP trigger surface.
//!
//! | Route | Auth | Behaviour |
//! |-------|------|-----------|
//! | `GET /healthz` | none | `200 OK` |
//! | `GET /metrics` | none | Prometheus text exposition |
//! | `POST /` | `x-api-key` | runs one reconciliation and returns its report |

use axum::{
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::{convert::Infallible, task::Poll};
use tower::{Layer, Service};
use tracing::{error, warn};

use crate::config::Secret;
use crate::constants::{
    API_KEY_HEADER, HEALTHZ_PATH, MESSAGE_ALREADY_PROCESSING, MESSAGE_FAILED, MESSAGE_PROCESSED,
    METRICS_PATH,
};
use crate::errors::SyncError;
use crate::metrics::gather_metrics;
use crate::records::{DnsRecord, SkippedRecord};
use crate::reconcilers::orchestrator::{RunOutcome, TlsaSyncOrchestrator};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<TlsaSyncOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<TlsaSyncOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Body returned by `POST /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub message: String,
    #[serde(rename = "dnsRecords")]
    pub dns_records: Vec<DnsRecord>,
    #[serde(rename = "addedTLSARecords")]
    pub added: Vec<DnsRecord>,
    #[serde(rename = "deletedTLSARecords")]
    pub deleted: Vec<DnsRecord>,
    #[serde(rename = "skippedTLSARecords")]
    pub skipped: Vec<SkippedRecord>,
}

impl From<RunOutcome> for EventResponse {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(report) => Self {
                message: MESSAGE_PROCESSED.to_string(),
                dns_records: report.dns_records,
                added: report.added,
                deleted: report.deleted,
                skipped: report.skipped,
            },
            RunOutcome::SkippedConcurrent => Self {
                message: MESSAGE_ALREADY_PROCESSING.to_string(),
                dns_records: Vec::new(),
                added: Vec::new(),
                deleted: Vec::new(),
                skipped: Vec::new(),
            },
        }
    }
}

/// Body returned when a run fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub error: String,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        if let Self::Unauthorized { reason } = self {
            return (StatusCode::UNAUTHORIZED, reason).into_response();
        }
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            message: MESSAGE_FAILED.to_string(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// A Tower Layer that checks the `x-api-key` header against the configured key.
#[derive(Clone)]
pub struct ApiKeyLayer {
    digest: Arc<Vec<u8>>,
}

impl ApiKeyLayer {
    pub fn new(api_key: &Secret) -> Self {
        Self {
            digest: Arc::new(Sha256::digest(api_key.expose().as_bytes()).to_vec()),
        }
    }
}

impl<S> Layer<S> for ApiKeyLayer {
    type Service = ApiKeyMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyMiddleware {
            inner,
            digest: self.digest.clone(),
        }
    }
}

/// Middleware that performs the API key check.
#[derive(Clone)]
pub struct ApiKeyMiddleware<S> {
    inner: S,
    digest: Arc<Vec<u8>>,
}

fn unauthorized(reason: &str) -> Response {
    SyncError::Unauthorized {
        reason: reason.to_string(),
    }
    .into_response()
}

impl<S, ReqBody> Service<Request<ReqBody>> for ApiKeyMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let expected = self.digest.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match req.headers().get(API_KEY_HEADER) {
                Some(value) if Sha256::digest(value.as_bytes()).as_slice() == expected.as_slice() => {
                    inner.call(req).await
                }
                Some(_) => {
                    warn!("Rejected trigger with invalid API key");
                    Ok(unauthorized("Invalid API key"))
                }
                None => {
                    warn!("Rejected trigger without API key");
                    Ok(unauthorized("Missing API key"))
                }
            }
        })
    }
}

async fn healthz() -> &'static str {
    "OK"
}

async fn metrics() -> Response {
    match gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn trigger(State(state): State<AppState>) -> Result<Json<EventResponse>, SyncError> {
    let outcome = Arc::clone(&state.orchestrator).run_detached().await?;
    Ok(Json(EventResponse::from(outcome)))
}

/// `POST /` router.
/// API key required.
fn create_trigger_router(api_key: &Secret) -> Router<AppState> {
    Router::new()
        .route("/", post(trigger))
        .layer(ApiKeyLayer::new(api_key))
}

/// Main router. Health and metrics are not behind the API key.
pub fn create_app(state: AppState, api_key: &Secret) -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(METRICS_PATH, get(metrics))
        .merge(create_trigger_router(api_key))
        .with_state(state)
}
