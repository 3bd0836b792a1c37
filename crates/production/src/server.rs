//! HTTP surface: ledger webhook, health and metrics.

use crate::{NodeMetrics, WebhookHttpError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use certchain_confirmation::{ApplyOutcome, WebhookDisposition, WebhookHandler, SIGNATURE_HEADER};
use certchain_tenancy::TenantConnectionRegistry;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub webhook: Arc<WebhookHandler>,
    pub registry: Arc<TenantConnectionRegistry>,
    pub metrics: NodeMetrics,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/ledger", post(ledger_webhook))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn ledger_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.webhook.handle(&body, signature).await {
        Ok(disposition) => {
            state.metrics.webhook_request(disposition.label());
            if let WebhookDisposition::Mint(ApplyOutcome::Confirmed {
                newly_minted: true, ..
            }) = &disposition
            {
                state.metrics.confirmed("push", 1);
            }
            (
                StatusCode::OK,
                Json(json!({ "status": "ok", "outcome": disposition.label() })),
            )
                .into_response()
        }
        Err(e) => {
            let err = WebhookHttpError::from(e);
            if let WebhookHttpError::Internal(detail) = &err {
                error!(error = %detail, "Webhook processing failed");
            }
            state.metrics.webhook_request(err.label());
            err.into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "tenant_connections": state.registry.connection_count(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
