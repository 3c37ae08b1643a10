//! HTTP surface: the payment API and the health/metrics server (spec §10.5).
//!
//! Two independent `axum` routers are started, matching
//! `canceler::server`'s separation of concerns: the payment API answers
//! `create_payment_link` / `check_payment` / `list_payments` on
//! `api.listen_addr`, while `GET /health` and `GET /metrics` are served on
//! their own `api.metrics_listen_addr` so a scrape target never competes
//! with payment traffic.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use eyre::{eyre, Context};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tracing::info;

use crate::metrics::Metrics;
use crate::orchestrator::{Orchestrator, Request};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Clone)]
pub struct MetricsState {
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentLinkBody {
    pub amount: f64,
    pub token: String,
    pub chain: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

async fn create_payment_link(
    State(state): State<AppState>,
    Json(body): Json<CreatePaymentLinkBody>,
) -> Response {
    let response = state
        .orchestrator
        .handle(Request::CreatePaymentLink {
            amount: body.amount,
            token: body.token,
            chain: body.chain,
            chat_id: body.chat_id,
        })
        .await;
    Json(response).into_response()
}

async fn check_payment(State(state): State<AppState>, Path(payment_id): Path<String>) -> Response {
    let response = state
        .orchestrator
        .handle(Request::CheckPayment { payment_id })
        .await;
    Json(response).into_response()
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Response {
    let response = state
        .orchestrator
        .handle(Request::ListPayments {
            status: query.status,
            limit: query.limit,
        })
        .await;
    Json(response).into_response()
}

/// Start the payment API: `POST /payments`, `GET /payments/:payment_id`,
/// `GET /payments`.
pub async fn start_payment_api(bind_address: &str, orchestrator: Arc<Orchestrator>) -> eyre::Result<()> {
    let state = AppState { orchestrator };

    let app = Router::new()
        .route("/payments", get(list_payments).post(create_payment_link))
        .route("/payments/{payment_id}", get(check_payment))
        .with_state(state);

    let addr: SocketAddr = bind_address
        .parse()
        .wrap_err_with(|| format!("invalid api.listen_addr {bind_address}"))?;
    info!(%addr, "payment API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn liveness() -> &'static str {
    "OK"
}

async fn prometheus_metrics(State(state): State<MetricsState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to build metrics response").into_response(),
    }
}

/// Start the health/metrics server: `GET /health`, `GET /metrics`.
pub async fn start_metrics_server(bind_address: &str, metrics: Arc<Metrics>) -> eyre::Result<()> {
    let state = MetricsState { metrics };

    let app = Router::new()
        .route("/health", get(liveness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state);

    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| eyre!("invalid api.metrics_listen_addr {bind_address}: {e}"))?;
    info!(%addr, "health/metrics server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
