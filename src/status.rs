//! Read-only HTTP status surface.
//!
//! * `GET /health` reports the advertised hostnames and the connection
//!   state of the container runtime.
//! * `GET /` describes the service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::reconciler::Reconciler;
use crate::types::ConnectionState;

pub const SERVICE_NAME: &str = "mdns-publisher";

#[derive(Clone)]
pub struct StatusState {
    pub reconciler: Arc<Reconciler>,
    pub connection: watch::Receiver<ConnectionState>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub registered_hostnames: Vec<String>,
    pub count: usize,
    pub connection: ConnectionState,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: serde_json::Value,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(index))
        .with_state(state)
}

async fn health(State(state): State<StatusState>) -> Json<HealthResponse> {
    let registered_hostnames = state.reconciler.snapshot_hostnames().await;
    let connection = *state.connection.borrow();
    Json(HealthResponse {
        status: "healthy",
        count: registered_hostnames.len(),
        registered_hostnames,
        connection,
    })
}

async fn index() -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: serde_json::json!({
            "/health": "Health check",
            "/": "This page",
        }),
    })
}

/// Serves the status surface until `cancel` fires.
pub async fn run_status_server(
    bind_addr: SocketAddr,
    state: StatusState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Health server started on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Health server stopped");
    Ok(())
}
