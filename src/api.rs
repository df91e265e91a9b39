use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use dashmap::DashMap;
use tokio::net::ToSocketAddrs;

use crate::monitor::{SnapshotStore, Zone};

mod models;

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    snapshots: Arc<SnapshotStore>,
    retired_energy: Arc<DashMap<Zone, f64>>,
}

impl ApiState {
    pub fn new(snapshots: Arc<SnapshotStore>, retired_energy: Arc<DashMap<Zone, f64>>) -> Self {
        Self {
            snapshots,
            retired_energy,
        }
    }
}

async fn export_snapshot(State(state): State<ApiState>) -> Response {
    let snapshot = state.snapshots.latest();
    (
        axum::http::StatusCode::OK,
        Json(models::SnapshotBody::from(&*snapshot)),
    )
        .into_response()
}

/// Cumulative energy of evicted processes, per zone. Diagnostic only.
async fn export_retired(State(state): State<ApiState>) -> Response {
    let body: HashMap<String, f64> = state
        .retired_energy
        .iter()
        .map(|entry| (entry.key().as_ref().to_owned(), *entry.value()))
        .collect();
    (axum::http::StatusCode::OK, Json(body)).into_response()
}

async fn health() -> Response {
    (axum::http::StatusCode::OK, "ok").into_response()
}

pub struct ApiServer {
    router: axum::Router,
}

impl ApiServer {
    pub fn new(state: ApiState) -> Self {
        let router = axum::Router::new()
            .route("/snapshot", get(export_snapshot))
            .route("/debug/retired", get(export_retired))
            .route("/health", get(health))
            .with_state(state);
        Self { router }
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("TCP Listener bind");
        axum::serve(listener, self.router.into_make_service())
            .await
            .unwrap()
    }
}
