use std::collections::BTreeMap;

use axum::{extract::State, Json};
use futures::future::join_all;
use serde::Serialize;

use crate::api_state::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub services: BTreeMap<&'static str, bool>,
}

/// Probes external services concurrently. Any failing probe marks the report `degraded`.
pub async fn health(State(state): State<ApiState>) -> Json<HealthReport> {
    let results = join_all(state.probes.iter().map(|probe| async move {
        (probe.name(), probe.healthy().await)
    }))
    .await;

    let services: BTreeMap<&'static str, bool> = results.into_iter().collect();
    let status = if services.values().all(|healthy| *healthy) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthReport { status, services })
}
