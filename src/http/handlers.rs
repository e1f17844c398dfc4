//! Trigger handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::server::AppState;
use crate::fleet::{HostDescriptor, HostUpdate, RestartError, SummaryError};
use crate::panics::{PanicDigest, PanicReport};
use crate::store::DocumentSession;

/// Body of `GET`/`PUT /maintenance`. `enabled` means liveness checks are
/// suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintenance {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRequest {
    pub host: String,
    pub dir: String,
}

#[derive(Debug, Serialize)]
pub struct HostUpdateResponse {
    pub host: String,
    pub outcome: HostUpdate,
}

/// Query of `GET /hosts/summary`; no host (or an empty one) means every host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryQuery {
    pub host: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub processes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestartResponse {
    pub host: String,
    pub output: String,
}

fn bad_request(reason: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, reason.into()).into_response()
}

fn rejected(rejection: JsonRejection) -> Response {
    bad_request(rejection.body_text())
}

pub async fn report_panic<S: DocumentSession>(
    State(state): State<AppState<S>>,
    body: Result<Json<PanicReport>, JsonRejection>,
) -> Response {
    let Json(report) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    if report.host_id.trim().is_empty() {
        return bad_request("ServerID must not be empty");
    }
    if report.short.is_empty() && report.line.is_empty() && report.content.is_empty() {
        return bad_request("report carries no Short, Line or Content");
    }

    state.aggregator.record(report);
    StatusCode::ACCEPTED.into_response()
}

pub async fn panic_digest<S: DocumentSession>(
    State(state): State<AppState<S>>,
) -> Json<Vec<PanicDigest>> {
    Json(state.aggregator.build_digest(false))
}

pub async fn maintenance_status<S: DocumentSession>(
    State(state): State<AppState<S>>,
) -> Json<Maintenance> {
    Json(Maintenance {
        enabled: !state.health.liveness_checks_enabled(),
    })
}

pub async fn set_maintenance<S: DocumentSession>(
    State(state): State<AppState<S>>,
    body: Result<Json<Maintenance>, JsonRejection>,
) -> Response {
    let Json(toggle) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    state.health.set_liveness_checks(!toggle.enabled);
    Json(toggle).into_response()
}

pub async fn refresh_catalog<S: DocumentSession>(State(state): State<AppState<S>>) -> Response {
    match state.health.refresh_catalog().await {
        Ok(processes) => Json(RefreshResponse { processes }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "catalog refresh failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("catalog refresh failed: {}", e)).into_response()
        }
    }
}

pub async fn update_host<S: DocumentSession>(
    State(state): State<AppState<S>>,
    body: Result<Json<HostDescriptor>, JsonRejection>,
) -> Response {
    let Json(host) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    if host.name.trim().is_empty() {
        return bad_request("host name must not be empty");
    }
    if host.inner_ip.trim().is_empty() && !host.ssh.is_empty() {
        return bad_request("inner_ip must not be empty");
    }

    let name = host.name.clone();
    let outcome = state.catalog.apply_host_update(host);
    Json(HostUpdateResponse { host: name, outcome }).into_response()
}

pub async fn host_summary<S: DocumentSession>(
    State(state): State<AppState<S>>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    let host = query.host.as_deref().map(str::trim).filter(|h| !h.is_empty());
    match state.health.host_summary(host).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e @ SummaryError::UnknownHost(_)) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

pub async fn restart<S: DocumentSession>(
    State(state): State<AppState<S>>,
    body: Result<Json<RestartRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    if request.host.trim().is_empty() {
        return bad_request("host must not be empty");
    }

    match state.health.restart_process(&request.host, &request.dir).await {
        Ok(output) => Json(RestartResponse {
            host: request.host,
            output,
        })
        .into_response(),
        Err(e @ RestartError::InvalidDirectory(_)) => bad_request(e.to_string()),
        Err(e @ RestartError::UnknownHost(_)) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e @ RestartError::Remote { .. }) => {
            tracing::warn!(error = %e, "operator restart failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
