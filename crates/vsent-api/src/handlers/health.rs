//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Video sentiment API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckStatus,
    pub executor: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<JobCounts>,
}

#[derive(Serialize)]
pub struct JobCounts {
    pub tracked: usize,
    pub active: usize,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            backend: None,
            error: None,
            latency_ms: None,
            jobs: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            status: "error".to_string(),
            ..Self::ok()
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks result-store connectivity and that the executor accepts work.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let storage_check = {
        let start = Instant::now();
        match state.service.check_store().await {
            Ok(backend) => CheckStatus {
                backend: Some(backend.to_string()),
                latency_ms: Some(start.elapsed().as_millis() as u64),
                ..CheckStatus::ok()
            },
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let (tracked, active) = state.service.job_counts();
    let executor_check = if state.service.is_shutting_down() {
        CheckStatus::error("shutting down")
    } else {
        CheckStatus {
            jobs: Some(JobCounts { tracked, active }),
            ..CheckStatus::ok()
        }
    };

    let all_ok = storage_check.is_ok() && executor_check.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            storage: storage_check,
            executor: executor_check,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
