//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::services::ServiceError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vsent_storage::StorageError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, ApiError::Internal(_) | ApiError::Storage(_))
    }

    /// Client-facing message, without the variant prefix.
    fn detail(&self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::RateLimited => "Rate limit exceeded. Please try again later.".to_string(),
            ApiError::Storage(e) => format!("Error retrieving results: {}", e),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(_) => ApiError::not_found("Job not found"),
            ServiceError::NotReady { .. } => ApiError::Conflict("Processing not completed yet".to_string()),
            ServiceError::JobFailed { detail, .. } => {
                ApiError::Unprocessable(format!("Job failed: {}", detail))
            }
            ServiceError::AlreadyFinished { status, .. } => {
                ApiError::Conflict(format!("Job already {}", status))
            }
            ServiceError::Starting(_) => {
                ApiError::Unavailable("Job is starting, retry shortly".to_string())
            }
            e @ ServiceError::Overloaded { .. } => ApiError::Unavailable(e.to_string()),
            e @ ServiceError::Unavailable(_) => ApiError::Unavailable(e.to_string()),
            ServiceError::Store(e) => ApiError::Storage(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.detail()
        };

        let body = Json(ErrorResponse { detail });
        match self {
            ApiError::RateLimited | ApiError::Unavailable(_) => {
                (status, [(header::RETRY_AFTER, "1")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsent_models::{JobId, JobStatus};

    #[test]
    fn test_service_error_mapping() {
        let id = JobId::from_string("abc");
        let cases = [
            (ServiceError::NotFound(id.clone()), StatusCode::NOT_FOUND),
            (
                ServiceError::NotReady {
                    job_id: id.clone(),
                    status: JobStatus::Processing,
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::JobFailed {
                    job_id: id.clone(),
                    detail: "boom".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::AlreadyFinished {
                    job_id: id.clone(),
                    status: JobStatus::Completed,
                },
                StatusCode::CONFLICT,
            ),
            (ServiceError::Starting(id.clone()), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Overloaded { limit: 3 }, StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::Store(vsent_storage::StorageError::not_found("k")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_not_ready_detail() {
        let err = ApiError::from(ServiceError::NotReady {
            job_id: JobId::new(),
            status: JobStatus::Received,
        });
        assert_eq!(err.detail(), "Processing not completed yet");
    }

    #[test]
    fn test_starting_job_is_retryable() {
        let response = ApiError::from(ServiceError::Starting(JobId::new())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
