//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Where result documents are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultBackend {
    /// Local directory (`RESULTS_DIR`)
    Local,
    /// S3-compatible bucket (`S3_*` variables)
    S3,
}

impl ResultBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Some(Self::Local),
            "s3" | "r2" => Some(Self::S3),
            _ => None,
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Submissions per second allowed per client IP
    pub rate_limit_rps: u32,
    /// Max request body size (uploads)
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Directory uploaded videos are written to
    pub upload_dir: PathBuf,
    /// Directory for the local result backend
    pub results_dir: PathBuf,
    /// Result store backend
    pub result_backend: ResultBackend,
    /// Non-terminal jobs allowed before submissions are refused (0 = unlimited)
    pub max_pending_jobs: usize,
    /// How long finished jobs stay pollable
    pub job_retention: Duration,
    /// Interval between retention sweeps
    pub retention_sweep_interval: Duration,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 5,
            max_body_size: 512 * 1024 * 1024, // 512MB
            environment: "development".to_string(),
            upload_dir: PathBuf::from("uploads"),
            results_dir: PathBuf::from("results"),
            result_backend: ResultBackend::Local,
            max_pending_jobs: 100,
            job_retention: Duration::from_secs(24 * 3600),
            retention_sweep_interval: Duration::from_secs(300),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            results_dir: std::env::var("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            result_backend: std::env::var("RESULT_BACKEND")
                .ok()
                .and_then(|s| ResultBackend::parse(&s))
                .unwrap_or(defaults.result_backend),
            max_pending_jobs: std::env::var("MAX_PENDING_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_pending_jobs),
            job_retention: std::env::var("JOB_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_retention),
            retention_sweep_interval: std::env::var("RETENTION_SWEEP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention_sweep_interval),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
