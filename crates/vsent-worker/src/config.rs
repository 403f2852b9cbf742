//! Worker configuration.

use std::time::Duration;

/// Simulated duration of each mock analysis phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDelays {
    pub extract_audio: Duration,
    pub transcribe: Duration,
    pub analyze_sentiment: Duration,
}

impl PhaseDelays {
    /// Same delay for every phase.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            extract_audio: delay,
            transcribe: delay,
            analyze_sentiment: delay,
        }
    }

    /// No delays at all (tests).
    pub fn none() -> Self {
        Self::uniform(Duration::ZERO)
    }
}

impl Default for PhaseDelays {
    fn default() -> Self {
        Self {
            extract_audio: Duration::from_secs(2),
            transcribe: Duration::from_secs(3),
            analyze_sentiment: Duration::from_secs(2),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrently running jobs; others wait in `Received`
    pub max_concurrent_jobs: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Mock workload phase delays
    pub phase_delays: PhaseDelays,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            job_timeout: Duration::from_secs(600), // 10 minutes
            shutdown_timeout: Duration::from_secs(30),
            phase_delays: PhaseDelays::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            // A single override applies to every phase.
            phase_delays: std::env::var("WORKER_PHASE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|ms| PhaseDelays::uniform(Duration::from_millis(ms)))
                .unwrap_or_default(),
        }
    }

    /// Config for tests: no phase delays, short timeouts.
    pub fn for_tests() -> Self {
        Self {
            max_concurrent_jobs: 4,
            job_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            phase_delays: PhaseDelays::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phase_delays() {
        let delays = PhaseDelays::default();
        assert_eq!(delays.extract_audio, Duration::from_secs(2));
        assert_eq!(delays.transcribe, Duration::from_secs(3));
        assert_eq!(delays.analyze_sentiment, Duration::from_secs(2));
    }

    #[test]
    fn test_uniform_delays() {
        let delays = PhaseDelays::uniform(Duration::from_millis(5));
        assert_eq!(delays.transcribe, Duration::from_millis(5));
        assert_eq!(PhaseDelays::none().extract_audio, Duration::ZERO);
    }
}
