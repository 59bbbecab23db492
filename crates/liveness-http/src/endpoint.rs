//! Liveness endpoint handlers.

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, Router},
};
use liveness_monitor::IdleTracker;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Path polled by the orchestrator.
pub const LIVENESS_PATH: &str = "/ishealthy";

/// Trackers consulted by the endpoint. Frozen when the server starts.
#[derive(Debug, Clone)]
pub struct LivenessState {
    trackers: Arc<[Arc<IdleTracker>]>,
}

/// Outcome of one liveness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// Every tracker saw data within its threshold.
    Healthy,
    /// At least one tracker is stale; carries the largest idle time.
    Idle(Duration),
    /// Nothing to evaluate.
    NoTrackers,
}

impl LivenessState {
    /// Create state over `trackers`.
    #[must_use]
    pub fn new(trackers: Vec<Arc<IdleTracker>>) -> Self {
        Self {
            trackers: trackers.into(),
        }
    }

    /// Number of trackers consulted per request.
    #[must_use]
    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Evaluate every tracker against its own threshold.
    #[must_use]
    pub fn evaluate(&self) -> LivenessVerdict {
        if self.trackers.is_empty() {
            return LivenessVerdict::NoTrackers;
        }

        let mut stalest: Option<Duration> = None;
        for tracker in self.trackers.iter() {
            let report = tracker.check();
            if !report.is_healthy() {
                stalest = Some(stalest.map_or(report.idle, |idle| idle.max(report.idle)));
            }
        }
        stalest.map_or(LivenessVerdict::Healthy, LivenessVerdict::Idle)
    }
}

impl LivenessVerdict {
    /// HTTP status for this verdict.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Idle(_) | Self::NoTrackers => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text response body. Idle time is reported in whole seconds.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::Healthy => String::from("OK"),
            Self::Idle(idle) => format!("Pipeline has been idle for {} seconds", idle.as_secs()),
            Self::NoTrackers => String::from("No idle tracker is registered"),
        }
    }
}

/// Liveness check.
///
/// GET /ishealthy
pub async fn liveness_handler(
    Extension(state): Extension<LivenessState>,
) -> (StatusCode, String) {
    let verdict = state.evaluate();
    match verdict {
        LivenessVerdict::Healthy => {}
        LivenessVerdict::Idle(idle) => {
            warn!(idle_seconds = idle.as_secs(), "Pipeline is idle, reporting unhealthy");
        }
        LivenessVerdict::NoTrackers => {
            warn!("Liveness requested but no idle tracker is registered");
        }
    }
    (verdict.status_code(), verdict.body())
}

/// Any path other than the liveness path.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Build the endpoint router.
pub fn router(state: LivenessState) -> Router {
    Router::new()
        .route(LIVENESS_PATH, get(liveness_handler))
        .fallback(not_found)
        .layer(Extension(state))
}
