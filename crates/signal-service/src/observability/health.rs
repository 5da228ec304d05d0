//! Health endpoints.
//!
//! - `GET /health` - liveness (process is running)
//! - `GET /ready` - readiness (discovery backend connected, not draining)
//!
//! `/metrics` is merged in by the binary from the Prometheus handle.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness and readiness flags.
#[derive(Debug)]
pub struct HealthState {
    live: AtomicBool,
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Live, not yet ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Stop accepting traffic (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Router serving `/health` and `/ready`.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status_of(router: Router, path: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn test_health_state_transitions() {
        let state = HealthState::new();
        assert!(state.is_live());
        assert!(!state.is_ready(), "Should not be ready by default");

        state.set_ready();
        assert!(state.is_ready());

        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let router = health_router(Arc::new(HealthState::new()));
        assert_eq!(status_of(router, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_endpoint_follows_state() {
        let state = Arc::new(HealthState::new());

        let router = health_router(Arc::clone(&state));
        assert_eq!(
            status_of(router, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.set_ready();
        let router = health_router(Arc::clone(&state));
        assert_eq!(status_of(router, "/ready").await, StatusCode::OK);
    }
}
