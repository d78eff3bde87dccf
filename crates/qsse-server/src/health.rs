//! Health and metrics HTTP endpoints (Axum).

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::ServerMetrics;

pub struct HealthState {
    pub metrics: ServerMetrics,
    /// Set once the gRPC listener is bound.
    pub ready: Arc<AtomicBool>,
}

pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the health router on `0.0.0.0:port` in the background.
pub async fn spawn_health_server(
    port: u16,
    state: Arc<HealthState>,
) -> anyhow::Result<JoinHandle<()>> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Metrics server listening on {}", listener.local_addr()?);
    let router = health_router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Metrics server failed: {}", e);
        }
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<Arc<HealthState>>) -> Result<&'static str, StatusCode> {
    if state.ready.load(Ordering::Relaxed) {
        Ok("OK")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> String {
    state.metrics.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state(ready: bool) -> Arc<HealthState> {
        Arc::new(HealthState {
            metrics: ServerMetrics::new(),
            ready: Arc::new(AtomicBool::new(ready)),
        })
    }

    async fn get_path(state: Arc<HealthState>, path: &str) -> (StatusCode, String) {
        let response = health_router(state)
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_is_always_ok() {
        let (status, body) = get_path(state(false), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_ready_follows_flag() {
        let (status, _) = get_path(state(false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, _) = get_path(state(true), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_served_as_text() {
        let s = state(true);
        s.metrics.call("GetCapabilities");
        let (status, body) = get_path(s, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("qsse_calls_total{method=\"GetCapabilities\"} 1"));
    }
}
