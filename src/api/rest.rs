// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// `/api/sensexTicks` is the chart feed and never fails: a stale-but-valid
// book is always served, whatever state the upstream is in. No endpoint
// mutates state.
//
// CORS is permissive; the chart front-end is served from another origin.
// =============================================================================

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::types::ApiEnvelope;

/// Plain-text body of the liveness route.
pub const LIVENESS_MESSAGE: &str = "Sensex tick server is running";

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(liveness))
        .route("/api/sensexTicks", get(sensex_ticks))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Liveness
// =============================================================================

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

// =============================================================================
// Tick feed
// =============================================================================

async fn sensex_ticks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiEnvelope::success(state.tick_store.snapshot()))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    buckets: usize,
    ticks: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
        buckets: state.tick_store.bucket_count(),
        ticks: state.tick_store.tick_count(),
    })
}

// =============================================================================
// Status
// =============================================================================

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_status())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use crate::types::Tick;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(RuntimeConfig::default()))
    }

    async fn get_body(state: Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = get_body(state, uri).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn liveness_is_plain_text() {
        let (status, body) = get_body(state(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap(), LIVENESS_MESSAGE);
    }

    #[tokio::test]
    async fn empty_store_still_succeeds() {
        let (status, json) = get_json(state(), "/api/sensexTicks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"], 1);
        assert_eq!(json["resultMessage"], "Success");
        assert_eq!(json["resultData"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn ticks_are_served_per_expiry_in_order() {
        let state = state();
        for (time, ltp) in [("09:16:00", 81000.5), ("09:17:00", 81010.0)] {
            state.tick_store.record(Tick {
                time: time.into(),
                ltp,
                prev_close: 80900.0,
                expiry: "27-06-2024".into(),
            });
        }

        let (_, json) = get_json(state, "/api/sensexTicks").await;
        let bucket = json["resultData"]["27-06-2024"].as_array().unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0]["time"], "09:16:00");
        assert_eq!(bucket[0]["ltp"], 81000.5);
        assert_eq!(bucket[0]["prevClose"], 80900.0);
        assert_eq!(bucket[1]["time"], "09:17:00");
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let state = state();
        state.tick_store.record(Tick {
            time: "09:16:00".into(),
            ltp: 1.0,
            prev_close: 0.0,
            expiry: "27-06-2024".into(),
        });

        let (status, json) = get_json(state, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["buckets"], 1);
        assert_eq!(json["ticks"], 1);
    }

    #[tokio::test]
    async fn status_includes_errors() {
        let state = state();
        state.push_error("upstream returned 502".into());

        let (status, json) = get_json(state, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["recent_errors"][0]["message"], "upstream returned 502");
        assert_eq!(json["poll_interval_secs"], 60);
        assert!(json["last_cycle"].is_null());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = get_body(state(), "/api/v1/state").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
