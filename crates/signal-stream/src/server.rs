//! HTTP 라우터.
//!
//! - `GET <ws_path>`: WebSocket 업그레이드
//! - `GET /health`: 엔진 상태 (JSON)
//! - `GET /metrics`: Prometheus 메트릭 (레코더가 설치된 경우)

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::SharedEngine;
use crate::websocket::websocket_handler;

/// 헬스 체크 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" | "shutting_down"
    pub status: String,
    pub version: String,
    /// 엔진 가동 시간(초)
    pub uptime_secs: u64,
    /// 현재 시간 (ISO 8601)
    pub timestamp: String,
    /// 활성 연결 수
    pub connections: usize,
    /// 토픽별 구독자 수
    pub topics: BTreeMap<String, usize>,
}

async fn health(State(engine): State<SharedEngine>) -> Json<HealthResponse> {
    let status = if engine.is_shutting_down() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: engine.uptime_secs(),
        timestamp: Utc::now().to_rfc3339(),
        connections: engine.registry().total_connections(),
        topics: engine.registry().topic_counts(),
    })
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// CORS 레이어. `CORS_ORIGINS`(쉼표 구분)가 없으면 모든 origin을 허용합니다.
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// 애플리케이션 라우터를 생성합니다.
pub fn create_router(engine: SharedEngine, ws_path: &str, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route(ws_path, get(websocket_handler))
        .route("/health", get(health))
        .with_state(engine);

    if let Some(handle) = metrics {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)).with_state(handle));
    }

    router.layer(TraceLayer::new_for_http()).layer(cors_layer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StreamEngine;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use signal_core::StreamConfig;
    use signal_data::MemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let engine = StreamEngine::new(StreamConfig::default(), Arc::new(MemoryStore::with_defaults())).shared();
        create_router(engine, "/ws/trading", None)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.connections, 0);
        assert!(health.topics.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_route_absent_without_recorder() {
        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_path_requires_upgrade() {
        let response = router()
            .oneshot(Request::builder().uri("/ws/trading").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
