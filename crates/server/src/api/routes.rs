use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/config", get(handlers::get_config))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mediarr_core::Config;
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(Arc::new(AppState::new(Config::default(), None, None)))
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_without_pipeline() {
        let (status, body) = get_body(router(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["scheduler"].is_null());
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_prometheus_text() {
        let (status, body) = get_body(router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE"));
        assert!(body.contains("mediarr_http_requests_in_flight"));
    }

    #[tokio::test]
    async fn test_config_is_sanitized() {
        let (status, body) = get_body(router(), "/api/v1/config").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["server"]["port"], 8989);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (status, _) = get_body(router(), "/api/v1/nothing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
