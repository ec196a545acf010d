//! HTTP API for the rebalancing dashboard
//!
//! This module provides a JSON API for:
//! - Inspecting the node's channels and their balance ratios
//! - Building a rebalance selection step by step
//! - Starting and cancelling a rebalance
//! - Reading recent success/error notifications

use crate::{RebalanceError, RebalanceResult, RebalancerApp};
use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::info;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

mod channels;
mod health;
mod limiter;
mod notifications;
mod rebalance;

pub use channels::*;
pub use health::*;
pub use limiter::RequestLimiter;
pub use notifications::*;
pub use rebalance::*;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// The rebalancer application
    pub app: RebalancerApp,
}

/// Build the API router
pub fn build_router(app: RebalancerApp, limiter: RequestLimiter) -> Router {
    let api = app.config.api.clone();
    let state = ApiState { app };

    let router = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Node channels
        .route("/v1/node/channels", get(list_channels))
        // Rebalance workflow
        .route("/v1/rebalance", get(get_session).delete(reset_session))
        .route("/v1/rebalance/refresh", post(refresh_session))
        .route(
            "/v1/rebalance/outgoing",
            post(choose_outgoing).delete(reset_outgoing),
        )
        .route(
            "/v1/rebalance/incoming",
            post(choose_incoming).delete(reset_incoming),
        )
        .route("/v1/rebalance/amount", put(set_amount))
        .route("/v1/rebalance/max-fee", put(set_max_fee))
        .route("/v1/rebalance/start", post(start_rebalance))
        .route("/v1/rebalance/cancel", post(cancel_rebalance))
        // Notifications
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/stream", get(stream_notifications))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            limiter::limit_requests,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(api.timeout_seconds)))
        .with_state(state);

    if api.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Start the HTTP API server with graceful shutdown
pub async fn serve_with_shutdown(
    app: RebalancerApp,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = app
        .config
        .api
        .bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let limiter = RequestLimiter::new(app.config.api.rate_limit_per_minute);
    let router = build_router(app, limiter.clone());

    let pruning = tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.prune();
        }
    });

    info!("Starting HTTP API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
        info!("Received shutdown signal, stopping API server...");
    })
    .await?;

    pruning.abort();
    info!("API server stopped gracefully");
    Ok(())
}

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (only present if success is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (only present if success is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Convert RebalanceError to HTTP status code
pub fn error_to_status_code(err: &RebalanceError) -> StatusCode {
    match err {
        RebalanceError::Validation(_) => StatusCode::BAD_REQUEST,
        RebalanceError::UnknownChannel(_) => StatusCode::BAD_REQUEST,
        RebalanceError::Rejected(_) => StatusCode::CONFLICT,
        RebalanceError::NoActiveRun => StatusCode::CONFLICT,
        RebalanceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RebalanceError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        RebalanceError::Node(_) => StatusCode::BAD_GATEWAY,
        RebalanceError::Rebalance(_) => StatusCode::BAD_GATEWAY,
        RebalanceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wrap a result in the response envelope
pub fn respond<T: Serialize>(result: RebalanceResult<T>) -> (StatusCode, Json<ApiResponse<T>>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => (error_to_status_code(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::node::mock::{channel, MockNode, Script};
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(node: MockNode, config: Config) -> RebalancerApp {
        RebalancerApp::with_node(Arc::new(config), Arc::new(node))
    }

    fn router(app: RebalancerApp) -> Router {
        let limiter = RequestLimiter::new(app.config.api.rate_limit_per_minute);
        build_router(app, limiter)
    }

    async fn ready_app(script: Script) -> RebalancerApp {
        let node = MockNode::new(vec![channel("A", 9_000, 1_000), channel("B", 1_000, 9_000)])
            .with_script(script);
        let app = app_with(node, Config::default());
        app.session.refresh().await;
        app
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[test]
    fn test_error_status_codes() {
        use crate::balance::Rejected;

        assert_eq!(
            error_to_status_code(&RebalanceError::UnknownChannel("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_to_status_code(&RebalanceError::Rejected(Rejected::Blocked)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_to_status_code(&RebalanceError::NoActiveRun),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_to_status_code(&RebalanceError::Unavailable("old".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_health() {
        let router = router(ready_app(Script::Route { fee_sats: 1 }).await);

        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["rebalance_available"], true);
    }

    #[tokio::test]
    async fn test_channels_carry_ratio() {
        let router = router(ready_app(Script::Route { fee_sats: 1 }).await);

        let (status, body) = call(&router, Method::GET, "/v1/node/channels", None).await;
        assert_eq!(status, StatusCode::OK);
        let channels = body["data"]["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0]["id"], "A");
        assert_eq!(channels[0]["balance_ratio"], 90);
        assert_eq!(channels[0]["local_display"], "9,000 sats");
    }

    #[tokio::test]
    async fn test_full_rebalance_flow() {
        let app = ready_app(Script::Route { fee_sats: 3 }).await;
        let router = router(app.clone());

        let (_, body) = call(&router, Method::GET, "/v1/rebalance", None).await;
        assert_eq!(body["data"]["state"], "empty");
        assert_eq!(body["data"]["outgoing_candidates"][0]["id"], "B");

        let (status, body) = call(
            &router,
            Method::POST,
            "/v1/rebalance/outgoing",
            Some(json!({ "channel_id": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "outgoing_chosen");
        assert_eq!(body["data"]["incoming_candidates"][0]["id"], "B");

        call(
            &router,
            Method::POST,
            "/v1/rebalance/incoming",
            Some(json!({ "channel_id": "B" })),
        )
        .await;
        call(
            &router,
            Method::PUT,
            "/v1/rebalance/max-fee",
            Some(json!({ "max_fee": 10 })),
        )
        .await;
        let (_, body) = call(
            &router,
            Method::PUT,
            "/v1/rebalance/amount",
            Some(json!({ "amount": 500 })),
        )
        .await;
        assert_eq!(body["data"]["state"], "ready");

        let (status, body) = call(&router, Method::POST, "/v1/rebalance/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["amount_sats"], 500);
        assert_eq!(body["data"]["max_fee_sats"], 10);

        let outcome = app.session.wait_for_run().await.unwrap();
        assert!(matches!(
            outcome,
            crate::balance::RunOutcome::Success { fee_sats: 3, .. }
        ));

        let (_, body) = call(&router, Method::GET, "/v1/rebalance", None).await;
        assert_eq!(body["data"]["state"], "empty");
        assert_eq!(body["data"]["run"]["status"]["state"], "finished");
        assert_eq!(body["data"]["run"]["status"]["outcome"]["result"], "success");

        let (_, body) = call(&router, Method::GET, "/v1/notifications", None).await;
        assert_eq!(body["data"][0]["level"], "success");
    }

    #[tokio::test]
    async fn test_rejections_map_to_status() {
        let router = router(ready_app(Script::Route { fee_sats: 1 }).await);

        let (status, body) = call(
            &router,
            Method::POST,
            "/v1/rebalance/incoming",
            Some(json!({ "channel_id": "B" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, _) = call(
            &router,
            Method::POST,
            "/v1/rebalance/outgoing",
            Some(json!({ "channel_id": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &router,
            Method::POST,
            "/v1/rebalance/outgoing",
            Some(json!({ "channel_id": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, Method::POST, "/v1/rebalance/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&router, Method::POST, "/v1/rebalance/cancel", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_over_http() {
        let app = ready_app(Script::Hang).await;
        let router = router(app.clone());

        for (method, uri, body) in [
            (Method::POST, "/v1/rebalance/outgoing", json!({ "channel_id": "A" })),
            (Method::POST, "/v1/rebalance/incoming", json!({ "channel_id": "B" })),
            (Method::PUT, "/v1/rebalance/amount", json!({ "amount": 500 })),
        ] {
            let (status, _) = call(&router, method, uri, Some(body)).await;
            assert_eq!(status, StatusCode::OK);
        }
        call(&router, Method::POST, "/v1/rebalance/start", None).await;

        let (status, _) = call(&router, Method::DELETE, "/v1/rebalance", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&router, Method::POST, "/v1/rebalance/cancel", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"]["state"], "cancelling");

        assert_eq!(
            app.session.wait_for_run().await,
            Some(crate::balance::RunOutcome::Cancelled)
        );
        let (_, body) = call(&router, Method::GET, "/v1/notifications", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_old_node_is_unavailable() {
        let node = MockNode::new(vec![channel("A", 1, 1)]).with_version("0.8.0-beta");
        let app = app_with(node, Config::default());
        app.session.refresh().await;
        let router = router(app);

        let (status, body) = call(
            &router,
            Method::POST,
            "/v1/rebalance/outgoing",
            Some(json!({ "channel_id": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("0.9.0"));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = Config::default();
        config.api.rate_limit_per_minute = 2;
        let router = router(app_with(MockNode::new(vec![]), config));

        assert_eq!(call(&router, Method::GET, "/health", None).await.0, StatusCode::OK);
        assert_eq!(call(&router, Method::GET, "/health", None).await.0, StatusCode::OK);
        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);

        assert_eq!(
            call(&router, Method::GET, "/v1/notifications", None).await.0,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_malformed_body_uses_envelope() {
        let router = router(ready_app(Script::Route { fee_sats: 1 }).await);

        let (status, body) = call(
            &router,
            Method::PUT,
            "/v1/rebalance/amount",
            Some(json!({ "amount": -5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Validation error"));

        let (status, body) = call(
            &router,
            Method::POST,
            "/v1/rebalance/outgoing",
            Some(json!({ "channel": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_notification_stream() {
        use crate::notify::Notifier;
        use tokio_stream::StreamExt;

        let app = ready_app(Script::Route { fee_sats: 1 }).await;
        let router = router(app.clone());

        let request = Request::builder()
            .uri("/v1/notifications/stream")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        app.notifications.notify_error("Error balancing channel: no_route");

        let mut frames = response.into_body().into_data_stream();
        let frame = frames.next().await.unwrap().unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.contains("event: notification"));
        assert!(text.contains("no_route"));
    }
}
