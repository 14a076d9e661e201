use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, http::HeaderValue, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::ai::{GenerationBackend, HttpBackend, UnconfiguredBackend};
use crate::api::{self, AppState, SharedState};
use crate::config::Config;
use crate::room::ws;

/// Build the full application router: REST API plus the websocket gateway.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Start the devroom server.
pub async fn start_server(config: Config) -> Result<()> {
    let backend: Arc<dyn GenerationBackend> = match HttpBackend::new(&config.ai) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::warn!("generation backend disabled: {e}");
            Arc::new(UnconfiguredBackend)
        }
    };
    if config.secret_key.is_none() {
        tracing::warn!("SECRET_KEY is not set; every presented credential will be rejected");
    }

    let dev_mode = config.dev_mode;
    let port = config.port;
    let client_url = config.client_url.clone();

    let state = Arc::new(AppState::new(config, backend));
    let mut app = build_router(state);

    let cors = match &client_url {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CLIENT_URL '{origin}'"))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };
    app = app.layer(cors);

    let host = if dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    println!("devroom running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    println!("\nShutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_router() -> Router {
        let config = Config {
            secret_key: Some("test-secret".to_string()),
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config, Arc::new(UnconfiguredBackend)));
        build_router(state)
    }

    #[tokio::test]
    async fn health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_routes_mounted() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/projects/all")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        // Unauthorized, not 404: the route exists and the gate answered.
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_route_is_mounted() {
        // A plain GET is not an upgradable request; the route must still
        // exist (anything but 404 proves the gateway is wired in).
        let app = test_router();
        let uri = format!("/ws?projectId={}", Uuid::new_v4());
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_routes_fall_through_to_404() {
        let app = test_router();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
