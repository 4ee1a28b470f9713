use std::future::Future;

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::process::Listener;
use crate::ServiceState;

pub mod api;
pub mod health;

const STATUS_PREFIX: &str = "/_status";
const API_PREFIX: &str = "/api";

/// Requests are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route(
            &format!("{}/livez", STATUS_PREFIX),
            get(health::liveness::handler),
        )
        .route(
            &format!("{}/version", STATUS_PREFIX),
            get(health::version::handler),
        )
        .nest(API_PREFIX, api::router(state.clone()))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
}

/// Serve the API on `listener` until `shutdown` resolves, then drain
/// in-flight requests.
pub async fn serve<F>(listener: Listener, state: ServiceState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    match listener {
        Listener::Unix(listener) => {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        }
        Listener::Tcp(listener) => {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::server::MountServer;
    use crate::ServiceConfig;

    fn state(dir: &tempfile::TempDir) -> ServiceState {
        let mut config = ServiceConfig::new(dir.path());
        config.etc_dir = dir.path().join("etc");
        config.user_config_path = dir.path().join("arborrc");
        config.num_worker_threads = 1;
        ServiceState::new(MountServer::builder(config).build().unwrap())
    }

    #[tokio::test]
    async fn test_routes() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = router(state(&dir));

        for (uri, expected) in [
            ("/_status/livez", StatusCode::OK),
            ("/_status/version", StatusCode::OK),
            ("/api/v0/mounts", StatusCode::OK),
            ("/api/v0/stats", StatusCode::OK),
            ("/api/v0/mounts/info?mount_point=/m1", StatusCode::NOT_FOUND),
            ("/api/v0/mounts/info", StatusCode::BAD_REQUEST),
            ("/api/v1/mounts", StatusCode::NOT_FOUND),
        ] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "GET {uri}");
        }
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = router(state(&dir));

        let body = vec![b' '; MAX_BODY_BYTES + 1];
        let response = app
            .oneshot(
                Request::post("/api/v0/mounts/unmount")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .header(http::header::CONTENT_LENGTH, body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
