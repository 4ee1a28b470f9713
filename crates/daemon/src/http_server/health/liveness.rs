use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::Request;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};

/// Request type for the liveness probe endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivezRequest {}

/// Response type for the liveness probe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivezResponse {
    pub status: String,
}

impl ApiRequest for LivezRequest {
    type Response = LivezResponse;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        client::get(base_url, "/_status/livez")
    }
}

/// Always answers while the daemon is accepting requests. Used by the CLI
/// and external supervisors to tell whether the daemon is up at all.
#[tracing::instrument]
pub async fn handler() -> Response {
    let msg = serde_json::json!({"status": "ok"});
    (StatusCode::OK, Json(msg)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_direct() {
        let response = handler().await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&body[..], b"{\"status\":\"ok\"}");
    }
}
