use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{Request, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use common::version::BuildInfo;

use crate::build_info;
use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};

/// Request type for the version endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionRequest {}

impl ApiRequest for VersionRequest {
    type Response = BuildInfo;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        client::get(base_url, "/_status/version")
    }
}

#[tracing::instrument]
pub async fn handler() -> Response {
    (StatusCode::OK, Json(build_info())).into_response()
}
