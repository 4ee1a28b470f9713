//! Unmount API endpoint

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::Request;
use serde::{Deserialize, Serialize};
use url::Url;

use super::status_for;
use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};
use crate::server::ServerError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmountRequest {
    pub mount_point: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmountResponse {
    pub unmounted: bool,
}

/// Returns once the mount is fully torn down.
pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<UnmountRequest>,
) -> Result<impl IntoResponse, UnmountError> {
    state.server().unmount(&req.mount_point).await?;

    Ok((
        http::StatusCode::OK,
        Json(UnmountResponse { unmounted: true }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum UnmountError {
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl IntoResponse for UnmountError {
    fn into_response(self) -> Response {
        match self {
            UnmountError::Server(e) => (status_for(&e), e.to_string()).into_response(),
        }
    }
}

impl ApiRequest for UnmountRequest {
    type Response = UnmountResponse;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        client::post_json(base_url, "/api/v0/mounts/unmount", &self)
    }
}
