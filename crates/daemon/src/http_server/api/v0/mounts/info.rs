//! Get mount API endpoint

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{Method, Request};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{status_for, MountEntry};
use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};
use crate::server::ServerError;
use crate::ServiceState;

/// Request to look up a live mount by its mount point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMountRequest {
    pub mount_point: String,
}

/// Response containing the mount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMountResponse {
    pub mount: MountEntry,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Query(req): Query<GetMountRequest>,
) -> Result<impl IntoResponse, GetMountError> {
    let mount = state.server().get_mount(&req.mount_point)?;

    Ok((
        http::StatusCode::OK,
        Json(GetMountResponse {
            mount: MountEntry::from(mount.as_ref()),
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum GetMountError {
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl IntoResponse for GetMountError {
    fn into_response(self) -> Response {
        match self {
            GetMountError::Server(e) => (status_for(&e), e.to_string()).into_response(),
        }
    }
}

impl ApiRequest for GetMountRequest {
    type Response = GetMountResponse;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        let mut url = base_url.join("/api/v0/mounts/info")?;
        url.query_pairs_mut()
            .append_pair("mount_point", &self.mount_point);
        client::request(Method::GET, &url, None)
    }
}
