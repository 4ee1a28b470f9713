//! Create mount API endpoint

use std::path::PathBuf;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::Request;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{status_for, MountEntry};
use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};
use crate::server::{MountInfo, ServerError};
use crate::ServiceState;

/// Request to mount a client directory at a mount point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMountRequest {
    pub mount_point: String,
    pub client_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMountResponse {
    pub mount: MountEntry,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Json(req): Json<CreateMountRequest>,
) -> Result<impl IntoResponse, CreateMountError> {
    let mount = state
        .server()
        .mount(MountInfo {
            mount_point: req.mount_point,
            client_dir: req.client_dir,
        })
        .await?;

    Ok((
        http::StatusCode::CREATED,
        Json(CreateMountResponse {
            mount: MountEntry::from(mount.as_ref()),
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum CreateMountError {
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl IntoResponse for CreateMountError {
    fn into_response(self) -> Response {
        match self {
            CreateMountError::Server(e) => (status_for(&e), e.to_string()).into_response(),
        }
    }
}

impl ApiRequest for CreateMountRequest {
    type Response = CreateMountResponse;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        client::post_json(base_url, "/api/v0/mounts", &self)
    }
}
