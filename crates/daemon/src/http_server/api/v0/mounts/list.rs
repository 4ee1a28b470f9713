//! List mounts API endpoint

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use http::Request;
use serde::{Deserialize, Serialize};
use url::Url;

use super::MountEntry;
use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListMountsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMountsResponse {
    pub mounts: Vec<MountEntry>,
}

pub async fn handler(State(state): State<ServiceState>) -> impl IntoResponse {
    let mut mounts: Vec<MountEntry> = state
        .server()
        .get_mount_points()
        .iter()
        .map(|mount| MountEntry::from(mount.as_ref()))
        .collect();
    mounts.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));

    (http::StatusCode::OK, Json(ListMountsResponse { mounts }))
}

impl ApiRequest for ListMountsRequest {
    type Response = ListMountsResponse;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        client::get(base_url, "/api/v0/mounts")
    }
}
