//! Service counters API endpoint

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use http::Request;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_server::api::client::{self, ApiBody, ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub counters: BTreeMap<String, i64>,
    pub mounts: usize,
    pub live_backing_stores: usize,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> impl IntoResponse {
    let server = state.server();
    (
        http::StatusCode::OK,
        Json(StatsResponse {
            counters: server.stats().snapshot(),
            mounts: server.mount_count(),
            live_backing_stores: server.backing_stores().live_count(),
        }),
    )
}

impl ApiRequest for StatsRequest {
    type Response = StatsResponse;

    fn build_request(self, base_url: &Url) -> Result<Request<ApiBody>, ApiError> {
        client::get(base_url, "/api/v0/stats")
    }
}
