//! Mount management API endpoints
//!
//! - `GET /` lists live mounts, `POST /` mounts a client directory
//! - `GET /info?mount_point=` looks one mount up
//! - `POST /unmount` unmounts and waits for teardown

use std::path::PathBuf;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::server::{Mount, ServerError};
use crate::ServiceState;

mod create;
mod info;
mod list;
mod unmount;

// Re-export request/response types for use by CLI and other clients
pub use create::{CreateMountError, CreateMountRequest, CreateMountResponse};
pub use info::{GetMountError, GetMountRequest, GetMountResponse};
pub use list::{ListMountsRequest, ListMountsResponse};
pub use unmount::{UnmountError, UnmountRequest, UnmountResponse};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(create::handler).get(list::handler))
        .route("/info", get(info::handler))
        .route("/unmount", post(unmount::handler))
        .with_state(state)
}

/// A live mount as reported over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub mount_point: String,
    pub client_dir: PathBuf,
    pub repo_type: String,
    pub repo_source: String,
    pub stage: String,
    pub inodes_loaded: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Mount> for MountEntry {
    fn from(mount: &Mount) -> Self {
        let config = mount.config();
        Self {
            mount_point: mount.path().to_string(),
            client_dir: config.client_dir.clone(),
            repo_type: config.repo_type.clone(),
            repo_source: config.repo_source.clone(),
            stage: mount.stage().as_str().to_string(),
            inodes_loaded: mount.inodes().len(),
            created_at: mount.created_at(),
        }
    }
}

fn status_for(error: &ServerError) -> StatusCode {
    if error.is_not_mounted() {
        StatusCode::NOT_FOUND
    } else if error.is_already_mounted() {
        StatusCode::CONFLICT
    } else if error.is_invalid_request() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
