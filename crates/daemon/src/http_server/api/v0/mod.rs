use axum::routing::get;
use axum::Router;

use crate::ServiceState;

pub mod mounts;
pub mod stats;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/mounts", mounts::router(state.clone()))
        .route("/stats", get(stats::handler))
        .with_state(state)
}
