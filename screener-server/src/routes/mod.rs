pub mod data;
pub mod pipeline;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(data::routes())
        .merge(pipeline::routes())
}
