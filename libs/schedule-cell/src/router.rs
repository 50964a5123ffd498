// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::state::AppState;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppState>) -> Router {
    // Every scheduling operation is authenticated and branch-scoped
    let protected_routes = Router::new()
        .route("/templates", put(handlers::upsert_template))
        .route("/templates", get(handlers::list_templates))
        .route("/blocks", post(handlers::create_block))
        .route("/blocks", get(handlers::list_blocks))
        .route("/availability", get(handlers::get_availability))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
