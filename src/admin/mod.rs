use axum::{middleware, Router};

use crate::{
    auth::guards::{admin_only, authenticate},
    state::AppState,
};

mod dto;
pub mod handlers;

/// Every admin route passes `authenticate`, then `admin_only`.
pub fn router(state: AppState) -> Router<AppState> {
    handlers::user_routes()
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}
