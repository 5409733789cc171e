use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod guards;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;

pub use services::CurrentUser;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
