use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::services::CurrentUser;
use crate::error::AppError;

/// Hands the identity attached by the `authenticate` guard to a handler.
#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
