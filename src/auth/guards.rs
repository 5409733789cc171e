use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::services::{require_admin, resolve_identity, CurrentUser};
use crate::{error::AppError, state::AppState};

/// Resolves the bearer token to a stored user and attaches [`CurrentUser`]
/// to the request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let current = resolve_identity(&state, header.as_deref()).await?;
    tracing::Span::current().record("user_id", current.id);
    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}

/// Must run after [`authenticate`].
pub async fn admin_only(req: Request, next: Next) -> Result<Response, AppError> {
    require_admin(req.extensions().get::<CurrentUser>())?;
    Ok(next.run(req).await)
}
