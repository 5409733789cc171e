use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, DebugUsersResponse, LoginRequest, RegisterRequest},
        services,
    },
    error::AppError,
    state::AppState,
    users::UserSummary,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/debug/users", get(debug_users))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let out = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            user: out.user,
            token: out.token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let out = services::login(&state, payload).await?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        user: out.user,
        token: out.token,
    }))
}

/// Development aid; hidden in production.
#[instrument(skip(state))]
pub async fn debug_users(
    State(state): State<AppState>,
) -> Result<Json<DebugUsersResponse>, AppError> {
    if state.config.production {
        return Err(AppError::not_found("Not found"));
    }
    let users: Vec<UserSummary> = state
        .users
        .list_all()
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect();
    Ok(Json(DebugUsersResponse {
        message: "All users (debug)",
        database: state.backend.label(),
        count: users.len(),
        users,
    }))
}
