use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{
    ChangeRoleRequest, CreateUserRequest, MessageResponse, UserListResponse, UserResponse,
};
use crate::{
    auth::{
        services::{create_user as create_account, credentials, parse_role},
        CurrentUser,
    },
    error::AppError,
    state::AppState,
    users::{Role, UserId, UserSummary},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/:id", delete(delete_user))
        .route("/admin/users/:id/role", patch(change_role))
}

fn user_id(path: Result<Path<UserId>, PathRejection>) -> Result<UserId, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::bad_request("Invalid user ID"))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>, AppError> {
    let users: Vec<UserSummary> = state
        .users
        .list_all()
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect();
    Ok(Json(UserListResponse {
        success: true,
        count: users.len(),
        users,
    }))
}

#[instrument(skip(state, payload), fields(admin_id = admin.id))]
pub async fn create_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let Json(payload) = payload?;
    let (email, password) = credentials(payload.email, payload.password)?;
    let role = parse_role(payload.role.as_deref())?;

    let user = create_account(&state, email, &password, payload.name, role).await?;
    info!(user_id = user.id, role = %user.role, "user created by admin");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            message: "User created successfully",
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, path), fields(admin_id = admin.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = user_id(path)?;
    if id == admin.id {
        warn!("admin attempted to delete own account");
        return Err(AppError::bad_request("Cannot delete your own account"));
    }
    if !state.users.delete(id).await? {
        return Err(AppError::not_found("User not found"));
    }
    // Outstanding tokens for this user now fail at the store lookup.
    info!(user_id = id, "user deleted");
    Ok(Json(MessageResponse {
        success: true,
        message: "User deleted successfully",
    }))
}

#[instrument(skip(state, path, payload), fields(admin_id = admin.id))]
pub async fn change_role(
    State(state): State<AppState>,
    admin: CurrentUser,
    path: Result<Path<UserId>, PathRejection>,
    payload: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let id = user_id(path)?;
    let Json(payload) = payload?;
    let role = parse_role(payload.role.as_deref())?
        .ok_or_else(|| AppError::bad_request("Role is required"))?;

    if id == admin.id && role != Role::Admin {
        return Err(AppError::bad_request("Cannot remove your own admin role"));
    }

    let user = state
        .users
        .set_role(id, role)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(user_id = id, role = %role, "user role changed");
    Ok(Json(UserResponse {
        success: true,
        message: "User role updated",
        user: user.into(),
    }))
}
