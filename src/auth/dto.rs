use serde::{Deserialize, Serialize};

use crate::users::{PublicUser, UserSummary};

/// Request body for user registration. Fields are optional at the serde level
/// so a missing field yields our own 400 instead of a deserialization error.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: PublicUser,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct DebugUsersResponse {
    pub message: &'static str,
    pub database: &'static str,
    pub count: usize,
    pub users: Vec<UserSummary>,
}
