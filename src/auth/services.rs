//! Registration, login and per-request identity resolution.
//!
//! Everything here talks to the [`UserStore`](crate::users::UserStore)
//! contract only; which backend sits behind `state.users` is decided once at
//! startup.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::{LoginRequest, RegisterRequest},
    jwt::TokenSubject,
};
use crate::{
    error::AppError,
    state::AppState,
    users::{normalize_email, NewUser, PublicUser, Role, User, UserId},
};

/// Shared by "no such user" and "wrong password" so the two are
/// indistinguishable to the caller.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const MISSING_CREDENTIALS: &str = "Email and password are required";

/// Column width of `email` and `name` in the users table.
pub const MAX_FIELD_LEN: usize = 255;

/// Identity attached to a request once its token has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

#[derive(Debug)]
pub struct AuthOutcome {
    pub user: PublicUser,
    pub token: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Both fields present and non-empty, email normalized.
pub(crate) fn credentials(
    email: Option<String>,
    password: Option<String>,
) -> Result<(String, String), AppError> {
    let email = email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty());
    let password = password.filter(|p| !p.is_empty());
    match (email, password) {
        (Some(e), Some(p)) => Ok((e, p)),
        _ => Err(AppError::bad_request(MISSING_CREDENTIALS)),
    }
}

pub(crate) fn parse_role(role: Option<&str>) -> Result<Option<Role>, AppError> {
    role.map(|r| {
        r.parse::<Role>()
            .map_err(|_| AppError::bad_request("Invalid role. Must be user or admin"))
    })
    .transpose()
}

/// Existence check, hash, insert. Used by registration and by the admin
/// create endpoint.
pub(crate) async fn create_user(
    state: &AppState,
    email: String,
    password: &str,
    name: Option<String>,
    role: Option<Role>,
) -> Result<User, AppError> {
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }
    if email.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::bad_request("Email must be at most 255 characters"));
    }
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if name.as_ref().is_some_and(|n| n.chars().count() > MAX_FIELD_LEN) {
        return Err(AppError::bad_request("Name must be at most 255 characters"));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::conflict("User already exists with this email"));
    }

    let password_hash = state.hasher.hash(password).await?;

    // The store repeats the uniqueness check atomically; a lost race still
    // surfaces as 409 through `From<StoreError>`.
    let user = state
        .users
        .create(NewUser {
            email,
            password_hash,
            name,
            role,
        })
        .await?;
    Ok(user)
}

fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    let token = state.tokens.issue(&TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
    })?;
    Ok(token)
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<AuthOutcome, AppError> {
    let (email, password) = credentials(req.email, req.password)?;
    let role = parse_role(req.role.as_deref())?;

    let user = create_user(state, email, &password, req.name, role).await?;
    let token = issue_token(state, &user)?;

    // The account is stored at this point; the count only feeds the log line.
    match state.users.count().await {
        Ok(total) => {
            info!(user_id = user.id, role = %user.role, total_users = total, "user registered")
        }
        Err(e) => warn!(error = %e, user_id = user.id, role = %user.role, "user registered"),
    }
    Ok(AuthOutcome {
        user: user.into(),
        token,
    })
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthOutcome, AppError> {
    let (email, password) = credentials(req.email, req.password)?;

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    };

    if !state.hasher.verify(&password, &user.password_hash).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    let token = issue_token(state, &user)?;
    info!(user_id = user.id, "user logged in");
    Ok(AuthOutcome {
        user: user.into(),
        token,
    })
}

/// Token part of an `Authorization: Bearer <token>` header value.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Missing token is 401, a token that fails verification is 403, and a valid
/// token whose user no longer exists is 401 again. Clients rely on this split.
pub async fn resolve_identity(
    state: &AppState,
    authorization: Option<&str>,
) -> Result<CurrentUser, AppError> {
    let token = authorization
        .and_then(bearer_token)
        .ok_or_else(|| AppError::unauthorized("Access token required"))?;

    let subject = state.tokens.verify(token).map_err(|e| {
        warn!(error = %e, "token verification failed");
        AppError::forbidden("Invalid token")
    })?;

    let user = state.users.find_by_id(subject.user_id).await?.ok_or_else(|| {
        warn!(user_id = subject.user_id, "token subject no longer exists");
        AppError::unauthorized("User not found")
    })?;

    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        role: user.role,
    })
}

pub fn require_admin(identity: Option<&CurrentUser>) -> Result<&CurrentUser, AppError> {
    let user = identity.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    if user.role != Role::Admin {
        warn!(user_id = user.id, "admin access denied");
        return Err(AppError::forbidden("Admin access required"));
    }
    Ok(user)
}
