use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use time::OffsetDateTime;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{admin, auth, state::AppState};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(admin::router(state.clone())),
        )
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    message: &'static str,
    database: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        message: "Backend is running!",
        database: state.backend.label(),
        timestamp: OffsetDateTime::now_utc(),
    })
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header("authorization", format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register(app: &Router, email: &str, role: Option<&str>) -> (i64, String) {
        let mut body = json!({ "email": email, "password": "pw-123456", "name": "Test" });
        if let Some(r) = role {
            body["role"] = json!(r);
        }
        let (status, json) = send(app, "POST", "/api/auth/register", Some(body), None).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        (
            json["user"]["id"].as_i64().unwrap(),
            json["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn register_then_login() {
        let app = build_app(AppState::fake());
        let (status, json) = send(
            &app,
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "Ann@Example.com", "password": "secret-pw" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], "User registered successfully");
        assert_eq!(json["user"]["email"], "ann@example.com");
        assert_eq!(json["user"]["role"], "user");
        assert!(json["user"]["name"].is_null());
        assert!(json["token"].is_string());
        assert!(!json.to_string().contains("argon2"));

        let (status, json) = send(
            &app,
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "ann@example.com", "password": "secret-pw" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Login successful");
        assert!(json["token"].is_string());
    }

    #[tokio::test]
    async fn register_error_statuses() {
        let app = build_app(AppState::fake());
        register(&app, "dup@example.com", None).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "DUP@example.com", "password": "x" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = send(
            &app,
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "new@example.com" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Email and password are required");

        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/register")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let app = build_app(AppState::fake());
        register(&app, "bob@example.com", None).await;

        let (s1, wrong_pw) = send(
            &app,
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "bob@example.com", "password": "nope" })),
            None,
        )
        .await;
        let (s2, unknown) = send(
            &app,
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "nobody@example.com", "password": "nope" })),
            None,
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s2, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_pw, unknown);
        assert_eq!(wrong_pw["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn admin_routes_are_guarded() {
        let app = build_app(AppState::fake());
        let (_, user_token) = register(&app, "user@example.com", None).await;
        let (_, admin_token) = register(&app, "admin@example.com", Some("admin")).await;

        let (status, json) = send(&app, "GET", "/api/admin/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], "Access token required");

        let (status, json) = send(&app, "GET", "/api/admin/users", None, Some("garbage")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["message"], "Invalid token");

        let (status, json) = send(&app, "GET", "/api/admin/users", None, Some(&user_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["message"], "Admin access required");

        let (status, json) = send(&app, "GET", "/api/admin/users", None, Some(&admin_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["users"][0]["email"], "admin@example.com");
        assert!(json["users"][0]["createdAt"].is_string());
        assert!(json["users"][0].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn admin_cannot_delete_self_but_can_delete_others() {
        let app = build_app(AppState::fake());
        let (user_id, user_token) = register(&app, "user@example.com", None).await;
        let (admin_id, admin_token) = register(&app, "admin@example.com", Some("admin")).await;

        let (status, json) = send(
            &app,
            "DELETE",
            &format!("/api/admin/users/{admin_id}"),
            None,
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Cannot delete your own account");

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/admin/users/{user_id}"),
            None,
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The deleted user's token is still signed and unexpired.
        let (status, json) = send(&app, "GET", "/api/admin/users", None, Some(&user_token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], "User not found");

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/admin/users/{user_id}"),
            None,
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) =
            send(&app, "DELETE", "/api/admin/users/abc", None, Some(&admin_token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Invalid user ID");
    }

    #[tokio::test]
    async fn admin_creates_users_and_changes_roles() {
        let app = build_app(AppState::fake());
        let (admin_id, admin_token) = register(&app, "admin@example.com", Some("admin")).await;

        let (status, json) = send(
            &app,
            "POST",
            "/api/admin/users",
            Some(json!({ "email": "staff@example.com", "password": "pw", "role": "chief" })),
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Invalid role. Must be user or admin");

        let (status, json) = send(
            &app,
            "POST",
            "/api/admin/users",
            Some(json!({ "email": "staff@example.com", "password": "pw" })),
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["user"]["role"], "user");
        let staff_id = json["user"]["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "POST",
            "/api/admin/users",
            Some(json!({ "email": "Staff@example.com", "password": "pw" })),
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "staff@example.com", "password": "pw" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = send(
            &app,
            "PATCH",
            &format!("/api/admin/users/{staff_id}/role"),
            Some(json!({ "role": "admin" })),
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["role"], "admin");

        let (status, json) = send(
            &app,
            "PATCH",
            &format!("/api/admin/users/{admin_id}/role"),
            Some(json!({ "role": "user" })),
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Cannot remove your own admin role");

        let (status, _) = send(
            &app,
            "PATCH",
            "/api/admin/users/999/role",
            Some(json!({ "role": "user" })),
            Some(&admin_token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let app = build_app(AppState::fake());
        let (status, json) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["database"], "In-Memory");
    }

    #[tokio::test]
    async fn debug_listing_hidden_in_production() {
        let mut state = AppState::fake();
        let app = build_app(state.clone());
        register(&app, "a@example.com", None).await;
        let (status, json) = send(&app, "GET", "/api/auth/debug/users", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);

        let mut config = (*state.config).clone();
        config.production = true;
        state.config = Arc::new(config);
        let app = build_app(state);
        let (status, _) = send(&app, "GET", "/api/auth/debug/users", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
