//!
//! StructIQe HTTP server
//! ---------------------
//! This module defines the Axum-based JSON API consumed by the admin
//! frontends and the CLI console.
//!
//! Responsibilities:
//! - Sign-in/sign-out endpoints driving the session lifecycle controller.
//! - Read-only company/employee directory passthrough.
//! - Feature-override CRUD passthrough.
//! - Fixed-origin CORS for the local dev frontends.
//! - Panic containment: a panicking handler answers 500, the process stays up.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::{Config, ALLOWED_ORIGINS};
use crate::directory::Directory;
use crate::error::AppError;
use crate::gateway::OverrideGateway;
use crate::identity::{
    AuthError, SessionController, SessionStore, SignInError, SupabaseAccessProvider,
};
use crate::supabase::SupabaseClient;

/// Shared server state injected into all handlers.
///
/// The controller owns the process's session/access pair (one operator
/// session at a time); the gateway and directory are stateless passthroughs
/// over the hosted service.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController<SupabaseAccessProvider>>,
    pub gateway: Arc<OverrideGateway>,
    pub directory: Arc<Directory>,
}

/// Wire up the service client, session store and controller from config and
/// run the startup restore.
pub fn build_state(cfg: &Config) -> anyhow::Result<AppState> {
    let client = Arc::new(SupabaseClient::new(&cfg.supabase_url, &cfg.supabase_anon_key)?);
    let provider = SupabaseAccessProvider::new(client.clone());
    let store = SessionStore::new(&cfg.state_dir);
    let controller = Arc::new(SessionController::new(provider, store, cfg.require_access_grant));
    controller.initialize();
    Ok(AppState {
        controller,
        gateway: Arc::new(OverrideGateway::new(client.clone())),
        directory: Arc::new(Directory::new(client)),
    })
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "structiqe ok" }))
        .route("/api/signin", post(signin))
        .route("/api/signout", post(signout))
        .route("/api/companies", get(companies))
        .route("/api/companies/{company_id}/employees", get(company_employees))
        .route("/api/overrides", get(list_overrides))
        .route(
            "/api/overrides/{employee_id}/{feature_key}",
            put(put_override).delete(delete_override),
        )
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Start the StructIQe HTTP server bound to the configured port.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let state = build_state(&cfg)?;
    let app = app(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// -------------------------
// CORS
// -------------------------

async fn cors(req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| ALLOWED_ORIGINS.contains(o))
        .map(|o| o.to_string());

    // Answer preflight before routing; the router has no OPTIONS handlers.
    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(resp.headers_mut(), origin.as_deref());
        return resp;
    }
    let mut resp = next.run(req).await;
    apply_cors_headers(resp.headers_mut(), origin.as_deref());
    resp
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&str>) {
    let Some(origin) = origin else { return };
    if let Ok(v) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

// -------------------------
// Auth endpoints
// -------------------------

#[derive(Debug, Deserialize)]
struct SignInPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SignInPayload>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let (email, password) = match payload {
        Ok(Json(SignInPayload { email: Some(e), password: Some(p) }))
            if !e.trim().is_empty() && !p.is_empty() =>
        {
            (e, p)
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "Email and password are required" })),
            )
        }
    };

    match state.controller.sign_in(email.trim(), &password).await {
        Ok(ok) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "user": { "id": ok.session.user_id.clone(), "email": ok.session.email.clone() },
                "access": ok.grant.role,
                "session": ok.session,
                "message": "Login successful",
            })),
        ),
        Err(SignInError::Auth(AuthError::InvalidCredentials(msg))) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": msg })),
        ),
        Err(SignInError::Auth(e @ (AuthError::MissingSession | AuthError::MissingSubject))) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": e.to_string() })),
        ),
        Err(e @ SignInError::NoAccessAssigned) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "success": false, "message": e.to_string() })),
        ),
        Err(SignInError::Auth(AuthError::Upstream(msg))) => {
            error!("sign in error: {msg}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Internal server error" })),
            )
        }
        Err(SignInError::Persist(msg)) => {
            error!("sign in persist error: {msg}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Internal server error" })),
            )
        }
    }
}

async fn signout(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.controller.sign_out().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "message": "Logged out" }))),
        Err(e) => {
            error!("sign out error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": e.to_string() })),
            )
        }
    }
}

// -------------------------
// Directory and override endpoints
// -------------------------

async fn companies(State(state): State<AppState>) -> Response {
    guarded("GET /api/companies", async move {
        match state.directory.companies().await {
            Ok(rows) => (StatusCode::OK, Json(serde_json::Value::Array(rows))).into_response(),
            Err(e) => service_error("GET /api/companies", e),
        }
    })
    .await
}

async fn company_employees(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Response {
    guarded("GET /api/companies/:companyId/employees", async move {
        match state.directory.employees(&company_id).await {
            Ok(rows) => (StatusCode::OK, Json(serde_json::Value::Array(rows))).into_response(),
            Err(e) => service_error("GET /api/companies/:companyId/employees", e),
        }
    })
    .await
}

async fn list_overrides(State(state): State<AppState>) -> Response {
    guarded("GET /api/overrides", async move {
        match state.gateway.list().await {
            Ok(rows) => (StatusCode::OK, Json(serde_json::Value::Array(rows))).into_response(),
            Err(e) => service_error("GET /api/overrides", e),
        }
    })
    .await
}

async fn put_override(
    State(state): State<AppState>,
    Path((employee_id, feature_key)): Path<(String, String)>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    guarded("PUT /api/overrides/:employeeId/:featureKey", async move {
        // `allow` must be a JSON boolean; anything else is a validation error.
        let allow = body
            .ok()
            .as_ref()
            .and_then(|Json(v)| v.get("allow"))
            .and_then(|v| v.as_bool());
        let Some(allow) = allow else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Request body must include boolean allow" })),
            )
                .into_response();
        };
        match state.gateway.upsert(&employee_id, &feature_key, allow).await {
            Ok(row) => (StatusCode::OK, Json(row)).into_response(),
            Err(e) => service_error("PUT /api/overrides/:employeeId/:featureKey", e),
        }
    })
    .await
}

async fn delete_override(
    State(state): State<AppState>,
    Path((employee_id, feature_key)): Path<(String, String)>,
) -> Response {
    guarded("DELETE /api/overrides/:employeeId/:featureKey", async move {
        match state.gateway.remove(&employee_id, &feature_key).await {
            Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
            Err(e) => service_error("DELETE /api/overrides/:employeeId/:featureKey", e),
        }
    })
    .await
}

// -------------------------
// Helpers
// -------------------------

fn service_error(context: &str, err: AppError) -> Response {
    error!("service error in {context}: {err}");
    err.into_response()
}

/// Run a handler body with panic containment: a panic becomes a 500 response
/// instead of tearing down the connection task.
async fn guarded<F>(context: &'static str, fut: F) -> Response
where
    F: std::future::Future<Output = Response>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(resp) => resp,
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                *s
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.as_str()
            } else {
                "panic"
            };
            error!(target: "panic", "handler {} panicked: {}", context, msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Internal server error" })),
            )
                .into_response()
        }
    }
}
