//! Full HTTP scenarios against the real router, with an in-process stub
//! standing in for the hosted service. The stub binds an ephemeral localhost
//! port, the app binds another; tests drive the public API with a plain HTTP
//! client.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use structiqe::config::Config;

struct Guard(JoinHandle<()>);
impl Drop for Guard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// -------------------------
// Stub hosted service
// -------------------------

#[derive(Clone)]
struct UpstreamState {
    overrides: Arc<Mutex<Vec<serde_json::Value>>>,
    /// effective-access row for user-1, when present
    grant_role: Option<&'static str>,
}

fn upstream_router(state: UpstreamState) -> Router {
    Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/rest/v1/rpc/link_employee_to_auth",
            post(|| async { StatusCode::NO_CONTENT }),
        )
        .route("/rest/v1/effective_access", get(effective_access))
        .route("/rest/v1/companies", get(companies))
        .route("/rest/v1/employees_effective_access_mat", get(employees))
        .route(
            "/rest/v1/employee_feature_overrides",
            get(list_overrides).post(upsert_override).delete(delete_override),
        )
        .with_state(state)
}

async fn token(
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if params.get("grant_type").map(String::as_str) != Some("password") {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unsupported_grant_type" })),
        );
    }
    let email = body.get("email").and_then(|v| v.as_str()).unwrap_or("");
    let password = body.get("password").and_then(|v| v.as_str()).unwrap_or("");
    if email == "a@b.com" && password == "s3cret" {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "access_token": "tok-1",
                "refresh_token": "refresh-1",
                "expires_in": 3600,
                "user": { "id": "user-1", "email": "a@b.com" }
            })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })),
        )
    }
}

async fn effective_access(
    State(state): State<UpstreamState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.grant_role {
        Some(role) => (
            StatusCode::OK,
            Json(serde_json::json!({ "user_id": "user-1", "position": role })),
        ),
        // zero rows under the single-object representation
        None => (StatusCode::NOT_ACCEPTABLE, Json(serde_json::json!({}))),
    }
}

async fn companies() -> Json<serde_json::Value> {
    Json(serde_json::json!([
        { "id": "c1", "name": "Acme" },
        { "id": "c2", "name": "Globex" }
    ]))
}

async fn employees(RawQuery(query): RawQuery) -> Json<serde_json::Value> {
    let q = query.unwrap_or_default();
    if q.contains("company_id=eq.c1") {
        Json(serde_json::json!([
            { "id": "e1", "company_id": "c1", "name": "Alice", "position": "manager" },
            { "id": "e2", "company_id": "c1", "name": "Bob", "position": "employee" }
        ]))
    } else {
        Json(serde_json::json!([]))
    }
}

async fn list_overrides(State(state): State<UpstreamState>) -> Json<serde_json::Value> {
    let mut rows = state.overrides.lock().clone();
    rows.sort_by(|a, b| {
        let ka = a.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
        let kb = b.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
        kb.cmp(ka)
    });
    Json(serde_json::Value::Array(rows))
}

async fn upsert_override(
    State(state): State<UpstreamState>,
    Json(row): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let emp = row.get("employee_id").cloned();
    let key = row.get("feature_key").cloned();
    let mut rows = state.overrides.lock();
    rows.retain(|r| !(r.get("employee_id") == emp.as_ref() && r.get("feature_key") == key.as_ref()));
    rows.push(row.clone());
    (StatusCode::CREATED, Json(serde_json::json!([row])))
}

async fn delete_override(
    State(state): State<UpstreamState>,
    RawQuery(query): RawQuery,
) -> StatusCode {
    let q = query.unwrap_or_default();
    let mut emp = None;
    let mut key = None;
    for part in q.split('&') {
        if let Some(v) = part.strip_prefix("employee_id=eq.") {
            emp = Some(v.to_string());
        }
        if let Some(v) = part.strip_prefix("feature_key=eq.") {
            key = Some(v.to_string());
        }
    }
    state.overrides.lock().retain(|r| {
        !(r.get("employee_id").and_then(|v| v.as_str()) == emp.as_deref()
            && r.get("feature_key").and_then(|v| v.as_str()) == key.as_deref())
    });
    StatusCode::NO_CONTENT
}

// -------------------------
// Harness
// -------------------------

async fn serve_ephemeral(app: Router) -> (Guard, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("test server error: {e:?}");
        }
    });
    (Guard(handle), format!("http://{addr}"))
}

async fn start_upstream(grant_role: Option<&'static str>) -> (Guard, String) {
    let state = UpstreamState { overrides: Arc::new(Mutex::new(Vec::new())), grant_role };
    serve_ephemeral(upstream_router(state)).await
}

async fn start_app(upstream: &str, tmp: &TempDir, require_grant: bool) -> (Guard, String) {
    let cfg = Config {
        supabase_url: upstream.to_string(),
        supabase_anon_key: "anon-test".to_string(),
        http_port: 0,
        state_dir: tmp.path().to_path_buf(),
        require_access_grant: require_grant,
    };
    let state = structiqe::server::build_state(&cfg).expect("build state");
    serve_ephemeral(structiqe::server::app(state)).await
}

async fn signin(client: &reqwest::Client, base: &str, email: &str, password: &str) -> reqwest::Response {
    client
        .post(format!("{base}/api/signin"))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("signin request")
}

// -------------------------
// Scenarios
// -------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signin_with_wrong_password_is_401() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = signin(&client, &base, "a@b.com", "wrong").await;
    assert_eq!(resp.status(), 401);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["success"], false);
    assert_eq!(v["message"], "Invalid login credentials");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signin_with_missing_fields_is_400() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    for body in [
        serde_json::json!({}),
        serde_json::json!({ "email": "a@b.com" }),
        serde_json::json!({ "email": "", "password": "x" }),
    ] {
        let resp = client
            .post(format!("{base}/api/signin"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body: {body}");
        let v: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(v["message"], "Email and password are required");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signin_success_returns_session_user_and_access() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = signin(&client, &base, "a@b.com", "s3cret").await;
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["user"]["id"], "user-1");
    assert_eq!(v["user"]["email"], "a@b.com");
    assert_eq!(v["access"], "manager");

    // expires_at is issued_at plus the provider ttl
    let issued: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(v["session"]["issued_at"].clone()).unwrap();
    let expires: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(v["session"]["expires_at"].clone()).unwrap();
    assert_eq!((expires - issued).num_seconds(), 3600);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signin_without_grant_row_defaults_to_employee() {
    let (_up, upstream) = start_upstream(None).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = signin(&client, &base, "a@b.com", "s3cret").await;
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["access"], "employee");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn strict_mode_rejects_missing_grant_with_403() {
    let (_up, upstream) = start_upstream(None).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, true).await;

    let client = reqwest::Client::new();
    let resp = signin(&client, &base, "a@b.com", "s3cret").await;
    assert_eq!(resp.status(), 403);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["success"], false);
    assert_eq!(v["message"], "No access assigned. Contact admin.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signout_succeeds_after_signin() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = signin(&client, &base, "a@b.com", "s3cret").await;
    assert_eq!(resp.status(), 200);

    let resp = client.post(format!("{base}/api/signout")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["message"], "Logged out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overrides_on_empty_table_is_empty_array() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/api/overrides")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v, serde_json::json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn override_upsert_is_last_write_wins_per_key() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let url = format!("{base}/api/overrides/42/darkMode");

    let resp = client.put(&url).json(&serde_json::json!({ "allow": true })).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let row: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(row["employee_id"], "42");
    assert_eq!(row["feature_key"], "darkMode");
    assert_eq!(row["allow"], true);

    let resp = client.put(&url).json(&serde_json::json!({ "allow": false })).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{base}/api/overrides")).send().await.unwrap();
    let rows: Vec<serde_json::Value> = resp.json().await.unwrap();
    let matching: Vec<_> = rows
        .iter()
        .filter(|r| r["employee_id"] == "42" && r["feature_key"] == "darkMode")
        .collect();
    assert_eq!(matching.len(), 1, "exactly one row per key");
    assert_eq!(matching[0]["allow"], false, "last write wins");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn override_put_with_non_boolean_allow_is_400() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    for body in [
        serde_json::json!({ "allow": "yes" }),
        serde_json::json!({ "allow": 1 }),
        serde_json::json!({}),
    ] {
        let resp = client
            .put(format!("{base}/api/overrides/42/darkMode"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body: {body}");
        let v: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(v["message"], "Request body must include boolean allow");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn override_delete_on_missing_key_is_success() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = client
        .delete(format!("{base}/api/overrides/nobody/nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["success"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn directory_endpoints_pass_rows_through() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/api/companies")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let rows: Vec<serde_json::Value> = resp.json().await.unwrap();
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, vec!["Acme", "Globex"]);

    let resp = client
        .get(format!("{base}/api/companies/c1/employees"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let rows: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Alice");

    let resp = client
        .get(format!("{base}/api/companies/c9/employees"))
        .send()
        .await
        .unwrap();
    let rows: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cors_preflight_and_response_headers() {
    let (_up, upstream) = start_upstream(Some("manager")).await;
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app(&upstream, &tmp, false).await;

    let client = reqwest::Client::new();
    // preflight from an allowed origin
    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{base}/api/overrides/42/darkMode"))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "PUT")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:5173"
    );

    // preflight from a foreign origin gets no allow header
    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{base}/api/overrides"))
        .header("Origin", "http://evil.example")
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());

    // plain requests from an allowed origin are stamped too
    let resp = client
        .get(format!("{base}/api/companies"))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_upstream_maps_to_500_with_details() {
    // nothing listens here
    let tmp = tempfile::tempdir().unwrap();
    let (_app, base) = start_app("http://127.0.0.1:9", &tmp, false).await;

    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/api/overrides")).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["message"], "Internal server error");
    assert!(v["details"].as_str().is_some_and(|d| !d.is_empty()));

    let resp = signin(&client, &base, "a@b.com", "s3cret").await;
    assert_eq!(resp.status(), 500);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["success"], false);
    assert_eq!(v["message"], "Internal server error");
}
