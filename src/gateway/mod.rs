//! Axum-based HTTP gateway for the admin panel.
//!
//! - Public: `GET /api/health`, `POST /api/login`
//! - Everything else requires `Authorization: Bearer <token>`; the check runs
//!   as a route layer before any handler
//! - CORS restricted to the configured origin allow-list; preflight requests
//!   are answered by the CORS layer before auth or routing
//! - Request body size limit (64KB) and timeout (30s)

pub mod error;

pub use error::ApiError;

use crate::auth::{AdminCredential, SessionTokens};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::roster::{self, EntryDuration, EntryRepository, ListKind};
use anyhow::Result;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Request, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Preflight cache lifetime advertised via `Access-Control-Max-Age`.
pub const CORS_MAX_AGE_SECS: u64 = 86_400;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<AdminCredential>,
    pub sessions: Arc<SessionTokens>,
    pub users: Arc<EntryRepository>,
    pub users_farm: Arc<EntryRepository>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn repo(&self, kind: ListKind) -> &Arc<EntryRepository> {
        match kind {
            ListKind::Users => &self.users,
            ListKind::UsersFarm => &self.users_farm,
        }
    }
}

/// Run the HTTP gateway until Ctrl+C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if config.admin.uses_default_password() {
        tracing::warn!("No admin password configured; using the built-in default. Set ADMIN_PASSWORD or ADMIN_PASSWORD_HASH.");
    }
    let admin = Arc::new(config.admin.credential());

    let users_store = roster::open_store(&config.storage, ListKind::Users).await?;
    let farm_store = roster::open_store(&config.storage, ListKind::UsersFarm).await?;

    let state = AppState {
        admin,
        sessions: Arc::new(SessionTokens::new(Arc::clone(&clock))),
        users: Arc::new(EntryRepository::new(
            ListKind::Users,
            users_store,
            Arc::clone(&clock),
        )),
        users_farm: Arc::new(EntryRepository::new(
            ListKind::UsersFarm,
            farm_store,
            Arc::clone(&clock),
        )),
        clock,
    };

    if config.gateway.sweep_interval_secs > 0 {
        spawn_sweeper(
            state.clone(),
            Duration::from_secs(config.gateway.sweep_interval_secs),
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    let users = state.users.count().await.unwrap_or(0);
    let users_farm = state.users_farm.count().await.unwrap_or(0);
    tracing::info!(
        addr = %actual_addr,
        admin = %state.admin.email(),
        storage = state.users.store_name(),
        users,
        users_farm,
        origins = ?config.gateway.allowed_origins,
        "Gateway listening"
    );

    println!("🛡️  dnmenu-manager listening on http://{actual_addr}");
    println!("  GET    /api/health                   status and list sizes");
    println!("  POST   /api/login                    {{\"email\", \"password\"}} → bearer token");
    println!("  POST   /api/logout                   revoke current token");
    println!("  GET    /api/validate-token           check current token");
    println!("  GET    /api/users | /api/usersfarm   list unexpired entries");
    println!("  POST   /api/users/add | /api/usersfarm/add");
    println!("  DELETE /api/users/{{name}} | /api/usersfarm/{{name}}");
    println!("  Press Ctrl+C to stop.\n");

    let app = build_router(state, &config.gateway.allowed_origins);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Build the full router with CORS, body limit and timeout layers.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/api/logout", post(handle_logout))
        .route("/api/validate-token", get(handle_validate_token))
        .route("/api/users", get(handle_users_list))
        .route(
            "/api/users/add",
            post(handle_users_add).delete(handle_users_remove_add),
        )
        .route("/api/users/{username}", delete(handle_users_remove))
        .route("/api/usersfarm", get(handle_farm_list))
        .route(
            "/api/usersfarm/add",
            post(handle_farm_add).delete(handle_farm_remove_add),
        )
        .route("/api/usersfarm/{username}", delete(handle_farm_remove))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/login", post(handle_login))
        .merge(protected)
        .fallback(handle_not_found)
        .method_not_allowed_fallback(handle_not_found)
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
            Method::PUT,
            Method::PATCH,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            header::ACCEPT,
        ])
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

/// Periodic purge of expired tokens and entries. Reads filter regardless.
fn spawn_sweeper(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            sweep_once(&state).await;
        }
    });
}

/// One sweep pass. Returns `(tokens, entries)` removed.
async fn sweep_once(state: &AppState) -> (usize, usize) {
    let tokens = state.sessions.purge_expired();
    if tokens > 0 {
        tracing::debug!(removed = tokens, "Swept expired tokens");
    }
    let mut entries = 0;
    for kind in ListKind::ALL {
        match state.repo(kind).purge_expired().await {
            Ok(0) => {}
            Ok(removed) => {
                entries += removed;
                tracing::info!(list = %kind, removed, "Swept expired entries");
            }
            Err(e) => tracing::warn!(list = %kind, "Expired entry sweep failed: {e}"),
        }
    }
    (tokens, entries)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AUTH GATE
// ══════════════════════════════════════════════════════════════════════════════

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject the request with 401 unless it carries a live admin token.
async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = extract_bearer_token(request.headers())
        .is_some_and(|token| state.sessions.validate(token));

    if !authorized {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request without a valid bearer token"
        );
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

// ══════════════════════════════════════════════════════════════════════════════
// PUBLIC HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /api/health: public liveness and list sizes.
async fn handle_health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let users = state.users.count().await?;
    let users_farm = state.users_farm.count().await?;
    Ok(Json(json!({
        "status": "ok",
        "users": users,
        "usersFarm": users_farm,
        "timestamp": state.clock.now(),
        "activeTokens": state.sessions.active_count(),
        "storage": state.users.store_name(),
    })))
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// POST /api/login: exchange admin credentials for a bearer token.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;

    let (Some(email), Some(password)) = (
        body.email.filter(|e| !e.is_empty()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::Validation(
            "Email e senha são obrigatórios".into(),
        ));
    };

    if !state.admin.verify(&email, &password) {
        tracing::warn!(email = %email, "Admin login failed");
        return Err(ApiError::InvalidCredentials);
    }

    let issued = state.sessions.issue();
    tracing::info!(
        email = %email,
        active_tokens = state.sessions.active_count(),
        "Admin login succeeded"
    );

    Ok(Json(json!({
        "token": issued.token,
        "expiresIn": issued.expires_in_secs,
    })))
}

/// Fallback for unknown routes.
async fn handle_not_found(method: Method, uri: Uri) -> ApiError {
    tracing::debug!(method = %method, path = %uri.path(), "Route not found");
    ApiError::RouteNotFound
}

// ══════════════════════════════════════════════════════════════════════════════
// PROTECTED HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// POST /api/logout: revoke the presented token.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    if let Some(token) = extract_bearer_token(&headers) {
        state.sessions.revoke(token);
    }
    tracing::info!(
        active_tokens = state.sessions.active_count(),
        "Admin logged out"
    );
    Json(json!({ "success": true }))
}

/// GET /api/validate-token: reaching the handler means the token is valid.
async fn handle_validate_token() -> Json<Value> {
    Json(json!({ "valid": true }))
}

/// Request body for adding an entry.
#[derive(Debug, Default, Deserialize)]
struct AddEntryBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    duration: Option<EntryDuration>,
}

async fn list_entries(state: &AppState, kind: ListKind) -> Result<Json<Value>, ApiError> {
    let repo = state.repo(kind);
    let entries = repo.list().await?;
    tracing::debug!(list = %repo.kind(), count = entries.len(), "Listing entries");
    let mut body = serde_json::Map::new();
    body.insert(
        kind.response_key().to_string(),
        serde_json::to_value(entries).map_err(|e| ApiError::Internal(e.into()))?,
    );
    Ok(Json(Value::Object(body)))
}

async fn add_entry(
    state: &AppState,
    kind: ListKind,
    body: Result<Json<AddEntryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;

    let username = body
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Username é obrigatório".into()))?;
    let duration = body
        .duration
        .ok_or_else(|| ApiError::Validation("Duração é obrigatória".into()))?;

    let entry = state.repo(kind).add(&username, duration).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": entry })),
    ))
}

async fn remove_entry(
    state: &AppState,
    kind: ListKind,
    username: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(username) =
        username.map_err(|e| ApiError::Validation(format!("Invalid request: {e}")))?;
    state.repo(kind).remove(&username).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/users
async fn handle_users_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_entries(&state, ListKind::Users).await
}

/// POST /api/users/add
async fn handle_users_add(
    State(state): State<AppState>,
    body: Result<Json<AddEntryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    add_entry(&state, ListKind::Users, body).await
}

/// DELETE /api/users/{username}
async fn handle_users_remove(
    State(state): State<AppState>,
    username: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    remove_entry(&state, ListKind::Users, username).await
}

/// DELETE /api/users/add: the static `add` route shadows the username pattern.
async fn handle_users_remove_add(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    remove_entry(&state, ListKind::Users, Ok(Path("add".to_string()))).await
}

/// GET /api/usersfarm
async fn handle_farm_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_entries(&state, ListKind::UsersFarm).await
}

/// POST /api/usersfarm/add
async fn handle_farm_add(
    State(state): State<AppState>,
    body: Result<Json<AddEntryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    add_entry(&state, ListKind::UsersFarm, body).await
}

/// DELETE /api/usersfarm/{username}
async fn handle_farm_remove(
    State(state): State<AppState>,
    username: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    remove_entry(&state, ListKind::UsersFarm, username).await
}

/// DELETE /api/usersfarm/add
async fn handle_farm_remove_add(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    remove_entry(&state, ListKind::UsersFarm, Ok(Path("add".to_string()))).await
}
