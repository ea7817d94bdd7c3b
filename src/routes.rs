//! HTTP API routes for sessiond.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Extension, Json, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::error::{ApiError, ErrorBody};
use crate::rate_limit::rate_limit_middleware;
use crate::request_id::request_id_middleware;
use crate::session::{Session, SessionInfo};
use crate::state::AppState;
use crate::tracking::{RequestedId, tracking_middleware};

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateSessionRequest {
    /// Target scope (defaults to "default").
    #[serde(default)]
    scope: Option<String>,
    /// User principal to attach to the session.
    #[serde(default)]
    user: Option<String>,
    /// Idle timeout override in seconds; zero or negative means never expire.
    /// Omit to inherit the scope's timeout.
    #[serde(default)]
    max_inactive_secs: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSessionRequest {
    /// New idle timeout in seconds; zero or negative means never expire.
    max_inactive_secs: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct EncodeRequest {
    /// URL (absolute or path-only) to rewrite with the session path parameter.
    url: String,
}

#[derive(Serialize, ToSchema)]
pub struct EncodeResponse {
    /// The rewritten URL; unchanged when URL tracking does not apply.
    url: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server status ("ok").
    status: String,
    /// Server version.
    version: String,
    /// Server uptime in seconds.
    uptime_seconds: u64,
    /// Number of live sessions.
    active_sessions: usize,
    /// High-water mark of concurrent sessions.
    peak_sessions: usize,
    /// Number of scopes.
    scopes: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateScopeRequest {
    /// Name for the new scope.
    name: String,
    /// Idle timeout for sessions in this scope, in seconds (0 = never expire).
    /// Omit to inherit the server default.
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct ScopeSummary {
    /// Scope name.
    name: String,
    /// Idle timeout in seconds; null when sessions never expire.
    timeout_secs: Option<u64>,
    /// Live sessions currently in the scope.
    active_sessions: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ListSessionsResponse {
    /// Session metadata summaries.
    sessions: Vec<SessionInfo>,
}

#[derive(Serialize, ToSchema)]
pub struct AttributeNamesResponse {
    /// Names of the session's attributes.
    names: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ListScopesResponse {
    /// All scopes.
    scopes: Vec<ScopeSummary>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ScopeFilter {
    /// Restrict the listing to one scope.
    scope: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sessiond API",
        description = "HTTP session management service.\n\nSessions are tracked across requests in cookie mode, URL-rewriting mode, or both; idle sessions are purged on a background sweep. Sessions are grouped into named scopes with per-scope idle timeouts.",
        version = "0.4.0",
        license(name = "Apache-2.0"),
    ),
    paths(
        create_session,
        list_sessions,
        get_current,
        update_current,
        invalidate_current,
        list_attributes,
        get_attribute,
        put_attribute,
        delete_attribute,
        peek_session,
        invalidate_session,
        encode,
        list_scopes,
        create_scope,
        delete_scope,
        health,
    ),
    components(
        schemas(
            CreateSessionRequest, UpdateSessionRequest, SessionInfo,
            EncodeRequest, EncodeResponse, HealthResponse, ErrorBody,
            CreateScopeRequest, ScopeSummary, ListScopesResponse,
            ListSessionsResponse, AttributeNamesResponse,
        )
    ),
    tags(
        (name = "Session", description = "Session lifecycle and attributes for the calling client"),
        (name = "Admin", description = "Administrative session and scope management"),
        (name = "System", description = "System and health endpoints"),
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the main application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Client-facing session endpoints
        .route("/sessions", post(create_session).get(list_sessions))
        .route(
            "/sessions/current",
            get(get_current)
                .patch(update_current)
                .delete(invalidate_current),
        )
        .route("/sessions/current/attributes", get(list_attributes))
        .route(
            "/sessions/current/attributes/{name}",
            get(get_attribute).put(put_attribute).delete(delete_attribute),
        )
        .route("/encode", post(encode))
        // Administration
        .route("/sessions/{id}", get(peek_session).delete(invalidate_session))
        .route("/scopes", get(list_scopes).post(create_scope))
        .route("/scopes/{name}", delete(delete_scope))
        // System
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tracking_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer(&state))
        .with_state(state);

    api.merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let x_request_id = header::HeaderName::from_static("x-request-id");
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            x_request_id.clone(),
        ])
        .expose_headers([x_request_id]);

    let origins = state.cors_origins();
    if origins.is_empty() {
        base.allow_origin(tower_http::cors::Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .map(|o| o.parse().expect("invalid CORS origin"))
            .collect();
        // Cookies only flow cross-origin with credentials enabled, which in
        // turn requires explicit origins.
        base.allow_origin(parsed).allow_credentials(true)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolves the request's session, touching it and recording metrics.
fn resolve_current(
    state: &AppState,
    requested: &RequestedId,
) -> Result<(String, Arc<Mutex<Session>>), ApiError> {
    let id = requested.id.as_deref().ok_or(ApiError::SessionNotFound)?;
    match state.registry().resolve(id) {
        Some(session) => {
            state.metrics().record_resolution(requested.source);
            Ok((id.to_string(), session))
        }
        None => {
            state.metrics().record_miss();
            Err(ApiError::SessionNotFound)
        }
    }
}

/// Maps a wire timeout (seconds, zero or negative = never) to a `Duration`.
fn wire_timeout(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs as u64))
}

/// `Set-Cookie` headers announcing a session, when cookie tracking is on.
fn session_cookie_headers(state: &AppState, id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let tracking = state.tracking();
    if tracking.mode.cookies_enabled()
        && let Ok(value) = HeaderValue::from_str(&tracking.session_cookie(id))
    {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// `Set-Cookie` headers discarding the session cookie.
fn clear_cookie_headers(state: &AppState) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let tracking = state.tracking();
    if tracking.mode.cookies_enabled()
        && let Ok(value) = HeaderValue::from_str(&tracking.clear_cookie())
    {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Create a new session.
///
/// The response carries the session metadata; in cookie mode it also sets
/// the session cookie. The session is "new" until the client presents its
/// ID back on a subsequent request.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body(content = Option<CreateSessionRequest>, description = "Optional creation parameters"),
    responses(
        (status = 201, description = "Session created", body = SessionInfo),
        (status = 404, description = "Scope not found", body = ErrorBody),
        (status = 503, description = "Session limit reached", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map_or_else(CreateSessionRequest::default, |Json(b)| b);

    let scope_name = req.scope.as_deref().unwrap_or("default");
    let scope = state
        .scopes()
        .get(scope_name)
        .ok_or_else(|| ApiError::NotFound(format!("scope '{scope_name}' not found")))?;

    let max_inactive = match req.max_inactive_secs {
        Some(secs) => wire_timeout(secs),
        None => scope.max_inactive,
    };

    let (id, session) = state
        .registry()
        .create(scope_name, req.user, max_inactive)?;
    let info = session.lock().info();

    let headers = session_cookie_headers(&state, &id);
    Ok((StatusCode::CREATED, headers, Json(info)))
}

/// Get the current session.
///
/// The session is resolved from the request's cookie or URL path parameter
/// and touched (its idle clock restarts).
#[utoipa::path(
    get,
    path = "/sessions/current",
    responses(
        (status = 200, description = "Current session metadata", body = SessionInfo),
        (status = 404, description = "No session, or session expired", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn get_current(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
) -> Result<Json<SessionInfo>, ApiError> {
    let (_, session) = resolve_current(&state, &requested)?;
    let info = session.lock().info();
    Ok(Json(info))
}

/// Update the current session's idle timeout.
#[utoipa::path(
    patch,
    path = "/sessions/current",
    request_body = UpdateSessionRequest,
    responses(
        (status = 200, description = "Updated session metadata", body = SessionInfo),
        (status = 404, description = "No session, or session expired", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn update_current(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<SessionInfo>, ApiError> {
    let (_, session) = resolve_current(&state, &requested)?;

    let mut guard = session.lock();
    guard.set_max_inactive(wire_timeout(req.max_inactive_secs));
    let info = guard.info();
    drop(guard);

    Ok(Json(info))
}

/// Invalidate the current session.
///
/// Removes the session and, in cookie mode, discards the session cookie.
#[utoipa::path(
    delete,
    path = "/sessions/current",
    responses(
        (status = 200, description = "Session invalidated"),
        (status = 404, description = "No session, or session expired", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn invalidate_current(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
) -> Result<impl IntoResponse, ApiError> {
    let (id, _) = resolve_current(&state, &requested)?;
    state.registry().invalidate(&id);

    let headers = clear_cookie_headers(&state);
    Ok((headers, Json(serde_json::json!({ "invalidated": id }))))
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// List the current session's attribute names.
#[utoipa::path(
    get,
    path = "/sessions/current/attributes",
    responses(
        (status = 200, description = "Attribute names", body = AttributeNamesResponse),
        (status = 404, description = "No session, or session expired", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn list_attributes(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
) -> Result<Json<AttributeNamesResponse>, ApiError> {
    let (_, session) = resolve_current(&state, &requested)?;
    let names = session.lock().attribute_names();
    Ok(Json(AttributeNamesResponse { names }))
}

/// Get one attribute value.
#[utoipa::path(
    get,
    path = "/sessions/current/attributes/{name}",
    params(
        ("name" = String, Path, description = "Attribute name"),
    ),
    responses(
        (status = 200, description = "Attribute value (arbitrary JSON)"),
        (status = 404, description = "No session, or attribute not set", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn get_attribute(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, session) = resolve_current(&state, &requested)?;
    let value = session
        .lock()
        .attribute(&name)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("attribute '{name}' not set")))?;
    Ok(Json(value))
}

/// Set one attribute to an arbitrary JSON value.
#[utoipa::path(
    put,
    path = "/sessions/current/attributes/{name}",
    params(
        ("name" = String, Path, description = "Attribute name"),
    ),
    responses(
        (status = 204, description = "Attribute stored"),
        (status = 404, description = "No session, or session expired", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn put_attribute(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
    Path(name): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let (_, session) = resolve_current(&state, &requested)?;
    session.lock().set_attribute(name, value);
    Ok(StatusCode::NO_CONTENT)
}

/// Remove one attribute. Removing an absent attribute is a no-op.
#[utoipa::path(
    delete,
    path = "/sessions/current/attributes/{name}",
    params(
        ("name" = String, Path, description = "Attribute name"),
    ),
    responses(
        (status = 204, description = "Attribute removed (or was absent)"),
        (status = 404, description = "No session, or session expired", body = ErrorBody),
    ),
    tag = "Session"
)]
async fn delete_attribute(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (_, session) = resolve_current(&state, &requested)?;
    session.lock().remove_attribute(&name);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// URL encoding
// ---------------------------------------------------------------------------

/// Rewrite a URL to carry the current session.
///
/// Returns the URL unchanged when URL tracking is off or the request has no
/// live session; the lookup does not touch the session.
#[utoipa::path(
    post,
    path = "/encode",
    request_body = EncodeRequest,
    responses(
        (status = 200, description = "Possibly-rewritten URL", body = EncodeResponse),
    ),
    tag = "Session"
)]
async fn encode(
    State(state): State<AppState>,
    Extension(requested): Extension<RequestedId>,
    Json(req): Json<EncodeRequest>,
) -> Result<Json<EncodeResponse>, ApiError> {
    let tracking = state.tracking();
    if !tracking.mode.url_enabled() {
        return Ok(Json(EncodeResponse { url: req.url }));
    }

    let Some(id) = requested.id.as_deref() else {
        return Ok(Json(EncodeResponse { url: req.url }));
    };
    if state.registry().peek(id).is_none() {
        return Ok(Json(EncodeResponse { url: req.url }));
    }

    state.metrics().record_url_encoded();
    Ok(Json(EncodeResponse {
        url: tracking.encode_url(&req.url, id),
    }))
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

/// List sessions.
///
/// Returns metadata summaries for all live sessions, optionally filtered by
/// scope. Listing does not touch the sessions.
#[utoipa::path(
    get,
    path = "/sessions",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Session summaries", body = ListSessionsResponse),
    ),
    tag = "Admin"
)]
async fn list_sessions(
    State(state): State<AppState>,
    Query(filter): Query<ScopeFilter>,
) -> Json<ListSessionsResponse> {
    let sessions = match filter.scope.as_deref() {
        Some(scope) => state.registry().list_scope(scope),
        None => state.registry().list(),
    };
    Json(ListSessionsResponse { sessions })
}

/// Inspect a session by ID without touching it.
///
/// Unlike resolution through tracking, this neither restarts the idle clock
/// nor clears the new flag.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "Session metadata", body = SessionInfo),
        (status = 404, description = "Session not found or expired", body = ErrorBody),
    ),
    tag = "Admin"
)]
async fn peek_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = state.registry().peek(&id).ok_or(ApiError::SessionNotFound)?;
    let info = session.lock().info();
    Ok(Json(info))
}

/// Force-invalidate a session by ID.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "Session invalidated"),
        (status = 404, description = "Session not found", body = ErrorBody),
    ),
    tag = "Admin"
)]
async fn invalidate_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.registry().invalidate(&id) {
        return Err(ApiError::SessionNotFound);
    }
    Ok(Json(serde_json::json!({ "invalidated": id })))
}

/// List all scopes.
#[utoipa::path(
    get,
    path = "/scopes",
    responses(
        (status = 200, description = "All scopes", body = ListScopesResponse),
    ),
    tag = "Admin"
)]
async fn list_scopes(State(state): State<AppState>) -> Json<ListScopesResponse> {
    let scopes = state
        .scopes()
        .list()
        .into_iter()
        .map(|settings| ScopeSummary {
            active_sessions: state.registry().count_scope(&settings.name),
            timeout_secs: settings.max_inactive.map(|d| d.as_secs()),
            name: settings.name.clone(),
        })
        .collect();
    Json(ListScopesResponse { scopes })
}

/// Create a new scope.
///
/// Name must start with a letter, contain only alphanumeric characters,
/// underscores, or hyphens, and be at most 64 characters.
#[utoipa::path(
    post,
    path = "/scopes",
    request_body = CreateScopeRequest,
    responses(
        (status = 201, description = "Scope created", body = ScopeSummary),
        (status = 400, description = "Invalid scope name", body = ErrorBody),
        (status = 409, description = "Scope already exists", body = ErrorBody),
    ),
    tag = "Admin"
)]
async fn create_scope(
    State(state): State<AppState>,
    Json(req): Json<CreateScopeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.scopes().create(&req.name, req.timeout_secs)?;
    Ok((
        StatusCode::CREATED,
        Json(ScopeSummary {
            name: settings.name.clone(),
            timeout_secs: settings.max_inactive.map(|d| d.as_secs()),
            active_sessions: 0,
        }),
    ))
}

/// Delete a scope and invalidate its sessions.
///
/// The "default" scope cannot be deleted.
#[utoipa::path(
    delete,
    path = "/scopes/{name}",
    params(
        ("name" = String, Path, description = "Scope name to delete"),
    ),
    responses(
        (status = 200, description = "Scope deleted"),
        (status = 400, description = "Cannot delete the default scope", body = ErrorBody),
        (status = 404, description = "Scope not found", body = ErrorBody),
    ),
    tag = "Admin"
)]
async fn delete_scope(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.scopes().delete(&name)?;
    let invalidated = state.registry().invalidate_scope(&name);
    Ok(Json(serde_json::json!({
        "deleted": name,
        "sessions_invalidated": invalidated,
    })))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Check server health.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse),
    ),
    tag = "System"
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
        active_sessions: state.registry().active_count(),
        peak_sessions: state.registry().peak_active(),
        scopes: state.scopes().count(),
    })
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics().render(
        state.registry().active_count(),
        state.registry().peak_active(),
        state.scopes().count(),
        state.uptime_secs(),
    );

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}
