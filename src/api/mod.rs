//! REST endpoints: auth, users, and projects.
//!
//! Every response uses the conventional JSON envelope — `{"success": true,
//! ...}` on the happy path, `{"success": false, "error": ...}` otherwise.
//! Only register and login are reachable without a bearer token.

pub mod store;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::ai::{GenerationBackend, MentionDispatcher};
use crate::auth::{Identity, TokenService, extract_bearer_http};
use crate::config::Config;
use crate::errors::TokenError;
use crate::room::RoomRegistry;

use store::{ProjectStore, StoreError, UserStore};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: Config,
    pub tokens: TokenService,
    pub users: UserStore,
    pub projects: ProjectStore,
    pub rooms: RoomRegistry,
    pub dispatcher: MentionDispatcher,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn GenerationBackend>) -> Self {
        let tokens = TokenService::new(config.secret_key.clone(), config.token_ttl);
        Self {
            config,
            tokens,
            users: UserStore::new(),
            projects: ProjectStore::new(),
            rooms: RoomRegistry::new(),
            dispatcher: MentionDispatcher::new(backend),
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddUsersRequest {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    pub users: Vec<Uuid>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        (status, Json(json!({"success": false, "error": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailTaken => ApiError::BadRequest(err.to_string()),
            StoreError::ProjectNotFound => ApiError::NotFound(err.to_string()),
            StoreError::NotAMember => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

/// Resolve the caller's identity from the request headers.
fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<(Identity, String), ApiError> {
    let token = extract_bearer_http(headers)
        .ok_or_else(|| ApiError::Unauthorized("No authentication token provided".to_string()))?;
    let identity = state.tokens.verify(&token)?;
    Ok((identity, token))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/users/register", post(register_user))
        .route("/api/users/login", post(login_user))
        .route("/api/users/logout", get(logout_user))
        .route("/api/users/profile", get(user_profile))
        .route("/api/users/all", get(list_users))
        .route("/api/projects/create", post(create_project))
        .route("/api/projects/all", get(list_projects))
        .route("/api/projects/get-project/{id}", get(get_project))
        .route("/api/projects/add-user", put(add_users))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

// ── User handlers ─────────────────────────────────────────────────────

async fn register_user(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "name, email and password are required".to_string(),
        ));
    }
    let user = state.users.register(&req.name, &req.email, &req.password)?;
    let token = state.tokens.mint(user.id, &user.email)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "user": user, "token": token})),
    )
        .into_response())
}

async fn login_user(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .users
        .authenticate(&req.email, &req.password)
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;
    let token = state.tokens.mint(user.id, &user.email)?;
    Ok(Json(json!({"success": true, "user": user, "token": token})))
}

async fn logout_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, token) = authenticate(&headers, &state)?;
    state.tokens.revoke(&token);
    Ok(Json(json!({"success": true, "message": "Logged out"})))
}

async fn user_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (identity, _) = authenticate(&headers, &state)?;
    let user = state
        .users
        .get(identity.id)
        .ok_or_else(|| ApiError::NotFound("User no longer exists".to_string()))?;
    Ok(Json(json!({"success": true, "user": user})))
}

async fn list_users(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (identity, _) = authenticate(&headers, &state)?;
    let users = state.users.list_others(identity.id);
    Ok(Json(json!({"success": true, "users": users})))
}

// ── Project handlers ──────────────────────────────────────────────────

async fn create_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Response, ApiError> {
    let (identity, _) = authenticate(&headers, &state)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Project name is required".to_string()));
    }
    let project = state.projects.create(req.name.trim(), identity.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "project": project})),
    )
        .into_response())
}

async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (identity, _) = authenticate(&headers, &state)?;
    let projects = state.projects.list_for(identity.id);
    Ok(Json(json!({"success": true, "projects": projects})))
}

async fn get_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authenticate(&headers, &state)?;
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid project ID '{id}'")))?;
    let project = state
        .projects
        .get(id)
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;
    Ok(Json(json!({"success": true, "project": project})))
}

async fn add_users(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<AddUsersRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (identity, _) = authenticate(&headers, &state)?;
    for user in &req.users {
        if state.users.get(*user).is_none() {
            return Err(ApiError::BadRequest(format!("Unknown user {user}")));
        }
    }
    let project = state
        .projects
        .add_members(req.project_id, identity.id, &req.users)?;
    Ok(Json(json!({"success": true, "project": project})))
}

// ── Tests ─────────────────────────────────────────────────────────────
