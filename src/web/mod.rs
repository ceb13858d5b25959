//! HTTP/JSON surface: role-shaped routing, request/response shapes, and
//! error mapping. Handlers are thin: they extract, delegate to `AppState`,
//! and serialize the result.
//!
//! Role gating happens at the route table, not inside a handler: a
//! `Follower`'s router simply never has `/set` or `/config` registered, and
//! a `Leader`'s router never has `/replicate` registered. A misdirected
//! request gets axum's ordinary 404, not a role-check response.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::{NodeRole, RuntimeConfig};
use crate::core::{CoreError, ReplicationCommand};
use crate::follower::FollowerApply;
use crate::leader::LeaderWriter;
use crate::store::Store;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum WebError {
    Input(String),
    Internal(String),
    NotFound,
}

impl From<CoreError> for WebError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) => WebError::Input(msg),
            CoreError::InvalidConfiguration(msg) => WebError::Input(msg),
            CoreError::LockError(msg) => WebError::Internal(msg),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg),
            WebError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            WebError::NotFound => (StatusCode::NOT_FOUND, "key not found".to_string()),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// Everything a request handler needs, shared across the process.
///
/// `leader_writer`/`follower_apply` are populated according to `role`, but
/// the router never consults them to decide *whether* to serve a request —
/// only the route table does that. They exist purely so the role-specific
/// handlers have something to call.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub role: NodeRole,
    pub runtime_config: Arc<RuntimeConfig>,
    pub leader_writer: Option<Arc<LeaderWriter>>,
    pub follower_apply: Option<Arc<FollowerApply>>,
}

/// Builds the router for this node's role. The shared routes are always
/// present; `/set` and `/config` are added only for a `Leader`, `/replicate`
/// only for a `Follower`.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/get/{key}", get(get_key))
        .route("/dump", get(dump))
        .route("/dump-versions", get(dump_versions));

    let router = match state.role {
        NodeRole::Leader => router
            .route("/set", post(set))
            .route("/config", post(update_config)),
        NodeRole::Follower => router.route("/replicate", post(replicate)),
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    role: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        role: match state.role {
            NodeRole::Leader => "Leader",
            NodeRole::Follower => "Follower",
        },
    })
}

async fn get_key(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<String>> {
    match state.store.get(&key) {
        Some(value) => Ok(Json(value)),
        None => Err(WebError::NotFound),
    }
}

async fn dump(State(state): State<AppState>) -> Json<std::collections::HashMap<String, String>> {
    Json(state.store.dump())
}

async fn dump_versions(
    State(state): State<AppState>,
) -> Json<std::collections::HashMap<String, u64>> {
    Json(state.store.dump_versions())
}

#[derive(Debug, Deserialize)]
struct SetQuery {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct SetResponse {
    success: bool,
    quorum: usize,
    acks: usize,
}

/// Applies locally, fans out to followers, and returns once the configured
/// write quorum is satisfied or every follower has answered.
async fn set(
    State(state): State<AppState>,
    Query(request): Query<SetQuery>,
) -> Result<Json<SetResponse>> {
    let writer = state
        .leader_writer
        .as_ref()
        .expect("route only registered on a Leader, where leader_writer is always set");

    let result = writer
        .write(request.key, request.value, CancellationToken::new())
        .await?;

    Ok(Json(SetResponse {
        success: result.is_success,
        quorum: result.required_quorum,
        acks: result.successful_followers,
    }))
}

#[derive(Debug, Deserialize)]
struct ConfigUpdateRequest {
    #[serde(rename = "writeQuorum")]
    write_quorum: Option<usize>,
    #[serde(rename = "minDelayMs")]
    min_delay_ms: Option<u64>,
    #[serde(rename = "maxDelayMs")]
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    #[serde(rename = "writeQuorum")]
    write_quorum: usize,
    #[serde(rename = "minDelayMs")]
    min_delay_ms: u64,
    #[serde(rename = "maxDelayMs")]
    max_delay_ms: u64,
}

/// Each field is applied atomically and independently; there is no
/// cross-field snapshot, only the post-update reads below.
async fn update_config(
    State(state): State<AppState>,
    Json(request): Json<ConfigUpdateRequest>,
) -> Result<Json<ConfigResponse>> {
    state.runtime_config.apply_update(
        request.write_quorum,
        request.min_delay_ms,
        request.max_delay_ms,
    )?;
    Ok(Json(ConfigResponse {
        write_quorum: state.runtime_config.write_quorum(),
        min_delay_ms: state.runtime_config.min_delay_ms(),
        max_delay_ms: state.runtime_config.max_delay_ms(),
    }))
}

#[derive(Debug, Serialize)]
struct ReplicateResponse {
    applied: bool,
}

/// Applies the incoming command and acknowledges only after the apply has
/// committed to the local store. Never further propagates.
async fn replicate(
    State(state): State<AppState>,
    Json(command): Json<ReplicationCommand>,
) -> Result<Json<ReplicateResponse>> {
    let apply = state
        .follower_apply
        .as_ref()
        .expect("route only registered on a Follower, where follower_apply is always set");
    apply.apply(command)?;
    Ok(Json(ReplicateResponse { applied: true }))
}
