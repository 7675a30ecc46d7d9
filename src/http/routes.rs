//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::app::AppState;
use crate::game::{PlayMode, SessionData, SessionError};
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::store::{SessionKey, StoreError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws/game/:mode/:user_id", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/session/:mode",
            get(session_view_handler).post(session_seed_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.registry.active_sessions(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

/// What a client shows before connecting to the game socket
#[derive(Debug, Serialize, Deserialize)]
struct SessionView {
    user_id: u64,
    mode: PlayMode,
    players_name: Vec<String>,
    win_history: Vec<usize>,
    game_round: usize,
    left_score: u32,
    right_score: u32,
}

impl From<&SessionData> for SessionView {
    fn from(data: &SessionData) -> Self {
        Self {
            user_id: data.user_id,
            mode: data.mode,
            players_name: data.players_name.clone(),
            win_history: data.win_history().to_vec(),
            game_round: data.game_round(),
            left_score: data.left_score,
            right_score: data.right_score,
        }
    }
}

async fn session_view_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(mode): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let key = SessionKey::new(PlayMode::from_path(&mode), auth.user_id);
    let data = state
        .sessions
        .load(&key)
        .await?
        .unwrap_or_else(|| SessionData::new(key.user_id, key.mode));

    Ok(Json(SessionView::from(&data)))
}

#[derive(Deserialize)]
struct SeedSessionRequest {
    players_name: Vec<String>,
}

async fn session_seed_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(mode): Path<String>,
    Json(req): Json<SeedSessionRequest>,
) -> Result<Json<SessionView>, AppError> {
    let mode = PlayMode::from_path(&mode);
    let data = SessionData::with_players(auth.user_id, mode, req.players_name)?;

    state
        .sessions
        .save(&data.key(), &data, state.config.session_ttl)
        .await?;
    info!(user_id = auth.user_id, mode = %mode, "Session seeded");

    Ok(Json(SessionView::from(&data)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::PlayerCount { .. } => AppError::BadRequest(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "Session store request failed");
        AppError::Internal("session store unavailable".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
