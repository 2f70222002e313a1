use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use catalog::{Catalog, PairEntry};
use session::{SessionConfig, SessionController, TracingSink};
use shared::{
    domain::{SessionId, Winner},
    error::{ApiError, ErrorCode, SessionError, StoreError},
    protocol::{CreateSessionRequest, CurrentPair, SessionSnapshot, SubmitVoteRequest},
};
use store::{SheetStoreClient, VoteStore};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

mod config;

use config::{load_settings, validate_data_dir};

struct AppState {
    catalog: Arc<Catalog>,
    store: Arc<dyn VoteStore>,
    session_config: SessionConfig,
    sessions: Mutex<HashMap<SessionId, Arc<SessionController>>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    validate_data_dir(&settings)?;

    let catalog = Catalog::scan(&settings.data_dir).map_err(|e| {
        error!(data_dir = %settings.data_dir.display(), %e, "failed to scan pair catalog");
        anyhow::anyhow!(e)
    })?;
    if catalog.is_empty() {
        anyhow::bail!(
            "no pair folders found under '{}'",
            settings.data_dir.display()
        );
    }
    info!(pairs = catalog.len(), data_dir = %settings.data_dir.display(), "pair catalog loaded");

    let base_url = Url::parse(&settings.store_base_url)?;
    let store: Arc<dyn VoteStore> =
        Arc::new(SheetStoreClient::new(base_url, settings.store_token.clone()));

    let state = Arc::new(AppState {
        catalog: Arc::new(catalog),
        store,
        session_config: SessionConfig {
            sheet_name: settings.sheet_name.clone(),
            flush_threshold: settings.flush_threshold,
            consistency_mode: settings.consistency_mode(),
        },
        sessions: Mutex::new(HashMap::new()),
    });
    let app = build_router(state, ServeDir::new(&settings.data_dir));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "survey server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, media: ServeDir) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/votes", post(submit_vote))
        .route("/sessions/:session_id/flush", post(flush_session))
        .nest_service("/media", media)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn media_urls(entry: &PairEntry) -> Vec<String> {
    entry
        .images
        .iter()
        .take(2)
        .filter_map(|path| {
            let name = path.file_name()?;
            // Pair folders and file names come straight off the filesystem
            // and may contain characters that need escaping in a URL path.
            let mut url = Url::parse("http://media.invalid/media").ok()?;
            url.path_segments_mut()
                .ok()?
                .extend([entry.pair_id.as_str(), &name.to_string_lossy()]);
            Some(url.path().to_string())
        })
        .collect()
}

async fn snapshot_response(controller: &SessionController) -> SessionSnapshot {
    let snap = controller.snapshot().await;
    SessionSnapshot {
        session_id: snap.session_id,
        complete: snap.complete,
        position: snap.cursor,
        total_pairs: snap.total_pairs,
        progress: snap.progress,
        pending_votes: snap.pending_votes,
        current: snap.current.as_ref().map(|entry| CurrentPair {
            pair_id: entry.pair_id.clone(),
            image_urls: media_urls(entry),
        }),
        sync_warning: snap.sync_warning,
    }
}

async fn lookup_session(
    state: &AppState,
    session_id: &str,
) -> Result<Arc<SessionController>, (StatusCode, Json<ApiError>)> {
    let sessions = state.sessions.lock().await;
    // Session ids are stored trimmed; trim the path segment the same way
    // so an id echoed back with stray whitespace still resolves.
    sessions
        .get(&SessionId(session_id.trim().to_string()))
        .cloned()
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(
                    ErrorCode::NotFound,
                    format!("unknown session '{session_id}'"),
                )),
            )
        })
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<ApiError>)> {
    let session_id = match req.participant_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => SessionId::parse(raw).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(ErrorCode::Validation, e.to_string())),
            )
        })?,
        _ => SessionId(Uuid::new_v4().to_string()),
    };

    let controller = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get(&session_id) {
            // Same participant id in the same process resumes the live
            // controller instead of forking a second cursor.
            Some(existing) => existing.clone(),
            None => {
                let controller = Arc::new(SessionController::new(
                    session_id.clone(),
                    state.catalog.clone(),
                    state.store.clone(),
                    Arc::new(TracingSink),
                    state.session_config.clone(),
                ));
                sessions.insert(session_id.clone(), controller.clone());
                controller
            }
        }
    };

    // Creating the session over HTTP is the participant's explicit start
    // action; the instructions screen lives on the client.
    controller.begin().await;
    Ok(Json(snapshot_response(&controller).await))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<ApiError>)> {
    let controller = lookup_session(&state, &session_id).await?;
    Ok(Json(snapshot_response(&controller).await))
}

async fn submit_vote(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitVoteRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<ApiError>)> {
    let controller = lookup_session(&state, &session_id).await?;
    let winner = Winner::parse(&req.winner).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(ErrorCode::Validation, e.to_string())),
        )
    })?;

    controller
        .record_decision(&req.pair_id, winner)
        .await
        .map_err(map_session_error)?;
    Ok(Json(snapshot_response(&controller).await))
}

async fn flush_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<ApiError>)> {
    let controller = lookup_session(&state, &session_id).await?;
    controller.flush().await.map_err(map_store_error)?;
    Ok(Json(snapshot_response(&controller).await))
}

fn map_session_error(error: SessionError) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &error {
        SessionError::NotStarted => (StatusCode::CONFLICT, ErrorCode::Conflict),
        SessionError::AlreadyComplete => (StatusCode::CONFLICT, ErrorCode::Conflict),
        SessionError::StalePair { .. } => (StatusCode::CONFLICT, ErrorCode::Conflict),
        SessionError::PairNotDefective(_) => (StatusCode::CONFLICT, ErrorCode::Conflict),
        SessionError::InvalidVote(_) => (StatusCode::BAD_REQUEST, ErrorCode::Validation),
    };
    (status, Json(ApiError::new(code, error.to_string())))
}

fn map_store_error(error: StoreError) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &error {
        StoreError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, ErrorCode::RateLimited),
        _ => (StatusCode::BAD_GATEWAY, ErrorCode::StoreUnavailable),
    };
    (status, Json(ApiError::new(code, error.to_string())))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
