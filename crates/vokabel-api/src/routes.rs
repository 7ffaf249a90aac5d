use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vokabel_core::db::SqliteCollection;
use vokabel_core::sync::{SyncRequest, SyncResponse, WordCollection};
use vokabel_core::timestamp::{self, Timestamp};
use vokabel_core::Entry;

use crate::auth::verify_sync_token;
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    server: Arc<Mutex<SyncServer>>,
}

/// The authoritative collection plus the last server time handed out.
/// Merges run one at a time under the state mutex.
struct SyncServer {
    collection: SqliteCollection,
    last_server_time: Option<Timestamp>,
}

impl SyncServer {
    /// Server times never repeat or go backwards, so every stored change is
    /// strictly after the watermark of any earlier response.
    fn next_server_time(&mut self) -> Timestamp {
        let now = timestamp::stamp_after(timestamp::now(), self.last_server_time);
        self.last_server_time = Some(now);
        now
    }
}

impl AppState {
    pub fn open(config: Arc<AppConfig>) -> Result<Self, vokabel_core::Error> {
        let collection = SqliteCollection::open(&config.db_path)?;
        tracing::info!(
            path = %config.db_path.display(),
            words = collection.count()?,
            "Opened word collection"
        );
        Ok(Self::with_collection(config, collection))
    }

    pub fn with_collection(config: Arc<AppConfig>, collection: SqliteCollection) -> Self {
        Self {
            config,
            server: Arc::new(Mutex::new(SyncServer {
                collection,
                last_server_time: None,
            })),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/words/sync", post(sync_words))
        .route("/words", get(list_words))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_sync_token,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", protected_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_sync_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.sync_token.as_deref() {
        verify_sync_token(request.headers(), expected)?;
    }
    Ok(next.run(request).await)
}

async fn sync_words(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SyncResponse>, AppError> {
    let mut server = state.server.lock().await;
    let now = server.next_server_time();
    let request = SyncRequest::decode(&body, now)?;
    let response = server.collection.merge(&request, now)?;
    Ok(Json(response))
}

async fn list_words(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, AppError> {
    let server = state.server.lock().await;
    Ok(Json(server.collection.all()?))
}
