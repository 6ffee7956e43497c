//! ==============================================================================
//! server.rs - http api for devices and the dashboard
//! ==============================================================================
//!
//! routes:
//!     GET    /registros/:device   readings of one device, newest first (row capped)
//!     GET    /registrosJSON       every reading as a downloadable json file
//!     GET    /dispositivos        distinct device names
//!     POST   /registro            store one reading with its data
//!     DELETE /registros           drop every reading
//!     *                           404 {"message": "Not found"}
//!
//! every handler gets the store through router state; nothing here is global.
//! storage calls are blocking (sqlite) and run on tokio's blocking pool.
//! a failing request answers 4xx/5xx and the process keeps serving.
//!
//! relationships:
//!     - used by: main.rs (router + serve)
//!     - uses: storage.rs (ReadingStore), ingest.rs (payload decoding)
//!
//! ==============================================================================

use crate::config::HostConfig;
use crate::domain::Reading;
use crate::ingest;
use crate::storage::{ReadingStore, StorageError, StorageResult};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const ACCEPT_LENGTH: HeaderName = HeaderName::from_static("accept-length");

// ==============================================================================
// shared state
// ==============================================================================
// cheap to clone: both halves are behind Arc. the store is opened once in
// main and lives until the server shuts down.

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub config: Arc<HostConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>, config: HostConfig) -> Self {
        Self { store, config: Arc::new(config) }
    }

    /// run a storage call on the blocking pool
    async fn with_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ReadingStore) -> StorageResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        let out = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(StorageError::from)??;
        Ok(out)
    }
}

// ==============================================================================
// errors
// ==============================================================================

/// per-request failures; each one becomes a json error response
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode response: {0}")]
    Encode(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("[API] {}", self);
            "Internal server error".to_string()
        } else {
            tracing::warn!("[API] {}", self);
            self.to_string()
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

// ==============================================================================
// router
// ==============================================================================

/// Build the axum router with all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        // wrong method on a known path answers like an unknown path
        .route("/registros/:device", get(readings_for_device).fallback(not_found))
        .route("/registrosJSON", get(export_json).fallback(not_found))
        .route("/dispositivos", get(list_devices).fallback(not_found))
        .route("/registro", post(create_reading).fallback(not_found))
        .route("/registros", delete(delete_readings).fallback(not_found))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==============================================================================
// handlers
// ==============================================================================

/// GET /registros/:device
async fn readings_for_device(
    State(state): State<AppState>,
    Path(device): Path<String>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let limit = state.config.query.device_row_limit;
    let readings = state
        .with_store(move |store| store.readings_for_device(&device, limit))
        .await?;
    Ok(Json(readings))
}

/// GET /registrosJSON - pretty printed attachment with its byte length declared
async fn export_json(State(state): State<AppState>) -> Result<Response, ApiError> {
    let readings = state.with_store(|store| store.export_all()).await?;
    let body = serde_json::to_vec_pretty(&readings).map_err(|e| ApiError::Encode(e.to_string()))?;

    let disposition = format!("attachment; filename={}", state.config.export.filename);
    let length = body.len().to_string();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (ACCEPT_LENGTH, length),
        ],
        body,
    )
        .into_response())
}

/// GET /dispositivos
async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let devices = state.with_store(|store| store.devices()).await?;
    Ok(Json(devices))
}

/// POST /registro
///
/// the body is read raw so devices that skip the content-type header are
/// still accepted.
async fn create_reading(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reading = ingest::decode(state.config.ingest.payload, &body)?;
    if state.config.logging.show_payloads {
        tracing::debug!("[INGEST] {:?}", reading);
    }

    let device = reading.device.clone();
    let points = reading.data.len();
    let id = state
        .with_store(move |store| store.create_reading(&reading))
        .await?;
    tracing::info!("[INGEST] registro {} from {:?} ({} datos)", id, device, points);

    Ok(Json(json!({ "message": "Registro created successfully" })))
}

/// DELETE /registros
async fn delete_readings(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let removed = state.with_store(|store| store.delete_all()).await?;
    tracing::info!("[API] deleted {} registros", removed);
    Ok(StatusCode::OK)
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}
