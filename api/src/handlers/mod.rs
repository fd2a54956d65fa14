//! API Handlers Module
//!
//! This module contains the request handlers for the API system.

use axum::{
    body::Bytes,
    debug_handler,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{Json, Response},
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use valuator_core::error::StoreError;
use valuator_core::schema::FieldRanges;
use valuator_core::{FittedModel, ModelStore, PriceOutput, PropertyRecord, Settings, ValuatorError};

use crate::error::{ApiError, AuthError};
use crate::models::{HealthResponse, InfoResponse};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Lazily loaded model shared by all requests
///
/// The first successful load is kept for the life of the process. A failed
/// load leaves the handle empty so the next request tries again.
pub struct ModelHandle {
    store: ModelStore,
    model: OnceCell<Arc<FittedModel>>,
}

impl ModelHandle {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store,
            model: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<FittedModel>, StoreError> {
        self.model
            .get_or_try_init(|| async {
                debug!("Loading latest version of '{}'", self.store.name());
                self.store.load_latest().await.map(Arc::new)
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }
}

/// Represents the state of the API server
pub struct ApiState {
    /// Shared secret expected in `X-API-Key`
    pub api_key: String,
    /// Model served by `/predict`
    pub model: ModelHandle,
    /// Ranges a request record must satisfy
    pub ranges: FieldRanges,
}

impl ApiState {
    pub fn new(api_key: impl Into<String>, store: ModelStore) -> Self {
        Self {
            api_key: api_key.into(),
            model: ModelHandle::new(store),
            ranges: FieldRanges::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ValuatorError> {
        let api_key = settings.require_api_key()?;
        let store = ModelStore::from_settings(settings)?;
        Ok(Self::new(api_key, store))
    }
}

/// Reject requests without the shared secret before the body is read
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if keys_match(key.as_bytes(), state.api_key.as_bytes()) => {
            Ok(next.run(request).await)
        }
        _ => {
            warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            Err(AuthError::InvalidKey)
        }
    }
}

/// Length-independent comparison of the provided and expected key
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let mut diff = provided.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = provided.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}

/// Health check endpoint
#[debug_handler]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Name and version of the served model
#[debug_handler]
pub async fn model_info(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<InfoResponse>, ApiError> {
    let model = state.model.get().await?;
    Ok(Json(InfoResponse {
        model_name: model.metadata.name.clone(),
        model_version: model.metadata.version,
    }))
}

/// Price a single property
#[debug_handler]
pub async fn predict(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PriceOutput>, ApiError> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("n/a")
        .to_string();

    let record: PropertyRecord = serde_json::from_slice(&body).map_err(|e| {
        debug!(request_id = %request_id, "Rejected payload: {}", e);
        ApiError::Unprocessable(format!("Invalid request body: {}", e))
    })?;
    record.check(&state.ranges)?;

    let model = state.model.get().await?;
    let price = model.pipeline.predict(&record)?;

    info!(
        request_id = %request_id,
        model_version = model.metadata.version,
        price,
        "Prediction served"
    );
    Ok(Json(PriceOutput::from_prediction(price)))
}
