//! API Server Module
//!
//! This module contains the server setup functionality for the API system.

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{health_check, model_info, predict, require_api_key, ApiState};
use crate::models::ServerConfig;

/// Build the application router
///
/// Only `/predict` sits behind the API key check.
pub fn router(state: Arc<ApiState>) -> Router {
    let predict_route = post(predict)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(model_info))
        .route("/predict", predict_route)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server
pub struct ApiServer {
    /// Server configuration
    config: ServerConfig,
    /// Shared state
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ServerConfig, state: ApiState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Start the API server and run until Ctrl-C
    pub async fn start(&self) -> Result<()> {
        let address = self.config.address();
        info!("Starting valuation API server on {}", address);

        let app = router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", address, e))?;
        info!("Valuation API server listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start API server: {}", e))?;

        info!("Valuation API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use valuator_core::{ModelPipeline, ModelStore, PropertyRecord, TrainingTable};

    const KEY: &str = "test-key";

    fn record_json() -> Value {
        json!({
            "type": "house",
            "sector": "north",
            "net_usable_area": 120.0,
            "net_area": 135.0,
            "n_rooms": 3,
            "n_bathroom": 2,
            "year_built": 1998
        })
    }

    fn empty_store(dir: &TempDir) -> ModelStore {
        let uri = format!("file:{}", dir.path().display());
        ModelStore::new("api-test", &uri, &uri).unwrap()
    }

    async fn registered_store(dir: &TempDir) -> ModelStore {
        let mut records = Vec::new();
        let mut prices = Vec::new();
        for i in 0..30u32 {
            let area = 60.0 + f64::from(i % 9) * 20.0;
            records.push(PropertyRecord {
                property_type: ["house", "apartment"][(i % 2) as usize].to_string(),
                sector: ["north", "south"][((i / 2) % 2) as usize].to_string(),
                net_usable_area: area,
                net_area: area + 10.0 + f64::from(i % 3),
                n_rooms: 1 + (i / 3) % 4,
                n_bathroom: 1 + (i / 4) % 2,
                year_built: 1960 + (i * 7) % 50,
            });
            prices.push(2_000.0 * area);
        }
        let table = TrainingTable::new(records, prices).unwrap();
        let (fitted, _) = ModelPipeline::default().fit(&table).unwrap();

        let store = empty_store(dir);
        store.save(&fitted, &BTreeMap::new(), &[]).await.unwrap();
        store
    }

    fn predict_request(key: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_or_wrong_key_is_unauthorized() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(ApiState::new(KEY, empty_store(&dir))));

        let payloads = [record_json().to_string(), "{}".to_string(), "not json".to_string()];
        for payload in payloads {
            for key in [None, Some("wrong")] {
                let response = app
                    .clone()
                    .oneshot(predict_request(key, payload.clone()))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
                let body = body_json(response).await;
                assert_eq!(body["detail"], "Invalid or missing API key.");
            }
        }
    }

    #[tokio::test]
    async fn test_missing_field_is_unprocessable() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(ApiState::new(KEY, empty_store(&dir))));

        for field in ["type", "sector", "net_area", "year_built"] {
            let mut payload = record_json();
            payload.as_object_mut().unwrap().remove(field);
            let response = app
                .clone()
                .oneshot(predict_request(Some(KEY), payload.to_string()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            assert!(body_json(response).await["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn test_health_does_not_need_a_model() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(ApiState::new(KEY, empty_store(&dir))));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_without_model_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ApiState::new(KEY, empty_store(&dir)));
        let app = router(state.clone());

        let response = app
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!state.model.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ApiState::new(KEY, empty_store(&dir)));
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(predict_request(Some(KEY), record_json().to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        registered_store(&dir).await;
        let response = app
            .oneshot(predict_request(Some(KEY), record_json().to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.model.is_loaded());
    }

    #[tokio::test]
    async fn test_predict_and_info() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(ApiState::new(KEY, registered_store(&dir).await)));

        let response = app
            .clone()
            .oneshot(predict_request(Some(KEY), record_json().to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let price = body_json(response).await["price"].as_f64().unwrap();
        assert!(price.is_finite() && price > 0.0);

        let response = app
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info = body_json(response).await;
        assert_eq!(info["model_name"], "api-test");
        assert_eq!(info["model_version"], 1);
    }

    #[tokio::test]
    async fn test_unseen_category_and_bad_values_are_unprocessable() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(ApiState::new(KEY, registered_store(&dir).await)));

        let mut unseen = record_json();
        unseen["sector"] = json!("atlantis");
        let mut negative = record_json();
        negative["net_area"] = json!(-5.0);
        let mut coerced = record_json();
        coerced["n_rooms"] = json!("3");
        let mut extra = record_json();
        extra["pool"] = json!(true);

        for payload in [unseen, negative, coerced, extra] {
            let response = app
                .clone()
                .oneshot(predict_request(Some(KEY), payload.to_string()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }
}
