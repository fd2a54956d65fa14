//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use valuator_core::error::{InferenceError, StoreError};

use crate::models::ErrorBody;

/// Rejection of the shared-secret check
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid or missing API key.")]
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// Failures of the prediction and info endpoints
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The client sent something it can fix
    #[error("{0}")]
    Unprocessable(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] StoreError),

    #[error("Prediction failed: {0}")]
    Inference(InferenceError),
}

impl From<InferenceError> for ApiError {
    fn from(error: InferenceError) -> Self {
        match error {
            InferenceError::UnseenCategory { .. } | InferenceError::InvalidRecord(_) => {
                ApiError::Unprocessable(error.to_string())
            }
            other => ApiError::Inference(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unseen = ApiError::from(InferenceError::UnseenCategory {
            field: "sector".to_string(),
            value: "x".to_string(),
        });
        assert_eq!(unseen.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let non_finite = ApiError::from(InferenceError::NonFinite);
        assert_eq!(non_finite.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let broken = ApiError::from(InferenceError::Model("tree scoring failed".to_string()));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = ApiError::from(StoreError::NotFound("m".to_string()));
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(
            AuthError::InvalidKey.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
