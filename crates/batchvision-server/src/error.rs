use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use batchvision_core::api_types::ErrorResponse;
use batchvision_core::BatchVisionError;

/// Errors a handler can answer with, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// The model or the service behind it produced something unusable.
    Upstream(String),
    Core(BatchVisionError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Core(err) => match err {
                BatchVisionError::RunInProgress => StatusCode::CONFLICT,
                BatchVisionError::NotFound(_) => StatusCode::NOT_FOUND,
                BatchVisionError::InvalidSchema(_)
                | BatchVisionError::Config(_)
                | BatchVisionError::Json(_) => StatusCode::BAD_REQUEST,
                BatchVisionError::Validation(_) | BatchVisionError::Rejected(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                BatchVisionError::Extraction(_) | BatchVisionError::Http(_) => {
                    StatusCode::BAD_GATEWAY
                }
                BatchVisionError::InvalidTransition { .. } | BatchVisionError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::BadRequest(message) | AppError::Upstream(message) => message.clone(),
            AppError::Core(err) => err.to_string(),
        }
    }
}

impl From<BatchVisionError> for AppError {
    fn from(err: BatchVisionError) -> Self {
        AppError::Core(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %message, "Request rejected");
        }
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchvision_core::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(BatchVisionError::RunInProgress).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(BatchVisionError::Validation(ValidationError::NoUsableFields)).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(BatchVisionError::Extraction("timeout".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::bad_request("x").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rejection_message_is_verbatim() {
        let err = AppError::from(BatchVisionError::Rejected("No total visible".into()));
        assert_eq!(err.message(), "No total visible");
    }
}
