use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdf_qa_core::AskError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Ask(#[from] AskError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Ask(error) => match error {
                AskError::EmptyQuestion => StatusCode::BAD_REQUEST,
                AskError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
                AskError::Embedding(_) | AskError::Generation(_) => StatusCode::BAD_GATEWAY,
                AskError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_qa_core::{IndexError, ServiceError};

    #[test]
    fn ask_errors_map_to_http_statuses() {
        let cases = [
            (AppError::from(AskError::EmptyQuestion), StatusCode::BAD_REQUEST),
            (
                AppError::from(AskError::Generation(ServiceError::Decode("x".to_string()))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::from(AskError::Index(IndexError::Corrupt("x".to_string()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::from(AskError::NotReady("ingestion running".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }
}
