use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use wabiz_core::ApiResponse;
use wabiz_worker::WorkerError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("Missing or invalid API token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Worker(err) => match err {
                WorkerError::Validation(_) | WorkerError::Webhook(_) | WorkerError::Template(_) => {
                    StatusCode::BAD_REQUEST
                }
                WorkerError::InvalidSignature => StatusCode::UNAUTHORIZED,
                WorkerError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
                WorkerError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                WorkerError::Provider(_) => StatusCode::BAD_GATEWAY,
                WorkerError::Db(_) | WorkerError::Unrecorded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Worker(WorkerError::Db(_)) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "Request failed");
                self.to_string()
            }
            _ => {
                tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
                self.to_string()
            }
        };

        let mut response = (status, Json(ApiResponse::error(message))).into_response();
        if let ApiError::Worker(WorkerError::RateLimited { retry_after_secs }) = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
