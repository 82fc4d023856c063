use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use study_flow::{ErrorKind, FlowError};
use tracing::{error, warn};

/// Error returned by every handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("unknown feature `{0}`")]
    UnknownFeature(String),

    #[error("session `{0}` not found")]
    SessionNotFound(String),

    #[error("notification {0} not found")]
    NotificationNotFound(u64),

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Flow(e) => match e.kind() {
                ErrorKind::UnsupportedFileType
                | ErrorKind::MissingInput
                | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::InvalidState | ErrorKind::Superseded => StatusCode::CONFLICT,
                ErrorKind::Timeout
                | ErrorKind::NetworkFailure
                | ErrorKind::InvalidResponseShape
                | ErrorKind::UpstreamError
                | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::UnknownFeature(_)
            | ApiError::SessionNotFound(_)
            | ApiError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> Value {
        match self {
            ApiError::Flow(e) => {
                let mut body = json!({
                    "error": e.user_message(),
                    "kind": e.kind(),
                    "details": e.to_string(),
                });
                if let FlowError::InvalidResponseShape {
                    raw_content: Some(raw),
                    ..
                } = e
                {
                    body["rawContent"] = Value::String(raw.clone());
                }
                body
            }
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        } else {
            warn!(status = %status, error = %self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
