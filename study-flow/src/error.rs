use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::phase::Phase;

/// Errors raised by the ingestion and generation pipelines
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    #[error("unsupported file type `{mime_type}`")]
    UnsupportedFileType { mime_type: String },

    #[error("{operation} timed out after {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("missing required input `{field}`")]
    MissingInput { field: String },

    #[error("invalid input `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("invalid response shape: {reason}")]
    InvalidResponseShape {
        reason: String,
        raw_content: Option<String>,
    },

    #[error("upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("pipeline is busy ({0})")]
    Busy(Phase),

    #[error("result discarded: the feature was reset while the request was in flight")]
    Superseded,

    #[error("storage error: {0}")]
    Storage(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Error taxonomy exposed to callers and stored in pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    UnsupportedFileType,
    Timeout,
    NetworkFailure,
    MissingInput,
    InvalidInput,
    InvalidResponseShape,
    UpstreamError,
    InvalidState,
    Superseded,
    Storage,
}

/// Serialisable projection of a [`FlowError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::UnsupportedFileType { .. } => ErrorKind::UnsupportedFileType,
            FlowError::Timeout { .. } => ErrorKind::Timeout,
            FlowError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            FlowError::MissingInput { .. } => ErrorKind::MissingInput,
            FlowError::InvalidInput { .. } => ErrorKind::InvalidInput,
            FlowError::InvalidResponseShape { .. } => ErrorKind::InvalidResponseShape,
            FlowError::Upstream { .. } => ErrorKind::UpstreamError,
            FlowError::InvalidTransition { .. } | FlowError::Busy(_) => ErrorKind::InvalidState,
            FlowError::Superseded => ErrorKind::Superseded,
            FlowError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the error stems from the caller's input rather than a collaborator
    pub fn is_input_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MissingInput | ErrorKind::InvalidInput | ErrorKind::UnsupportedFileType
        )
    }

    /// Text suitable for a dismissible notification
    pub fn user_message(&self) -> String {
        match self {
            FlowError::UnsupportedFileType { mime_type } => format!(
                "Files of type `{mime_type}` are not supported. Please upload a PDF or a plain text file."
            ),
            FlowError::Timeout { operation, .. } => format!(
                "The {operation} step took too long. Please try again, or use a smaller file."
            ),
            FlowError::NetworkFailure(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            FlowError::MissingInput { field } => format!("Please fill in `{field}`."),
            FlowError::InvalidInput { field, reason } => format!("`{field}` is invalid: {reason}"),
            FlowError::InvalidResponseShape { .. } => {
                "The response could not be understood. Please try again.".to_string()
            }
            FlowError::Upstream { message, .. } => format!("Generation failed: {message}"),
            FlowError::InvalidTransition { .. } | FlowError::Busy(_) => {
                "Please wait for the current step to finish.".to_string()
            }
            FlowError::Superseded => "The request was cancelled.".to_string(),
            FlowError::Storage(message) => format!("Saving failed: {message}"),
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind(),
            message: self.user_message(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_message_names_accepted_types() {
        let err = FlowError::UnsupportedFileType {
            mime_type: "application/msword".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedFileType);
        let message = err.user_message();
        assert!(message.contains("PDF"));
        assert!(message.contains("text"));
    }

    #[test]
    fn upstream_display_includes_status() {
        let err = FlowError::Upstream {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "upstream error (502): bad gateway");

        let err = FlowError::Upstream {
            status: None,
            message: "empty completion".to_string(),
        };
        assert_eq!(err.to_string(), "upstream error: empty completion");
    }

    #[test]
    fn state_errors_share_a_kind() {
        assert_eq!(FlowError::Busy(Phase::Uploading).kind(), ErrorKind::InvalidState);
        assert_eq!(
            FlowError::InvalidTransition {
                from: Phase::Ready,
                to: Phase::Uploading
            }
            .kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn error_info_serialises_camel_case_kind() {
        let info = FlowError::MissingInput {
            field: "topic".to_string(),
        }
        .info();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "missingInput");
    }
}
