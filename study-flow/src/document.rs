use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Accepted document families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Classify a MIME type; parameters such as `; charset=utf-8` are ignored.
    pub fn classify(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/pdf" {
            Some(DocumentKind::Pdf)
        } else if essence.strip_prefix("text/").is_some_and(|sub| !sub.is_empty()) {
            Some(DocumentKind::Text)
        } else {
            None
        }
    }
}

/// A file selected by the user. Owned by the ingestion pipeline until
/// extraction settles, then dropped.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn kind(&self) -> Result<DocumentKind> {
        DocumentKind::classify(&self.mime_type).ok_or_else(|| FlowError::UnsupportedFileType {
            mime_type: self.mime_type.clone(),
        })
    }
}

/// Text pulled out of an uploaded document; may legitimately be empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedText {
    pub content: String,
    pub source_file_name: Option<String>,
}
