use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::document::{ExtractedText, UploadedDocument};
use crate::error::{FlowError, Result};
use crate::feature::FeatureSpec;
use crate::phase::Phase;
use crate::timeout::with_timeout;

pub const TEXT_CONTENT: &str = "text_content";
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_url: String,
}

/// Reply of the extraction collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ExtractionResponse {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            output: Some(json!({ TEXT_CONTENT: text.into() })),
            details: None,
        }
    }

    pub fn failure(details: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            output: None,
            details: Some(details.into()),
        }
    }
}

/// File upload and schema-driven extraction collaborator
#[async_trait]
pub trait FileService: Send + Sync {
    async fn upload(&self, document: &UploadedDocument) -> Result<UploadReceipt>;

    async fn extract(&self, file_url: &str, schema: &Value) -> Result<ExtractionResponse>;

    /// Release whatever is still held for `file_url`. Called once the ingestion
    /// that uploaded it ends, however it ends.
    fn discard(&self, _file_url: &str) {}
}

/// Hands an uploaded file back to the service when the ingestion is over
struct UploadLease<'a> {
    files: &'a dyn FileService,
    file_url: &'a str,
}

impl Drop for UploadLease<'_> {
    fn drop(&mut self) {
        self.files.discard(self.file_url);
    }
}

/// Receives each ingestion step before it starts. Returning an error aborts
/// the ingestion with that error.
pub trait IngestionObserver: Send {
    fn on_step(&mut self, phase: Phase, progress: &str) -> Result<()>;
}

/// Observer for callers that track no state
pub struct IgnoreSteps;

impl IngestionObserver for IgnoreSteps {
    fn on_step(&mut self, _phase: Phase, _progress: &str) -> Result<()> {
        Ok(())
    }
}

pub fn uploading_label(file_name: &str) -> String {
    format!("Uploading {file_name}…")
}

pub fn processing_label(file_name: &str) -> String {
    format!("Processing {file_name}…")
}

/// Shape requested from the extraction collaborator
pub fn text_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            TEXT_CONTENT: { "type": "string" }
        },
        "required": [TEXT_CONTENT]
    })
}

/// Upload → extract, each step under its own deadline, strictly sequential
#[derive(Clone)]
pub struct IngestionPipeline {
    files: Arc<dyn FileService>,
    upload_budget: Duration,
    extract_budget: Duration,
}

impl IngestionPipeline {
    pub fn new(files: Arc<dyn FileService>, config: &PipelineConfig) -> Self {
        Self {
            files,
            upload_budget: config.upload_timeout(),
            extract_budget: config.extract_timeout(),
        }
    }

    /// Reject documents the feature does not accept, before any call is made
    pub fn check_type(&self, spec: &FeatureSpec, document: &UploadedDocument) -> Result<()> {
        let kind = document.kind()?;
        if !spec.accepts(kind) {
            return Err(FlowError::UnsupportedFileType {
                mime_type: document.mime_type.clone(),
            });
        }
        Ok(())
    }

    pub async fn upload(&self, document: &UploadedDocument) -> Result<UploadReceipt> {
        info!(
            file_name = %document.file_name,
            mime_type = %document.mime_type,
            bytes = document.bytes.len(),
            "uploading document"
        );
        with_timeout(self.files.upload(document), self.upload_budget, "upload")
            .await
            .inspect_err(|e| error!(file_name = %document.file_name, error = %e, "upload failed"))
    }

    pub async fn extract(&self, receipt: &UploadReceipt, file_name: &str) -> Result<ExtractedText> {
        let schema = text_schema();
        let response = with_timeout(
            self.files.extract(&receipt.file_url, &schema),
            self.extract_budget,
            "extraction",
        )
        .await
        .inspect_err(|e| error!(file_name = %file_name, error = %e, "extraction failed"))?;

        let content = read_text_content(response)
            .inspect_err(|e| error!(file_name = %file_name, error = %e, "extraction rejected"))?;

        if content.trim().is_empty() {
            warn!(file_name = %file_name, "extraction succeeded but produced no text");
        } else {
            info!(file_name = %file_name, chars = content.len(), "extraction completed");
        }

        Ok(ExtractedText {
            content,
            source_file_name: Some(file_name.to_string()),
        })
    }

    /// MIME gate, then upload, then extraction. The document is dropped as
    /// soon as the upload has been accepted, and the uploaded file is
    /// discarded on every exit after that.
    pub async fn run(
        &self,
        spec: &FeatureSpec,
        document: UploadedDocument,
        observer: &mut dyn IngestionObserver,
    ) -> Result<ExtractedText> {
        if let Err(e) = self.check_type(spec, &document) {
            warn!(file_name = %document.file_name, mime_type = %document.mime_type, "unsupported file type");
            return Err(e);
        }

        let file_name = document.file_name.clone();
        observer.on_step(Phase::Uploading, &uploading_label(&file_name))?;
        let receipt = self.upload(&document).await?;
        drop(document);
        let _lease = UploadLease {
            files: self.files.as_ref(),
            file_url: &receipt.file_url,
        };

        observer.on_step(Phase::Extracting, &processing_label(&file_name))?;
        self.extract(&receipt, &file_name).await
    }
}

fn read_text_content(response: ExtractionResponse) -> Result<String> {
    if response.status != STATUS_SUCCESS {
        return Err(FlowError::Upstream {
            status: None,
            message: response
                .details
                .unwrap_or_else(|| format!("extraction status `{}`", response.status)),
        });
    }

    let output = response.output.unwrap_or(Value::Null);
    match output.get(TEXT_CONTENT) {
        Some(Value::String(text)) => Ok(text.clone()),
        _ => Err(FlowError::InvalidResponseShape {
            reason: format!("extraction output lacks `{TEXT_CONTENT}`"),
            raw_content: Some(output.to_string()),
        }),
    }
}
