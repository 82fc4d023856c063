use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use dashmap::DashMap;
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use serde_json::{Value, json};
use std::io::Cursor;
use study_flow::ingest::TEXT_CONTENT;
use study_flow::providers::OpenRouterClient;
use study_flow::{
    DocumentKind, ExtractionResponse, FileService, Result, UploadReceipt, UploadedDocument,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOCAL_SCHEME: &str = "local://";

/// Vision-model transcription of rendered PDF pages
#[derive(Clone)]
pub struct PdfOcr {
    client: OpenRouterClient,
    model: String,
}

impl PdfOcr {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// PDF → page images → one OCR call → text
    pub async fn transcribe(&self, pdf: Vec<u8>) -> anyhow::Result<String> {
        let images = render_pages(pdf).await?;
        if images.is_empty() {
            return Err(anyhow!("no pages rendered from PDF"));
        }
        info!(pages = images.len(), "running OCR over rendered pages");

        let mut content = vec![json!({
            "type": "text",
            "text": format!(
                "You are an OCR system for study material. I'm providing {} pages of a document written in Hebrew or English. \
                Extract ALL text with perfect accuracy, preserving structure, headings, lists and formulas. \
                Return ONLY the extracted text without any commentary.",
                images.len()
            )
        })];
        for image in &images {
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/png;base64,{}", image_to_base64(image)?)
                }
            }));
        }

        let text = self.client.chat(&self.model, content, 4000, false).await?;
        Ok(text)
    }
}

async fn render_pages(pdf: Vec<u8>) -> anyhow::Result<Vec<DynamicImage>> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<DynamicImage>> {
        let pdf = PDF::from_bytes(pdf).map_err(|e| anyhow!("Failed to load PDF: {}", e))?;
        pdf.render(Pages::All, None)
            .map_err(|e| anyhow!("Failed to render PDF pages: {}", e))
    })
    .await?
}

fn image_to_base64(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {}", e))?;
    Ok(STANDARD.encode(&buffer))
}

struct StoredFile {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

/// In-process [`FileService`]: uploads are held in memory until extracted
pub struct LocalFileService {
    files: DashMap<String, StoredFile>,
    ocr: Option<PdfOcr>,
}

impl LocalFileService {
    pub fn new(ocr: Option<PdfOcr>) -> Self {
        Self {
            files: DashMap::new(),
            ocr,
        }
    }

    pub fn pending(&self) -> usize {
        self.files.len()
    }

    async fn read_text(&self, file: StoredFile) -> anyhow::Result<String> {
        match DocumentKind::classify(&file.mime_type) {
            Some(DocumentKind::Text) => Ok(String::from_utf8_lossy(&file.bytes).into_owned()),
            Some(DocumentKind::Pdf) => {
                let ocr = self
                    .ocr
                    .as_ref()
                    .ok_or_else(|| anyhow!("PDF extraction is not configured"))?;
                ocr.transcribe(file.bytes).await
            }
            None => Err(anyhow!("cannot extract text from `{}`", file.mime_type)),
        }
    }
}

fn wants_text_content(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(|p| p.get(TEXT_CONTENT))
        .is_some()
}

#[async_trait]
impl FileService for LocalFileService {
    async fn upload(&self, document: &UploadedDocument) -> Result<UploadReceipt> {
        let file_url = format!("{LOCAL_SCHEME}{}", Uuid::new_v4());
        self.files.insert(
            file_url.clone(),
            StoredFile {
                file_name: document.file_name.clone(),
                mime_type: document.mime_type.clone(),
                bytes: document.bytes.clone(),
            },
        );
        Ok(UploadReceipt { file_url })
    }

    async fn extract(&self, file_url: &str, schema: &Value) -> Result<ExtractionResponse> {
        if !wants_text_content(schema) {
            return Ok(ExtractionResponse::failure(format!(
                "only `{TEXT_CONTENT}` extraction is supported"
            )));
        }
        let Some((_, file)) = self.files.remove(file_url) else {
            return Ok(ExtractionResponse::failure(format!("unknown file `{file_url}`")));
        };

        let file_name = file.file_name.clone();
        Ok(match self.read_text(file).await {
            Ok(text) => {
                info!(file_name = %file_name, chars = text.len(), "text extracted");
                ExtractionResponse::success(text)
            }
            Err(e) => {
                warn!(file_name = %file_name, error = %e, "text extraction failed");
                ExtractionResponse::failure(e.to_string())
            }
        })
    }

    fn discard(&self, file_url: &str) {
        if let Some((_, file)) = self.files.remove(file_url) {
            debug!(file_name = %file.file_name, "discarded unextracted upload");
        }
    }
}
