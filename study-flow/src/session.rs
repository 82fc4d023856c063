//! FeatureSession – one feature instance driving its pipelines against its state store.
//!
//! A session owns a [`FeatureStore`] and runs every ingestion and generation
//! through it:
//!
//! * **ingest**: MIME gate → full file reset → `uploading` → `extracting` → `ready`.
//!   A failed step moves the session to `failed` and clears the file name.
//! * **generate**: inputs are completed from the store (topic, concepts, extracted
//!   text), validated, then the result slot is cleared before the single call.
//! * **reset / clear_file**: restore defaults and invalidate whatever is in flight.
//!
//! Every operation that starts a network step captures the store's request token.
//! When the step settles, its outcome is committed only if the token is unchanged;
//! otherwise the outcome is dropped and the call returns [`FlowError::Superseded`].
//!
//! The store lock is never held across an `.await`, so reads such as
//! [`FeatureSession::snapshot`] stay available while a call is in flight.

use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::capabilities::Clipboard;
use crate::document::{ExtractedText, UploadedDocument};
use crate::error::{FlowError, Result};
use crate::feature::{FeatureKind, FieldKind, Language};
use crate::generate::GenerationPipeline;
use crate::ingest::{IngestionObserver, IngestionPipeline};
use crate::phase::Phase;
use crate::request::GenerationRequest;
use crate::state::{FeatureSnapshot, FeatureStore};

fn lock(store: &Mutex<FeatureStore>) -> MutexGuard<'_, FeatureStore> {
    store
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy)]
enum Flag {
    Loading,
    Uploading,
}

/// Lowers a busy flag when the operation ends, however it ends, unless a newer
/// request owns the store by then.
struct FlagGuard<'a> {
    store: &'a Mutex<FeatureStore>,
    token: u64,
    flag: Flag,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        let mut store = lock(self.store);
        if store.token() != self.token {
            return;
        }
        match self.flag {
            Flag::Loading => store.set_loading(false),
            Flag::Uploading => store.set_uploading(false),
        }
    }
}

/// Moves the store through the ingestion phases while the token still matches
struct StoreObserver<'a> {
    store: &'a Mutex<FeatureStore>,
    token: u64,
}

impl IngestionObserver for StoreObserver<'_> {
    fn on_step(&mut self, phase: Phase, progress: &str) -> Result<()> {
        let mut store = lock(self.store);
        if store.token() != self.token {
            return Err(FlowError::Superseded);
        }
        store.pipeline_mut().advance_with(phase, progress)
    }
}

pub struct FeatureSession {
    id: String,
    feature: FeatureKind,
    store: Mutex<FeatureStore>,
    ingestion: IngestionPipeline,
    generation: GenerationPipeline,
}

impl FeatureSession {
    pub fn new(
        id: impl Into<String>,
        store: FeatureStore,
        ingestion: IngestionPipeline,
        generation: GenerationPipeline,
    ) -> Self {
        Self {
            id: id.into(),
            feature: store.feature(),
            store: Mutex::new(store),
            ingestion,
            generation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn feature(&self) -> FeatureKind {
        self.feature
    }

    fn store(&self) -> MutexGuard<'_, FeatureStore> {
        lock(&self.store)
    }

    pub fn snapshot(&self) -> FeatureSnapshot {
        self.store().snapshot()
    }

    /// Turn a user file into source text for this feature.
    pub async fn ingest(&self, document: UploadedDocument) -> Result<ExtractedText> {
        let spec = self.feature.spec();
        if let Err(e) = self.ingestion.check_type(spec, &document) {
            warn!(
                session_id = %self.id,
                file_name = %document.file_name,
                mime_type = %document.mime_type,
                "rejected file"
            );
            let mut store = self.store();
            store.pipeline_mut().last_error = Some(e.info());
            store.notify(&e);
            return Err(e);
        }

        let token = {
            let mut store = self.store();
            let token = store.clear_file();
            store.set_file_name(document.file_name.clone());
            store.set_uploading(true);
            token
        };
        info!(session_id = %self.id, file_name = %document.file_name, "ingestion started");

        let _uploading = FlagGuard {
            store: &self.store,
            token,
            flag: Flag::Uploading,
        };
        let mut observer = StoreObserver {
            store: &self.store,
            token,
        };
        let outcome = self.ingestion.run(spec, document, &mut observer).await;

        let mut store = self.store();
        if store.token() != token {
            debug!(session_id = %self.id, "discarding superseded ingestion outcome");
            return Err(FlowError::Superseded);
        }

        match outcome {
            Ok(text) => {
                store.set_source_text(text.content.clone());
                store.pipeline_mut().advance(Phase::Ready)?;
                store.pipeline_mut().progress_message.clear();
                info!(session_id = %self.id, chars = text.content.len(), "document ready");
                Ok(text)
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "ingestion failed");
                store.set_file_name(String::new());
                if let Err(transition) = store.pipeline_mut().fail(&e) {
                    warn!(session_id = %self.id, error = %transition, "could not record ingestion failure");
                }
                store.notify(&e);
                Err(e)
            }
        }
    }

    /// Forget the current file, its text and any result
    pub fn clear_file(&self) {
        self.store().clear_file();
        info!(session_id = %self.id, "file cleared");
    }

    /// Run one generation. `body` holds the caller's inputs; blanks are filled
    /// from the store before validation.
    pub async fn generate(&self, body: Value) -> Result<Value> {
        let (request, token) = {
            let mut store = self.store();
            let phase = store.phase();
            if phase.is_busy() {
                warn!(session_id = %self.id, phase = %phase, "generation refused while busy");
                return Err(FlowError::Busy(phase));
            }

            let request = match self.prepare(&store, body) {
                Ok(request) => request,
                Err(e) => {
                    warn!(session_id = %self.id, error = %e, "generation request rejected");
                    store.pipeline_mut().last_error = Some(e.info());
                    store.notify(&e);
                    return Err(e);
                }
            };

            store.set_result(None);
            if phase.is_finished() {
                let back = if store.source_text().is_empty() {
                    Phase::Idle
                } else {
                    Phase::Ready
                };
                store.pipeline_mut().clear_to(back);
            }
            store.pipeline_mut().advance(Phase::Generating)?;
            store.pipeline_mut().last_error = None;
            store.set_loading(true);
            (request, store.bump_token())
        };

        let _loading = FlagGuard {
            store: &self.store,
            token,
            flag: Flag::Loading,
        };
        let outcome = self.generation.run(&request).await;

        let mut store = self.store();
        if store.token() != token {
            debug!(session_id = %self.id, "discarding superseded generation outcome");
            return Err(FlowError::Superseded);
        }

        match outcome {
            Ok(payload) => {
                store.set_result(Some(payload.clone()));
                store.pipeline_mut().advance(Phase::Succeeded)?;
                Ok(payload)
            }
            Err(e) => {
                store.pipeline_mut().fail(&e)?;
                store.notify(&e);
                Err(e)
            }
        }
    }

    fn prepare(&self, store: &FeatureStore, body: Value) -> Result<GenerationRequest> {
        let body = match body {
            Value::Null => Value::Object(Map::new()),
            Value::Object(mut map) => {
                if map.get("language").is_none_or(Value::is_null) {
                    map.insert(
                        "language".to_string(),
                        Value::String(store.language().as_str().to_string()),
                    );
                }
                Value::Object(map)
            }
            other => other,
        };

        let mut request = GenerationRequest::from_body(self.feature, body)?;
        let spec = self.feature.spec();
        request.fill_blank(spec.source_field, store.source_text());
        request.fill_blank("topic", store.topic());

        let wants_concepts = spec
            .required
            .iter()
            .any(|f| f.kind == FieldKind::List && f.name == "concepts");
        if wants_concepts && request.list("concepts").is_empty() {
            let concepts: Vec<Value> = store
                .concepts()
                .non_empty()
                .map(|c| Value::String(c.to_string()))
                .collect();
            request
                .inputs
                .insert("concepts".to_string(), Value::Array(concepts));
        }

        request.validate()?;
        Ok(request)
    }

    /// Restore every field to its default; anything in flight is discarded
    pub fn reset(&self) {
        self.store().reset();
        info!(session_id = %self.id, "session reset");
    }

    pub fn set_topic(&self, topic: impl Into<String>) {
        self.store().set_topic(topic);
    }

    pub fn set_language(&self, language: Language) {
        self.store().set_language(language);
    }

    pub fn add_concept(&self) {
        self.store().add_concept();
    }

    pub fn remove_concept(&self, index: usize) -> bool {
        self.store().remove_concept(index)
    }

    pub fn update_concept(&self, index: usize, value: impl Into<String>) -> bool {
        self.store().update_concept(index, value)
    }

    pub fn dismiss(&self, notification: u64) -> bool {
        self.store().dismiss(notification)
    }

    /// Copy the pretty-printed result. Returns false when there is nothing to copy.
    pub fn copy_result(&self, clipboard: &dyn Clipboard) -> Result<bool> {
        let text = match self.store().result() {
            Some(result) => serde_json::to_string_pretty(result)
                .map_err(|e| FlowError::InvalidInput {
                    field: "result".to_string(),
                    reason: e.to_string(),
                })?,
            None => return Ok(false),
        };
        clipboard.write_text(&text)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryClipboard;
    use crate::config::PipelineConfig;
    use crate::error::ErrorKind;
    use crate::generate::Generator;
    use crate::ingest::{ExtractionResponse, FileService, UploadReceipt};
    use crate::storage::{InMemoryStateBackend, StateBackend};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::Notify;

    enum Extraction {
        Text(&'static str),
        Hang,
    }

    enum Upload {
        Accept,
        Reject,
        Gated(Arc<Notify>),
    }

    struct StubFiles {
        uploads: AtomicUsize,
        extracts: AtomicUsize,
        upload: Upload,
        extraction: Extraction,
    }

    #[async_trait]
    impl FileService for StubFiles {
        async fn upload(&self, document: &UploadedDocument) -> Result<UploadReceipt> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            match &self.upload {
                Upload::Accept => {}
                Upload::Reject => {
                    return Err(FlowError::NetworkFailure("connection reset".into()));
                }
                Upload::Gated(gate) => gate.notified().await,
            }
            Ok(UploadReceipt {
                file_url: format!("mem://{}", document.file_name),
            })
        }

        async fn extract(&self, _file_url: &str, _schema: &Value) -> Result<ExtractionResponse> {
            self.extracts.fetch_add(1, Ordering::SeqCst);
            match self.extraction {
                Extraction::Text(text) => Ok(ExtractionResponse::success(text)),
                Extraction::Hang => std::future::pending().await,
            }
        }
    }

    struct StubGenerator {
        calls: AtomicUsize,
        replies: Mutex<VecDeque<Result<Value>>>,
        bodies: Mutex<Vec<Value>>,
        gate: Option<Arc<Notify>>,
    }

    impl StubGenerator {
        fn replying(replies: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replies: Mutex::new(replies.into()),
                bodies: Mutex::new(Vec::new()),
                gate: None,
            })
        }

        fn gated(reply: Value, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replies: Mutex::new(vec![Ok(reply)].into()),
                bodies: Mutex::new(Vec::new()),
                gate: Some(gate),
            })
        }
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(request.to_body());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FlowError::NetworkFailure("no reply scripted".into())))
        }
    }

    fn session_with(
        store: FeatureStore,
        files: Arc<StubFiles>,
        generator: Arc<StubGenerator>,
        config: PipelineConfig,
    ) -> FeatureSession {
        FeatureSession::new(
            "s-1",
            store,
            IngestionPipeline::new(files, &config),
            GenerationPipeline::new(generator, config.generation_timeout()),
        )
    }

    fn files(extraction: Extraction) -> Arc<StubFiles> {
        uploading(Upload::Accept, extraction)
    }

    fn uploading(upload: Upload, extraction: Extraction) -> Arc<StubFiles> {
        Arc::new(StubFiles {
            uploads: AtomicUsize::new(0),
            extracts: AtomicUsize::new(0),
            upload,
            extraction,
        })
    }

    #[tokio::test]
    async fn pasted_text_quiz_in_hebrew() {
        let generator = StubGenerator::replying(vec![Ok(json!({
            "title": "Cells",
            "questions": [{"q": "a"}, {"q": "b"}, {"q": "c"}]
        }))]);
        let session = session_with(
            FeatureStore::new(FeatureKind::Quiz),
            files(Extraction::Text("")),
            generator.clone(),
            PipelineConfig::default(),
        );

        let text = "The mitochondria is the powerhouse of the cell.";
        let result = session
            .generate(json!({"topic": text, "numQuestions": 3}))
            .await
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            generator.bodies.lock().unwrap()[0],
            json!({"topic": text, "numQuestions": 3, "language": "hebrew"})
        );

        let snapshot = session.snapshot();
        assert_eq!(snapshot.pipeline.phase, Phase::Succeeded);
        assert_eq!(snapshot.result, Some(result));
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn docx_never_uploads_and_phase_stays_idle() {
        let stub = files(Extraction::Text("unused"));
        let session = session_with(
            FeatureStore::new(FeatureKind::Quiz),
            stub.clone(),
            StubGenerator::replying(vec![]),
            PipelineConfig::default(),
        );

        for mime in ["application/msword", "image/png", "application/zip", ""] {
            let err = session
                .ingest(UploadedDocument::new("essay.docx", mime, vec![1, 2, 3]))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedFileType);
        }

        assert_eq!(stub.uploads.load(Ordering::SeqCst), 0);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.pipeline.phase, Phase::Idle);
        assert_eq!(snapshot.notifications.len(), 4);
    }

    #[tokio::test]
    async fn extraction_timeout_fails_and_clears_file_name() {
        let stub = files(Extraction::Hang);
        let config = PipelineConfig {
            extract_timeout_secs: 1,
            ..PipelineConfig::default()
        };
        let session = session_with(
            FeatureStore::new(FeatureKind::Charts),
            stub.clone(),
            StubGenerator::replying(vec![]),
            config,
        );

        let started = Instant::now();
        let err = session
            .ingest(UploadedDocument::new("report.pdf", "application/pdf", vec![0x25]))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(stub.uploads.load(Ordering::SeqCst), 1);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.pipeline.phase, Phase::Failed);
        assert_eq!(snapshot.file_name, "");
        assert_eq!(snapshot.pipeline.progress_message, "");
        assert!(!snapshot.is_uploading);
        assert_eq!(snapshot.pipeline.last_error.unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn upload_failure_fails_and_clears_file_name() {
        let stub = uploading(Upload::Reject, Extraction::Text("unused"));
        let session = session_with(
            FeatureStore::new(FeatureKind::Flashcards),
            stub.clone(),
            StubGenerator::replying(vec![]),
            PipelineConfig::default(),
        );

        let err = session
            .ingest(UploadedDocument::new("deck.pdf", "application/pdf", vec![0x25]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
        assert_eq!(stub.extracts.load(Ordering::SeqCst), 0);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.pipeline.phase, Phase::Failed);
        assert_eq!(snapshot.file_name, "");
        assert_eq!(snapshot.pipeline.progress_message, "");
        assert!(!snapshot.is_uploading);
        assert_eq!(
            snapshot.pipeline.last_error.unwrap().kind,
            ErrorKind::NetworkFailure
        );
        assert_eq!(snapshot.notifications.len(), 1);
    }

    #[tokio::test]
    async fn reset_during_upload_discards_the_ingestion() {
        let gate = Arc::new(Notify::new());
        let stub = uploading(Upload::Gated(gate.clone()), Extraction::Text("stale text"));
        let session = Arc::new(session_with(
            FeatureStore::new(FeatureKind::Quiz),
            stub.clone(),
            StubGenerator::replying(vec![]),
            PipelineConfig::default(),
        ));

        let running = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .ingest(UploadedDocument::new("old.txt", "text/plain", b"old".to_vec()))
                    .await
            })
        };
        while !session.snapshot().is_uploading {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.snapshot().pipeline.phase, Phase::Uploading);

        session.reset();
        gate.notify_one();
        let err = running.await.unwrap().unwrap_err();

        assert!(matches!(err, FlowError::Superseded));
        assert_eq!(stub.extracts.load(Ordering::SeqCst), 0);
        let snapshot = session.snapshot();
        assert_eq!(snapshot, FeatureStore::new(FeatureKind::Quiz).snapshot());
        assert_eq!(snapshot.source_text, "");
        assert!(!snapshot.is_uploading);
    }

    #[tokio::test]
    async fn extracted_text_feeds_the_source_field() {
        let generator = StubGenerator::replying(vec![Ok(json!({"charts": [{"type": "bar"}]}))]);
        let session = session_with(
            FeatureStore::new(FeatureKind::Charts),
            files(Extraction::Text("year,sales\n2023,10")),
            generator.clone(),
            PipelineConfig::default(),
        );

        session
            .ingest(UploadedDocument::new("sales.csv", "text/csv", b"year,sales".to_vec()))
            .await
            .unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.pipeline.phase, Phase::Ready);
        assert_eq!(snapshot.file_name, "sales.csv");

        session.generate(Value::Null).await.unwrap();
        assert_eq!(generator.bodies.lock().unwrap()[0]["text"], "year,sales\n2023,10");
    }

    #[tokio::test]
    async fn blank_required_field_makes_no_call() {
        let generator = StubGenerator::replying(vec![]);
        let session = session_with(
            FeatureStore::new(FeatureKind::Bibliography),
            files(Extraction::Text("")),
            generator.clone(),
            PipelineConfig::default(),
        );

        let err = session
            .generate(json!({"text": "Smith 2020", "style": "   "}))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::MissingInput { ref field } if field == "style"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.snapshot().pipeline.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn failed_regeneration_leaves_no_stale_result() {
        let generator = StubGenerator::replying(vec![
            Ok(json!({"flashcards": [{"front": "ATP", "back": "energy"}]})),
            Err(FlowError::Upstream {
                status: Some(502),
                message: "bad gateway".into(),
            }),
        ]);
        let session = session_with(
            FeatureStore::new(FeatureKind::Flashcards),
            files(Extraction::Text("")),
            generator,
            PipelineConfig::default(),
        );

        session.set_topic("Cell energy");
        session.generate(Value::Null).await.unwrap();
        assert!(session.snapshot().result.is_some());

        let err = session.generate(Value::Null).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamError);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.result, None);
        assert_eq!(snapshot.pipeline.phase, Phase::Failed);
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.notifications.len(), 1);
    }

    #[tokio::test]
    async fn late_result_after_reset_is_discarded() {
        let gate = Arc::new(Notify::new());
        let generator = StubGenerator::gated(json!({"slides": [{"title": "Intro"}]}), gate.clone());
        let session = Arc::new(session_with(
            FeatureStore::new(FeatureKind::Presentation),
            files(Extraction::Text("")),
            generator,
            PipelineConfig::default(),
        ));

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.generate(json!({"topic": "Volcanoes"})).await })
        };
        while session.snapshot().pipeline.phase != Phase::Generating {
            tokio::task::yield_now().await;
        }
        assert!(session.snapshot().is_loading);

        session.reset();
        gate.notify_one();
        let err = running.await.unwrap().unwrap_err();

        assert!(matches!(err, FlowError::Superseded));
        let snapshot = session.snapshot();
        assert_eq!(snapshot, FeatureStore::new(FeatureKind::Presentation).snapshot());
    }

    #[tokio::test]
    async fn generation_is_refused_while_busy() {
        let gate = Arc::new(Notify::new());
        let generator = StubGenerator::gated(json!({"formulas": []}), gate.clone());
        let session = Arc::new(session_with(
            FeatureStore::new(FeatureKind::FormulaSheet),
            files(Extraction::Text("")),
            generator,
            PipelineConfig::default(),
        ));

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.generate(json!({"topic": "Kinematics"})).await })
        };
        while !session.snapshot().is_loading {
            tokio::task::yield_now().await;
        }

        let err = session.generate(json!({"topic": "again"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        gate.notify_one();
        running.await.unwrap().unwrap();
        assert_eq!(session.snapshot().pipeline.phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn summary_table_uses_stored_concepts_and_persists() {
        let backend: Arc<dyn StateBackend> = Arc::new(InMemoryStateBackend::new());
        let generator = StubGenerator::replying(vec![Ok(json!({"summary": [{"concept": "osmosis"}]}))]);
        let session = session_with(
            FeatureStore::persisted(FeatureKind::SummaryTable, backend.clone(), "summary-table"),
            files(Extraction::Text("Water crosses membranes by osmosis.")),
            generator.clone(),
            PipelineConfig::default(),
        );

        session
            .ingest(UploadedDocument::new("bio.txt", "text/plain", b"...".to_vec()))
            .await
            .unwrap();
        session.set_topic("Membranes");
        session.update_concept(0, "osmosis");
        session.add_concept();
        session.set_language(Language::English);

        session.generate(json!({})).await.unwrap();
        let body = generator.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["concepts"], json!(["osmosis"]));
        assert_eq!(body["sourceText"], "Water crosses membranes by osmosis.");
        assert_eq!(body["language"], "english");

        let restored = FeatureStore::persisted(FeatureKind::SummaryTable, backend, "summary-table");
        assert_eq!(restored.topic(), "Membranes");
        assert_eq!(restored.phase(), Phase::Succeeded);
        assert_eq!(restored.result().unwrap()["summary"][0]["concept"], "osmosis");
    }

    #[tokio::test]
    async fn null_language_uses_the_session_language() {
        let generator = StubGenerator::replying(vec![Ok(json!({"slides": []}))]);
        let session = session_with(
            FeatureStore::new(FeatureKind::Presentation),
            files(Extraction::Text("")),
            generator.clone(),
            PipelineConfig::default(),
        );
        session.set_language(Language::English);

        session
            .generate(json!({"topic": "Plate tectonics", "language": null}))
            .await
            .unwrap();
        assert_eq!(generator.bodies.lock().unwrap()[0]["language"], "english");
    }

    #[tokio::test]
    async fn copy_result_writes_to_clipboard() {
        let session = session_with(
            FeatureStore::new(FeatureKind::Schedule),
            files(Extraction::Text("")),
            StubGenerator::replying(vec![Ok(json!({"schedule": [{"day": 1}]}))]),
            PipelineConfig::default(),
        );
        let clipboard = MemoryClipboard::new();
        assert!(!session.copy_result(&clipboard).unwrap());

        session
            .generate(json!({"topic": "Algebra", "examDate": "2026-12-01"}))
            .await
            .unwrap();
        assert!(session.copy_result(&clipboard).unwrap());
        assert!(clipboard.contents().unwrap().contains("\"day\": 1"));
    }
}
