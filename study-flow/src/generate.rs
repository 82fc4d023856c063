use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::capabilities::SpeechSynthesis;
use crate::error::{FlowError, Result};
use crate::feature::FeatureKind;
use crate::prompt::build_prompt;
use crate::request::GenerationRequest;
use crate::timeout::with_timeout;

/// Prompt-completion collaborator
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete `prompt`, returning the model's JSON object. `response_schema`
    /// describes the keys the caller needs back.
    async fn complete(&self, prompt: &str, response_schema: Option<&Value>) -> Result<Value>;
}

/// The generation call of a feature: structured inputs in, JSON result out
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value>;
}

/// Generator that builds prompts locally and calls a [`Completer`]; speech
/// requests go to a [`SpeechSynthesis`] collaborator.
pub struct LocalGenerator {
    completer: Arc<dyn Completer>,
    speech: Option<Arc<dyn SpeechSynthesis>>,
}

impl LocalGenerator {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self {
            completer,
            speech: None,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesis>) -> Self {
        self.speech = Some(speech);
        self
    }

    async fn synthesize(&self, request: &GenerationRequest) -> Result<Value> {
        let speech = self.speech.as_ref().ok_or_else(|| FlowError::Upstream {
            status: None,
            message: "speech synthesis is not configured".to_string(),
        })?;

        let text = request.text("text").unwrap_or_default();
        let audio = speech
            .synthesize(text, request.language, request.text("voice"))
            .await?;

        if audio.bytes.is_empty() {
            return Err(FlowError::Upstream {
                status: None,
                message: "speech synthesis returned no audio".to_string(),
            });
        }

        Ok(json!({
            "audioContent": STANDARD.encode(&audio.bytes),
            "contentType": audio.content_type,
            "voice": audio.voice,
        }))
    }
}

#[async_trait]
impl Generator for LocalGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        if request.feature == FeatureKind::Speech {
            return self.synthesize(request).await;
        }

        let prompt = build_prompt(request);
        let schema = request.feature.spec().response_schema();
        self.completer.complete(&prompt, Some(&schema)).await
    }
}

/// Validate → call → shape-check, with one attempt and a hard deadline
#[derive(Clone)]
pub struct GenerationPipeline {
    generator: Arc<dyn Generator>,
    budget: Duration,
}

impl GenerationPipeline {
    pub fn new(generator: Arc<dyn Generator>, budget: Duration) -> Self {
        Self { generator, budget }
    }

    pub async fn run(&self, request: &GenerationRequest) -> Result<Value> {
        let feature = request.feature;
        if let Err(e) = request.validate() {
            warn!(feature = %feature, error = %e, "generation request rejected");
            return Err(e);
        }

        info!(
            feature = %feature,
            language = request.language.as_str(),
            "issuing generation call"
        );

        let payload = with_timeout(self.generator.generate(request), self.budget, "generation")
            .await
            .inspect_err(|e| error!(feature = %feature, error = %e, "generation call failed"))?;

        if let Err(e) = feature.spec().check_shape(&payload) {
            error!(feature = %feature, error = %e, "generation result has the wrong shape");
            return Err(e);
        }

        info!(feature = %feature, "generation succeeded");
        Ok(payload)
    }
}

/// Parse a model reply that must be a JSON object, tolerating a Markdown code fence
pub fn parse_json_payload(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();

    if cleaned.is_empty() {
        return Err(FlowError::Upstream {
            status: None,
            message: "empty completion".to_string(),
        });
    }

    serde_json::from_str::<Value>(cleaned).map_err(|e| FlowError::InvalidResponseShape {
        reason: format!("completion is not valid JSON: {e}"),
        raw_content: Some(raw.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{SpeechAudio, Voice};
    use crate::error::ErrorKind;
    use crate::feature::Language;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedCompleter {
        reply: Result<Value>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompleter {
        fn new(reply: Result<Value>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(&self, prompt: &str, schema: Option<&Value>) -> Result<Value> {
            assert!(schema.is_some());
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }
    }

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"questions": []}))
        }
    }

    struct Tone;

    #[async_trait]
    impl SpeechSynthesis for Tone {
        async fn voices(&self, language: Language) -> Result<Vec<Voice>> {
            Ok(vec![Voice {
                id: "alloy".into(),
                name: "Alloy".into(),
                language: language.tag().into(),
            }])
        }

        async fn synthesize(
            &self,
            _text: &str,
            _language: Language,
            voice: Option<&str>,
        ) -> Result<SpeechAudio> {
            Ok(SpeechAudio {
                bytes: vec![0x49, 0x44, 0x33],
                content_type: "audio/mpeg".into(),
                voice: voice.unwrap_or("alloy").into(),
            })
        }
    }

    fn quiz() -> GenerationRequest {
        GenerationRequest::new(FeatureKind::Quiz, Language::Hebrew)
            .with("topic", "The mitochondria is the powerhouse of the cell.")
            .with("numQuestions", 3)
    }

    #[tokio::test]
    async fn blank_required_field_never_reaches_the_generator() {
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let pipeline = GenerationPipeline::new(generator.clone(), Duration::from_secs(1));

        let request = GenerationRequest::new(FeatureKind::Quiz, Language::Hebrew)
            .with("topic", "  ")
            .with("numQuestions", 3);
        let err = pipeline.run(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn local_generator_prompts_with_schema() {
        let completer = ScriptedCompleter::new(Ok(json!({
            "title": "Cells",
            "questions": [{"q": 1}, {"q": 2}, {"q": 3}]
        })));
        let pipeline = GenerationPipeline::new(
            Arc::new(LocalGenerator::new(completer.clone())),
            Duration::from_secs(1),
        );

        let result = pipeline.run(&quiz()).await.unwrap();
        assert_eq!(result["questions"].as_array().unwrap().len(), 3);

        let prompts = completer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("exactly 3"));
    }

    #[tokio::test]
    async fn valid_json_without_required_key_is_rejected() {
        let completer = ScriptedCompleter::new(Ok(json!({"title": "Cells"})));
        let pipeline = GenerationPipeline::new(
            Arc::new(LocalGenerator::new(completer)),
            Duration::from_secs(1),
        );

        let err = pipeline.run(&quiz()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponseShape);
    }

    #[tokio::test]
    async fn speech_is_wrapped_as_base64() {
        let completer = ScriptedCompleter::new(Ok(json!({})));
        let generator = LocalGenerator::new(completer).with_speech(Arc::new(Tone));
        let pipeline = GenerationPipeline::new(Arc::new(generator), Duration::from_secs(1));

        let request = GenerationRequest::new(FeatureKind::Speech, Language::English)
            .with("text", "Photosynthesis converts light into chemical energy.");
        let result = pipeline.run(&request).await.unwrap();

        assert_eq!(result["audioContent"], "SUQz");
        assert_eq!(result["contentType"], "audio/mpeg");
    }

    #[tokio::test]
    async fn speech_without_synthesizer_is_an_upstream_error() {
        let generator = LocalGenerator::new(ScriptedCompleter::new(Ok(json!({}))));
        let request =
            GenerationRequest::new(FeatureKind::Speech, Language::English).with("text", "hi");
        let err = generator.generate(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
    }

    #[test]
    fn parses_fenced_and_plain_json() {
        let value = parse_json_payload("```json\n{\"summary\": []}\n```").unwrap();
        assert_eq!(value, json!({"summary": []}));

        let value = parse_json_payload("  {\"a\": 1} ").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn non_json_keeps_raw_content() {
        let err = parse_json_payload("Sure! Here is your quiz:").unwrap_err();
        match err {
            FlowError::InvalidResponseShape { raw_content, .. } => {
                assert_eq!(raw_content.as_deref(), Some("Sure! Here is your quiz:"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = parse_json_payload("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
    }
}
