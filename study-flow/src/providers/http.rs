use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capabilities::{SpeechAudio, SpeechSynthesis, Voice};
use crate::document::UploadedDocument;
use crate::error::{FlowError, Result};
use crate::feature::Language;
use crate::generate::{Completer, Generator, parse_json_payload};
use crate::ingest::{ExtractionResponse, FileService, UploadReceipt};
use crate::request::GenerationRequest;

pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Backstop for a single HTTP exchange; pipeline deadlines are normally shorter
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(900);

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(TRANSPORT_TIMEOUT)
        .build()
        .map_err(|e| FlowError::NetworkFailure(format!("cannot build http client: {e}")))
}

fn transport_error(e: reqwest::Error) -> FlowError {
    if e.is_timeout() {
        FlowError::Timeout {
            operation: "http request",
            budget: TRANSPORT_TIMEOUT,
        }
    } else {
        FlowError::NetworkFailure(e.to_string())
    }
}

/// Turn a non-2xx response into `Upstream`, preferring the body's `error` field
async fn upstream_error(response: Response) -> FlowError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error").and_then(|e| match e {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    FlowError::Upstream {
        status: Some(status.as_u16()),
        message,
    }
}

fn trim_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

/// Minimal OpenRouter chat-completions client
#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
            endpoint: OPENROUTER_CHAT_URL.to_string(),
        })
    }

    /// Point the client at another OpenAI-compatible chat endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Send one user message made of `content` parts and return the reply text.
    /// With `json_mode` the model is asked for a JSON object.
    pub async fn chat(
        &self,
        model: &str,
        content: Vec<Value>,
        max_tokens: u32,
        json_mode: bool,
    ) -> Result<String> {
        let mut payload = json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": content
                }
            ],
            "max_tokens": max_tokens
        });
        if json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        debug!(model = %model, endpoint = %self.endpoint, "calling chat completions");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let err = upstream_error(response).await;
            warn!(model = %model, error = %err, "chat completion rejected");
            return Err(err);
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        if let Some(message) = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return Err(FlowError::Upstream {
                status: None,
                message: message.to_string(),
            });
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if content.trim().is_empty() {
            return Err(FlowError::Upstream {
                status: None,
                message: "empty completion".to_string(),
            });
        }

        info!(model = %model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

/// [`Completer`] backed by OpenRouter in JSON-object mode
pub struct OpenRouterCompleter {
    client: OpenRouterClient,
    model: String,
    max_tokens: u32,
}

impl OpenRouterCompleter {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 4000,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl Completer for OpenRouterCompleter {
    async fn complete(&self, prompt: &str, response_schema: Option<&Value>) -> Result<Value> {
        let mut text = prompt.to_string();
        if let Some(schema) = response_schema {
            text.push_str("\n\nThe JSON object must satisfy this JSON schema:\n");
            text.push_str(&schema.to_string());
        }

        let reply = self
            .client
            .chat(
                &self.model,
                vec![json!({ "type": "text", "text": text })],
                self.max_tokens,
                true,
            )
            .await?;
        parse_json_payload(&reply)
    }
}

/// Remote file service: `POST <base>/upload` with the raw bytes, then
/// `POST <base>/extract` with `{fileUrl, schema}`.
pub struct HttpFileService {
    http: Client,
    base_url: String,
}

impl HttpFileService {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl FileService for HttpFileService {
    async fn upload(&self, document: &UploadedDocument) -> Result<UploadReceipt> {
        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .header(header::CONTENT_TYPE, &document.mime_type)
            .header("x-file-name", &document.file_name)
            .body(document.bytes.clone())
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        response.json::<UploadReceipt>().await.map_err(|e| {
            FlowError::InvalidResponseShape {
                reason: format!("upload reply lacks `fileUrl`: {e}"),
                raw_content: None,
            }
        })
    }

    async fn extract(&self, file_url: &str, schema: &Value) -> Result<ExtractionResponse> {
        let response = self
            .http
            .post(format!("{}/extract", self.base_url))
            .json(&json!({ "fileUrl": file_url, "schema": schema }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        response.json::<ExtractionResponse>().await.map_err(|e| {
            FlowError::InvalidResponseShape {
                reason: format!("extraction reply is malformed: {e}"),
                raw_content: None,
            }
        })
    }
}

/// [`Generator`] calling a remote generation endpoint per feature
pub struct HttpGenerator {
    http: Client,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        let url = format!("{}/api/{}", self.base_url, request.feature.slug());
        let response = self
            .http
            .post(&url)
            .json(&request.to_body())
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let raw = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&raw).map_err(|e| FlowError::InvalidResponseShape {
            reason: format!("endpoint returned invalid JSON: {e}"),
            raw_content: Some(raw),
        })
    }
}

const VOICES: [(&str, &str); 6] = [
    ("alloy", "Alloy"),
    ("echo", "Echo"),
    ("fable", "Fable"),
    ("nova", "Nova"),
    ("onyx", "Onyx"),
    ("shimmer", "Shimmer"),
];

/// OpenAI-compatible text-to-speech (`POST <base>/audio/speech`)
pub struct HttpSpeechSynthesis {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpSpeechSynthesis {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: trim_base(base_url),
            api_key: None,
            model: model.into(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn default_voice(language: Language) -> &'static str {
        match language {
            Language::Hebrew => "nova",
            Language::English => "alloy",
        }
    }
}

#[async_trait]
impl SpeechSynthesis for HttpSpeechSynthesis {
    async fn voices(&self, language: Language) -> Result<Vec<Voice>> {
        Ok(VOICES
            .iter()
            .map(|(id, name)| Voice {
                id: id.to_string(),
                name: name.to_string(),
                language: language.tag().to_string(),
            })
            .collect())
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        voice: Option<&str>,
    ) -> Result<SpeechAudio> {
        let voice = voice.unwrap_or(Self::default_voice(language));
        let mut request = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": voice,
                "response_format": "mp3"
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response.bytes().await.map_err(transport_error)?;

        info!(voice = %voice, bytes = bytes.len(), "speech synthesised");
        Ok(SpeechAudio {
            bytes: bytes.to_vec(),
            content_type,
            voice: voice.to_string(),
        })
    }
}
