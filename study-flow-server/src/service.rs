use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post, put},
};
use serde_json::{Value, json};
use std::sync::Arc;
use study_flow::providers::{HttpFileService, HttpSpeechSynthesis, OpenRouterClient};
use study_flow::{
    Completer, FeatureKind, FeatureSession, FileService, FileStateBackend, GenerationPipeline,
    GenerationRequest, InMemoryStateBackend, IngestionPipeline, Language, LocalGenerator,
    SpeechSynthesis, StateBackend, UploadedDocument, Voice,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{Instrument, info};
use uuid::Uuid;

use crate::{
    config::ServerSettings,
    errors::{ApiError, ApiResult},
    extract::{LocalFileService, PdfOcr},
    models::{
        ConceptOp, ConceptRequest, CreateSessionRequest, SessionResponse, UpdateFieldsRequest,
        VoicesQuery,
    },
    sessions::SessionRegistry,
};

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const CORRELATION_HEADER: &str = "x-correlation-id";
const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Clone)]
pub struct AppState {
    pub generation: GenerationPipeline,
    pub speech: Option<Arc<dyn SpeechSynthesis>>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(
        generation: GenerationPipeline,
        speech: Option<Arc<dyn SpeechSynthesis>>,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            generation,
            speech,
            sessions: Arc::new(sessions),
        }
    }
}

pub fn create_app(settings: &ServerSettings) -> anyhow::Result<Router> {
    let app_state = create_app_state(settings)?;
    Ok(build_router(app_state))
}

#[cfg(feature = "rig")]
fn build_completer(
    settings: &ServerSettings,
    api_key: &str,
    _client: &OpenRouterClient,
) -> Arc<dyn Completer> {
    Arc::new(study_flow::providers::RigCompleter::new(api_key, &settings.model))
}

#[cfg(not(feature = "rig"))]
fn build_completer(
    settings: &ServerSettings,
    _api_key: &str,
    client: &OpenRouterClient,
) -> Arc<dyn Completer> {
    Arc::new(study_flow::providers::OpenRouterCompleter::new(
        client.clone(),
        settings.model.clone(),
    ))
}

pub fn create_app_state(settings: &ServerSettings) -> anyhow::Result<AppState> {
    let api_key = settings.api_key()?;
    let client = OpenRouterClient::new(api_key)?;

    let speech: Option<Arc<dyn SpeechSynthesis>> = match &settings.speech_url {
        Some(url) => {
            let mut speech = HttpSpeechSynthesis::new(url.clone(), settings.speech_model.clone())?;
            if let Some(key) = &settings.speech_api_key {
                speech = speech.with_api_key(key.clone());
            }
            info!(url = %url, "speech synthesis enabled");
            Some(Arc::new(speech))
        }
        None => None,
    };

    let mut generator = LocalGenerator::new(build_completer(settings, api_key, &client));
    if let Some(speech) = &speech {
        generator = generator.with_speech(speech.clone());
    }
    let generation =
        GenerationPipeline::new(Arc::new(generator), settings.pipeline.generation_timeout());

    let files: Arc<dyn FileService> = match &settings.file_service_url {
        Some(url) => {
            info!(url = %url, "using remote file service");
            Arc::new(HttpFileService::new(url.clone())?)
        }
        None => Arc::new(LocalFileService::new(Some(PdfOcr::new(
            client,
            settings.ocr_model.clone(),
        )))),
    };

    let backend: Arc<dyn StateBackend> = match &settings.state_dir {
        Some(dir) => {
            let backend = FileStateBackend::open(dir)?;
            info!(path = %backend.path().display(), "persisting feature state");
            Arc::new(backend)
        }
        None => Arc::new(InMemoryStateBackend::new()),
    };

    let sessions = SessionRegistry::new(
        IngestionPipeline::new(files, &settings.pipeline),
        generation.clone(),
        backend,
    );
    Ok(AppState::new(generation, speech, sessions))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/speech/voices", get(list_voices))
        .route("/api/{feature}", post(generate))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/fields", put(update_fields))
        .route("/sessions/{id}/concepts", post(edit_concepts))
        .route("/sessions/{id}/file", post(upload_file).delete(clear_file))
        .route("/sessions/{id}/generate", post(generate_in_session))
        .route("/sessions/{id}/reset", post(reset_session))
        .route(
            "/sessions/{id}/notifications/{notification}",
            axum::routing::delete(dismiss_notification),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Tag each request with a correlation id, in a span and on the response
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(CORRELATION_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    let features: Vec<&str> = FeatureKind::ALL.iter().map(|f| f.slug()).collect();
    Json(json!({
        "service": "Study Flow Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Upload study material, extract its text and generate quizzes, flashcards, summaries and more",
        "features": features,
        "endpoints": {
            "POST /api/{feature}": "Generate a result for a feature from JSON inputs",
            "GET /api/speech/voices": "List text-to-speech voices for a language",
            "POST /sessions": "Open a feature session",
            "GET /sessions/{id}": "Session state",
            "PUT /sessions/{id}/fields": "Set topic or language",
            "POST /sessions/{id}/concepts": "Add, remove or update a concept",
            "POST /sessions/{id}/file": "Upload a PDF or text file (raw body, x-file-name header)",
            "DELETE /sessions/{id}/file": "Clear the file and its results",
            "POST /sessions/{id}/generate": "Generate from the session's inputs",
            "POST /sessions/{id}/reset": "Reset the session",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn parse_feature(slug: &str) -> Result<FeatureKind, ApiError> {
    FeatureKind::from_slug(slug).ok_or_else(|| ApiError::UnknownFeature(slug.to_string()))
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {e}")))
}

fn parse_language(raw: Option<&str>) -> Result<Language, ApiError> {
    match raw.map(str::trim).filter(|l| !l.is_empty()) {
        Some(language) => Ok(language.parse()?),
        None => Ok(Language::default()),
    }
}

fn find_session(state: &AppState, id: &str) -> Result<Arc<FeatureSession>, ApiError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
}

fn session_response(session: &FeatureSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        session_id: session.id().to_string(),
        state: session.snapshot(),
    })
}

async fn generate(
    State(state): State<AppState>,
    Path(feature): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    let feature = parse_feature(&feature)?;
    let request = GenerationRequest::from_body(feature, parse_body(&body)?)?;
    info!(feature = %feature, "generation requested");

    let result = state.generation.run(&request).await?;
    Ok(Json(result))
}

async fn list_voices(
    State(state): State<AppState>,
    Query(query): Query<VoicesQuery>,
) -> ApiResult<Vec<Voice>> {
    let language = parse_language(query.language.as_deref())?;
    let speech = state.speech.as_ref().ok_or_else(|| {
        ApiError::Flow(study_flow::FlowError::Upstream {
            status: None,
            message: "speech synthesis is not configured".to_string(),
        })
    })?;
    Ok(Json(speech.voices(language).await?))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<SessionResponse> {
    let feature = parse_feature(&request.feature)?;
    let session = state.sessions.open(feature, request.session_id)?;
    Ok(session_response(&session))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    Ok(session_response(&session))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id) {
        info!(session_id = %id, "session closed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

async fn update_fields(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateFieldsRequest>,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    if request.language.is_some() {
        session.set_language(parse_language(request.language.as_deref())?);
    }
    if let Some(topic) = request.topic {
        session.set_topic(topic);
    }
    Ok(session_response(&session))
}

async fn edit_concepts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ConceptRequest>,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    let index = || {
        request
            .index
            .ok_or_else(|| ApiError::BadRequest("`index` is required".to_string()))
    };

    match request.op {
        ConceptOp::Add => session.add_concept(),
        ConceptOp::Remove => {
            session.remove_concept(index()?);
        }
        ConceptOp::Update => {
            let value = request.value.clone().unwrap_or_default();
            let index = index()?;
            if !session.update_concept(index, value) {
                return Err(ApiError::BadRequest(format!("no concept at index {index}")));
            }
        }
    }
    Ok(session_response(&session))
}

async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("upload");

    session
        .ingest(UploadedDocument::new(file_name, mime_type, body.to_vec()))
        .await?;
    Ok(session_response(&session))
}

async fn clear_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    session.clear_file();
    Ok(session_response(&session))
}

async fn generate_in_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    session.generate(parse_body(&body)?).await?;
    Ok(session_response(&session))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    session.reset();
    Ok(session_response(&session))
}

async fn dismiss_notification(
    State(state): State<AppState>,
    Path((id, notification)): Path<(String, u64)>,
) -> ApiResult<SessionResponse> {
    let session = find_session(&state, &id)?;
    if !session.dismiss(notification) {
        return Err(ApiError::NotificationNotFound(notification));
    }
    Ok(session_response(&session))
}
