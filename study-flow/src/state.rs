use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::concepts::ConceptList;
use crate::error::{ErrorKind, FlowError};
use crate::feature::{FeatureKind, Language};
use crate::phase::{Phase, PipelineState};
use crate::storage::StateBackend;

/// Persisted field names
pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const CONCEPTS: &str = "concepts";
    pub const LANGUAGE: &str = "language";
    pub const FILE_NAME: &str = "fileName";
    pub const SOURCE_TEXT: &str = "sourceText";
    pub const RESULT: &str = "result";

    pub const ALL: [&str; 6] = [TOPIC, CONCEPTS, LANGUAGE, FILE_NAME, SOURCE_TEXT, RESULT];
}

/// Notifications kept per feature; older ones are dropped first
pub const MAX_NOTIFICATIONS: usize = 20;

/// Dismissible user-facing notice raised by a caught pipeline error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub kind: ErrorKind,
    pub message: String,
}

/// Serialisable view of a feature instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSnapshot {
    pub feature: FeatureKind,
    pub topic: String,
    pub concepts: ConceptList,
    pub language: Language,
    pub file_name: String,
    pub source_text: String,
    pub result: Option<Value>,
    pub is_loading: bool,
    pub is_uploading: bool,
    #[serde(flatten)]
    pub pipeline: PipelineState,
    pub notifications: Vec<Notification>,
}

struct Persistence {
    backend: Arc<dyn StateBackend>,
    namespace: String,
}

impl Persistence {
    fn key(&self, field: &str) -> String {
        format!("{}:{}", self.namespace, field)
    }

    fn load<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        let key = self.key(field);
        let raw = match self.backend.read(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "state backend unavailable, using default");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .inspect_err(|e| warn!(key = %key, error = %e, "persisted value is corrupted, using default"))
            .ok()
    }

    fn store<T: Serialize>(&self, field: &str, value: &T) {
        let key = self.key(field);
        let outcome = serde_json::to_string(value)
            .map_err(|e| FlowError::Storage(e.to_string()))
            .and_then(|raw| self.backend.write(&key, &raw));
        if let Err(e) = outcome {
            warn!(key = %key, error = %e, "failed to persist feature state");
        }
    }

    fn store_many(&self, values: &[(&str, Value)]) {
        let entries: Vec<(String, String)> = values
            .iter()
            .map(|(field, value)| (self.key(field), value.to_string()))
            .collect();
        if let Err(e) = self.backend.write_many(&entries) {
            warn!(namespace = %self.namespace, error = %e, "failed to persist feature state");
        }
    }

    fn clear(&self) {
        let keys: Vec<String> = fields::ALL.iter().map(|field| self.key(field)).collect();
        if let Err(e) = self.backend.remove_many(&keys) {
            warn!(namespace = %self.namespace, error = %e, "failed to clear persisted feature state");
        }
    }
}

/// Mutable state behind one feature's UI, with a full-reset contract and
/// optional write-through persistence.
pub struct FeatureStore {
    feature: FeatureKind,
    topic: String,
    concepts: ConceptList,
    language: Language,
    file_name: String,
    source_text: String,
    result: Option<Value>,
    is_loading: bool,
    is_uploading: bool,
    pipeline: PipelineState,
    notifications: Vec<Notification>,
    next_notification: u64,
    token: u64,
    persistence: Option<Persistence>,
}

impl FeatureStore {
    pub fn new(feature: FeatureKind) -> Self {
        Self {
            feature,
            topic: String::new(),
            concepts: ConceptList::new(),
            language: Language::default(),
            file_name: String::new(),
            source_text: String::new(),
            result: None,
            is_loading: false,
            is_uploading: false,
            pipeline: PipelineState::default(),
            notifications: Vec::new(),
            next_notification: 1,
            token: 0,
            persistence: None,
        }
    }

    /// Store whose fields are mirrored to `backend` under `namespace`. Each field
    /// starts from its persisted value when one can be read, else its default.
    pub fn persisted(
        feature: FeatureKind,
        backend: Arc<dyn StateBackend>,
        namespace: impl Into<String>,
    ) -> Self {
        let persistence = Persistence {
            backend,
            namespace: namespace.into(),
        };

        let mut store = Self::new(feature);
        store.topic = persistence.load(fields::TOPIC).unwrap_or_default();
        store.concepts = persistence.load(fields::CONCEPTS).unwrap_or_default();
        store.language = persistence.load(fields::LANGUAGE).unwrap_or_default();
        store.file_name = persistence.load(fields::FILE_NAME).unwrap_or_default();
        store.source_text = persistence.load(fields::SOURCE_TEXT).unwrap_or_default();
        store.result = persistence.load::<Option<Value>>(fields::RESULT).flatten();

        store.pipeline.phase = if store.result.is_some() {
            Phase::Succeeded
        } else if store.source_text.is_empty() {
            Phase::Idle
        } else {
            Phase::Ready
        };

        debug!(
            namespace = %persistence.namespace,
            phase = %store.pipeline.phase,
            "restored persisted feature state"
        );
        store.persistence = Some(persistence);
        store
    }

    fn mirror<T: Serialize>(&self, field: &str, value: &T) {
        if let Some(persistence) = &self.persistence {
            persistence.store(field, value);
        }
    }

    pub fn feature(&self) -> FeatureKind {
        self.feature
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
        self.mirror(fields::TOPIC, &self.topic);
    }

    pub fn concepts(&self) -> &ConceptList {
        &self.concepts
    }

    pub fn add_concept(&mut self) {
        self.concepts.add();
        self.mirror(fields::CONCEPTS, &self.concepts);
    }

    pub fn remove_concept(&mut self, index: usize) -> bool {
        let removed = self.concepts.remove(index);
        if removed {
            self.mirror(fields::CONCEPTS, &self.concepts);
        }
        removed
    }

    pub fn update_concept(&mut self, index: usize, value: impl Into<String>) -> bool {
        let updated = self.concepts.update(index, value);
        if updated {
            self.mirror(fields::CONCEPTS, &self.concepts);
        }
        updated
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.mirror(fields::LANGUAGE, &self.language);
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = file_name.into();
        self.mirror(fields::FILE_NAME, &self.file_name);
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn set_source_text(&mut self, text: impl Into<String>) {
        self.source_text = text.into();
        self.mirror(fields::SOURCE_TEXT, &self.source_text);
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Option<Value>) {
        self.result = result;
        self.mirror(fields::RESULT, &self.result);
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn is_uploading(&self) -> bool {
        self.is_uploading
    }

    pub fn set_uploading(&mut self, uploading: bool) {
        self.is_uploading = uploading;
    }

    pub fn phase(&self) -> Phase {
        self.pipeline.phase
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut PipelineState {
        &mut self.pipeline
    }

    /// Current request-generation token
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Invalidate every in-flight request and return the new token
    pub fn bump_token(&mut self) -> u64 {
        self.token += 1;
        self.token
    }

    /// Raise a dismissible notification for a caught error
    pub fn notify(&mut self, error: &FlowError) -> u64 {
        let id = self.next_notification;
        self.next_notification += 1;
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            let excess = self.notifications.len() + 1 - MAX_NOTIFICATIONS;
            self.notifications.drain(..excess);
        }
        self.notifications.push(Notification {
            id,
            kind: error.kind(),
            message: error.user_message(),
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.notifications.len() != before
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Drop the file, its text, the progress label and any result; back to `Idle`
    pub fn clear_file(&mut self) -> u64 {
        self.file_name.clear();
        self.source_text.clear();
        self.result = None;
        if let Some(persistence) = &self.persistence {
            persistence.store_many(&[
                (fields::FILE_NAME, Value::String(String::new())),
                (fields::SOURCE_TEXT, Value::String(String::new())),
                (fields::RESULT, Value::Null),
            ]);
        }
        self.is_loading = false;
        self.is_uploading = false;
        self.pipeline.clear_to(Phase::Idle);
        self.bump_token()
    }

    /// Restore every field to its default and forget persisted values
    pub fn reset(&mut self) -> u64 {
        self.topic.clear();
        self.concepts = ConceptList::new();
        self.language = Language::default();
        self.file_name.clear();
        self.source_text.clear();
        self.result = None;
        self.is_loading = false;
        self.is_uploading = false;
        self.pipeline.reset();
        self.notifications.clear();
        if let Some(persistence) = &self.persistence {
            persistence.clear();
        }
        self.bump_token()
    }

    pub fn snapshot(&self) -> FeatureSnapshot {
        FeatureSnapshot {
            feature: self.feature,
            topic: self.topic.clone(),
            concepts: self.concepts.clone(),
            language: self.language,
            file_name: self.file_name.clone(),
            source_text: self.source_text.clone(),
            result: self.result.clone(),
            is_loading: self.is_loading,
            is_uploading: self.is_uploading,
            pipeline: self.pipeline.clone(),
            notifications: self.notifications.clone(),
        }
    }
}
