use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use study_flow::{
    FeatureKind, FeatureSession, FeatureStore, FlowError, GenerationPipeline, IngestionPipeline,
    Result, StateBackend,
};
use tracing::info;
use uuid::Uuid;

const MAX_ID_LEN: usize = 64;

fn check_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FlowError::InvalidInput {
            field: "sessionId".to_string(),
            reason: format!("use up to {MAX_ID_LEN} letters, digits, `-` or `_`"),
        })
    }
}

/// Live feature sessions, keyed by id
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<FeatureSession>>,
    ingestion: IngestionPipeline,
    generation: GenerationPipeline,
    backend: Arc<dyn StateBackend>,
}

impl SessionRegistry {
    pub fn new(
        ingestion: IngestionPipeline,
        generation: GenerationPipeline,
        backend: Arc<dyn StateBackend>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            ingestion,
            generation,
            backend,
        }
    }

    /// Return the live session `session_id`, or open it. Persisted features
    /// restore their state from the backend under `<feature>:<session id>`.
    /// Sessions live until removed.
    pub fn open(&self, feature: FeatureKind, session_id: Option<String>) -> Result<Arc<FeatureSession>> {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        check_id(&id)?;

        match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if existing.feature() != feature {
                    return Err(FlowError::InvalidInput {
                        field: "sessionId".to_string(),
                        reason: format!("session belongs to `{}`", existing.feature()),
                    });
                }
                Ok(existing.clone())
            }
            Entry::Vacant(entry) => {
                let store = if feature.spec().persisted {
                    FeatureStore::persisted(
                        feature,
                        self.backend.clone(),
                        format!("{}:{}", feature.slug(), id),
                    )
                } else {
                    FeatureStore::new(feature)
                };
                let session = Arc::new(FeatureSession::new(
                    id.clone(),
                    store,
                    self.ingestion.clone(),
                    self.generation.clone(),
                ));
                entry.insert(session.clone());
                info!(session_id = %id, feature = %feature, "session opened");
                Ok(session)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<FeatureSession>> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
