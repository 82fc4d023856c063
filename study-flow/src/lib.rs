pub mod capabilities;
pub mod concepts;
pub mod config;
pub mod document;
pub mod error;
pub mod feature;
pub mod generate;
pub mod ingest;
pub mod phase;
pub mod prompt;
pub mod providers;
pub mod request;
pub mod session;
pub mod state;
pub mod storage;
pub mod timeout;

// Re-export commonly used types
pub use capabilities::{Clipboard, MemoryClipboard, SpeechAudio, SpeechSynthesis, Voice};
pub use concepts::ConceptList;
pub use config::PipelineConfig;
pub use document::{DocumentKind, ExtractedText, UploadedDocument};
pub use error::{ErrorInfo, ErrorKind, FlowError, Result};
pub use feature::{FeatureKind, FeatureSpec, Language};
pub use generate::{Completer, GenerationPipeline, Generator, LocalGenerator, parse_json_payload};
pub use ingest::{
    ExtractionResponse, FileService, IngestionObserver, IngestionPipeline, UploadReceipt,
};
pub use phase::{Phase, PipelineState};
pub use request::GenerationRequest;
pub use session::FeatureSession;
pub use state::{FeatureSnapshot, FeatureStore, Notification};
pub use storage::{FileStateBackend, InMemoryStateBackend, StateBackend};
pub use timeout::with_timeout;
