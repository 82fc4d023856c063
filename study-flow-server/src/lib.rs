pub mod config;
pub mod errors;
pub mod extract;
pub mod models;
pub mod service;
pub mod sessions;

pub use config::ServerSettings;
pub use errors::{ApiError, ApiResult};
pub use extract::{LocalFileService, PdfOcr};
pub use service::{AppState, build_router, create_app, create_app_state};
pub use sessions::SessionRegistry;
