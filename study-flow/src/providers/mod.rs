//! Network-backed implementations of the pipeline collaborators.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "rig")]
pub mod rig_agent;

#[cfg(feature = "http")]
pub use http::{
    HttpFileService, HttpGenerator, HttpSpeechSynthesis, OpenRouterClient, OpenRouterCompleter,
};

#[cfg(feature = "rig")]
pub use rig_agent::RigCompleter;
