use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FlowError, Result};

fn default_upload_timeout() -> u64 {
    120
}

fn default_extract_timeout() -> u64 {
    300
}

fn default_generation_timeout() -> u64 {
    180
}

/// Deadlines of the network-bound steps, shared by every feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_timeout_secs: default_upload_timeout(),
            extract_timeout_secs: default_extract_timeout(),
            generation_timeout_secs: default_generation_timeout(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| FlowError::InvalidInput {
            field: "pipeline config".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
