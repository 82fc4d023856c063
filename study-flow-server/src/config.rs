use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::path::PathBuf;
use study_flow::PipelineConfig;

pub const CONFIG_PATH_VAR: &str = "STUDY_FLOW_CONFIG";

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_ocr_model() -> String {
    "openai/gpt-4.1-mini".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

/// Server settings: optional YAML file, then environment overrides
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub openrouter_api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_ocr_model")]
    pub ocr_model: String,
    /// Remote ingestion service; PDFs and text are handled in-process when unset
    #[serde(default)]
    pub file_service_url: Option<String>,
    #[serde(default)]
    pub speech_url: Option<String>,
    #[serde(default = "default_speech_model")]
    pub speech_model: String,
    #[serde(default)]
    pub speech_api_key: Option<String>,
    /// Directory for durable feature state; memory only when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            openrouter_api_key: None,
            model: default_model(),
            ocr_model: default_ocr_model(),
            file_service_url: None,
            speech_url: None,
            speech_model: default_speech_model(),
            speech_api_key: None,
            state_dir: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerSettings {
    /// Read the file named by `STUDY_FLOW_CONFIG` (if any) and apply the process environment
    pub fn load() -> anyhow::Result<Self> {
        let mut settings = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read config file {path}"))?;
                Self::from_yaml_str(&raw)?
            }
            Err(_) => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("invalid server config")
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("PORT must be a port number, got `{port}`"))?;
        }
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            self.openrouter_api_key = Some(key);
        }
        if let Some(model) = lookup("STUDY_FLOW_MODEL") {
            self.model = model;
        }
        if let Some(model) = lookup("STUDY_FLOW_OCR_MODEL") {
            self.ocr_model = model;
        }
        if let Some(url) = lookup("STUDY_FLOW_FILE_SERVICE_URL") {
            self.file_service_url = Some(url);
        }
        if let Some(url) = lookup("STUDY_FLOW_SPEECH_URL") {
            self.speech_url = Some(url);
        }
        if let Some(model) = lookup("STUDY_FLOW_SPEECH_MODEL") {
            self.speech_model = model;
        }
        if let Some(key) = lookup("STUDY_FLOW_SPEECH_API_KEY") {
            self.speech_api_key = Some(key);
        }
        if let Some(dir) = lookup("STUDY_FLOW_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn api_key(&self) -> anyhow::Result<&str> {
        self.openrouter_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn yaml_then_env() {
        let mut settings = ServerSettings::from_yaml_str(
            "port: 8080\nmodel: anthropic/claude-3.5-haiku\npipeline:\n  generation_timeout_secs: 60\n",
        )
        .unwrap();
        assert_eq!(settings.pipeline.generation_timeout_secs, 60);
        assert_eq!(settings.pipeline.upload_timeout_secs, 120);

        let env: HashMap<&str, &str> =
            HashMap::from([("PORT", "9090"), ("OPENROUTER_API_KEY", "sk-test")]);
        settings
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.port, 9090);
        assert_eq!(settings.model, "anthropic/claude-3.5-haiku");
        assert_eq!(settings.api_key().unwrap(), "sk-test");
    }

    #[test]
    fn bad_port_and_missing_key_are_errors() {
        let mut settings = ServerSettings::default();
        assert!(settings.api_key().is_err());
        assert!(settings.apply_env(|k| (k == "PORT").then(|| "http".to_string())).is_err());
    }
}
