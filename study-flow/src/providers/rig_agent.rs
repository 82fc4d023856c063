use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openrouter;
use serde_json::Value;
use tracing::info;

use crate::error::{FlowError, Result};
use crate::generate::{Completer, parse_json_payload};

const JSON_ONLY_PREAMBLE: &str = "You are a study assistant for students. \
    Always answer with a single valid JSON object and nothing else: \
    no Markdown, no commentary.";

/// [`Completer`] backed by a rig OpenRouter agent
pub struct RigCompleter {
    agent: Agent<openrouter::CompletionModel>,
    model: String,
}

impl RigCompleter {
    pub fn new(api_key: &str, model: &str) -> Self {
        let client = openrouter::Client::new(api_key);
        let agent = client.agent(model).preamble(JSON_ONLY_PREAMBLE).build();
        Self {
            agent,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Completer for RigCompleter {
    async fn complete(&self, prompt: &str, response_schema: Option<&Value>) -> Result<Value> {
        let prompt = match response_schema {
            Some(schema) => format!("{prompt}\n\nJSON schema of the answer:\n{schema}"),
            None => prompt.to_string(),
        };

        let reply = self
            .agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| FlowError::Upstream {
                status: None,
                message: e.to_string(),
            })?;

        info!(model = %self.model, chars = reply.len(), "agent completion received");
        parse_json_payload(&reply)
    }
}
