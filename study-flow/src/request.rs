use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};
use crate::feature::{FeatureKind, FieldKind, Language};

/// Inputs of one generation call for one feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub feature: FeatureKind,
    pub inputs: Map<String, Value>,
    pub language: Language,
}

impl GenerationRequest {
    pub fn new(feature: FeatureKind, language: Language) -> Self {
        Self {
            feature,
            inputs: Map::new(),
            language,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(field.into(), value.into());
        self
    }

    /// Build a request from an endpoint's JSON body. `language` is optional and
    /// defaults to Hebrew; every other key is kept as an input.
    pub fn from_body(feature: FeatureKind, body: Value) -> Result<Self> {
        let mut inputs = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(FlowError::InvalidInput {
                    field: "body".to_string(),
                    reason: "expected a JSON object".to_string(),
                });
            }
        };

        let language = match inputs.remove("language") {
            None | Some(Value::Null) => Language::default(),
            Some(Value::String(s)) if s.trim().is_empty() => Language::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(FlowError::InvalidInput {
                    field: "language".to_string(),
                    reason: format!("expected a string, got {other}"),
                });
            }
        };

        Ok(Self {
            feature,
            inputs,
            language,
        })
    }

    /// JSON body for the feature's endpoint
    pub fn to_body(&self) -> Value {
        let mut body = self.inputs.clone();
        body.insert(
            "language".to_string(),
            Value::String(self.language.as_str().to_string()),
        );
        Value::Object(body)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.inputs
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn number(&self, field: &str) -> Option<u64> {
        match self.inputs.get(field)? {
            Value::Number(n) => n.as_u64().filter(|n| *n > 0),
            Value::String(s) => s.trim().parse::<u64>().ok().filter(|n| *n > 0),
            _ => None,
        }
    }

    /// Non-empty trimmed string elements of a list input
    pub fn list(&self, field: &str) -> Vec<&str> {
        self.inputs
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fill `field` with `value` unless the caller already supplied text for it
    pub fn fill_blank(&mut self, field: &str, value: &str) -> bool {
        if self.text(field).is_some() || value.trim().is_empty() {
            return false;
        }
        self.inputs
            .insert(field.to_string(), Value::String(value.to_string()));
        true
    }

    /// Fail fast with `MissingInput` naming the first blank required field
    pub fn validate(&self) -> Result<()> {
        for field in self.feature.spec().required {
            let present = match field.kind {
                FieldKind::Text => self.text(field.name).is_some(),
                FieldKind::Number => self.number(field.name).is_some(),
                FieldKind::List => !self.list(field.name).is_empty(),
            };
            if !present {
                return Err(FlowError::MissingInput {
                    field: field.name.to_string(),
                });
            }
        }
        Ok(())
    }
}
