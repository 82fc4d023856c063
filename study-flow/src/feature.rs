//! Catalogue of study tools and the per-feature configuration that
//! parameterises the shared pipelines.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

use crate::document::DocumentKind;
use crate::error::{FlowError, Result};

/// Answer language of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Hebrew,
    English,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Hebrew => "hebrew",
            Language::English => "english",
        }
    }

    /// BCP 47 tag used by speech synthesis
    pub fn tag(self) -> &'static str {
        match self {
            Language::Hebrew => "he-IL",
            Language::English => "en-US",
        }
    }
}

impl FromStr for Language {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hebrew" => Ok(Language::Hebrew),
            "english" => Ok(Language::English),
            other => Err(FlowError::InvalidInput {
                field: "language".to_string(),
                reason: format!("expected `hebrew` or `english`, got `{other}`"),
            }),
        }
    }
}

/// One independent study tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    Quiz,
    Flashcards,
    Schedule,
    FormulaSheet,
    SummaryTable,
    Bibliography,
    Charts,
    Presentation,
    Speech,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 9] = [
        FeatureKind::Quiz,
        FeatureKind::Flashcards,
        FeatureKind::Schedule,
        FeatureKind::FormulaSheet,
        FeatureKind::SummaryTable,
        FeatureKind::Bibliography,
        FeatureKind::Charts,
        FeatureKind::Presentation,
        FeatureKind::Speech,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            FeatureKind::Quiz => "quiz",
            FeatureKind::Flashcards => "flashcards",
            FeatureKind::Schedule => "schedule",
            FeatureKind::FormulaSheet => "formula-sheet",
            FeatureKind::SummaryTable => "summary-table",
            FeatureKind::Bibliography => "bibliography",
            FeatureKind::Charts => "charts",
            FeatureKind::Presentation => "presentation",
            FeatureKind::Speech => "speech",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    pub fn spec(self) -> &'static FeatureSpec {
        match self {
            FeatureKind::Quiz => &QUIZ,
            FeatureKind::Flashcards => &FLASHCARDS,
            FeatureKind::Schedule => &SCHEDULE,
            FeatureKind::FormulaSheet => &FORMULA_SHEET,
            FeatureKind::SummaryTable => &SUMMARY_TABLE,
            FeatureKind::Bibliography => &BIBLIOGRAPHY,
            FeatureKind::Charts => &CHARTS,
            FeatureKind::Presentation => &PRESENTATION,
            FeatureKind::Speech => &SPEECH,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty after trimming
    Text,
    /// Positive integer, as a JSON number or numeric string
    Number,
    /// At least one non-empty string element
    List,
}

#[derive(Debug, Clone, Copy)]
pub struct RequiredField {
    pub name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Array,
    String,
}

/// Key a result payload must carry
#[derive(Debug, Clone, Copy)]
pub struct ResultKey {
    pub name: &'static str,
    pub kind: ResultKind,
}

/// Per-feature configuration of the shared pipelines
#[derive(Debug)]
pub struct FeatureSpec {
    pub kind: FeatureKind,
    pub required: &'static [RequiredField],
    pub result_keys: &'static [ResultKey],
    /// Input populated from extracted document text when left blank
    pub source_field: &'static str,
    pub accepted: &'static [DocumentKind],
    /// Whether the feature's state survives reloads
    pub persisted: bool,
}

const fn text(name: &'static str) -> RequiredField {
    RequiredField {
        name,
        kind: FieldKind::Text,
    }
}

const fn array(name: &'static str) -> ResultKey {
    ResultKey {
        name,
        kind: ResultKind::Array,
    }
}

const DOCUMENTS: &[DocumentKind] = &[DocumentKind::Pdf, DocumentKind::Text];

static QUIZ: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Quiz,
    required: &[
        text("topic"),
        RequiredField {
            name: "numQuestions",
            kind: FieldKind::Number,
        },
    ],
    result_keys: &[array("questions")],
    source_field: "topic",
    accepted: DOCUMENTS,
    persisted: false,
};

static FLASHCARDS: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Flashcards,
    required: &[text("topic")],
    result_keys: &[array("flashcards")],
    source_field: "topic",
    accepted: DOCUMENTS,
    persisted: false,
};

static SCHEDULE: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Schedule,
    required: &[text("topic"), text("examDate")],
    result_keys: &[array("schedule")],
    source_field: "topic",
    accepted: DOCUMENTS,
    persisted: false,
};

static FORMULA_SHEET: FeatureSpec = FeatureSpec {
    kind: FeatureKind::FormulaSheet,
    required: &[text("topic")],
    result_keys: &[array("formulas")],
    source_field: "topic",
    accepted: DOCUMENTS,
    persisted: false,
};

static SUMMARY_TABLE: FeatureSpec = FeatureSpec {
    kind: FeatureKind::SummaryTable,
    required: &[
        text("topic"),
        RequiredField {
            name: "concepts",
            kind: FieldKind::List,
        },
    ],
    result_keys: &[array("summary")],
    source_field: "sourceText",
    accepted: DOCUMENTS,
    persisted: true,
};

static BIBLIOGRAPHY: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Bibliography,
    required: &[text("text"), text("style")],
    result_keys: &[array("citations")],
    source_field: "text",
    accepted: DOCUMENTS,
    persisted: false,
};

static CHARTS: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Charts,
    required: &[text("text")],
    result_keys: &[array("charts")],
    source_field: "text",
    accepted: DOCUMENTS,
    persisted: false,
};

static PRESENTATION: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Presentation,
    required: &[text("topic")],
    result_keys: &[array("slides")],
    source_field: "topic",
    accepted: DOCUMENTS,
    persisted: false,
};

static SPEECH: FeatureSpec = FeatureSpec {
    kind: FeatureKind::Speech,
    required: &[text("text")],
    result_keys: &[ResultKey {
        name: "audioContent",
        kind: ResultKind::String,
    }],
    source_field: "text",
    accepted: DOCUMENTS,
    persisted: false,
};

impl FeatureSpec {
    pub fn accepts(&self, kind: DocumentKind) -> bool {
        self.accepted.contains(&kind)
    }

    /// Minimal JSON schema naming the result keys, handed to the completion call
    pub fn response_schema(&self) -> Value {
        let mut properties = Map::new();
        for key in self.result_keys {
            let schema = match key.kind {
                ResultKind::Array => json!({ "type": "array" }),
                ResultKind::String => json!({ "type": "string" }),
            };
            properties.insert(key.name.to_string(), schema);
        }
        let required: Vec<&str> = self.result_keys.iter().map(|k| k.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check that a payload carries every result key with the expected JSON type.
    /// Semantic correctness is not interpreted.
    pub fn check_shape(&self, payload: &Value) -> Result<()> {
        let object = payload
            .as_object()
            .ok_or_else(|| FlowError::InvalidResponseShape {
                reason: format!("{} result is not a JSON object", self.kind),
                raw_content: Some(payload.to_string()),
            })?;

        for key in self.result_keys {
            let ok = match (object.get(key.name), key.kind) {
                (Some(Value::Array(_)), ResultKind::Array) => true,
                (Some(Value::String(_)), ResultKind::String) => true,
                _ => false,
            };
            if !ok {
                return Err(FlowError::InvalidResponseShape {
                    reason: format!("{} result is missing `{}`", self.kind, key.name),
                    raw_content: Some(payload.to_string()),
                });
            }
        }
        Ok(())
    }
}
