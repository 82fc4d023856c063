use serde::{Deserialize, Serialize};
use study_flow::FeatureSnapshot;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub feature: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFieldsRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptOp {
    Add,
    Remove,
    Update,
}

#[derive(Debug, Deserialize)]
pub struct ConceptRequest {
    pub op: ConceptOp,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoicesQuery {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub state: FeatureSnapshot,
}
