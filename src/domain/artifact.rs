use super::{new_id, now_rfc3339, UnitRef};
use serde::{Deserialize, Serialize};

/// What kind of output a run produced. One per pipeline stage that emits
/// anything durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Refinement,
    Split,
    Research,
    Plan,
    Code,
    Simplification,
    Verification,
    Review,
    Summary,
}

/// Immutable record of agent output for one (unit, stage) pair.
/// Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub unit: UnitRef,
    /// Stage label at the time the artifact was produced.
    pub stage: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub agent: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Set when the producing run explicitly asked for human input.
    #[serde(default)]
    pub human_input_requested: bool,
    pub created_at: String,
}

impl Artifact {
    pub fn new(unit: UnitRef, stage: &str, kind: ArtifactKind, content: &str, agent: &str) -> Self {
        Self {
            id: new_id(),
            unit,
            stage: stage.to_string(),
            kind,
            content: content.to_string(),
            agent: agent.to_string(),
            confidence: None,
            human_input_requested: false,
            created_at: now_rfc3339(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
