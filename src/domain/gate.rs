use super::{new_id, now_rfc3339, UnitRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

/// Why a gate was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// The stage's confidence score fell below the configured threshold.
    LowConfidence,
    /// The agent explicitly requested human input.
    AgentRequested,
    /// The stage is configured as mandatorily gated.
    MandatoryStage,
}

/// A human-approval checkpoint blocking further progress until resolved.
/// At most one pending gate exists per unit; the owning unit's
/// `gate_pending` flag enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanGate {
    pub id: String,
    pub unit: UnitRef,
    pub status: GateStatus,
    pub reason: GateReason,
    /// Unit confidence at the time the gate was raised.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Free-text context shown to the approver.
    pub note: String,
    pub created_at: String,
    #[serde(default)]
    pub resolved_at: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    /// The approver's note, used verbatim as a pause reason on rejection.
    #[serde(default)]
    pub resolution_note: Option<String>,
}

impl HumanGate {
    pub fn new(unit: UnitRef, reason: GateReason, note: &str, confidence: Option<f64>) -> Self {
        Self {
            id: new_id(),
            unit,
            status: GateStatus::Pending,
            reason,
            confidence,
            note: note.to_string(),
            created_at: now_rfc3339(),
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    pub fn resolve(&mut self, status: GateStatus, by: &str, note: Option<String>) {
        self.status = status;
        self.resolved_at = Some(now_rfc3339());
        self.resolved_by = Some(by.to_string());
        self.resolution_note = note;
    }
}
