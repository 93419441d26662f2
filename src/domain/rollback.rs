use super::{new_id, now_rfc3339, UnitRef};
use serde::{Deserialize, Serialize};

/// What caused a rollback to be invoked. Rollback is always explicit;
/// the trigger records the operator's stated cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTrigger {
    MaxRetriesExceeded,
    HumanRejected,
    RegressionDetected,
    ManualAbort,
}

impl RollbackTrigger {
    /// Static recovery options surfaced to the operator per trigger type.
    pub fn recovery_options(&self) -> Vec<&'static str> {
        match self {
            Self::MaxRetriesExceeded => vec![
                "Review the last error and adjust the task description",
                "Resume the unit to retry from the target stage",
                "Split the unit into smaller tasks",
            ],
            Self::HumanRejected => vec![
                "Revise the rejected artifact and resume",
                "Re-run the stage with amended instructions",
            ],
            Self::RegressionDetected => vec![
                "Inspect artifacts produced after the target stage",
                "Re-run verification before advancing again",
            ],
            Self::ManualAbort => vec![
                "Resume the unit when ready",
                "Leave the unit paused for later triage",
            ],
        }
    }
}

/// Append-only audit entry written by the rollback operation.
/// Bookkeeping and state reset only; no workspace mutation is implied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub id: String,
    pub unit: UnitRef,
    pub trigger: RollbackTrigger,
    /// Stage label before the rollback.
    pub state_before: String,
    /// Stage label the unit was reset to.
    pub target_state: String,
    /// Human-readable description of each action taken.
    pub actions: Vec<String>,
    /// Artifacts produced at or after the target stage; preserved, never
    /// deleted.
    pub preserved_artifacts: Vec<String>,
    pub recovery_options: Vec<String>,
    pub created_at: String,
}

impl RollbackRecord {
    pub fn new(
        unit: UnitRef,
        trigger: RollbackTrigger,
        state_before: &str,
        target_state: &str,
    ) -> Self {
        Self {
            id: new_id(),
            unit,
            trigger,
            state_before: state_before.to_string(),
            target_state: target_state.to_string(),
            actions: Vec::new(),
            preserved_artifacts: Vec::new(),
            recovery_options: trigger
                .recovery_options()
                .into_iter()
                .map(String::from)
                .collect(),
            created_at: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_options_are_static_per_trigger() {
        for trigger in [
            RollbackTrigger::MaxRetriesExceeded,
            RollbackTrigger::HumanRejected,
            RollbackTrigger::RegressionDetected,
            RollbackTrigger::ManualAbort,
        ] {
            assert!(!trigger.recovery_options().is_empty());
            assert_eq!(trigger.recovery_options(), trigger.recovery_options());
        }
    }

    #[test]
    fn test_record_captures_trigger_options() {
        let record = RollbackRecord::new(
            UnitRef::Task("t-1".to_string()),
            RollbackTrigger::HumanRejected,
            "Reviewing",
            "Planning",
        );
        assert_eq!(record.recovery_options.len(), 2);
        assert_eq!(record.state_before, "Reviewing");
        assert_eq!(record.target_state, "Planning");
    }
}
