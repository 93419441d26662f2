//! Entity types shared across the orchestration core.
//!
//! These are the persisted records: work items, tasks, artifacts, human
//! gates, agent questions, and rollback audit entries. State transition
//! rules live in `crate::pipeline`, not here.

mod artifact;
mod gate;
mod question;
mod rollback;
mod task;
mod work_item;

pub use artifact::{Artifact, ArtifactKind};
pub use gate::{GateReason, GateStatus, HumanGate};
pub use question::{AgentQuestion, QuestionAnswer, QuestionItem, QuestionStatus};
pub use rollback::{RollbackRecord, RollbackTrigger};
pub use task::{Task, TaskState};
pub use work_item::{WorkItem, WorkItemState};

use serde::{Deserialize, Serialize};

/// Reference to either kind of schedulable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum UnitRef {
    WorkItem(String),
    Task(String),
}

impl UnitRef {
    pub fn id(&self) -> &str {
        match self {
            Self::WorkItem(id) | Self::Task(id) => id,
        }
    }
}

impl std::fmt::Display for UnitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkItem(id) => write!(f, "work_item:{}", id),
            Self::Task(id) => write!(f, "task:{}", id),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
