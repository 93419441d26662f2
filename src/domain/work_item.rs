use super::{new_id, now_rfc3339};
use serde::{Deserialize, Serialize};

/// Pipeline stage of a work item. The variant order is the pipeline order;
/// `crate::pipeline` relies on the discriminant ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    New,
    Refining,
    Ready,
    Splitting,
    Executing,
    Done,
}

impl WorkItemState {
    pub const ALL: [WorkItemState; 6] = [
        WorkItemState::New,
        WorkItemState::Refining,
        WorkItemState::Ready,
        WorkItemState::Splitting,
        WorkItemState::Executing,
        WorkItemState::Done,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Refining => "Refining",
            Self::Ready => "Ready",
            Self::Splitting => "Splitting",
            Self::Executing => "Executing",
            Self::Done => "Done",
        }
    }
}

impl std::fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A user-facing unit of intake, refined and split before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub state: WorkItemState,
    pub priority: i32,

    /// Confidence score reported by the last refinement run, 0.0..=1.0.
    #[serde(default)]
    pub confidence: Option<f64>,

    /// True while a human gate is unresolved; blocks scheduling and
    /// explicit transitions.
    #[serde(default)]
    pub gate_pending: bool,

    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub pause_reason: Option<String>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub has_error: bool,
    #[serde(default)]
    pub last_error: Option<String>,

    /// Run id while an agent run is executing against this item.
    /// At most one unit system-wide has this set.
    #[serde(default)]
    pub assigned_run: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl WorkItem {
    pub fn new(title: &str, description: &str, priority: i32) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            state: WorkItemState::New,
            priority,
            confidence: None,
            gate_pending: false,
            paused: false,
            pause_reason: None,
            retry_count: 0,
            has_error: false,
            last_error: None,
            assigned_run: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }

    pub fn pause(&mut self, reason: &str) {
        self.paused = true;
        self.pause_reason = Some(reason.to_string());
        self.touch();
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.pause_reason = None;
        self.retry_count = 0;
        self.has_error = false;
        self.touch();
    }
}
