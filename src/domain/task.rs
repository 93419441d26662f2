use super::{new_id, now_rfc3339};
use serde::{Deserialize, Serialize};

/// Pipeline stage of a task. Variant order is pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Backlog,
    Split,
    Research,
    Planning,
    Implementing,
    Simplifying,
    Verifying,
    Reviewing,
    PrReady,
    Done,
}

impl TaskState {
    pub const ALL: [TaskState; 10] = [
        TaskState::Backlog,
        TaskState::Split,
        TaskState::Research,
        TaskState::Planning,
        TaskState::Implementing,
        TaskState::Simplifying,
        TaskState::Verifying,
        TaskState::Reviewing,
        TaskState::PrReady,
        TaskState::Done,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Backlog => "Backlog",
            Self::Split => "Split",
            Self::Research => "Research",
            Self::Planning => "Planning",
            Self::Implementing => "Implementing",
            Self::Simplifying => "Simplifying",
            Self::Verifying => "Verifying",
            Self::Reviewing => "Reviewing",
            Self::PrReady => "PR Ready",
            Self::Done => "Done",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// An executable leaf (or hierarchical parent) unit driven through the
/// implementation pipeline.
///
/// Parent tasks never run; their state is derived from children via
/// `crate::pipeline::derive_parent_state` and stored here only for display
/// and scheduling of descendants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub work_item_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub title: String,
    pub description: String,
    pub state: TaskState,
    pub priority: i32,
    /// Execution order among siblings.
    pub sort_order: u32,

    #[serde(default)]
    pub confidence: Option<f64>,
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

    #[serde(default)]
    pub assigned_run: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn new(work_item_id: &str, title: &str, description: &str, sort_order: u32) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            work_item_id: work_item_id.to_string(),
            parent_id: None,
            title: title.to_string(),
            description: description.to_string(),
            state: TaskState::Backlog,
            priority: 0,
            sort_order,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering_follows_pipeline() {
        assert!(TaskState::Backlog < TaskState::Planning);
        assert!(TaskState::Planning < TaskState::Implementing);
        assert!(TaskState::PrReady < TaskState::Done);
    }

    #[test]
    fn test_new_task_starts_in_backlog() {
        let task = Task::new("wi-1", "t", "d", 3);
        assert_eq!(task.state, TaskState::Backlog);
        assert_eq!(task.work_item_id, "wi-1");
        assert_eq!(task.sort_order, 3);
        assert!(task.parent_id.is_none());
    }
}
