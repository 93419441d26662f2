//! Stage-specific prompt construction.
//!
//! The scheduler launches the agent with a prompt describing the unit and
//! the stage it is in; the agent does the reasoning, this module only
//! frames it. Prompts are XML-structured so the agent can tell the unit
//! description apart from the instructions.

use crate::domain::{ArtifactKind, Task, TaskState, WorkItem, WorkItemState};

/// The prompt and bookkeeping labels for one scheduled run.
#[derive(Debug, Clone)]
pub struct StagePrompt {
    /// Stage label recorded on events and artifacts.
    pub stage: String,
    pub prompt: String,
    pub artifact_kind: ArtifactKind,
}

pub fn work_item_prompt(item: &WorkItem) -> StagePrompt {
    let (instruction, artifact_kind) = match item.state {
        WorkItemState::New | WorkItemState::Refining => (
            "Refine this work item: clarify the goal, surface hidden requirements, \
             and state acceptance criteria. End with a one-paragraph summary.",
            ArtifactKind::Refinement,
        ),
        WorkItemState::Ready | WorkItemState::Splitting => (
            "Split this work item into an ordered list of small, independently \
             verifiable tasks. For each task give a title and a two-sentence \
             description.",
            ArtifactKind::Split,
        ),
        // Not schedulable; covered for completeness.
        WorkItemState::Executing | WorkItemState::Done => {
            ("Summarize the current status of this work item.", ArtifactKind::Summary)
        }
    };

    StagePrompt {
        stage: item.state.label().to_string(),
        prompt: format!(
            "<work-item>\n<title>{}</title>\n<description>\n{}\n</description>\n</work-item>\n\n{}",
            item.title, item.description, instruction
        ),
        artifact_kind,
    }
}

pub fn task_prompt(task: &Task) -> StagePrompt {
    let (instruction, artifact_kind) = match task.state {
        TaskState::Backlog | TaskState::Split => (
            "Assess this task: confirm it is small enough to implement directly, \
             or propose how to subdivide it.",
            ArtifactKind::Split,
        ),
        TaskState::Research => (
            "Research this task: locate the relevant code, describe the current \
             behavior, and list constraints an implementation must respect.",
            ArtifactKind::Research,
        ),
        TaskState::Planning => (
            "Write an implementation plan for this task: files to change, the \
             approach, and how it will be verified.",
            ArtifactKind::Plan,
        ),
        TaskState::Implementing => (
            "Implement this task following the existing plan. Make the smallest \
             change that satisfies the description.",
            ArtifactKind::Code,
        ),
        TaskState::Simplifying => (
            "Review the implementation for this task and simplify it: remove \
             duplication and dead code without changing behavior.",
            ArtifactKind::Simplification,
        ),
        TaskState::Verifying => (
            "Verify this task: run the relevant tests and checks, and report \
             exactly what passed and failed.",
            ArtifactKind::Verification,
        ),
        TaskState::Reviewing => (
            "Review the change for this task as a careful colleague would: \
             correctness first, then clarity. List concrete findings.",
            ArtifactKind::Review,
        ),
        // Not schedulable; covered for completeness.
        TaskState::PrReady | TaskState::Done => (
            "Summarize the change made for this task.",
            ArtifactKind::Summary,
        ),
    };

    StagePrompt {
        stage: task.state.label().to_string(),
        prompt: format!(
            "<task>\n<title>{}</title>\n<description>\n{}\n</description>\n</task>\n\n{}",
            task.title, task.description, instruction
        ),
        artifact_kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_prompt_embeds_title_and_description() {
        let item = WorkItem::new("Add caching", "Cache the thing", 0);
        let prompt = work_item_prompt(&item);
        assert_eq!(prompt.stage, "New");
        assert!(prompt.prompt.contains("<title>Add caching</title>"));
        assert!(prompt.prompt.contains("Cache the thing"));
        assert_eq!(prompt.artifact_kind, ArtifactKind::Refinement);
    }

    #[test]
    fn test_split_stage_produces_split_artifact() {
        let mut item = WorkItem::new("t", "d", 0);
        item.state = WorkItemState::Splitting;
        assert_eq!(work_item_prompt(&item).artifact_kind, ArtifactKind::Split);
    }

    #[test]
    fn test_task_prompt_tracks_stage() {
        let mut task = Task::new("wi", "Fix parser", "Handle empty input", 0);
        task.state = TaskState::Planning;
        let prompt = task_prompt(&task);
        assert_eq!(prompt.stage, "Planning");
        assert_eq!(prompt.artifact_kind, ArtifactKind::Plan);
        assert!(prompt.prompt.contains("implementation plan"));

        task.state = TaskState::Reviewing;
        assert_eq!(task_prompt(&task).artifact_kind, ArtifactKind::Review);
    }
}
