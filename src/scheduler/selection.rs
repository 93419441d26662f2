//! Pure selection: which unit of work runs next.
//!
//! Work items are prioritized over tasks so refinement work drains before
//! execution work. Within each pool: priority descending, earlier pipeline
//! stage first, then creation time ascending.

use crate::domain::{Task, UnitRef, WorkItem};
use crate::pipeline::{task_schedulable, work_item_schedulable, Stage};
use std::collections::HashSet;

fn work_item_eligible(item: &WorkItem, max_retries: u32) -> bool {
    work_item_schedulable(item.state)
        && !item.paused
        && !item.gate_pending
        && item.assigned_run.is_none()
        && (!item.has_error || item.retry_count < max_retries)
}

fn task_eligible(task: &Task, max_retries: u32, parent_ids: &HashSet<String>) -> bool {
    // A task with children is never itself scheduled.
    !parent_ids.contains(&task.id)
        && task_schedulable(task.state)
        && !task.paused
        && !task.gate_pending
        && task.assigned_run.is_none()
        && (!task.has_error || task.retry_count < max_retries)
}

/// Picks the next unit to run, or `None` to idle until the next tick.
pub fn select_next(
    work_items: &[WorkItem],
    tasks: &[Task],
    max_retries: u32,
) -> Option<UnitRef> {
    let parent_ids: HashSet<String> = tasks
        .iter()
        .filter_map(|t| t.parent_id.clone())
        .collect();

    let mut items: Vec<&WorkItem> = work_items
        .iter()
        .filter(|i| work_item_eligible(i, max_retries))
        .collect();
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.state.position().cmp(&b.state.position()))
            .then(a.created_at.cmp(&b.created_at))
    });
    if let Some(item) = items.first() {
        return Some(UnitRef::WorkItem(item.id.clone()));
    }

    let mut leaves: Vec<&Task> = tasks
        .iter()
        .filter(|t| task_eligible(t, max_retries, &parent_ids))
        .collect();
    leaves.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.state.position().cmp(&b.state.position()))
            .then(a.created_at.cmp(&b.created_at))
    });
    leaves.first().map(|t| UnitRef::Task(t.id.clone()))
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
