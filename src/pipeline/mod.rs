//! Pure pipeline state machine.
//!
//! The ONLY place transition legality is decided. No I/O: the scheduler
//! asks these functions for the next state and applies the answer through
//! the store.

use crate::domain::{TaskState, WorkItemState};

/// An ordered pipeline stage enum. `ORDER` is the authoritative pipeline
/// order; adjacency and success transitions are derived from it.
pub trait Stage: Copy + Eq + Ord + std::fmt::Display + 'static {
    const ORDER: &'static [Self];

    fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or(usize::MAX)
    }

    fn is_terminal(self) -> bool {
        Self::ORDER.last() == Some(&self)
    }
}

impl Stage for WorkItemState {
    const ORDER: &'static [Self] = &WorkItemState::ALL;
}

impl Stage for TaskState {
    const ORDER: &'static [Self] = &TaskState::ALL;
}

/// The fixed adjacency map: the state a Success outcome advances to.
/// Terminal states have no entry.
pub fn next_on_success<S: Stage>(state: S) -> Option<S> {
    let pos = state.position();
    S::ORDER.get(pos + 1).copied()
}

/// The previous state in pipeline order, if any.
pub fn prev<S: Stage>(state: S) -> Option<S> {
    let pos = state.position();
    pos.checked_sub(1).and_then(|p| S::ORDER.get(p)).copied()
}

/// The single legality rule for explicit transition requests: exactly one
/// step in either direction. Rollback is the only operation allowed to
/// jump further, and it does not go through this check.
pub fn is_adjacent<S: Stage>(from: S, to: S) -> bool {
    let (a, b) = (from.position(), to.position());
    a.abs_diff(b) == 1
}

/// Rolls a parent task's state up from its children: Done only when all
/// children are Done, otherwise the state of the least-advanced
/// non-terminal child (ties broken by pipeline order).
///
/// Used only for display and scheduling of parents; parents themselves are
/// never scheduled.
pub fn derive_parent_state(child_states: &[TaskState]) -> TaskState {
    if child_states.is_empty() {
        return TaskState::Backlog;
    }
    if child_states.iter().all(|s| *s == TaskState::Done) {
        return TaskState::Done;
    }
    child_states
        .iter()
        .copied()
        .filter(|s| *s != TaskState::Done)
        .min()
        .unwrap_or(TaskState::Backlog)
}

/// Whether the scheduler may pick a work item in this state. Executing
/// items advance through their tasks; Done is terminal.
pub fn work_item_schedulable(state: WorkItemState) -> bool {
    matches!(
        state,
        WorkItemState::New
            | WorkItemState::Refining
            | WorkItemState::Ready
            | WorkItemState::Splitting
    )
}

/// Whether the scheduler may pick a (leaf) task in this state. PrReady
/// awaits explicit human action; Done is terminal.
pub fn task_schedulable(state: TaskState) -> bool {
    !matches!(state, TaskState::PrReady | TaskState::Done)
}
