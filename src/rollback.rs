//! Explicit failure-recovery rollback.
//!
//! Bookkeeping and state reset only: snapshots the unit, writes an
//! immutable audit record referencing the artifacts still valid at or
//! after the target stage, force-sets the state, and resets stage-local
//! counters. It never touches the workspace or version control, and it is
//! never invoked automatically.

use crate::domain::{
    RollbackRecord, RollbackTrigger, TaskState, UnitRef, WorkItemState,
};
use crate::events::{EventSink, OrchestratorEvent};
use crate::pipeline::Stage;
use crate::store::Store;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

pub async fn rollback_work_item(
    store: &Arc<dyn Store>,
    events: &Arc<dyn EventSink>,
    id: &str,
    target: WorkItemState,
    trigger: RollbackTrigger,
) -> Result<RollbackRecord> {
    let mut item = store
        .load_work_item(id)
        .await?
        .with_context(|| format!("Unknown work item {}", id))?;

    if target.position() >= item.state.position() {
        bail!(
            "Rollback target {} is not earlier than current state {}",
            target,
            item.state
        );
    }

    let unit = UnitRef::WorkItem(item.id.clone());
    let record = build_record(
        store,
        events,
        &unit,
        item.state.label(),
        target.label(),
        trigger,
        stage_position_of::<WorkItemState>(target.label()),
    )
    .await?;

    item.state = target;
    item.retry_count = 0;
    item.has_error = false;
    item.last_error = None;
    item.touch();
    store.save_work_item(&item).await?;

    finish(store, events, &unit, &record).await?;
    Ok(record)
}

pub async fn rollback_task(
    store: &Arc<dyn Store>,
    events: &Arc<dyn EventSink>,
    id: &str,
    target: TaskState,
    trigger: RollbackTrigger,
) -> Result<RollbackRecord> {
    let mut task = store
        .load_task(id)
        .await?
        .with_context(|| format!("Unknown task {}", id))?;

    if target.position() >= task.state.position() {
        bail!(
            "Rollback target {} is not earlier than current state {}",
            target,
            task.state
        );
    }

    let unit = UnitRef::Task(task.id.clone());
    let record = build_record(
        store,
        events,
        &unit,
        task.state.label(),
        target.label(),
        trigger,
        stage_position_of::<TaskState>(target.label()),
    )
    .await?;

    task.state = target;
    task.retry_count = 0;
    task.has_error = false;
    task.last_error = None;
    task.touch();
    store.save_task(&task).await?;

    finish(store, events, &unit, &record).await?;
    Ok(record)
}

/// Position of a stage label in a pipeline's order; labels that are not a
/// stage of that pipeline sort before everything.
fn stage_position_of<S: Stage>(label: &str) -> usize {
    S::ORDER
        .iter()
        .position(|s| s.to_string() == label)
        .unwrap_or(0)
}

async fn build_record(
    store: &Arc<dyn Store>,
    events: &Arc<dyn EventSink>,
    unit: &UnitRef,
    state_before: &str,
    target: &str,
    trigger: RollbackTrigger,
    target_position: usize,
) -> Result<RollbackRecord> {
    events.emit(OrchestratorEvent::RollbackInitiated {
        unit: unit.clone(),
        target: target.to_string(),
    });

    let mut record = RollbackRecord::new(unit.clone(), trigger, state_before, target);
    record
        .actions
        .push(format!("Reset state from {} to {}", state_before, target));
    record
        .actions
        .push("Reset retry counter and error state".to_string());

    // Artifacts produced at or after the target stage stay valid for
    // re-execution and are referenced, never deleted.
    let artifacts = store.artifacts_for_unit(unit).await?;
    for artifact in &artifacts {
        let position = match unit {
            UnitRef::WorkItem(_) => stage_position_of::<WorkItemState>(&artifact.stage),
            UnitRef::Task(_) => stage_position_of::<TaskState>(&artifact.stage),
        };
        if position >= target_position {
            record.preserved_artifacts.push(artifact.id.clone());
        }
    }
    record.actions.push(format!(
        "Preserved {} artifact(s) at or after {}",
        record.preserved_artifacts.len(),
        target
    ));

    Ok(record)
}

async fn finish(
    store: &Arc<dyn Store>,
    events: &Arc<dyn EventSink>,
    unit: &UnitRef,
    record: &RollbackRecord,
) -> Result<()> {
    store.append_rollback(record).await?;
    events.emit(OrchestratorEvent::RollbackCompleted {
        unit: unit.clone(),
        record_id: record.id.clone(),
    });
    Ok(())
}

#[cfg(test)]
#[path = "tests/rollback_tests.rs"]
mod tests;
