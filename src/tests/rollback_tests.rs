use super::*;
use crate::domain::{Artifact, ArtifactKind, Task};
use crate::events::NullSink;
use crate::store::MemoryStore;

async fn task_in_reviewing(store: &Arc<dyn Store>) -> Task {
    let mut task = Task::new("wi-1", "task", "desc", 0);
    task.state = TaskState::Reviewing;
    task.retry_count = 3;
    task.has_error = true;
    task.last_error = Some("stuck".to_string());
    store.save_task(&task).await.unwrap();
    task
}

fn deps() -> (Arc<dyn Store>, Arc<dyn EventSink>) {
    (Arc::new(MemoryStore::new()), Arc::new(NullSink))
}

#[tokio::test]
async fn test_rollback_jumps_backward_and_resets_counters() {
    let (store, events) = deps();
    let task = task_in_reviewing(&store).await;

    let record = rollback_task(
        &store,
        &events,
        &task.id,
        TaskState::Planning,
        RollbackTrigger::RegressionDetected,
    )
    .await
    .unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Planning);
    assert_eq!(task.retry_count, 0);
    assert!(!task.has_error);
    assert!(task.last_error.is_none());

    assert_eq!(record.state_before, "Reviewing");
    assert_eq!(record.target_state, "Planning");
    assert!(!record.recovery_options.is_empty());
}

#[tokio::test]
async fn test_rollback_preserves_artifacts_at_or_after_target() {
    let (store, events) = deps();
    let task = task_in_reviewing(&store).await;
    let unit = UnitRef::Task(task.id.clone());

    let research = Artifact::new(
        unit.clone(),
        "Research",
        ArtifactKind::Research,
        "notes",
        "claude",
    );
    let plan = Artifact::new(unit.clone(), "Planning", ArtifactKind::Plan, "plan", "claude");
    let code = Artifact::new(unit.clone(), "Implementing", ArtifactKind::Code, "diff", "claude");
    store.append_artifact(&research).await.unwrap();
    store.append_artifact(&plan).await.unwrap();
    store.append_artifact(&code).await.unwrap();

    let record = rollback_task(
        &store,
        &events,
        &task.id,
        TaskState::Planning,
        RollbackTrigger::HumanRejected,
    )
    .await
    .unwrap();

    // Planning and Implementing artifacts are at-or-after the target;
    // Research is before it.
    assert!(record.preserved_artifacts.contains(&plan.id));
    assert!(record.preserved_artifacts.contains(&code.id));
    assert!(!record.preserved_artifacts.contains(&research.id));

    // Nothing was deleted.
    assert_eq!(store.artifacts_for_unit(&unit).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_rollback_record_is_appended() {
    let (store, events) = deps();
    let task = task_in_reviewing(&store).await;
    let unit = UnitRef::Task(task.id.clone());

    rollback_task(
        &store,
        &events,
        &task.id,
        TaskState::Research,
        RollbackTrigger::MaxRetriesExceeded,
    )
    .await
    .unwrap();

    let records = store.rollbacks_for_unit(&unit).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].trigger, RollbackTrigger::MaxRetriesExceeded);
}

#[tokio::test]
async fn test_rollback_rejects_forward_or_same_target() {
    let (store, events) = deps();
    let task = task_in_reviewing(&store).await;

    let err = rollback_task(
        &store,
        &events,
        &task.id,
        TaskState::Reviewing,
        RollbackTrigger::ManualAbort,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not earlier"));

    let err = rollback_task(
        &store,
        &events,
        &task.id,
        TaskState::Done,
        RollbackTrigger::ManualAbort,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not earlier"));
}

#[tokio::test]
async fn test_rollback_work_item() {
    let (store, events) = deps();
    let mut item = crate::domain::WorkItem::new("item", "", 0);
    item.state = WorkItemState::Splitting;
    item.retry_count = 2;
    store.save_work_item(&item).await.unwrap();

    let record = rollback_work_item(
        &store,
        &events,
        &item.id,
        WorkItemState::Refining,
        RollbackTrigger::ManualAbort,
    )
    .await
    .unwrap();

    let item = store.load_work_item(&item.id).await.unwrap().unwrap();
    assert_eq!(item.state, WorkItemState::Refining);
    assert_eq!(item.retry_count, 0);
    assert_eq!(record.state_before, "Splitting");
}
