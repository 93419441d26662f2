use super::*;
use crate::config::{AgentConfig, GateConfig, QuestionConfig, SchedulerConfig};
use crate::domain::{Task, WorkItem};
use crate::prompts;
use crate::store::MemoryStore;
use super::run::RunProduct;
use std::collections::HashMap;
use std::time::Duration;

/// Sink that records every event for assertions.
#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<OrchestratorEvent>>,
}

impl CollectingSink {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: OrchestratorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn config_with_script(script: &str, max_retries: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        agent: AgentConfig {
            command: "sh".to_string(),
            executable: Some(PathBuf::from("/bin/sh")),
            // The prompt lands after the script as $0; the script ignores it.
            args: vec!["-c".to_string(), script.to_string()],
            prompt_flag: "-p".to_string(),
            allowed_tools: Vec::new(),
            env: HashMap::new(),
            tool_permission_timeout_secs: 5,
        },
        scheduler: SchedulerConfig {
            poll_interval_secs: 1,
            max_retries,
        },
        gates: GateConfig {
            confidence_threshold: 0.0,
            mandatory_stages: Vec::new(),
        },
        questions: QuestionConfig::default(),
    }
}

fn scheduler_with(
    store: Arc<MemoryStore>,
    sink: Arc<CollectingSink>,
    config: OrchestratorConfig,
) -> Scheduler {
    Scheduler::new(store, sink, config, std::env::temp_dir())
}

async fn planning_task(store: &MemoryStore) -> Task {
    let mut task = Task::new("wi-1", "task", "desc", 0);
    task.state = TaskState::Planning;
    store.save_task(&task).await.unwrap();
    task
}

fn success_product(output: &str) -> RunOutcome {
    RunOutcome::Success(RunProduct {
        output: output.to_string(),
        session_id: None,
        stats: None,
        asked_human: false,
    })
}

#[tokio::test]
async fn test_success_advances_and_resets_retry_state() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink.clone(), config_with_script("true", 3));

    let mut task = planning_task(&store).await;
    task.retry_count = 2;
    task.has_error = true;
    task.last_error = Some("old".to_string());
    store.save_task(&task).await.unwrap();

    let stage = prompts::task_prompt(&task);
    scheduler
        .apply_outcome(
            &UnitRef::Task(task.id.clone()),
            &stage,
            success_product("the plan"),
        )
        .await
        .unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Implementing);
    assert_eq!(task.retry_count, 0);
    assert!(!task.has_error);
    assert!(task.last_error.is_none());

    let artifacts = store
        .artifacts_for_unit(&UnitRef::Task(task.id.clone()))
        .await
        .unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].content, "the plan");
    assert_eq!(artifacts[0].stage, "Planning");

    assert!(sink.names().contains(&"item_updated"));
}

#[tokio::test]
async fn test_success_without_output_persists_no_artifact() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let task = planning_task(&store).await;
    let stage = prompts::task_prompt(&task);
    scheduler
        .apply_outcome(&UnitRef::Task(task.id.clone()), &stage, success_product(""))
        .await
        .unwrap();

    let artifacts = store
        .artifacts_for_unit(&UnitRef::Task(task.id))
        .await
        .unwrap();
    assert!(artifacts.is_empty());
}

#[tokio::test]
async fn test_error_below_limit_increments_and_stays_eligible() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let task = planning_task(&store).await;
    let stage = prompts::task_prompt(&task);
    scheduler
        .apply_outcome(
            &UnitRef::Task(task.id.clone()),
            &stage,
            RunOutcome::Error("boom".to_string()),
        )
        .await
        .unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert_eq!(task.retry_count, 1);
    assert!(task.has_error);
    assert!(!task.paused);
    assert_eq!(task.last_error.as_deref(), Some("boom"));
    assert_eq!(task.state, TaskState::Planning);
}

#[tokio::test]
async fn test_error_at_limit_auto_pauses_with_count_in_reason() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink.clone(), config_with_script("true", 3));

    let mut task = planning_task(&store).await;
    task.retry_count = 2;
    task.has_error = true;
    store.save_task(&task).await.unwrap();

    let stage = prompts::task_prompt(&task);
    scheduler
        .apply_outcome(
            &UnitRef::Task(task.id.clone()),
            &stage,
            RunOutcome::Error("boom".to_string()),
        )
        .await
        .unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert!(task.paused);
    assert_eq!(task.retry_count, 3);
    let reason = task.pause_reason.unwrap();
    assert!(reason.contains("3 failed attempts"), "reason: {}", reason);
    assert!(reason.contains("boom"), "reason: {}", reason);
    assert!(sink.names().contains(&"item_paused"));
}

#[tokio::test]
async fn test_cancelled_always_pauses_even_with_zero_retries() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let task = planning_task(&store).await;
    let stage = prompts::task_prompt(&task);
    scheduler
        .apply_outcome(&UnitRef::Task(task.id.clone()), &stage, RunOutcome::Cancelled)
        .await
        .unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert!(task.paused);
    assert_eq!(task.retry_count, 0);
    assert!(task.pause_reason.unwrap().contains("cancelled"));
}

#[tokio::test]
async fn test_tick_end_to_end_with_fake_agent() {
    let script = r#"echo '{"type":"result","result":"stage output","usage":{"input_tokens":1,"output_tokens":1}}'"#;
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink.clone(), config_with_script(script, 3));

    let task = planning_task(&store).await;
    scheduler.tick().await.unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Implementing);
    assert!(task.assigned_run.is_none());

    let artifacts = store
        .artifacts_for_unit(&UnitRef::Task(task.id))
        .await
        .unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].content, "stage output");

    let names = sink.names();
    assert!(names.contains(&"run_scheduled"));
    assert!(names.contains(&"item_updated"));
}

#[tokio::test]
async fn test_disabled_scheduler_selects_nothing() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink.clone(), config_with_script("true", 3));

    planning_task(&store).await;
    scheduler.set_enabled(false);
    scheduler.tick().await.unwrap();

    assert!(sink.names().is_empty());
    scheduler.set_enabled(true);
    scheduler.tick().await.unwrap();
    assert!(sink.names().contains(&"run_scheduled"));
}

#[tokio::test]
async fn test_abort_cancels_active_run_and_pauses_unit() {
    let script = r#"echo '{"type":"assistant","content":[{"type":"text","text":"working"}]}'; sleep 30"#;
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = Arc::new(scheduler_with(
        store.clone(),
        sink,
        config_with_script(script, 3),
    ));

    let task = planning_task(&store).await;
    let run = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.tick().await }
    });

    // Wait for the run to claim the slot.
    for _ in 0..200 {
        if scheduler.is_busy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(scheduler.is_busy());

    // A second selection while a run is active is a no-op.
    scheduler.tick().await.unwrap();

    assert!(scheduler.abort_current().await.unwrap());
    run.await.unwrap().unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert!(task.paused);
    assert!(task.assigned_run.is_none());
    assert!(!scheduler.is_busy());

    // Nothing left to abort.
    assert!(!scheduler.abort_current().await.unwrap());
}

#[tokio::test]
async fn test_executable_not_found_is_error_outcome() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let mut config = config_with_script("true", 3);
    config.agent.command = "definitely-not-on-path-xyz".to_string();
    config.agent.executable = None;
    let scheduler = scheduler_with(store.clone(), sink, config);

    let task = planning_task(&store).await;
    scheduler.tick().await.unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert!(task.has_error);
    assert_eq!(task.retry_count, 1);
    assert!(task
        .last_error
        .as_deref()
        .unwrap()
        .contains("not found"));
}

#[tokio::test]
async fn test_child_success_recomputes_parent_derived_state() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let mut parent = Task::new("wi-1", "parent", "", 0);
    parent.state = TaskState::Research;
    store.save_task(&parent).await.unwrap();

    let mut child_a = Task::new("wi-1", "a", "", 1);
    child_a.parent_id = Some(parent.id.clone());
    child_a.state = TaskState::Planning;
    let mut child_b = Task::new("wi-1", "b", "", 2);
    child_b.parent_id = Some(parent.id.clone());
    child_b.state = TaskState::Verifying;
    store.save_task(&child_a).await.unwrap();
    store.save_task(&child_b).await.unwrap();

    let stage = prompts::task_prompt(&child_a);
    scheduler
        .apply_outcome(
            &UnitRef::Task(child_a.id.clone()),
            &stage,
            success_product("out"),
        )
        .await
        .unwrap();

    // Children are now Implementing and Verifying; the parent shows the
    // least-advanced.
    let parent = store.load_task(&parent.id).await.unwrap().unwrap();
    assert_eq!(parent.state, TaskState::Implementing);
}

#[tokio::test]
async fn test_last_task_done_completes_executing_work_item() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let mut item = WorkItem::new("item", "", 0);
    item.state = WorkItemState::Executing;
    store.save_work_item(&item).await.unwrap();

    let mut task = Task::new(&item.id, "only", "", 0);
    task.state = TaskState::PrReady;
    store.save_task(&task).await.unwrap();

    scheduler
        .request_task_transition(&task.id, TaskState::Done)
        .await
        .unwrap();

    let item = store.load_work_item(&item.id).await.unwrap().unwrap();
    assert_eq!(item.state, WorkItemState::Done);
}

#[tokio::test]
async fn test_manual_transition_rejects_non_adjacent_and_gated() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let task = planning_task(&store).await;
    let err = scheduler
        .request_task_transition(&task.id, TaskState::Verifying)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not adjacent"));

    // One step back is legal.
    scheduler
        .request_task_transition(&task.id, TaskState::Research)
        .await
        .unwrap();

    let mut task = store.load_task(&task.id).await.unwrap().unwrap();
    task.gate_pending = true;
    store.save_task(&task).await.unwrap();
    let err = scheduler
        .request_task_transition(&task.id, TaskState::Planning)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pending gate"));
}

#[tokio::test]
async fn test_manual_transition_rejects_parent_tasks() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink, config_with_script("true", 3));

    let parent = planning_task(&store).await;
    let mut child = Task::new("wi-1", "child", "", 1);
    child.parent_id = Some(parent.id.clone());
    store.save_task(&child).await.unwrap();

    let err = scheduler
        .request_task_transition(&parent.id, TaskState::Implementing)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("derived"));
}

#[tokio::test]
async fn test_resume_resets_retry_state_and_emits() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingSink::default());
    let scheduler = scheduler_with(store.clone(), sink.clone(), config_with_script("true", 3));

    let mut task = planning_task(&store).await;
    task.retry_count = 3;
    task.has_error = true;
    task.pause("dead");
    store.save_task(&task).await.unwrap();

    let unit = UnitRef::Task(task.id.clone());
    scheduler.resume_unit(&unit).await.unwrap();

    let task = store.load_task(&task.id).await.unwrap().unwrap();
    assert!(!task.paused);
    assert_eq!(task.retry_count, 0);
    assert!(!task.has_error);
    assert!(sink.names().contains(&"item_resumed"));
}
