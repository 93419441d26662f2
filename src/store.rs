//! Persistence port.
//!
//! The orchestration core consumes this trait; durable storage lives
//! behind it. `MemoryStore` backs the binary's single-process mode and the
//! test suite.

use crate::domain::{AgentQuestion, Artifact, HumanGate, RollbackRecord, Task, UnitRef, WorkItem};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_work_item(&self, id: &str) -> Result<Option<WorkItem>>;
    async fn save_work_item(&self, item: &WorkItem) -> Result<()>;
    async fn list_work_items(&self) -> Result<Vec<WorkItem>>;

    async fn load_task(&self, id: &str) -> Result<Option<Task>>;
    async fn save_task(&self, task: &Task) -> Result<()>;
    async fn list_tasks(&self) -> Result<Vec<Task>>;
    /// Direct children of a parent task.
    async fn children_of(&self, parent_task_id: &str) -> Result<Vec<Task>>;
    /// All tasks belonging to a work item.
    async fn tasks_for_work_item(&self, work_item_id: &str) -> Result<Vec<Task>>;

    async fn append_artifact(&self, artifact: &Artifact) -> Result<()>;
    async fn artifacts_for_unit(&self, unit: &UnitRef) -> Result<Vec<Artifact>>;

    async fn append_log(&self, unit: &UnitRef, line: &str) -> Result<()>;

    async fn save_gate(&self, gate: &HumanGate) -> Result<()>;
    async fn load_gate(&self, id: &str) -> Result<Option<HumanGate>>;

    async fn save_question(&self, question: &AgentQuestion) -> Result<()>;
    async fn load_question(&self, id: &str) -> Result<Option<AgentQuestion>>;

    async fn append_rollback(&self, record: &RollbackRecord) -> Result<()>;
    async fn rollbacks_for_unit(&self, unit: &UnitRef) -> Result<Vec<RollbackRecord>>;
}

#[derive(Default)]
struct MemoryInner {
    work_items: HashMap<String, WorkItem>,
    tasks: HashMap<String, Task>,
    artifacts: Vec<Artifact>,
    logs: Vec<(UnitRef, String)>,
    gates: HashMap<String, HumanGate>,
    questions: HashMap<String, AgentQuestion>,
    rollbacks: Vec<RollbackRecord>,
}

/// In-memory store. All operations are O(n) scans over small maps; fine
/// for a single orchestrator process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        Ok(self.inner.lock().unwrap().work_items.get(id).cloned())
    }

    async fn save_work_item(&self, item: &WorkItem) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .work_items
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        Ok(self.inner.lock().unwrap().work_items.values().cloned().collect())
    }

    async fn load_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.inner.lock().unwrap().tasks.get(id).cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.inner.lock().unwrap().tasks.values().cloned().collect())
    }

    async fn children_of(&self, parent_task_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_task_id))
            .cloned()
            .collect())
    }

    async fn tasks_for_work_item(&self, work_item_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.work_item_id == work_item_id)
            .cloned()
            .collect())
    }

    async fn append_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.inner.lock().unwrap().artifacts.push(artifact.clone());
        Ok(())
    }

    async fn artifacts_for_unit(&self, unit: &UnitRef) -> Result<Vec<Artifact>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .artifacts
            .iter()
            .filter(|a| &a.unit == unit)
            .cloned()
            .collect())
    }

    async fn append_log(&self, unit: &UnitRef, line: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .logs
            .push((unit.clone(), line.to_string()));
        Ok(())
    }

    async fn save_gate(&self, gate: &HumanGate) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .gates
            .insert(gate.id.clone(), gate.clone());
        Ok(())
    }

    async fn load_gate(&self, id: &str) -> Result<Option<HumanGate>> {
        Ok(self.inner.lock().unwrap().gates.get(id).cloned())
    }

    async fn save_question(&self, question: &AgentQuestion) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .questions
            .insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn load_question(&self, id: &str) -> Result<Option<AgentQuestion>> {
        Ok(self.inner.lock().unwrap().questions.get(id).cloned())
    }

    async fn append_rollback(&self, record: &RollbackRecord) -> Result<()> {
        self.inner.lock().unwrap().rollbacks.push(record.clone());
        Ok(())
    }

    async fn rollbacks_for_unit(&self, unit: &UnitRef) -> Result<Vec<RollbackRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rollbacks
            .iter()
            .filter(|r| &r.unit == unit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
