//! Uniform access to the two schedulable unit kinds.
//!
//! The scheduler, gate keeper, and rollback operation all mutate the same
//! bookkeeping fields on both entity types; `Unit` folds the two together
//! so that logic is written once.

use crate::domain::{Task, UnitRef, WorkItem};
use crate::store::Store;
use anyhow::Result;

#[derive(Debug, Clone)]
pub enum Unit {
    WorkItem(WorkItem),
    Task(Task),
}

impl Unit {
    pub fn unit_ref(&self) -> UnitRef {
        match self {
            Self::WorkItem(item) => UnitRef::WorkItem(item.id.clone()),
            Self::Task(task) => UnitRef::Task(task.id.clone()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::WorkItem(item) => &item.id,
            Self::Task(task) => &task.id,
        }
    }

    pub fn state_label(&self) -> String {
        match self {
            Self::WorkItem(item) => item.state.label().to_string(),
            Self::Task(task) => task.state.label().to_string(),
        }
    }

    pub fn gate_pending(&self) -> bool {
        match self {
            Self::WorkItem(item) => item.gate_pending,
            Self::Task(task) => task.gate_pending,
        }
    }

    pub fn set_gate_pending(&mut self, pending: bool) {
        match self {
            Self::WorkItem(item) => {
                item.gate_pending = pending;
                item.touch();
            }
            Self::Task(task) => {
                task.gate_pending = pending;
                task.touch();
            }
        }
    }

    pub fn paused(&self) -> bool {
        match self {
            Self::WorkItem(item) => item.paused,
            Self::Task(task) => task.paused,
        }
    }

    pub fn pause(&mut self, reason: &str) {
        match self {
            Self::WorkItem(item) => item.pause(reason),
            Self::Task(task) => task.pause(reason),
        }
    }

    pub fn resume(&mut self) {
        match self {
            Self::WorkItem(item) => item.resume(),
            Self::Task(task) => task.resume(),
        }
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            Self::WorkItem(item) => item.retry_count,
            Self::Task(task) => task.retry_count,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::WorkItem(item) => item.confidence,
            Self::Task(task) => task.confidence,
        }
    }

    pub fn record_error(&mut self, message: &str) {
        match self {
            Self::WorkItem(item) => {
                item.retry_count += 1;
                item.has_error = true;
                item.last_error = Some(message.to_string());
                item.touch();
            }
            Self::Task(task) => {
                task.retry_count += 1;
                task.has_error = true;
                task.last_error = Some(message.to_string());
                task.touch();
            }
        }
    }

    pub fn clear_error(&mut self) {
        match self {
            Self::WorkItem(item) => {
                item.retry_count = 0;
                item.has_error = false;
                item.last_error = None;
                item.touch();
            }
            Self::Task(task) => {
                task.retry_count = 0;
                task.has_error = false;
                task.last_error = None;
                task.touch();
            }
        }
    }

    pub fn assigned_run(&self) -> Option<&str> {
        match self {
            Self::WorkItem(item) => item.assigned_run.as_deref(),
            Self::Task(task) => task.assigned_run.as_deref(),
        }
    }

    pub fn set_assigned_run(&mut self, run_id: Option<String>) {
        match self {
            Self::WorkItem(item) => {
                item.assigned_run = run_id;
                item.touch();
            }
            Self::Task(task) => {
                task.assigned_run = run_id;
                task.touch();
            }
        }
    }
}

pub async fn load_unit(store: &dyn Store, unit: &UnitRef) -> Result<Option<Unit>> {
    match unit {
        UnitRef::WorkItem(id) => Ok(store.load_work_item(id).await?.map(Unit::WorkItem)),
        UnitRef::Task(id) => Ok(store.load_task(id).await?.map(Unit::Task)),
    }
}

pub async fn save_unit(store: &dyn Store, unit: &Unit) -> Result<()> {
    match unit {
        Unit::WorkItem(item) => store.save_work_item(item).await,
        Unit::Task(task) => store.save_task(task).await,
    }
}
