//! Event emission port.
//!
//! Every state-changing operation publishes a named event with a
//! JSON-serializable payload and a timestamp, suitable for delivery over
//! any publish/subscribe transport. The default sink appends JSONL with
//! monotonic sequence numbers for ordering and reconstruction.

use crate::domain::UnitRef;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "data")]
pub enum OrchestratorEvent {
    ItemCreated { unit: UnitRef, title: String },
    ItemUpdated { unit: UnitRef, state: String },
    ItemDeleted { unit: UnitRef },
    ItemPaused { unit: UnitRef, reason: String },
    ItemResumed { unit: UnitRef },
    LogAppended { unit: UnitRef, line: String },
    GateRequested { unit: UnitRef, gate_id: String, reason: String },
    GateResolved { unit: UnitRef, gate_id: String, status: String },
    QuestionRequested { unit: UnitRef, question_id: String },
    QuestionAnswered { unit: UnitRef, question_id: String },
    QuestionTimedOut { unit: UnitRef, question_id: String },
    QuestionCancelled { unit: UnitRef, question_id: String },
    RunScheduled { unit: UnitRef, run_id: String, stage: String },
    RollbackInitiated { unit: UnitRef, target: String },
    RollbackCompleted { unit: UnitRef, record_id: String },
}

impl OrchestratorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ItemCreated { .. } => "item_created",
            Self::ItemUpdated { .. } => "item_updated",
            Self::ItemDeleted { .. } => "item_deleted",
            Self::ItemPaused { .. } => "item_paused",
            Self::ItemResumed { .. } => "item_resumed",
            Self::LogAppended { .. } => "log_appended",
            Self::GateRequested { .. } => "gate_requested",
            Self::GateResolved { .. } => "gate_resolved",
            Self::QuestionRequested { .. } => "question_requested",
            Self::QuestionAnswered { .. } => "question_answered",
            Self::QuestionTimedOut { .. } => "question_timed_out",
            Self::QuestionCancelled { .. } => "question_cancelled",
            Self::RunScheduled { .. } => "run_scheduled",
            Self::RollbackInitiated { .. } => "rollback_initiated",
            Self::RollbackCompleted { .. } => "rollback_completed",
        }
    }
}

/// Consumer side of the event port. Emission must never fail the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestratorEvent);
}

/// Sink that drops everything. Useful in tests that don't assert on events.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: OrchestratorEvent) {}
}

/// One emitted entry in JSONL form.
#[derive(Serialize, Deserialize)]
pub struct EventEntry {
    /// Monotonic sequence number, unique across the process lifetime.
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds.
    pub ts: String,
    pub event: Value,
}

/// Append-only JSONL sink. Thread-safe; write failures are swallowed so a
/// full disk never takes the scheduler down.
pub struct JsonlEventSink {
    seq: AtomicU64,
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonlEventSink {
    /// Opens (or creates) `<dir>/events.jsonl` for appending.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file
    /// cannot be opened.
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("events.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            seq: AtomicU64::new(0),
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&self, event: OrchestratorEvent) {
        let entry = EventEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            event: serde_json::to_value(&event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }
}

/// Fan-out sink for in-process subscribers. Lagging receivers miss events
/// rather than blocking the emitter.
pub struct BroadcastSink {
    tx: tokio::sync::broadcast::Sender<OrchestratorEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.tx.send(event);
    }
}

/// Emits to every inner sink in order.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: OrchestratorEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
