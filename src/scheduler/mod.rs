//! The scheduler: owns the single global "agent busy" slot, selects the
//! next eligible unit once per poll tick, drives the bridge, and applies
//! state-machine outcomes.
//!
//! At most one agent process is active system-wide. The current-run slot
//! is the mutual-exclusion gate: selection while a run is active is a
//! no-op, never a queued request.

pub mod run;
pub mod selection;

use crate::bridge::locator::resolve_executable;
use crate::bridge::process::ProcessSpec;
use crate::config::OrchestratorConfig;
use crate::domain::{Artifact, TaskState, UnitRef, WorkItemState};
use crate::error::RunError;
use crate::events::{EventSink, OrchestratorEvent};
use crate::gate::questions::QuestionCoordinator;
use crate::gate::{GateKeeper, ToolGate};
use crate::pipeline::{derive_parent_state, is_adjacent, next_on_success};
use crate::prompts::{task_prompt, work_item_prompt, StagePrompt};
use crate::store::Store;
use crate::units::{load_unit, save_unit, Unit};
use anyhow::{bail, Context, Result};
use run::{drive_run, RunOutcome, RunRequest};
use selection::select_next;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct ActiveRun {
    run_id: String,
    cancel_tx: watch::Sender<bool>,
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    config: OrchestratorConfig,
    working_dir: PathBuf,
    tool_gate: Option<Arc<dyn ToolGate>>,
    questions: Option<Arc<QuestionCoordinator>>,
    gate_keeper: GateKeeper,
    enabled: AtomicBool,
    current: Mutex<Option<ActiveRun>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSink>,
        config: OrchestratorConfig,
        working_dir: PathBuf,
    ) -> Self {
        let gate_keeper = GateKeeper::new(store.clone(), events.clone(), config.gates.clone());
        Self {
            store,
            events,
            config,
            working_dir,
            tool_gate: None,
            questions: None,
            gate_keeper,
            enabled: AtomicBool::new(true),
            current: Mutex::new(None),
        }
    }

    /// Wires in the interactive-question coordinator as the run's
    /// tool-permission callback. Without it the agent is launched one-shot
    /// with stdin closed.
    pub fn with_question_coordinator(mut self, coordinator: Arc<QuestionCoordinator>) -> Self {
        self.questions = Some(coordinator.clone());
        self.tool_gate = Some(coordinator);
        self
    }

    pub fn gate_keeper(&self) -> &GateKeeper {
        &self.gate_keeper
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// True while an agent run is active.
    pub fn is_busy(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    /// The periodic polling loop. Runs until the shutdown signal fires; an
    /// in-flight run is left to finish.
    pub async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.scheduler.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!("Scheduler tick failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One poll tick: select at most one unit and run it to completion.
    pub async fn tick(&self) -> Result<()> {
        if !self.is_enabled() || self.is_busy() {
            return Ok(());
        }

        let work_items = self.store.list_work_items().await?;
        let tasks = self.store.list_tasks().await?;
        let Some(unit_ref) = select_next(&work_items, &tasks, self.config.scheduler.max_retries)
        else {
            return Ok(());
        };

        self.execute_unit(&unit_ref).await
    }

    /// Runs the agent against one unit and applies the outcome. A no-op if
    /// another run wins the claim first.
    pub async fn execute_unit(&self, unit_ref: &UnitRef) -> Result<()> {
        let mut unit = load_unit(self.store.as_ref(), unit_ref)
            .await?
            .with_context(|| format!("Unknown unit {}", unit_ref))?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            // The claim: check-and-set under one lock. Losing means another
            // selection got there first; give up, don't queue.
            let mut current = self.current.lock().unwrap();
            if current.is_some() {
                return Ok(());
            }
            *current = Some(ActiveRun {
                run_id: run_id.clone(),
                cancel_tx,
            });
        }

        unit.set_assigned_run(Some(run_id.clone()));
        save_unit(self.store.as_ref(), &unit).await?;

        let stage = match &unit {
            Unit::WorkItem(item) => work_item_prompt(item),
            Unit::Task(task) => task_prompt(task),
        };
        self.events.emit(OrchestratorEvent::RunScheduled {
            unit: unit_ref.clone(),
            run_id: run_id.clone(),
            stage: stage.stage.clone(),
        });

        let outcome = match self.build_spec(&stage.prompt) {
            Ok(spec) => {
                let request = RunRequest {
                    run_id: run_id.clone(),
                    unit: unit_ref.clone(),
                    stage: stage.stage.clone(),
                    spec,
                };
                drive_run(
                    &request,
                    self.tool_gate.clone(),
                    self.config.agent.tool_permission_timeout(),
                    cancel_rx,
                )
                .await
            }
            // Locator failures surface as an immediate Error outcome.
            Err(e) => RunOutcome::Error(e.to_string()),
        };

        self.current.lock().unwrap().take();

        let mut unit = load_unit(self.store.as_ref(), unit_ref)
            .await?
            .with_context(|| format!("Unit {} vanished during run", unit_ref))?;
        unit.set_assigned_run(None);
        save_unit(self.store.as_ref(), &unit).await?;

        self.apply_outcome(unit_ref, &stage, outcome).await
    }

    /// Aborts the active run, if any. Outstanding question wait handles
    /// are cancelled before the process is killed.
    pub async fn abort_current(&self) -> Result<bool> {
        let run_id = match self.current.lock().unwrap().as_ref() {
            Some(active) => active.run_id.clone(),
            None => return Ok(false),
        };

        if let Some(questions) = &self.questions {
            questions.cancel_run(&run_id).await?;
        }

        let current = self.current.lock().unwrap();
        if let Some(active) = current.as_ref() {
            if active.run_id == run_id {
                let _ = active.cancel_tx.send(true);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn build_spec(&self, prompt: &str) -> Result<ProcessSpec, RunError> {
        let agent = &self.config.agent;
        let program = resolve_executable(agent.executable.as_deref(), &agent.command)?;

        let mut args = agent.args.clone();
        if !agent.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(agent.allowed_tools.join(","));
        }
        args.push(agent.prompt_flag.clone());
        args.push(prompt.to_string());

        let mut env: Vec<(String, String)> = agent
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.sort();

        Ok(ProcessSpec {
            program,
            args,
            working_dir: self.working_dir.clone(),
            env,
            keep_stdin_open: self.tool_gate.is_some(),
        })
    }

    async fn apply_outcome(
        &self,
        unit_ref: &UnitRef,
        stage: &StagePrompt,
        outcome: RunOutcome,
    ) -> Result<()> {
        let mut unit = load_unit(self.store.as_ref(), unit_ref)
            .await?
            .with_context(|| format!("Unknown unit {}", unit_ref))?;

        match outcome {
            RunOutcome::Success(product) => {
                unit.clear_error();
                match &mut unit {
                    Unit::WorkItem(item) => {
                        if let Some(next) = next_on_success(item.state) {
                            item.state = next;
                        }
                    }
                    Unit::Task(task) => {
                        if let Some(next) = next_on_success(task.state) {
                            task.state = next;
                        }
                    }
                }
                save_unit(self.store.as_ref(), &unit).await?;

                if !product.output.is_empty() {
                    let mut artifact = Artifact::new(
                        unit_ref.clone(),
                        &stage.stage,
                        stage.artifact_kind,
                        &product.output,
                        &self.config.agent.command,
                    );
                    artifact.human_input_requested = product.asked_human;
                    self.store.append_artifact(&artifact).await?;
                }

                self.events.emit(OrchestratorEvent::ItemUpdated {
                    unit: unit_ref.clone(),
                    state: unit.state_label(),
                });

                if let Unit::Task(task) = &unit {
                    self.recompute_ancestors(task).await?;
                }

                self.gate_keeper
                    .maybe_gate_after_run(unit_ref, &stage.stage, unit.confidence(), false)
                    .await?;
                Ok(())
            }
            RunOutcome::Error(message) => {
                unit.record_error(&message);
                let max_retries = self.config.scheduler.max_retries;
                if unit.retry_count() >= max_retries {
                    let reason = format!(
                        "Auto-paused after {} failed attempts: {}",
                        unit.retry_count(),
                        message
                    );
                    unit.pause(&reason);
                    save_unit(self.store.as_ref(), &unit).await?;
                    self.events.emit(OrchestratorEvent::ItemPaused {
                        unit: unit_ref.clone(),
                        reason,
                    });
                } else {
                    save_unit(self.store.as_ref(), &unit).await?;
                    self.events.emit(OrchestratorEvent::ItemUpdated {
                        unit: unit_ref.clone(),
                        state: unit.state_label(),
                    });
                }
                Ok(())
            }
            RunOutcome::Cancelled => {
                // A user-initiated abort always pauses, regardless of retry
                // count, so the next tick cannot immediately re-pick the unit.
                let reason = "Run cancelled by user".to_string();
                unit.pause(&reason);
                save_unit(self.store.as_ref(), &unit).await?;
                self.events.emit(OrchestratorEvent::ItemPaused {
                    unit: unit_ref.clone(),
                    reason,
                });
                Ok(())
            }
        }
    }

    /// After a task transition commits: roll the parent's derived state up
    /// from its children, and finish the owning work item when every task
    /// is done.
    async fn recompute_ancestors(&self, task: &crate::domain::Task) -> Result<()> {
        if let Some(parent_id) = &task.parent_id {
            let children = self.store.children_of(parent_id).await?;
            let states: Vec<TaskState> = children.iter().map(|c| c.state).collect();
            if let Some(mut parent) = self.store.load_task(parent_id).await? {
                let derived = derive_parent_state(&states);
                if parent.state != derived {
                    parent.state = derived;
                    parent.touch();
                    self.store.save_task(&parent).await?;
                    self.events.emit(OrchestratorEvent::ItemUpdated {
                        unit: UnitRef::Task(parent.id.clone()),
                        state: parent.state.label().to_string(),
                    });
                }
            }
        }

        let siblings = self.store.tasks_for_work_item(&task.work_item_id).await?;
        if !siblings.is_empty() && siblings.iter().all(|t| t.state == TaskState::Done) {
            if let Some(mut item) = self.store.load_work_item(&task.work_item_id).await? {
                if item.state == WorkItemState::Executing {
                    item.state = WorkItemState::Done;
                    item.touch();
                    self.store.save_work_item(&item).await?;
                    self.events.emit(OrchestratorEvent::ItemUpdated {
                        unit: UnitRef::WorkItem(item.id.clone()),
                        state: item.state.label().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Explicit transition request for a work item: exactly one step in
    /// either direction, and never past a pending gate.
    pub async fn request_work_item_transition(
        &self,
        id: &str,
        to: WorkItemState,
    ) -> Result<()> {
        let mut item = self
            .store
            .load_work_item(id)
            .await?
            .with_context(|| format!("Unknown work item {}", id))?;
        if item.gate_pending {
            bail!("Work item {} is blocked by a pending gate", id);
        }
        if !is_adjacent(item.state, to) {
            bail!("Transition {} -> {} is not adjacent", item.state, to);
        }
        item.state = to;
        item.touch();
        self.store.save_work_item(&item).await?;
        self.events.emit(OrchestratorEvent::ItemUpdated {
            unit: UnitRef::WorkItem(item.id.clone()),
            state: item.state.label().to_string(),
        });
        Ok(())
    }

    /// Explicit transition request for a task. Parent tasks are refused:
    /// their state is derived from children, never set directly.
    pub async fn request_task_transition(&self, id: &str, to: TaskState) -> Result<()> {
        let mut task = self
            .store
            .load_task(id)
            .await?
            .with_context(|| format!("Unknown task {}", id))?;
        if task.gate_pending {
            bail!("Task {} is blocked by a pending gate", id);
        }
        if !self.store.children_of(id).await?.is_empty() {
            bail!("Task {} has children; its state is derived", id);
        }
        if !is_adjacent(task.state, to) {
            bail!("Transition {} -> {} is not adjacent", task.state, to);
        }
        task.state = to;
        task.touch();
        self.store.save_task(&task).await?;
        self.events.emit(OrchestratorEvent::ItemUpdated {
            unit: UnitRef::Task(task.id.clone()),
            state: task.state.label().to_string(),
        });

        let task = self.store.load_task(id).await?.context("task vanished")?;
        self.recompute_ancestors(&task).await
    }

    /// Manual pause by explicit human action.
    pub async fn pause_unit(&self, unit_ref: &UnitRef, reason: &str) -> Result<()> {
        let mut unit = load_unit(self.store.as_ref(), unit_ref)
            .await?
            .with_context(|| format!("Unknown unit {}", unit_ref))?;
        unit.pause(reason);
        save_unit(self.store.as_ref(), &unit).await?;
        self.events.emit(OrchestratorEvent::ItemPaused {
            unit: unit_ref.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Manual resume: clears the pause and resets retry state.
    pub async fn resume_unit(&self, unit_ref: &UnitRef) -> Result<()> {
        let mut unit = load_unit(self.store.as_ref(), unit_ref)
            .await?
            .with_context(|| format!("Unknown unit {}", unit_ref))?;
        unit.resume();
        save_unit(self.store.as_ref(), &unit).await?;
        self.events.emit(OrchestratorEvent::ItemResumed {
            unit: unit_ref.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
