//! Human-in-the-loop coordination: approval gates and the tool-permission
//! contract the bridge consumer calls for every tool-use block.

pub mod questions;

use crate::config::GateConfig;
use crate::domain::{GateReason, GateStatus, HumanGate, UnitRef};
use crate::events::{EventSink, OrchestratorEvent};
use crate::store::Store;
use crate::units::{load_unit, save_unit};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// One tool-use block awaiting a permission decision.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool_name: String,
    pub tool_use_id: String,
    /// Opaque structured input; parsed lazily by whoever cares.
    pub input: Value,
    pub working_dir: PathBuf,
    pub session_id: Option<String>,
    pub unit: UnitRef,
    pub run_id: String,
    /// The owning run's cancellation signal.
    pub cancel: watch::Receiver<bool>,
}

/// Outcome of a permission decision.
#[derive(Debug, Clone)]
pub enum PermissionDecision {
    /// Let the tool call proceed unmodified.
    Allow,
    /// Let the call complete with this substituted result.
    AllowWithResult(Value),
    /// Refuse the call. With `interrupt` the whole run is aborted;
    /// without it a synthetic error result is written and the run goes on.
    Deny { message: String, interrupt: bool },
}

/// Tool-permission callback, invoked once per tool-use block before its
/// result is produced.
#[async_trait]
pub trait ToolGate: Send + Sync {
    async fn decide(&self, request: ToolRequest) -> PermissionDecision;

    /// True when `decide` parks this tool on an external wait with its own
    /// bound. The caller applies the generic per-call timeout only to
    /// tools this returns false for.
    fn intercepts(&self, _tool_name: &str) -> bool {
        false
    }
}

/// Permits everything. The default when no coordinator is wired in.
pub struct AllowAll;

#[async_trait]
impl ToolGate for AllowAll {
    async fn decide(&self, _request: ToolRequest) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

/// Creates and resolves human gates, maintaining the one-pending-gate-per-
/// unit invariant through the unit's `gate_pending` flag.
pub struct GateKeeper {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    config: GateConfig,
}

impl GateKeeper {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventSink>, config: GateConfig) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    /// Raises a gate for the unit. Fails if one is already pending.
    pub async fn request_gate(
        &self,
        unit_ref: &UnitRef,
        reason: GateReason,
        note: &str,
    ) -> Result<HumanGate> {
        let mut unit = load_unit(self.store.as_ref(), unit_ref)
            .await?
            .with_context(|| format!("Unknown unit {}", unit_ref))?;

        if unit.gate_pending() {
            bail!("Unit {} already has a pending gate", unit_ref);
        }

        let gate = HumanGate::new(unit_ref.clone(), reason, note, unit.confidence());
        self.store.save_gate(&gate).await?;

        unit.set_gate_pending(true);
        save_unit(self.store.as_ref(), &unit).await?;

        self.events.emit(OrchestratorEvent::GateRequested {
            unit: unit_ref.clone(),
            gate_id: gate.id.clone(),
            reason: format!("{:?}", reason),
        });
        Ok(gate)
    }

    /// Resolves a pending gate and clears the unit's flag. Rejection
    /// additionally pauses the unit with the rejection note as the reason.
    pub async fn resolve_gate(
        &self,
        gate_id: &str,
        status: GateStatus,
        resolved_by: &str,
        note: Option<String>,
    ) -> Result<HumanGate> {
        if status == GateStatus::Pending {
            bail!("Cannot resolve a gate to Pending");
        }

        let mut gate = self
            .store
            .load_gate(gate_id)
            .await?
            .with_context(|| format!("Unknown gate {}", gate_id))?;
        if gate.status != GateStatus::Pending {
            bail!("Gate {} is already resolved", gate_id);
        }

        gate.resolve(status, resolved_by, note.clone());
        self.store.save_gate(&gate).await?;

        if let Some(mut unit) = load_unit(self.store.as_ref(), &gate.unit).await? {
            unit.set_gate_pending(false);
            if status == GateStatus::Rejected {
                let reason = note.unwrap_or_else(|| "Gate rejected".to_string());
                unit.pause(&reason);
                self.events.emit(OrchestratorEvent::ItemPaused {
                    unit: gate.unit.clone(),
                    reason,
                });
            }
            save_unit(self.store.as_ref(), &unit).await?;
        }

        self.events.emit(OrchestratorEvent::GateResolved {
            unit: gate.unit.clone(),
            gate_id: gate.id.clone(),
            status: format!("{:?}", status),
        });
        Ok(gate)
    }

    /// Applies the gate triggers after a successful run: explicit agent
    /// request, mandatory stage, or confidence below threshold.
    pub async fn maybe_gate_after_run(
        &self,
        unit_ref: &UnitRef,
        stage: &str,
        confidence: Option<f64>,
        human_input_requested: bool,
    ) -> Result<Option<HumanGate>> {
        if human_input_requested {
            let gate = self
                .request_gate(unit_ref, GateReason::AgentRequested, "Agent requested human input")
                .await?;
            return Ok(Some(gate));
        }
        if self.config.mandatory_stages.iter().any(|s| s == stage) {
            let note = format!("Stage {} requires approval", stage);
            let gate = self
                .request_gate(unit_ref, GateReason::MandatoryStage, &note)
                .await?;
            return Ok(Some(gate));
        }
        if let Some(confidence) = confidence {
            if confidence < self.config.confidence_threshold {
                let note = format!(
                    "Confidence {:.2} below threshold {:.2}",
                    confidence, self.config.confidence_threshold
                );
                let gate = self
                    .request_gate(unit_ref, GateReason::LowConfidence, &note)
                    .await?;
                return Ok(Some(gate));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
