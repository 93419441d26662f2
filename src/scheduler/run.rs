//! Drives one agent run from spawn to classified outcome.
//!
//! Everything the bridge can throw is caught at this boundary and folded
//! into the three scheduler outcomes; nothing escapes uncaught. Outcome
//! classification happens only after the message stream is drained and the
//! process has exited.

use crate::bridge::codec::{decode_line, tool_result_line, AgentMessage, ContentBlock, RunStats};
use crate::bridge::process::{AgentProcess, ProcessSpec};
use crate::domain::UnitRef;
use crate::error::RunError;
use crate::gate::{PermissionDecision, ToolGate, ToolRequest};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One scheduled invocation of the agent against one unit at one stage.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub unit: UnitRef,
    pub stage: String,
    pub spec: ProcessSpec,
}

/// What a successful run produced.
#[derive(Debug, Clone, Default)]
pub struct RunProduct {
    /// Final result text if the agent reported one, otherwise the
    /// accumulated assistant text.
    pub output: String,
    pub session_id: Option<String>,
    pub stats: Option<RunStats>,
    /// True when the reserved interactive-question tool was invoked during
    /// the run.
    pub asked_human: bool,
}

/// Scheduler-level classification of a finished run.
#[derive(Debug)]
pub enum RunOutcome {
    Success(RunProduct),
    Cancelled,
    Error(String),
}

/// Runs the agent process to completion and classifies the outcome.
pub async fn drive_run(
    request: &RunRequest,
    tool_gate: Option<Arc<dyn ToolGate>>,
    permission_timeout: Duration,
    cancel_rx: watch::Receiver<bool>,
) -> RunOutcome {
    match drive_inner(request, tool_gate, permission_timeout, cancel_rx.clone()).await {
        Ok(product) => {
            if *cancel_rx.borrow() {
                RunOutcome::Cancelled
            } else if product.stats.as_ref().is_some_and(|s| s.is_error) {
                let preview: String = product.output.chars().take(200).collect();
                RunOutcome::Error(format!("Agent reported an error: {}", preview))
            } else {
                RunOutcome::Success(product)
            }
        }
        Err(RunError::Cancelled) => RunOutcome::Cancelled,
        // An abort can surface as a denied tool call or an I/O error from
        // the killed process; the signal decides the classification.
        Err(_) if *cancel_rx.borrow() => RunOutcome::Cancelled,
        Err(e) => RunOutcome::Error(e.to_string()),
    }
}

async fn drive_inner(
    request: &RunRequest,
    tool_gate: Option<Arc<dyn ToolGate>>,
    permission_timeout: Duration,
    cancel_rx: watch::Receiver<bool>,
) -> Result<RunProduct, RunError> {
    let mut process = AgentProcess::spawn(&request.spec, cancel_rx.clone())?;

    let result = consume_stream(
        request,
        &mut process,
        tool_gate,
        permission_timeout,
        cancel_rx,
    )
    .await;

    match result {
        Ok(mut product) => {
            // No more tool responses will be sent; let a process waiting
            // for another turn see EOF and finish.
            process.close_stdin();
            // Stream is drained; join the process and its stderr drain
            // before reporting anything.
            let wait_result = process.wait().await;
            process.dispose().await;
            let stderr = wait_result?;
            if !stderr.is_empty() {
                tracing::debug!(run_id = %request.run_id, "agent stderr: {}", stderr);
            }
            if product.session_id.is_none() {
                product.session_id = product
                    .stats
                    .as_ref()
                    .and_then(|s| s.session_id.clone());
            }
            Ok(product)
        }
        Err(e) => {
            process.dispose().await;
            Err(e)
        }
    }
}

async fn consume_stream(
    request: &RunRequest,
    process: &mut AgentProcess,
    tool_gate: Option<Arc<dyn ToolGate>>,
    permission_timeout: Duration,
    cancel_rx: watch::Receiver<bool>,
) -> Result<RunProduct, RunError> {
    let mut product = RunProduct::default();
    let mut text = String::new();

    while let Some(line) = process.next_line().await? {
        // Malformed lines decode to None and are skipped.
        let Some(message) = decode_line(&line) else {
            continue;
        };

        match message {
            AgentMessage::System { session_id, .. } => {
                if session_id.is_some() {
                    product.session_id = session_id;
                }
            }
            AgentMessage::Assistant { content, .. } => {
                for block in content {
                    match block {
                        ContentBlock::Text { text: t } => {
                            if !text.is_empty() {
                                text.push('\n');
                            }
                            text.push_str(&t);
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            if let Some(gate) = &tool_gate {
                                handle_tool_use(
                                    request,
                                    process,
                                    gate.as_ref(),
                                    permission_timeout,
                                    cancel_rx.clone(),
                                    &mut product,
                                    ToolCall { id, name, input },
                                )
                                .await?;
                            }
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
            }
            AgentMessage::User { .. } => {}
            AgentMessage::Result(stats) => {
                if let Some(result) = &stats.result {
                    product.output = result.clone();
                }
                product.stats = Some(stats);
            }
            AgentMessage::Stream { .. } => {}
        }
    }

    if product.output.is_empty() {
        product.output = text;
    }
    Ok(product)
}

struct ToolCall {
    id: String,
    name: String,
    input: Value,
}

async fn handle_tool_use(
    request: &RunRequest,
    process: &mut AgentProcess,
    gate: &dyn ToolGate,
    permission_timeout: Duration,
    cancel_rx: watch::Receiver<bool>,
    product: &mut RunProduct,
    call: ToolCall,
) -> Result<(), RunError> {
    let ToolCall {
        id: tool_use_id,
        name: tool_name,
        input,
    } = call;

    let intercepted = gate.intercepts(&tool_name);
    if intercepted {
        product.asked_human = true;
    }

    let tool_request = ToolRequest {
        tool_name: tool_name.clone(),
        tool_use_id: tool_use_id.clone(),
        input,
        working_dir: request.spec.working_dir.clone(),
        session_id: product.session_id.clone(),
        unit: request.unit.clone(),
        run_id: request.run_id.clone(),
        cancel: cancel_rx,
    };

    // An intercepting gate bounds itself (question timeout under run
    // cancellation); everything else gets the generic per-call timeout.
    let decision = if intercepted {
        gate.decide(tool_request).await
    } else {
        match tokio::time::timeout(permission_timeout, gate.decide(tool_request)).await {
            Ok(decision) => decision,
            Err(_) => return Err(RunError::ToolPermissionTimeout { tool_name }),
        }
    };

    match decision {
        PermissionDecision::Allow => Ok(()),
        PermissionDecision::AllowWithResult(result) => {
            process
                .write_line(&tool_result_line(&tool_use_id, &result, false))
                .await
        }
        PermissionDecision::Deny { message, interrupt } => {
            if interrupt {
                return Err(RunError::ToolDenied { tool_name, message });
            }
            // Without interrupt the denial becomes a synthetic error
            // result and the run continues.
            process
                .write_line(&tool_result_line(
                    &tool_use_id,
                    &Value::String(message),
                    true,
                ))
                .await
        }
    }
}

#[cfg(test)]
#[path = "tests/run_tests.rs"]
mod tests;
