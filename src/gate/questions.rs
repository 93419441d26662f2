//! Interactive question coordination.
//!
//! The agent asks the human a question by invoking one reserved tool
//! mid-run. Acting as the tool-permission callback for that tool name, the
//! coordinator parks the run on a single-shot wait handle until an answer
//! arrives from outside, the per-question timeout lapses, or the run is
//! cancelled. Every other tool name passes through untouched.

use super::{PermissionDecision, ToolGate, ToolRequest};
use crate::config::QuestionConfig;
use crate::domain::{AgentQuestion, QuestionAnswer, QuestionItem, QuestionStatus, UnitRef};
use crate::events::{EventSink, OrchestratorEvent};
use crate::store::Store;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

struct Waiter {
    run_id: String,
    tx: oneshot::Sender<Vec<QuestionAnswer>>,
}

pub struct QuestionCoordinator {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    config: QuestionConfig,
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl QuestionCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSink>,
        config: QuestionConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Completes the wait handle for a pending question, unblocking exactly
    /// one parked permission decision.
    ///
    /// # Errors
    /// Fails with no side effect if no wait handle exists for the id.
    pub async fn submit_answers(
        &self,
        question_id: &str,
        answers: Vec<QuestionAnswer>,
    ) -> Result<()> {
        let waiter = self.waiters.lock().unwrap().remove(question_id);
        match waiter {
            Some(waiter) => {
                // If the receiving side is already gone the run was
                // cancelled in the meantime; the answers are dropped.
                let _ = waiter.tx.send(answers);
                Ok(())
            }
            None => bail!("No pending question with id {}", question_id),
        }
    }

    /// Cancels every outstanding wait handle belonging to the run.
    /// Idempotent: a second call finds nothing to cancel.
    pub async fn cancel_run(&self, run_id: &str) -> Result<()> {
        let cancelled: Vec<String> = {
            let mut waiters = self.waiters.lock().unwrap();
            let ids: Vec<String> = waiters
                .iter()
                .filter(|(_, w)| w.run_id == run_id)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                waiters.remove(id);
            }
            ids
        };

        for id in cancelled {
            if let Some(mut question) = self.store.load_question(&id).await? {
                question.status = QuestionStatus::Cancelled;
                question.resolved_at = Some(chrono::Utc::now().to_rfc3339());
                self.store.save_question(&question).await?;
                self.events.emit(OrchestratorEvent::QuestionCancelled {
                    unit: question.unit.clone(),
                    question_id: id,
                });
            }
        }
        Ok(())
    }

    /// Number of outstanding wait handles, across all runs.
    pub fn pending_count(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }

    /// Ids of the questions currently parked on a wait handle.
    pub fn pending_ids(&self) -> Vec<String> {
        self.waiters.lock().unwrap().keys().cloned().collect()
    }

    async fn mark(
        &self,
        question_id: &str,
        status: QuestionStatus,
        answers: Option<Vec<QuestionAnswer>>,
    ) -> Result<Option<UnitRef>> {
        let Some(mut question) = self.store.load_question(question_id).await? else {
            return Ok(None);
        };
        question.status = status;
        question.resolved_at = Some(chrono::Utc::now().to_rfc3339());
        if let Some(answers) = answers {
            question.answers = answers;
        }
        let unit = question.unit.clone();
        self.store.save_question(&question).await?;
        Ok(Some(unit))
    }

    async fn wait_for_answer(
        &self,
        question: &AgentQuestion,
        mut cancel: tokio::sync::watch::Receiver<bool>,
    ) -> PermissionDecision {
        let (tx, mut rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(
            question.id.clone(),
            Waiter {
                run_id: question.run_id.clone(),
                tx,
            },
        );

        let timeout = tokio::time::sleep(self.config.timeout());
        tokio::pin!(timeout);
        let mut cancel_open = true;

        let outcome = loop {
            tokio::select! {
                answers = &mut rx => break answers.ok(),
                _ = &mut timeout => {
                    self.waiters.lock().unwrap().remove(&question.id);
                    let _ = self.mark(&question.id, QuestionStatus::Timeout, None).await;
                    self.events.emit(OrchestratorEvent::QuestionTimedOut {
                        unit: question.unit.clone(),
                        question_id: question.id.clone(),
                    });
                    return PermissionDecision::Deny {
                        message: "Interactive question timed out".to_string(),
                        interrupt: true,
                    };
                }
                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            // The run is being aborted; cancel_run will
                            // sweep the waiter (or already has).
                            self.waiters.lock().unwrap().remove(&question.id);
                            let _ = self.mark(&question.id, QuestionStatus::Cancelled, None).await;
                            return PermissionDecision::Deny {
                                message: "Run cancelled while awaiting answer".to_string(),
                                interrupt: true,
                            };
                        }
                        Ok(()) => {}
                        // Sender dropped without cancelling: keep waiting
                        // on the answer and the timeout.
                        Err(_) => cancel_open = false,
                    }
                }
            }
        };

        match outcome {
            Some(answers) => {
                let _ = self
                    .mark(&question.id, QuestionStatus::Answered, Some(answers.clone()))
                    .await;
                self.events.emit(OrchestratorEvent::QuestionAnswered {
                    unit: question.unit.clone(),
                    question_id: question.id.clone(),
                });
                PermissionDecision::AllowWithResult(render_answers(&question.questions, &answers))
            }
            // Wait handle dropped by cancel_run; it already marked the
            // question and emitted the event.
            None => PermissionDecision::Deny {
                message: "Run cancelled while awaiting answer".to_string(),
                interrupt: true,
            },
        }
    }
}

#[async_trait]
impl ToolGate for QuestionCoordinator {
    fn intercepts(&self, tool_name: &str) -> bool {
        tool_name == self.config.tool_name
    }

    async fn decide(&self, request: ToolRequest) -> PermissionDecision {
        if request.tool_name != self.config.tool_name {
            return PermissionDecision::Allow;
        }

        let questions = decode_questions(&request.input);
        if questions.is_empty() {
            // Nothing we can surface to a human; let the call proceed.
            return PermissionDecision::Allow;
        }

        let question = AgentQuestion::new(
            request.unit.clone(),
            &request.run_id,
            &request.tool_use_id,
            questions,
            self.config.timeout(),
        );
        if let Err(e) = self.store.save_question(&question).await {
            tracing::warn!("Failed to persist question {}: {}", question.id, e);
            return PermissionDecision::Allow;
        }
        self.events.emit(OrchestratorEvent::QuestionRequested {
            unit: question.unit.clone(),
            question_id: question.id.clone(),
        });

        self.wait_for_answer(&question, request.cancel).await
    }
}

/// Decodes the reserved tool's input into question items. Lenient: items
/// without a prompt or with an option count outside 2..=4 are dropped.
pub fn decode_questions(input: &Value) -> Vec<QuestionItem> {
    let Some(items) = input.get("questions").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut questions = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.get("question").and_then(Value::as_str) else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }

        let options: Vec<String> = item
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(|opt| {
                        opt.as_str()
                            .map(String::from)
                            .or_else(|| {
                                opt.get("label").and_then(Value::as_str).map(String::from)
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !(2..=4).contains(&options.len()) {
            continue;
        }

        let header = item
            .get("header")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("Question {}", index + 1));
        let multi_select = item
            .get("multiSelect")
            .or_else(|| item.get("multi_select"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        questions.push(QuestionItem {
            question: text.to_string(),
            header,
            options,
            multi_select,
        });
    }
    questions
}

/// Renders submitted answers into the substituted tool result the agent
/// expects: one line per question, free-text override winning over the
/// selected labels.
pub fn render_answers(questions: &[QuestionItem], answers: &[QuestionAnswer]) -> Value {
    let mut lines = Vec::new();
    for question in questions {
        let answer = answers.iter().find(|a| a.header == question.header);
        let rendered = answer.map(QuestionAnswer::render).unwrap_or_default();
        if questions.len() == 1 {
            lines.push(rendered);
        } else {
            lines.push(format!("{}: {}", question.header, rendered));
        }
    }
    Value::String(lines.join("\n"))
}

#[cfg(test)]
#[path = "tests/questions_tests.rs"]
mod tests;
