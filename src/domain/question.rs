use super::{new_id, now_rfc3339, UnitRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
    Timeout,
    Cancelled,
}

/// One question as decoded from the reserved tool's input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    /// Full prompt text shown to the human.
    pub question: String,
    /// Short label identifying the question in the answer set.
    pub header: String,
    /// 2-4 options offered by the agent.
    pub options: Vec<String>,
    #[serde(default)]
    pub multi_select: bool,
}

/// An externally submitted answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    /// Matches `QuestionItem::header`.
    pub header: String,
    /// Selected option labels; joined when multi-select.
    #[serde(default)]
    pub selected: Vec<String>,
    /// Free-text answer overriding the options when supplied.
    #[serde(default)]
    pub other: Option<String>,
}

impl QuestionAnswer {
    /// Renders the answer the way the agent expects it back: the free-text
    /// override if present, otherwise the selected labels joined.
    pub fn render(&self) -> String {
        match &self.other {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => self.selected.join(", "),
        }
    }
}

/// An agent-initiated question surfaced mid-run via the reserved tool.
/// Resolved, timed out, or cancelled before the run it belongs to ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentQuestion {
    pub id: String,
    pub unit: UnitRef,
    /// The run this question belongs to.
    pub run_id: String,
    /// Tool-call correlation id from the agent stream.
    pub tool_use_id: String,
    pub status: QuestionStatus,
    pub questions: Vec<QuestionItem>,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    pub asked_at: String,
    /// RFC3339 deadline derived from the configured per-question timeout.
    pub deadline: String,
    #[serde(default)]
    pub resolved_at: Option<String>,
}

impl AgentQuestion {
    pub fn new(
        unit: UnitRef,
        run_id: &str,
        tool_use_id: &str,
        questions: Vec<QuestionItem>,
        timeout: std::time::Duration,
    ) -> Self {
        let deadline = chrono::Utc::now()
            + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        Self {
            id: new_id(),
            unit,
            run_id: run_id.to_string(),
            tool_use_id: tool_use_id.to_string(),
            status: QuestionStatus::Pending,
            questions,
            answers: Vec::new(),
            asked_at: now_rfc3339(),
            deadline: deadline.to_rfc3339(),
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_joins_multi_select() {
        let answer = QuestionAnswer {
            header: "approach".to_string(),
            selected: vec!["option a".to_string(), "option b".to_string()],
            other: None,
        };
        assert_eq!(answer.render(), "option a, option b");
    }

    #[test]
    fn test_render_prefers_other_text() {
        let answer = QuestionAnswer {
            header: "approach".to_string(),
            selected: vec!["option a".to_string()],
            other: Some("something else entirely".to_string()),
        };
        assert_eq!(answer.render(), "something else entirely");
    }

    #[test]
    fn test_render_ignores_blank_other() {
        let answer = QuestionAnswer {
            header: "approach".to_string(),
            selected: vec!["option a".to_string()],
            other: Some("   ".to_string()),
        };
        assert_eq!(answer.render(), "option a");
    }
}
