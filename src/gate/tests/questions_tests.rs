use super::*;
use crate::events::NullSink;
use crate::gate::{ToolGate, ToolRequest};
use crate::store::MemoryStore;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

fn coordinator(timeout_secs: u64) -> Arc<QuestionCoordinator> {
    let store = Arc::new(MemoryStore::new());
    let events: Arc<dyn EventSink> = Arc::new(NullSink);
    Arc::new(QuestionCoordinator::new(
        store,
        events,
        QuestionConfig {
            tool_name: "AskUserQuestion".to_string(),
            timeout_secs,
        },
    ))
}

fn question_input() -> Value {
    serde_json::json!({
        "questions": [{
            "question": "Which storage backend should this use?",
            "header": "storage",
            "options": ["sqlite", "postgres"],
            "multiSelect": false,
        }]
    })
}

fn request(coordinator_tool: &str, input: Value, cancel: watch::Receiver<bool>) -> ToolRequest {
    ToolRequest {
        tool_name: coordinator_tool.to_string(),
        tool_use_id: "toolu_1".to_string(),
        input,
        working_dir: PathBuf::from("."),
        session_id: Some("session-1".to_string()),
        unit: UnitRef::Task("t-1".to_string()),
        run_id: "run-1".to_string(),
        cancel,
    }
}

async fn wait_for_pending(coordinator: &QuestionCoordinator) {
    for _ in 0..100 {
        if coordinator.pending_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("No wait handle was registered");
}

#[tokio::test]
async fn test_other_tools_pass_through() {
    let coordinator = coordinator(60);
    let (_tx, cancel) = watch::channel(false);
    let decision = coordinator
        .decide(request("Bash", serde_json::json!({"command": "ls"}), cancel))
        .await;
    assert!(matches!(decision, PermissionDecision::Allow));
}

#[tokio::test]
async fn test_zero_questions_allows_unmodified() {
    let coordinator = coordinator(60);
    let (_tx, cancel) = watch::channel(false);
    let decision = coordinator
        .decide(request(
            "AskUserQuestion",
            serde_json::json!({"questions": []}),
            cancel,
        ))
        .await;
    assert!(matches!(decision, PermissionDecision::Allow));
}

#[tokio::test]
async fn test_submit_unknown_id_is_not_found() {
    let coordinator = coordinator(60);
    let err = coordinator
        .submit_answers("missing", Vec::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No pending question"));
}

#[tokio::test]
async fn test_decode_questions_happy_path() {
    let questions = decode_questions(&question_input());
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].header, "storage");
    assert_eq!(questions[0].options, vec!["sqlite", "postgres"]);
    assert!(!questions[0].multi_select);
}

#[tokio::test]
async fn test_decode_questions_drops_invalid_items() {
    let input = serde_json::json!({
        "questions": [
            {"question": "", "options": ["a", "b"]},
            {"question": "one option only", "options": ["a"]},
            {"question": "five options", "options": ["a", "b", "c", "d", "e"]},
            {"question": "valid", "options": [{"label": "x"}, {"label": "y"}], "multi_select": true},
        ]
    });
    let questions = decode_questions(&input);
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].question, "valid");
    assert_eq!(questions[0].options, vec!["x", "y"]);
    assert!(questions[0].multi_select);
}

#[tokio::test]
async fn test_decode_questions_missing_array() {
    assert!(decode_questions(&serde_json::json!({"other": 1})).is_empty());
    assert!(decode_questions(&Value::Null).is_empty());
}

#[tokio::test]
async fn test_render_single_question_is_bare_answer() {
    let questions = decode_questions(&question_input());
    let answers = vec![QuestionAnswer {
        header: "storage".to_string(),
        selected: vec!["sqlite".to_string()],
        other: None,
    }];
    let rendered = render_answers(&questions, &answers);
    assert_eq!(rendered, Value::String("sqlite".to_string()));
}

#[tokio::test]
async fn test_render_multiple_questions_labels_lines() {
    let questions = vec![
        QuestionItem {
            question: "q1".to_string(),
            header: "first".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            multi_select: true,
        },
        QuestionItem {
            question: "q2".to_string(),
            header: "second".to_string(),
            options: vec!["c".to_string(), "d".to_string()],
            multi_select: false,
        },
    ];
    let answers = vec![
        QuestionAnswer {
            header: "first".to_string(),
            selected: vec!["a".to_string(), "b".to_string()],
            other: None,
        },
        QuestionAnswer {
            header: "second".to_string(),
            selected: Vec::new(),
            other: Some("free text".to_string()),
        },
    ];
    let rendered = render_answers(&questions, &answers);
    assert_eq!(
        rendered,
        Value::String("first: a, b\nsecond: free text".to_string())
    );
}

#[tokio::test]
async fn test_answer_unblocks_waiting_decision() {
    let store = Arc::new(MemoryStore::new());
    let events: Arc<dyn EventSink> = Arc::new(NullSink);
    let coordinator = Arc::new(QuestionCoordinator::new(
        store.clone(),
        events,
        QuestionConfig {
            tool_name: "AskUserQuestion".to_string(),
            timeout_secs: 60,
        },
    ));

    let (_cancel_tx, cancel) = watch::channel(false);
    let decide = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = request("AskUserQuestion", question_input(), cancel);
        async move { coordinator.decide(request).await }
    });

    wait_for_pending(&coordinator).await;
    let question_id = {
        let ids = coordinator.pending_ids();
        assert_eq!(ids.len(), 1);
        ids.into_iter().next().unwrap()
    };

    coordinator
        .submit_answers(
            &question_id,
            vec![QuestionAnswer {
                header: "storage".to_string(),
                selected: vec!["postgres".to_string()],
                other: None,
            }],
        )
        .await
        .unwrap();

    match decide.await.unwrap() {
        PermissionDecision::AllowWithResult(value) => {
            assert_eq!(value, Value::String("postgres".to_string()));
        }
        other => panic!("Expected AllowWithResult, got {:?}", other),
    }

    let question = store.load_question(&question_id).await.unwrap().unwrap();
    assert_eq!(question.status, QuestionStatus::Answered);
    assert_eq!(question.answers[0].selected, vec!["postgres"]);

    // The wait handle is consumed; a second submission is not found.
    let err = coordinator
        .submit_answers(&question_id, Vec::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No pending question"));
}

#[tokio::test]
async fn test_question_timeout_denies_with_interrupt() {
    let store = Arc::new(MemoryStore::new());
    let events: Arc<dyn EventSink> = Arc::new(NullSink);
    let coordinator = Arc::new(QuestionCoordinator::new(
        store.clone(),
        events,
        QuestionConfig {
            tool_name: "AskUserQuestion".to_string(),
            timeout_secs: 0,
        },
    ));

    let (_cancel_tx, cancel) = watch::channel(false);
    let decision = coordinator
        .decide(request("AskUserQuestion", question_input(), cancel))
        .await;

    match decision {
        PermissionDecision::Deny { interrupt, message } => {
            assert!(interrupt);
            assert!(message.contains("timed out"));
        }
        other => panic!("Expected Deny, got {:?}", other),
    }
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_cancel_run_sweeps_waiters_once() {
    let store = Arc::new(MemoryStore::new());
    let events: Arc<dyn EventSink> = Arc::new(NullSink);
    let coordinator = Arc::new(QuestionCoordinator::new(
        store.clone(),
        events,
        QuestionConfig {
            tool_name: "AskUserQuestion".to_string(),
            timeout_secs: 60,
        },
    ));

    let (_cancel_tx, cancel) = watch::channel(false);
    let decide = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = request("AskUserQuestion", question_input(), cancel);
        async move { coordinator.decide(request).await }
    });

    wait_for_pending(&coordinator).await;
    let question_id = coordinator.pending_ids().into_iter().next().unwrap();

    coordinator.cancel_run("run-1").await.unwrap();
    match decide.await.unwrap() {
        PermissionDecision::Deny { interrupt, .. } => assert!(interrupt),
        other => panic!("Expected Deny, got {:?}", other),
    }

    let question = store.load_question(&question_id).await.unwrap().unwrap();
    assert_eq!(question.status, QuestionStatus::Cancelled);

    // Second cancellation is a no-op.
    coordinator.cancel_run("run-1").await.unwrap();
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
async fn test_run_cancellation_signal_interrupts_wait() {
    let store = Arc::new(MemoryStore::new());
    let events: Arc<dyn EventSink> = Arc::new(NullSink);
    let coordinator = Arc::new(QuestionCoordinator::new(
        store.clone(),
        events,
        QuestionConfig {
            tool_name: "AskUserQuestion".to_string(),
            timeout_secs: 60,
        },
    ));

    let (cancel_tx, cancel) = watch::channel(false);
    let decide = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = request("AskUserQuestion", question_input(), cancel);
        async move { coordinator.decide(request).await }
    });

    wait_for_pending(&coordinator).await;
    cancel_tx.send(true).unwrap();

    match decide.await.unwrap() {
        PermissionDecision::Deny { interrupt, message } => {
            assert!(interrupt);
            assert!(message.contains("cancelled"));
        }
        other => panic!("Expected Deny, got {:?}", other),
    }
}
