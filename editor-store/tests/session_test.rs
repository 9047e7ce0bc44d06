//! Editor session state machine tests
//!
//! Runs go through a scripted execution API; history lands in an in-memory
//! SQLite store.

mod support;

use std::sync::Arc;

use serde_json::json;

use editor_store::drafts::draft_key;
use editor_store::editor::{EditorHandle, TextBuffer};
use editor_store::gateway::GatewayError;
use editor_store::history::HistoryError;
use editor_store::session::{FailureKind, EMPTY_SOURCE_MESSAGE, TRANSPORT_FAILURE_MESSAGE};
use editor_store::storage::{KeyValueStorage, MemoryStorage};
use editor_store::store::DataStore;
use editor_store::RunPhase;
use shared_types::{Language, FONT_SIZE_MAX, FONT_SIZE_MIN};
use support::{user, FixedIdentity, Harness};

/// Yield until the session reports an in-flight run.
async fn until_running(harness: &Harness) {
    while !harness.session.is_running() {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Outcome Mapping
// ============================================================================

#[tokio::test]
async fn test_successful_run_trims_output() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("console.log(42)");
    h.api.respond(json!({ "run": { "code": 0, "output": "  42\n" } }));

    let phase = h.session.run_code().await;

    assert_eq!(phase, RunPhase::Success);
    let snap = h.session.snapshot();
    assert_eq!(snap.output, "42");
    assert_eq!(snap.error, None);
    assert!(!snap.is_running);
    let result = snap.execution_result.expect("result recorded");
    assert_eq!(result.output, "42");
    assert_eq!(result.code, "console.log(42)");
    assert_eq!(result.error, None);
}

#[tokio::test]
async fn test_compile_failure_takes_priority_over_run_stage() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("int main( {");
    h.api.respond(json!({
        "compile": { "code": 1, "stderr": "syntax error" },
        "run": { "code": 0, "output": "" }
    }));

    let phase = h.session.run_code().await;

    assert_eq!(phase, RunPhase::Error);
    let snap = h.session.snapshot();
    assert!(!snap.is_running);
    assert_eq!(snap.error.as_deref(), Some("syntax error"));
    assert_eq!(snap.output, "");
    assert_eq!(snap.failure, Some(FailureKind::Compile));
    assert_eq!(
        snap.execution_result.and_then(|r| r.error).as_deref(),
        Some("syntax error")
    );
}

#[tokio::test]
async fn test_compile_failure_falls_back_to_output_when_stderr_empty() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("broken");
    h.api.respond(json!({
        "compile": { "code": 2, "stderr": "", "output": "  missing semicolon \n" },
        "run": { "code": 1, "stderr": "never reached" }
    }));

    h.session.run_code().await;

    assert_eq!(
        h.session.snapshot().error.as_deref(),
        Some("missing semicolon")
    );
}

#[tokio::test]
async fn test_runtime_failure_uses_run_diagnostic() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("throw new Error('boom')");
    h.api.respond(json!({
        "compile": { "code": 0 },
        "run": { "code": 1, "stderr": "Error: boom\n", "output": "partial" }
    }));

    let phase = h.session.run_code().await;

    assert_eq!(phase, RunPhase::Error);
    let snap = h.session.snapshot();
    assert_eq!(snap.error.as_deref(), Some("Error: boom"));
    assert_eq!(snap.failure, Some(FailureKind::Runtime));
    assert_eq!(snap.output, "");
}

#[tokio::test]
async fn test_general_failure_message_is_shown() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("print(1)");
    h.api
        .respond(json!({ "message": "Requests are limited to 5 per second" }));

    h.session.run_code().await;

    let snap = h.session.snapshot();
    assert_eq!(
        snap.error.as_deref(),
        Some("Requests are limited to 5 per second")
    );
    assert_eq!(snap.failure, Some(FailureKind::General));
}

#[tokio::test]
async fn test_blank_message_does_not_hide_run_output() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("print(42)");
    h.api.respond(json!({ "message": "", "run": { "code": 0, "output": "42\n" } }));

    let phase = h.session.run_code().await;

    assert_eq!(phase, RunPhase::Success);
    let snap = h.session.snapshot();
    assert_eq!(snap.output, "42");
    assert_eq!(snap.error, None);
    assert_eq!(snap.failure, None);
}

#[tokio::test]
async fn test_transport_failure_hides_raw_error() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("console.log(1)");
    h.api.fail(GatewayError::Transport(
        "error sending request for url (https://emkc.org): connection refused".into(),
    ));

    let phase = h.session.run_code().await;

    assert_eq!(phase, RunPhase::Error);
    let snap = h.session.snapshot();
    assert!(!snap.is_running);
    assert_eq!(snap.error.as_deref(), Some(TRANSPORT_FAILURE_MESSAGE));
    assert_eq!(snap.failure, Some(FailureKind::Transport));
    assert_eq!(
        snap.execution_result.and_then(|r| r.error).as_deref(),
        Some(TRANSPORT_FAILURE_MESSAGE)
    );
}

#[tokio::test]
async fn test_request_uses_language_runtime() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.session.set_language(Language::Python);
    h.type_code("print('hi')");
    h.api.respond(json!({ "run": { "code": 0, "output": "hi\n" } }));

    h.session.run_code().await;

    let requests = h.api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].language, "python");
    assert_eq!(requests[0].version, "3.10.0");
    assert_eq!(requests[0].files[0].content, "print('hi')");
}

// ============================================================================
// Empty Source
// ============================================================================

#[tokio::test]
async fn test_empty_buffer_never_reaches_api() {
    let h = Harness::new(FixedIdentity::signed_in(user("u1"))).await;

    for blank in ["", "   \n\t"] {
        h.type_code(blank);
        let phase = h.session.run_code().await;

        assert_eq!(phase, RunPhase::Error);
        let snap = h.session.snapshot();
        assert_eq!(snap.error.as_deref(), Some(EMPTY_SOURCE_MESSAGE));
        assert!(!snap.is_running);
        assert_eq!(snap.failure, Some(FailureKind::Validation));
    }

    assert!(h.api.requests().is_empty());
    h.session.history().flush().await;
    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn test_empty_run_leaves_in_flight_run_running() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("print(1)");
    let release = h.api.hold_next();
    h.api.respond(json!({ "run": { "code": 0, "output": "1" } }));

    let (phase, ()) = tokio::join!(h.session.run_code(), async {
        until_running(&h).await;
        h.type_code("  ");

        assert_eq!(h.session.run_code().await, RunPhase::Error);
        assert!(h.session.is_running());
        release.send(()).unwrap();
    });

    assert_eq!(phase, RunPhase::Success);
    assert!(!h.session.is_running());
    assert_eq!(h.api.requests().len(), 1);
}

#[tokio::test]
async fn test_run_without_editor_is_empty() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.session.detach_editor();

    assert_eq!(h.session.run_code().await, RunPhase::Error);
    assert!(h.api.requests().is_empty());
}

// ============================================================================
// Running Flag
// ============================================================================

#[tokio::test]
async fn test_previous_outcome_cleared_while_running() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("x");
    h.api
        .respond(json!({ "run": { "code": 1, "stderr": "ReferenceError" } }));
    h.session.run_code().await;
    assert!(h.session.snapshot().error.is_some());

    let release = h.api.hold_next();
    h.api.respond(json!({ "run": { "code": 0, "output": "done" } }));

    let (phase, ()) = tokio::join!(h.session.run_code(), async {
        until_running(&h).await;
        let snap = h.session.snapshot();
        assert_eq!(snap.phase, RunPhase::Running);
        assert_eq!(snap.error, None);
        assert_eq!(snap.output, "");
        release.send(()).unwrap();
    });

    assert_eq!(phase, RunPhase::Success);
    assert!(!h.session.is_running());
    assert_eq!(h.session.snapshot().output, "done");
}

#[tokio::test]
async fn test_running_flag_cleared_when_run_is_dropped() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("while (true) {}");
    let _release = h.api.hold_next();

    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        h.session.run_code(),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!h.session.is_running());
    assert_ne!(h.session.snapshot().phase, RunPhase::Running);
}

// ============================================================================
// Execution History
// ============================================================================

#[tokio::test]
async fn test_signed_in_run_is_logged() {
    let h = Harness::new(FixedIdentity::signed_in(user("u1"))).await;
    h.type_code("console.log('hi')");
    h.api.respond(json!({ "run": { "code": 0, "output": "hi\n" } }));

    h.session.run_code().await;
    h.session.history().flush().await;

    let records = h.store.inner().list_executions("u1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].language, Language::JavaScript);
    assert_eq!(records[0].code, "console.log('hi')");
    assert_eq!(records[0].output, "hi");
    assert_eq!(records[0].error, None);
}

#[tokio::test]
async fn test_failed_and_transport_runs_are_logged_with_error() {
    let h = Harness::new(FixedIdentity::signed_in(user("u1"))).await;
    h.type_code("oops");
    h.api
        .respond(json!({ "run": { "code": 1, "stderr": "NameError" } }));
    h.session.run_code().await;
    h.session.history().flush().await;
    h.api.fail(GatewayError::Status(503));
    h.session.run_code().await;
    h.session.history().flush().await;

    let records = h.store.inner().list_executions("u1").await.unwrap();
    let errors: Vec<_> = records.iter().map(|r| r.error.clone()).collect();
    assert_eq!(
        errors,
        vec![
            Some(TRANSPORT_FAILURE_MESSAGE.to_string()),
            Some("NameError".to_string())
        ]
    );
}

#[tokio::test]
async fn test_signed_out_run_is_not_logged() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("1 + 1");
    h.api.respond(json!({ "run": { "code": 0, "output": "2" } }));

    h.session.run_code().await;
    h.session.history().flush().await;

    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn test_history_failure_never_touches_session() {
    let h = Harness::new(FixedIdentity::signed_in(user("u1"))).await;
    let mut errors = h.session.history().take_errors().expect("first taker");
    h.store.fail_writes(true);
    h.type_code("console.log(7)");
    h.api.respond(json!({ "run": { "code": 0, "output": "7\n" } }));

    let phase = h.session.run_code().await;
    h.session.history().flush().await;

    assert_eq!(phase, RunPhase::Success);
    let snap = h.session.snapshot();
    assert_eq!(snap.output, "7");
    assert_eq!(snap.error, None);
    assert!(matches!(errors.try_recv(), Ok(HistoryError::Store(_))));
    assert!(h.session.history().take_errors().is_none());
}

#[tokio::test]
async fn test_history_keeps_language_captured_at_run_start() {
    let h = Harness::new(FixedIdentity::signed_in(user("u1"))).await;
    h.type_code("console.log(1)");
    let release = h.api.hold_next();
    h.api.respond(json!({ "run": { "code": 0, "output": "1" } }));

    tokio::join!(h.session.run_code(), async {
        until_running(&h).await;
        h.session.set_language(Language::Rust);
        release.send(()).unwrap();
    });
    h.session.history().flush().await;

    let records = h.store.inner().list_executions("u1").await.unwrap();
    assert_eq!(records[0].language, Language::JavaScript);
    assert_eq!(records[0].code, "console.log(1)");
}

// ============================================================================
// Drafts and Preferences
// ============================================================================

#[tokio::test]
async fn test_attach_loads_template_then_draft() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    assert_eq!(h.editor.value(), Language::JavaScript.default_code());

    h.type_code("let a = 1;");
    let other: Arc<dyn EditorHandle> = Arc::new(TextBuffer::default());
    h.session.attach_editor(&other);
    assert_eq!(other.value(), "let a = 1;");
}

#[tokio::test]
async fn test_language_switch_round_trip_restores_buffers() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("console.log('js draft')");

    h.session.set_language(Language::Python);
    assert_eq!(h.editor.value(), Language::Python.default_code());
    h.type_code("print('py draft')");

    h.session.set_language(Language::JavaScript);
    assert_eq!(h.editor.value(), "console.log('js draft')");

    h.session.set_language(Language::Python);
    assert_eq!(h.editor.value(), "print('py draft')");
}

#[tokio::test]
async fn test_language_switch_keeps_unreported_edits() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    // Edited in the widget but never reported through on_code_changed
    h.editor.set_value("");

    h.session.set_language(Language::Go);
    h.session.set_language(Language::JavaScript);

    assert_eq!(h.editor.value(), "");
    assert_eq!(h.storage.get(&draft_key(Language::JavaScript)).as_deref(), Some(""));
}

#[tokio::test]
async fn test_language_switch_clears_output_but_not_result() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.type_code("console.log(3)");
    h.api.respond(json!({ "run": { "code": 0, "output": "3" } }));
    h.session.run_code().await;

    h.session.set_language(Language::Ruby);

    let snap = h.session.snapshot();
    assert_eq!(snap.output, "");
    assert_eq!(snap.error, None);
    assert_eq!(snap.phase, RunPhase::Idle);
    assert_eq!(snap.language, Language::Ruby);
    assert_eq!(snap.execution_result.map(|r| r.output).as_deref(), Some("3"));
}

#[tokio::test]
async fn test_reset_to_default_is_idempotent() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    h.session.set_language(Language::Swift);
    h.type_code("print(\"mine\")");

    let once = h.session.reset_to_default();
    let buffer_once = h.editor.value();
    let twice = h.session.reset_to_default();

    assert_eq!(once, Language::Swift.default_code());
    assert_eq!(once, twice);
    assert_eq!(buffer_once, h.editor.value());
    assert_eq!(h.storage.get(&draft_key(Language::Swift)), None);
}

#[tokio::test]
async fn test_preferences_persist_across_sessions() {
    let storage = Arc::new(MemoryStorage::new());
    let h = Harness::with_storage(FixedIdentity::signed_out(), storage.clone()).await;

    assert_eq!(h.session.set_font_size(40), FONT_SIZE_MAX);
    assert_eq!(h.session.set_font_size(3), FONT_SIZE_MIN);
    assert_eq!(h.session.set_font_size(18), 18);
    h.session.set_theme("vs-dark");
    h.session.set_language(Language::Go);
    h.type_code("package main");
    drop(h);

    assert_eq!(storage.get("editor-font-size").as_deref(), Some("18"));

    let restored = Harness::with_storage(FixedIdentity::signed_out(), storage).await;
    let snap = restored.session.snapshot();
    assert_eq!(snap.font_size, 18);
    assert_eq!(snap.theme, "vs-dark");
    assert_eq!(snap.language, Language::Go);
    assert_eq!(restored.editor.value(), "package main");
}

#[tokio::test]
async fn test_dropped_editor_is_not_kept_alive() {
    let h = Harness::new(FixedIdentity::signed_out()).await;
    let Harness { session, editor, .. } = h;
    let weak = Arc::downgrade(&editor);
    drop(editor);

    assert!(weak.upgrade().is_none());
    assert_eq!(session.code(), "");
}
