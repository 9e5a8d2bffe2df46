//! Shadow summarization against scripted agent binaries.

#![cfg(unix)]

mod common;

use std::time::Duration;

use agentdeck_connector::{ConnectorError, SessionManager, ShadowTask};
use tokio::sync::mpsc;

#[tokio::test]
async fn summarize_collects_assistant_text() {
    let tmp = tempfile::tempdir().unwrap();
    let agent = common::ndjson_agent(
        tmp.path(),
        "agent.sh",
        &[
            r#"{"type":"system","subtype":"init","session_id":"shadow-1"}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"The user fixed a bug. "}]}}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Tests now pass."}]}}"#,
            r#"{"type":"result","usage":{"input_tokens":5,"output_tokens":5}}"#,
        ],
    );

    let summary = ShadowTask::new(tmp.path())
        .with_binary(&agent)
        .summarize("user: fix the bug\nassistant: done")
        .await
        .unwrap();

    assert_eq!(summary, "The user fixed a bug. Tests now pass.");
}

#[tokio::test]
async fn silent_subprocess_times_out_without_touching_the_session() {
    let tmp = tempfile::tempdir().unwrap();
    let agent = common::write_fake_agent(tmp.path(), "agent.sh", "sleep 30");

    // A primary session exists alongside; the shadow run must not touch it.
    let (tx, _rx) = mpsc::channel(64);
    let mut mgr = SessionManager::new(tmp.path(), tx).with_binary(&agent);
    mgr.start(None, Some("primary"), true).await.unwrap();

    let err = ShadowTask::new(tmp.path())
        .with_binary(&agent)
        .with_timeout(Duration::from_millis(200))
        .summarize("some conversation")
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::SummaryTimeout(_)));
    assert_eq!(mgr.turn_count(), 0);
    assert!(!mgr.is_processing());
    assert_eq!(mgr.session_id().await.as_deref(), Some("primary"));
}

#[tokio::test]
async fn exit_without_text_is_an_empty_result() {
    let tmp = tempfile::tempdir().unwrap();
    let agent = common::ndjson_agent(
        tmp.path(),
        "agent.sh",
        &[
            r#"{"type":"system","subtype":"init","session_id":"shadow-2"}"#,
            r#"{"type":"result","usage":{"input_tokens":1,"output_tokens":0}}"#,
        ],
    );

    let err = ShadowTask::new(tmp.path())
        .with_binary(&agent)
        .summarize("nothing much")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::SummaryEmpty));
}

#[tokio::test]
async fn explicit_agent_error_aborts_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let agent = common::ndjson_agent(
        tmp.path(),
        "agent.sh",
        &[r#"{"type":"error","error":"rate limited"}"#],
    );

    let err = ShadowTask::new(tmp.path())
        .with_binary(&agent)
        .summarize("anything")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::AgentError(m) if m == "rate limited"));
}
