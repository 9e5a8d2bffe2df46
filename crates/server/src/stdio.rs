//! Stdio NDJSON transport.
//!
//! Client commands arrive one JSON object per line on stdin; every
//! session event leaves as one JSON object per line on stdout, in emission
//! order, with no filtering. This is the whole transport responsibility.

use std::path::PathBuf;

use agentdeck_connector::{SessionManager, ShadowTask};
use agentdeck_protocol::{ClientCommand, SessionEvent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Run the transport until stdin closes.
pub async fn run(
    mut manager: SessionManager,
    events_tx: mpsc::Sender<SessionEvent>,
    mut events_rx: mpsc::Receiver<SessionEvent>,
) -> anyhow::Result<()> {
    // Writer: fan events out to stdout in order.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events_rx.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(
                        component = "stdio",
                        event = "stdio.serialize_failed",
                        error = %e,
                        "Failed to serialize event"
                    );
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ClientCommand>(&line) {
            Ok(cmd) => handle_command(cmd, &mut manager, &events_tx).await,
            Err(e) => {
                let _ = events_tx
                    .send(SessionEvent::Error {
                        message: format!("invalid command: {e}"),
                    })
                    .await;
            }
        }
    }

    info!(
        component = "stdio",
        event = "stdio.stdin_closed",
        "Stdin closed, shutting down"
    );
    manager.stop().await;
    drop(manager);
    drop(events_tx);
    let _ = writer.await;
    Ok(())
}

pub async fn handle_command(
    cmd: ClientCommand,
    manager: &mut SessionManager,
    events_tx: &mpsc::Sender<SessionEvent>,
) {
    match cmd {
        ClientCommand::Start {
            working_dir,
            session_id,
            new_session,
        } => {
            let dir = working_dir.map(PathBuf::from);
            if let Err(e) = manager
                .start(dir.as_deref(), session_id.as_deref(), new_session)
                .await
            {
                let _ = events_tx
                    .send(SessionEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
        ClientCommand::Prompt { text } => {
            if let Err(e) = manager.send_prompt(&text).await {
                let _ = events_tx
                    .send(SessionEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
        ClientCommand::Interrupt => manager.interrupt_current().await,
        ClientCommand::Stop => manager.stop().await,
        ClientCommand::Summarize { conversation } => {
            // Independent of the primary session by design; runs as its
            // own task so a slow summary never blocks the command loop.
            let mut task = ShadowTask::new(manager.working_dir());
            if let Some(bin) = manager.binary() {
                task = task.with_binary(bin);
            }
            let tx = events_tx.clone();
            tokio::spawn(async move {
                let event = match task.summarize(&conversation).await {
                    Ok(summary) => SessionEvent::SummaryReady { summary },
                    Err(e) => SessionEvent::Error {
                        message: e.to_string(),
                    },
                };
                let _ = tx.send(event).await;
            });
        }
        ClientCommand::Status => {
            let status = manager.status().await;
            let _ = events_tx.send(SessionEvent::Status { status }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_command_reports_through_the_event_channel() {
        let (tx, mut rx) = mpsc::channel(64);
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = SessionManager::new(tmp.path(), tx.clone());

        handle_command(
            ClientCommand::Start {
                working_dir: None,
                session_id: Some("tab-9".into()),
                new_session: true,
            },
            &mut manager,
            &tx,
        )
        .await;
        handle_command(ClientCommand::Status, &mut manager, &tx).await;

        // SessionStarted, Ready, then the status snapshot.
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::SessionStarted { .. }
        ));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Ready));
        match rx.recv().await.unwrap() {
            SessionEvent::Status { status } => {
                assert!(status.active);
                assert_eq!(status.session_id.as_deref(), Some("tab-9"));
                assert!(!status.processing);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prompt_without_session_surfaces_an_error_event() {
        let (tx, mut rx) = mpsc::channel(64);
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = SessionManager::new(tmp.path(), tx.clone());

        handle_command(
            ClientCommand::Prompt {
                text: "hello".into(),
            },
            &mut manager,
            &tx,
        )
        .await;

        match rx.recv().await.unwrap() {
            SessionEvent::Error { message } => assert!(message.contains("no active session")),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
