//! Session state manager.
//!
//! Owns session identity, the turn counter, continuity mode, and the one
//! active subprocess. Each accepted prompt re-spawns the agent CLI with
//! flags chosen by the argument strategy; the subprocess's stdout flows
//! through the line framer and decoder into the dispatcher, and the
//! resulting events leave through an explicit typed channel per manager
//! instance. Invariant: an active child implies `processing == true`, and
//! at most one child exists per session at any instant.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentdeck_protocol::{SessionEvent, SessionStatus};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::args::{turn_args, ContinuityMode};
use crate::command::{resolve_agent_binary, spawn_agent};
use crate::debug_log::DebugLog;
use crate::decode::decode_line;
use crate::dispatch::Dispatcher;
use crate::framing::LineFramer;
use crate::ConnectorError;

/// Best-effort wait after a terminate signal.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// State shared with the per-turn reader task.
struct Shared {
    /// The id currently believed canonical (caller- or agent-assigned).
    canonical_id: Mutex<Option<String>>,
    /// The id the agent last confirmed via its init event.
    agent_id: Mutex<Option<String>>,
    processing: AtomicBool,
    /// At most one active subprocess per session.
    child: Mutex<Option<Child>>,
}

pub struct SessionManager {
    events: mpsc::Sender<SessionEvent>,
    shared: Arc<Shared>,
    debug_log: Arc<Mutex<DebugLog>>,
    turn_count: u32,
    continuity: ContinuityMode,
    working_dir: PathBuf,
    binary: Option<PathBuf>,
}

impl SessionManager {
    pub fn new(working_dir: impl Into<PathBuf>, events: mpsc::Sender<SessionEvent>) -> Self {
        let working_dir = working_dir.into();
        Self {
            events,
            shared: Arc::new(Shared {
                canonical_id: Mutex::new(None),
                agent_id: Mutex::new(None),
                processing: AtomicBool::new(false),
                child: Mutex::new(None),
            }),
            debug_log: Arc::new(Mutex::new(DebugLog::new(&working_dir))),
            turn_count: 0,
            continuity: ContinuityMode::New,
            working_dir,
            binary: None,
        }
    }

    /// Override agent binary resolution (tests, packaged installs).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Create or attach to a session. Rules, in order: a redundant start
    /// with the current id only refreshes the working directory and keeps
    /// the turn counter; a requested id resets state and adopts it (New or
    /// Resuming); no id and no session generates a fresh one; otherwise
    /// the current session is left untouched.
    pub async fn start(
        &mut self,
        working_dir: Option<&Path>,
        requested_id: Option<&str>,
        is_new_session: bool,
    ) -> Result<(), ConnectorError> {
        if let Some(requested) = requested_id {
            let canonical = self.shared.canonical_id.lock().await.clone();
            let agent = self.shared.agent_id.lock().await.clone();

            if canonical.as_deref() == Some(requested) || agent.as_deref() == Some(requested) {
                // Resuming the same tab must not restart turn numbering.
                info!(
                    component = "session_manager",
                    event = "session.start.already_active",
                    session_id = %requested,
                    turn_count = self.turn_count,
                    "Session already active, not resetting turn count"
                );
                if let Some(dir) = working_dir {
                    self.set_working_dir(dir).await;
                }
                self.emit_started(canonical.unwrap_or_else(|| requested.to_string()))
                    .await;
                return Ok(());
            }

            self.reset_state().await;
            *self.shared.canonical_id.lock().await = Some(requested.to_string());
            self.continuity = if is_new_session {
                ContinuityMode::New
            } else {
                ContinuityMode::Resuming
            };
            info!(
                component = "session_manager",
                event = "session.start.adopted_id",
                session_id = %requested,
                continuity = ?self.continuity,
                "Adopted requested session id"
            );
        } else {
            let have_session = self.shared.canonical_id.lock().await.is_some();
            if !have_session {
                let id = Uuid::new_v4().to_string();
                info!(
                    component = "session_manager",
                    event = "session.start.generated_id",
                    session_id = %id,
                    "Creating new session with generated id"
                );
                *self.shared.canonical_id.lock().await = Some(id);
                self.continuity = ContinuityMode::New;
            } else {
                info!(
                    component = "session_manager",
                    event = "session.start.kept_current",
                    turn_count = self.turn_count,
                    "Keeping current session untouched"
                );
            }
        }

        if let Some(dir) = working_dir {
            self.set_working_dir(dir).await;
        }

        let id = self
            .shared
            .canonical_id
            .lock()
            .await
            .clone()
            .unwrap_or_default();
        self.emit_started(id).await;
        Ok(())
    }

    /// Submit one prompt: one turn, one subprocess. At most one prompt may
    /// be in flight per session; a prompt arriving while processing is
    /// logged and dropped (at-most-once delivery, no retry).
    pub async fn send_prompt(&mut self, prompt: &str) -> Result<(), ConnectorError> {
        let session_id = self
            .shared
            .canonical_id
            .lock()
            .await
            .clone()
            .ok_or(ConnectorError::NoActiveSession)?;

        if self.shared.processing.load(Ordering::SeqCst) {
            warn!(
                component = "session_manager",
                event = "session.prompt.dropped",
                session_id = %session_id,
                "Already processing a prompt, ignoring new prompt"
            );
            return Ok(());
        }
        self.shared.processing.store(true, Ordering::SeqCst);
        self.turn_count += 1;

        info!(
            component = "session_manager",
            event = "session.prompt.accepted",
            session_id = %session_id,
            turn = self.turn_count,
            prompt_len = prompt.len(),
            "Processing prompt"
        );

        let log_id = self.log_id().await;
        self.debug_log
            .lock()
            .await
            .append_prompt(&log_id, prompt, self.turn_count)
            .await;

        // Starting a new turn replaces any stale subprocess.
        if let Some(mut stale) = self.shared.child.lock().await.take() {
            warn!(
                component = "session_manager",
                event = "session.prompt.stale_child_killed",
                session_id = %session_id,
                "Killing stale subprocess before new turn"
            );
            let _ = stale.start_kill();
        }

        let binary = match &self.binary {
            Some(b) => b.clone(),
            None => match resolve_agent_binary() {
                Ok(b) => b,
                Err(e) => return self.fail_turn(e).await,
            },
        };

        let args = turn_args(
            self.turn_count,
            self.continuity,
            Some(session_id.as_str()),
            prompt,
        );
        let mut child = match spawn_agent(&binary, &args, &self.working_dir) {
            Ok(c) => c,
            Err(e) => return self.fail_turn(e).await,
        };

        let Some(stdout) = child.stdout.take() else {
            return self
                .fail_turn(ConnectorError::Spawn("no stdout on child".into()))
                .await;
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(
                        component = "session_manager",
                        event = "session.agent.stderr",
                        line = %line,
                        "Agent stderr"
                    );
                }
            });
        }

        *self.shared.child.lock().await = Some(child);

        let reader = TurnReader {
            dispatcher: Dispatcher::new(Some(session_id)),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            debug_log: Arc::clone(&self.debug_log),
        };
        tokio::spawn(reader.run(stdout));

        Ok(())
    }

    /// Terminate the active subprocess without touching session identity;
    /// the next prompt continues the same session. Safe no-op when idle.
    pub async fn interrupt_current(&mut self) {
        let taken = self.shared.child.lock().await.take();
        match taken {
            Some(mut child) => {
                info!(
                    component = "session_manager",
                    event = "session.interrupt",
                    "Stopping current agent subprocess"
                );
                let _ = child.start_kill();
                self.shared.processing.store(false, Ordering::SeqCst);
                tokio::time::sleep(KILL_GRACE).await;
                let _ = self.events.send(SessionEvent::Ready).await;
                let _ = self
                    .events
                    .send(SessionEvent::ProcessStopped {
                        reason: "user_interrupted".into(),
                    })
                    .await;
            }
            None => {
                info!(
                    component = "session_manager",
                    event = "session.interrupt.idle",
                    "No active agent subprocess to stop"
                );
            }
        }
    }

    /// Tear the session down: kill the child, wait a short grace interval,
    /// reset every field to idle.
    pub async fn stop(&mut self) {
        let taken = self.shared.child.lock().await.take();
        if let Some(mut child) = taken {
            let _ = child.start_kill();
            tokio::time::sleep(KILL_GRACE).await;
        }
        self.reset_state().await;
    }

    /// Lifecycle snapshot.
    pub async fn status(&self) -> SessionStatus {
        let session_id = self.shared.canonical_id.lock().await.clone();
        SessionStatus {
            active: session_id.is_some(),
            session_id,
            processing: self.shared.processing.load(Ordering::SeqCst),
        }
    }

    pub async fn session_id(&self) -> Option<String> {
        self.shared.canonical_id.lock().await.clone()
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn continuity(&self) -> ContinuityMode {
        self.continuity
    }

    pub fn is_processing(&self) -> bool {
        self.shared.processing.load(Ordering::SeqCst)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The configured binary override, when one was set.
    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    // -- Internal helpers ---------------------------------------------------

    async fn emit_started(&self, session_id: String) {
        let _ = self
            .events
            .send(SessionEvent::SessionStarted { session_id })
            .await;
        let _ = self.events.send(SessionEvent::Ready).await;
    }

    /// A turn-local failure: surface the error, re-emit readiness, leave
    /// session identity and turn count intact.
    async fn fail_turn(&mut self, err: ConnectorError) -> Result<(), ConnectorError> {
        error!(
            component = "session_manager",
            event = "session.turn.failed",
            error = %err,
            "Turn failed before producing output"
        );
        self.shared.processing.store(false, Ordering::SeqCst);
        let _ = self
            .events
            .send(SessionEvent::Error {
                message: err.to_string(),
            })
            .await;
        let _ = self.events.send(SessionEvent::Ready).await;
        Ok(())
    }

    /// Debug log records go under the agent-confirmed id when known.
    async fn log_id(&self) -> String {
        let agent = self.shared.agent_id.lock().await.clone();
        match agent {
            Some(id) => id,
            None => self
                .shared
                .canonical_id
                .lock()
                .await
                .clone()
                .unwrap_or_else(|| "unknown".into()),
        }
    }

    async fn set_working_dir(&mut self, dir: &Path) {
        self.working_dir = dir.to_path_buf();
        self.debug_log.lock().await.set_working_dir(dir);
    }

    async fn reset_state(&mut self) {
        if let Some(mut child) = self.shared.child.lock().await.take() {
            let _ = child.start_kill();
        }
        *self.shared.canonical_id.lock().await = None;
        *self.shared.agent_id.lock().await = None;
        self.shared.processing.store(false, Ordering::SeqCst);
        self.turn_count = 0;
        self.continuity = ContinuityMode::New;
    }
}

/// Per-turn reader: frames chunks into lines, decodes and dispatches them,
/// and closes the turn out when the subprocess exits.
struct TurnReader {
    dispatcher: Dispatcher,
    shared: Arc<Shared>,
    events: mpsc::Sender<SessionEvent>,
    debug_log: Arc<Mutex<DebugLog>>,
}

impl TurnReader {
    async fn run(mut self, mut stdout: ChildStdout) {
        let mut framer = LineFramer::new();
        let mut buf = [0u8; 8192];

        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let log_id = self.log_id().await;
                    self.debug_log
                        .lock()
                        .await
                        .append_raw(&log_id, &chunk)
                        .await;
                    for line in framer.push(&chunk) {
                        if !self.handle_line(&line).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(
                        component = "session_manager",
                        event = "session.agent.read_error",
                        error = %e,
                        "Error reading agent stdout"
                    );
                    break;
                }
            }
        }

        // An unterminated trailing fragment still gets decoded; the agent
        // does not always end its last line with a newline.
        if let Some(rest) = framer.finish() {
            self.handle_line(&rest).await;
        }

        for event in self.dispatcher.finish() {
            let _ = self.events.send(event).await;
        }

        // Reap the child unless an interrupt/stop already took it.
        if let Some(mut child) = self.shared.child.lock().await.take() {
            let _ = child.wait().await;
        }
        self.shared.processing.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Ready).await;

        debug!(
            component = "session_manager",
            event = "session.turn.ended",
            "Agent subprocess turn ended"
        );
    }

    /// Returns false when the event channel is gone and reading should stop.
    async fn handle_line(&mut self, line: &str) -> bool {
        let Some(decoded) = decode_line(line) else {
            return true;
        };

        if let Some(parsed) = &decoded.parsed {
            let log_id = self.log_id().await;
            self.debug_log
                .lock()
                .await
                .append_parsed(&log_id, parsed)
                .await;
        }

        for event in self.dispatcher.dispatch(decoded.event) {
            match &event {
                SessionEvent::SessionIdChanged { new_id, .. } => {
                    *self.shared.canonical_id.lock().await = Some(new_id.clone());
                    *self.shared.agent_id.lock().await = Some(new_id.clone());
                }
                SessionEvent::SystemInfo {
                    session_id: Some(sid),
                    ..
                } => {
                    *self.shared.agent_id.lock().await = Some(sid.clone());
                }
                SessionEvent::Error { .. } => {
                    // The turn is over as soon as the agent reports an
                    // error; do not wait for process exit.
                    self.shared.processing.store(false, Ordering::SeqCst);
                }
                _ => {}
            }
            if self.events.send(event).await.is_err() {
                info!(
                    component = "session_manager",
                    event = "session.events.channel_closed",
                    "Event channel closed, stopping reader"
                );
                return false;
            }
        }
        true
    }

    async fn log_id(&self) -> String {
        let agent = self.shared.agent_id.lock().await.clone();
        match agent {
            Some(id) => id,
            None => self
                .shared
                .canonical_id
                .lock()
                .await
                .clone()
                .unwrap_or_else(|| "unknown".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (SessionManager, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let tmp = std::env::temp_dir();
        (SessionManager::new(tmp, tx), rx)
    }

    async fn expect_started(rx: &mut mpsc::Receiver<SessionEvent>) -> String {
        match rx.recv().await.unwrap() {
            SessionEvent::SessionStarted { session_id } => session_id,
            other => panic!("expected SessionStarted, got {other:?}"),
        }
    }

    async fn expect_ready(rx: &mut mpsc::Receiver<SessionEvent>) {
        match rx.recv().await.unwrap() {
            SessionEvent::Ready => {}
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_without_id_generates_one() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, None, false).await.unwrap();

        let id = expect_started(&mut rx).await;
        expect_ready(&mut rx).await;
        assert!(!id.is_empty());
        assert_eq!(mgr.continuity(), ContinuityMode::New);
        assert_eq!(mgr.session_id().await.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn redundant_start_with_same_id_is_a_noop() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, Some("tab-1"), true).await.unwrap();
        expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        mgr.start(None, Some("tab-1"), false).await.unwrap();
        let id = expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        assert_eq!(id, "tab-1");
        // Mode stays New: the session was never reset.
        assert_eq!(mgr.continuity(), ContinuityMode::New);
    }

    #[tokio::test]
    async fn requested_id_without_new_flag_resumes() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, Some("old-session"), false).await.unwrap();
        assert_eq!(expect_started(&mut rx).await, "old-session");
        assert_eq!(mgr.continuity(), ContinuityMode::Resuming);
        assert_eq!(mgr.turn_count(), 0);
    }

    #[tokio::test]
    async fn switching_ids_resets_state() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, Some("a"), true).await.unwrap();
        expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        mgr.start(None, Some("b"), true).await.unwrap();
        assert_eq!(expect_started(&mut rx).await, "b");
        assert_eq!(mgr.turn_count(), 0);
        assert_eq!(mgr.continuity(), ContinuityMode::New);
    }

    #[tokio::test]
    async fn start_with_existing_session_and_no_id_keeps_it() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, Some("keep-me"), true).await.unwrap();
        expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        mgr.start(None, None, false).await.unwrap();
        assert_eq!(expect_started(&mut rx).await, "keep-me");
    }

    #[tokio::test]
    async fn prompt_without_session_is_rejected() {
        let (mut mgr, _rx) = manager();
        let err = mgr.send_prompt("hello").await.unwrap_err();
        assert!(matches!(err, ConnectorError::NoActiveSession));
    }

    #[tokio::test]
    async fn idle_interrupt_is_a_noop() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, Some("s"), true).await.unwrap();
        expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        mgr.interrupt_current().await;

        assert_eq!(mgr.turn_count(), 0);
        assert!(!mgr.is_processing());
        // No Ready/ProcessStopped from an idle interrupt.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_resets_everything() {
        let (mut mgr, mut rx) = manager();
        mgr.start(None, Some("s"), true).await.unwrap();
        expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        mgr.stop().await;
        let status = mgr.status().await;
        assert!(!status.active);
        assert_eq!(status.session_id, None);
        assert!(!status.processing);
        assert_eq!(mgr.turn_count(), 0);
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_an_error_and_leaves_the_session_idle() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut mgr =
            SessionManager::new(std::env::temp_dir(), tx).with_binary("/nonexistent/agent");
        mgr.start(None, Some("s"), true).await.unwrap();
        expect_started(&mut rx).await;
        expect_ready(&mut rx).await;

        mgr.send_prompt("hello").await.unwrap();

        match rx.recv().await.unwrap() {
            SessionEvent::Error { message } => assert!(message.contains("spawn")),
            other => panic!("expected Error, got {other:?}"),
        }
        expect_ready(&mut rx).await;
        assert!(!mgr.is_processing());
        assert_eq!(mgr.session_id().await.as_deref(), Some("s"));
        // Turn-local failure: the counter keeps its incremented value and
        // identity is preserved.
        assert_eq!(mgr.turn_count(), 1);
    }
}
