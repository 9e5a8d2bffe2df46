//! Argument strategy for per-turn agent invocations.
//!
//! The agent CLI cannot both resume a specific session id and run
//! non-interactively: `--session-id` only creates new sessions, and
//! `--resume <id>` misbehaves under `--print`. So the session-id flag is
//! used exactly once, on the first turn of a brand-new session, and every
//! other turn falls back to `--continue` (resume whatever the agent
//! considers most recent). The id is reconciled afterwards from the
//! `system`/`init` protocol event. This is a documented workaround for the
//! external tool, not an emergent design.

/// Whether a session was just created or is attaching to prior history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityMode {
    New,
    Resuming,
}

/// Flags common to every non-interactive invocation.
fn base_args() -> Vec<String> {
    vec![
        "--print".into(),
        "--verbose".into(),
        "--output-format".into(),
        "stream-json".into(),
        "--dangerously-skip-permissions".into(),
    ]
}

/// Build the argument vector for one turn of a managed session.
///
/// `turn_count` is the 1-based number of this prompt since the last reset.
pub fn turn_args(
    turn_count: u32,
    continuity: ContinuityMode,
    session_id: Option<&str>,
    prompt: &str,
) -> Vec<String> {
    let mut args = base_args();

    if turn_count == 1 && continuity == ContinuityMode::New {
        // First turn of a brand-new session may claim a specific id.
        if let Some(id) = session_id {
            args.push("--session-id".into());
            args.push(id.into());
        }
    } else {
        args.push("--continue".into());
    }

    args.push(prompt.into());
    args
}

/// Build the argument vector for a one-shot shadow invocation.
///
/// No session flag at all: the shadow run must not attach to, or disturb,
/// any existing conversation state.
pub fn shadow_args(prompt: &str) -> Vec<String> {
    let mut args = base_args();
    args.push(prompt.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_flag(args: &[String]) -> Option<&str> {
        if args.iter().any(|a| a == "--continue") {
            Some("--continue")
        } else if args.iter().any(|a| a == "--session-id") {
            Some("--session-id")
        } else {
            None
        }
    }

    #[test]
    fn first_turn_of_new_session_claims_the_id() {
        let args = turn_args(1, ContinuityMode::New, Some("abc-123"), "hello");
        let pos = args.iter().position(|a| a == "--session-id").unwrap();
        assert_eq!(args[pos + 1], "abc-123");
        assert!(!args.iter().any(|a| a == "--continue"));
        assert_eq!(args.last().unwrap(), "hello");
    }

    #[test]
    fn first_turn_without_id_has_no_session_flag() {
        let args = turn_args(1, ContinuityMode::New, None, "hello");
        assert_eq!(session_flag(&args), None);
    }

    #[test]
    fn resumed_first_turn_continues_without_id() {
        // The caller's id is provisional here; it gets reconciled from the
        // init event after the fact.
        let args = turn_args(1, ContinuityMode::Resuming, Some("abc-123"), "hello");
        assert_eq!(session_flag(&args), Some("--continue"));
        assert!(!args.iter().any(|a| a == "abc-123"));
    }

    #[test]
    fn later_turns_always_continue() {
        for turn in [2, 5] {
            for mode in [ContinuityMode::New, ContinuityMode::Resuming] {
                let args = turn_args(turn, mode, Some("abc-123"), "hello");
                assert_eq!(session_flag(&args), Some("--continue"), "turn {turn} {mode:?}");
            }
        }
    }

    #[test]
    fn base_flags_always_present_and_prompt_last() {
        let args = turn_args(3, ContinuityMode::Resuming, None, "do the thing");
        for flag in [
            "--print",
            "--verbose",
            "--output-format",
            "--dangerously-skip-permissions",
        ] {
            assert!(args.iter().any(|a| a == flag), "missing {flag}");
        }
        let pos = args.iter().position(|a| a == "--output-format").unwrap();
        assert_eq!(args[pos + 1], "stream-json");
        assert_eq!(args.last().unwrap(), "do the thing");
    }

    #[test]
    fn shadow_args_carry_no_session_flag() {
        let args = shadow_args("summarize this");
        assert_eq!(session_flag(&args), None);
        assert_eq!(args.last().unwrap(), "summarize this");
    }
}
