//! End-of-run report

use std::fmt::Write as _;

use sshfan_core::{CommandStatus, RunResult, SessionResult, SessionState};

const RULE: &str = "==============================================";

/// Text shown after every host has finished
#[must_use]
pub fn render_text(result: &RunResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");

    if result.success {
        let _ = writeln!(out, "✅ Successfully executed commands to all hosts.");
    } else {
        let failed = result.failed().count();
        let _ = writeln!(
            out,
            "❌ {failed} of {} hosts failed:",
            result.sessions.len()
        );
        for session in result.failed() {
            render_failure(&mut out, session);
        }
    }

    let _ = writeln!(out, "{RULE}");
    out
}

fn render_failure(out: &mut String, session: &SessionResult) {
    let reason = session
        .error
        .as_ref()
        .map_or_else(|| session.state.to_string(), ToString::to_string);
    let _ = writeln!(out, "  {}: {reason}", session.host);

    if let Some(record) = session.failed_command() {
        let _ = writeln!(out, "    > {}", record.command);
    }

    if session.state != SessionState::Skipped {
        let skipped = session
            .commands
            .iter()
            .filter(|c| c.status == CommandStatus::NotAttempted)
            .count();
        if skipped > 0 {
            let _ = writeln!(out, "    {skipped} command(s) not run");
        }
    }
}

/// Full result as pretty JSON
///
/// # Errors
/// Returns error if serialization fails
pub fn render_json(result: &RunResult) -> eyre::Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
