//! `SessionRunner`: one host's dial, script and teardown

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use kameo::actor::ActorRef;
use sshfan_exec::{ConnectionSpec, Dialer, OutputHandler, OutputStream, RemoteSession};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::actor::sink::OutputSink;
use crate::config::RunConfig;
use crate::env::EnvPrelude;
use crate::line::LineBuffer;
use crate::message::{EmitLine, LineKind, OutputLine};
use crate::result::{CommandRecord, CommandStatus, SessionError, SessionResult};
use crate::state::SessionState;

/// The part of a run that is identical for every host
#[derive(Debug, Clone)]
pub struct ScriptPlan {
    /// Commands in declared order
    pub commands: Vec<String>,
    /// Export lines prepended to each command
    pub env: EnvPrelude,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub stop_on_failure: bool,
    /// Echo each materialized command before running it
    pub debug: bool,
}

impl ScriptPlan {
    #[must_use]
    pub fn from_config(config: &RunConfig, env: EnvPrelude) -> Self {
        Self {
            commands: config.script.clone(),
            env,
            connect_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
            stop_on_failure: config.stop_on_failure,
            debug: config.debug,
        }
    }
}

/// Forwards streamed output to the sink one whole line at a time
struct LineForwarder {
    host: String,
    sink: ActorRef<OutputSink>,
    stdout: LineBuffer,
    stderr: LineBuffer,
}

impl LineForwarder {
    fn new(host: String, sink: ActorRef<OutputSink>) -> Self {
        Self {
            host,
            sink,
            stdout: LineBuffer::new(),
            stderr: LineBuffer::new(),
        }
    }

    async fn send(&self, kind: LineKind, text: String) {
        let line = OutputLine::new(self.host.clone(), kind, text);
        if self.sink.tell(EmitLine(line)).await.is_err() {
            debug!(host = %self.host, "output sink closed, dropping line");
        }
    }

    /// Emit partial lines left over when a command ends
    async fn finish(&mut self) {
        if let Some(text) = self.stdout.finish() {
            self.send(LineKind::Stdout, text).await;
        }
        if let Some(text) = self.stderr.finish() {
            self.send(LineKind::Stderr, text).await;
        }
    }
}

#[async_trait]
impl OutputHandler for LineForwarder {
    async fn on_output(&mut self, stream: OutputStream, data: &[u8]) {
        let lines = match stream {
            OutputStream::Stdout => self.stdout.push(data),
            OutputStream::Stderr => self.stderr.push(data),
        };
        for text in lines {
            self.send(stream.into(), text).await;
        }
    }
}

/// Runs the script against one host
///
/// Commands run on separate channels of one connection, in order. The
/// connection is closed on every path out of `run`.
pub struct SessionRunner {
    host: String,
    spec: ConnectionSpec,
    dialer: Arc<dyn Dialer>,
    plan: Arc<ScriptPlan>,
    sink: ActorRef<OutputSink>,
    state: SessionState,
}

impl SessionRunner {
    pub fn new(
        host: impl Into<String>,
        spec: ConnectionSpec,
        dialer: Arc<dyn Dialer>,
        plan: Arc<ScriptPlan>,
        sink: ActorRef<OutputSink>,
    ) -> Self {
        Self {
            host: host.into(),
            spec,
            dialer,
            plan,
            sink,
            state: SessionState::Idle,
        }
    }

    /// Host entry as declared
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition_to(&mut self, next: SessionState) {
        let allowed = self.state.can_transition_to(next);
        debug_assert!(allowed, "invalid session transition {} -> {}", self.state, next);
        if !allowed {
            error!(host = %self.host, from = %self.state, to = %next, "invalid session transition");
            return;
        }
        debug!(host = %self.host, from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn not_attempted(&self, from: usize) -> impl Iterator<Item = CommandRecord> + '_ {
        self.plan
            .commands
            .iter()
            .enumerate()
            .skip(from)
            .map(|(index, command)| CommandRecord::not_attempted(index, command.as_str()))
    }

    /// Record this host as never started
    #[must_use]
    pub fn skip(mut self) -> SessionResult {
        self.transition_to(SessionState::Skipped);
        info!(host = %self.host, "host skipped");

        let commands = self.not_attempted(0).collect();
        SessionResult::new(
            self.host,
            SessionState::Skipped,
            commands,
            Some(SessionError::Skipped),
            Utc::now(),
            Duration::ZERO,
        )
    }

    /// Dial, run every command, close
    #[instrument(skip(self), fields(host = %self.host, route = %self.dialer.route()))]
    pub async fn run(mut self) -> SessionResult {
        let started_at = Utc::now();
        let start = Instant::now();

        self.transition_to(SessionState::Dialing);
        let dialed = timeout(self.plan.connect_timeout, self.dialer.dial(&self.spec)).await;

        let mut session = match dialed {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return self.connection_failed(e.to_string(), started_at, start),
            Err(_) => {
                let message = format!(
                    "{}: timed out after {:?}",
                    self.spec.endpoint(),
                    self.plan.connect_timeout
                );
                return self.connection_failed(message, started_at, start);
            }
        };

        self.transition_to(SessionState::Running);
        let (commands, error) = self.execute(session.as_mut()).await;

        if let Err(e) = session.close().await {
            warn!(host = %self.host, error = %e, "failed to close session");
        }

        let state = if error.is_none() {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
        self.transition_to(state);

        let elapsed = start.elapsed();
        match &error {
            None => info!(host = %self.host, elapsed = ?elapsed, "session succeeded"),
            Some(e) => warn!(host = %self.host, error = %e, elapsed = ?elapsed, "session failed"),
        }

        SessionResult::new(self.host, state, commands, error, started_at, elapsed)
    }

    fn connection_failed(
        mut self,
        message: String,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
    ) -> SessionResult {
        self.transition_to(SessionState::ConnectionFailed);
        error!(host = %self.host, error = %message, "connection failed");

        let commands = self.not_attempted(0).collect();
        SessionResult::new(
            self.host,
            SessionState::ConnectionFailed,
            commands,
            Some(SessionError::Connection { message }),
            started_at,
            start.elapsed(),
        )
    }

    async fn execute(
        &self,
        session: &mut dyn RemoteSession,
    ) -> (Vec<CommandRecord>, Option<SessionError>) {
        let mut records = Vec::with_capacity(self.plan.commands.len());
        let mut first_error: Option<SessionError> = None;

        for (index, command) in self.plan.commands.iter().enumerate() {
            if first_error.is_some() && self.plan.stop_on_failure {
                debug!(host = %self.host, remaining = self.plan.commands.len() - index, "stopping after failure");
                records.extend(self.not_attempted(index));
                break;
            }

            let record = self.run_command(session, index, command).await;

            if let Some(err) = SessionError::from_command(&record) {
                warn!(host = %self.host, index, command = %command, error = %err, "command failed");
                first_error.get_or_insert(err);
            }
            records.push(record);
        }

        (records, first_error)
    }

    async fn run_command(
        &self,
        session: &mut dyn RemoteSession,
        index: usize,
        command: &str,
    ) -> CommandRecord {
        let script = self.plan.env.apply(command);
        let mut forwarder = LineForwarder::new(self.host.clone(), self.sink.clone());

        if self.plan.debug {
            for text in script.lines() {
                forwarder.send(LineKind::Command, text.to_string()).await;
            }
        }

        info!(host = %self.host, index, command = %command, "running command");
        let start = Instant::now();

        let outcome = timeout(self.plan.command_timeout, session.run(&script, &mut forwarder)).await;
        forwarder.finish().await;

        let status = match outcome {
            Ok(Ok(code)) => CommandStatus::Exited { code },
            Ok(Err(e)) => CommandStatus::Errored {
                reason: e.to_string(),
            },
            Err(_) => CommandStatus::TimedOut {
                after: self.plan.command_timeout,
            },
        };

        let duration = start.elapsed();
        debug!(host = %self.host, index, status = ?status, duration = ?duration, "command finished");

        CommandRecord {
            index,
            command: command.to_string(),
            status,
            duration: Some(duration),
        }
    }
}
