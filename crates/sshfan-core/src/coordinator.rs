//! `Coordinator`: validates a run, dispatches sessions, aggregates results

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kameo::actor::ActorRef;
use kameo::prelude::*;
use sshfan_exec::Connector;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actor::sink::{OutputSink, OutputSinkArgs};
use crate::config::{DispatchMode, RunConfig};
use crate::env::EnvPrelude;
use crate::error::CoreError;
use crate::message::Flush;
use crate::resolve::{resolve_proxy, resolve_target};
use crate::result::{RunResult, SessionError, SessionResult};
use crate::runner::{ScriptPlan, SessionRunner};
use crate::state::SessionState;
use crate::tunnel::TunnelProvider;

/// Runs one script across every configured host
pub struct Coordinator {
    connector: Arc<dyn Connector>,
}

impl Coordinator {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Execute the run, streaming host output to `writer`
    ///
    /// Per-host failures are reported in the returned `RunResult`; only
    /// problems that stop the run from starting come back as `Err`.
    ///
    /// # Errors
    /// Returns `CoreError::Configuration` for invalid config (before any
    /// network activity) and `CoreError::ProxyConnection` if the jump host
    /// cannot be established
    pub async fn run(
        &self,
        config: &RunConfig,
        writer: Box<dyn Write + Send>,
    ) -> Result<RunResult, CoreError> {
        let start = Instant::now();

        config.validate()?;
        let targets = config
            .hosts
            .iter()
            .map(|entry| resolve_target(entry, config).map(|spec| (entry.trim().to_string(), spec)))
            .collect::<Result<Vec<_>, _>>()?;
        let proxy = config
            .enabled_proxy()
            .map(|p| resolve_proxy(p, config.strict_auth))
            .transpose()?;
        let env = EnvPrelude::from_entries(&config.envs)?;
        let plan = Arc::new(ScriptPlan::from_config(config, env));

        let mode = config.dispatch_mode();
        info!(
            hosts = targets.len(),
            commands = plan.commands.len(),
            mode = ?mode,
            proxy = proxy.is_some(),
            "starting run"
        );

        let tunnel = TunnelProvider::new(Arc::clone(&self.connector), proxy, config.proxy_timeout());
        let dialer = tunnel.dialer().await?;

        let sink = OutputSink::spawn(OutputSinkArgs {
            writer,
            tag_hosts: targets.len() > 1,
        });

        let runners = targets
            .into_iter()
            .map(|(host, spec)| {
                SessionRunner::new(host, spec, Arc::clone(&dialer), Arc::clone(&plan), sink.clone())
            })
            .collect::<Vec<_>>();

        let sessions = match mode {
            DispatchMode::Sequential => {
                run_sequential(runners, config.abort_on_host_failure).await
            }
            DispatchMode::Concurrent => run_concurrent(runners).await,
        };

        drain_sink(&sink).await;
        tunnel.shutdown().await;

        let result = RunResult::new(sessions, start.elapsed());
        info!(
            success = result.success,
            failed = result.failed().count(),
            elapsed = ?result.elapsed,
            "run finished"
        );
        Ok(result)
    }
}

async fn run_sequential(runners: Vec<SessionRunner>, abort_on_host_failure: bool) -> Vec<SessionResult> {
    let mut sessions = Vec::with_capacity(runners.len());
    let mut halted = false;

    for runner in runners {
        if halted {
            sessions.push(runner.skip());
            continue;
        }

        let host = runner.host().to_string();
        let result = join_session(host, tokio::spawn(runner.run())).await;
        if !result.success && abort_on_host_failure {
            warn!(host = %result.host, "host failed, skipping remaining hosts");
            halted = true;
        }
        sessions.push(result);
    }

    sessions
}

async fn run_concurrent(runners: Vec<SessionRunner>) -> Vec<SessionResult> {
    let handles = runners
        .into_iter()
        .map(|runner| {
            let host = runner.host().to_string();
            (host, tokio::spawn(runner.run()))
        })
        .collect::<Vec<_>>();

    let mut sessions = Vec::with_capacity(handles.len());
    for (host, handle) in handles {
        sessions.push(join_session(host, handle).await);
    }

    sessions
}

/// Await a session task; a panicked task becomes a failed result for its host
async fn join_session(host: String, handle: JoinHandle<SessionResult>) -> SessionResult {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(host = %host, error = %e, "session task aborted");
            SessionResult::new(
                host,
                SessionState::Failed,
                Vec::new(),
                Some(SessionError::Aborted {
                    message: e.to_string(),
                }),
                Utc::now(),
                Duration::ZERO,
            )
        }
    }
}

/// Wait for every queued line to be written, then stop the sink
async fn drain_sink(sink: &ActorRef<OutputSink>) {
    match sink.ask(Flush).await {
        Ok(stats) => debug!(
            lines = stats.lines_written,
            write_errors = stats.write_errors,
            "output drained"
        ),
        Err(e) => warn!(error = %e, "failed to drain output"),
    }
    if let Err(e) = sink.stop_gracefully().await {
        debug!(error = %e, "output sink already stopped");
    }
}
