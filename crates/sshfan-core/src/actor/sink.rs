//! `OutputSink`: serialized writer for host output
//!
//! Every session sends its lines here as messages. The actor is the only
//! owner of the writer and handles one message at a time, so a line is always
//! written with a single call and lines from different hosts never splice.

use std::io::Write;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::message::{EmitLine, Flush, LineKind, OutputLine, SinkStats};

/// Arguments for spawning an `OutputSink`
pub struct OutputSinkArgs {
    /// Destination for rendered lines
    pub writer: Box<dyn Write + Send>,
    /// Prefix lines with `host: ` (off for single-host runs)
    pub tag_hosts: bool,
}

/// Actor owning the output writer
pub struct OutputSink {
    writer: Box<dyn Write + Send>,
    tag_hosts: bool,
    stats: SinkStats,
}

impl OutputSink {
    /// Render a line exactly as it will be written, newline included
    #[must_use]
    pub fn render(line: &OutputLine, tag_hosts: bool) -> String {
        let mut out = String::with_capacity(line.host.len() + line.text.len() + 8);
        if tag_hosts {
            out.push_str(&line.host);
            out.push_str(": ");
        }
        match line.kind {
            LineKind::Stdout => {}
            LineKind::Stderr => out.push_str("err: "),
            LineKind::Command => out.push_str("$ "),
        }
        out.push_str(&line.text);
        out.push('\n');
        out
    }
}

impl Actor for OutputSink {
    type Args = OutputSinkArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        debug!(id = %actor_ref.id(), tag_hosts = args.tag_hosts, "OutputSink starting");

        Ok(Self {
            writer: args.writer,
            tag_hosts: args.tag_hosts,
            stats: SinkStats::default(),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "failed to flush output on stop");
        }
        debug!(reason = ?reason, lines = self.stats.lines_written, "OutputSink stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<EmitLine> for OutputSink {
    type Reply = ();

    async fn handle(&mut self, msg: EmitLine, _ctx: &mut Context<Self, Self::Reply>) {
        let rendered = Self::render(&msg.0, self.tag_hosts);

        match self.writer.write_all(rendered.as_bytes()) {
            Ok(()) => self.stats.lines_written += 1,
            Err(e) => {
                self.stats.write_errors += 1;
                warn!(host = %msg.0.host, error = %e, "failed to write output line");
            }
        }
    }
}

impl Message<Flush> for OutputSink {
    type Reply = SinkStats;

    async fn handle(&mut self, _msg: Flush, _ctx: &mut Context<Self, Self::Reply>) -> SinkStats {
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "failed to flush output");
        }
        self.stats
    }
}
