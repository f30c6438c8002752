//! Message types for the output sink actor
//!
//! Message handlers are implemented in `actor::sink`.

use kameo_macros::Reply;
use sshfan_exec::OutputStream;

/// What a line of output represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Stdout,
    Stderr,
    /// Debug echo of the command about to run
    Command,
}

impl From<OutputStream> for LineKind {
    fn from(stream: OutputStream) -> Self {
        match stream {
            OutputStream::Stdout => LineKind::Stdout,
            OutputStream::Stderr => LineKind::Stderr,
        }
    }
}

/// One complete line of host output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Host entry the line belongs to
    pub host: String,
    pub kind: LineKind,
    /// Line text without the trailing newline
    pub text: String,
}

impl OutputLine {
    pub fn new(host: impl Into<String>, kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            kind,
            text: text.into(),
        }
    }
}

/// Write one line (fire-and-forget)
#[derive(Debug)]
pub struct EmitLine(pub OutputLine);

/// Flush the writer once every earlier line is written
#[derive(Debug)]
pub struct Flush;

/// Sink counters returned by `Flush`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Reply)]
pub struct SinkStats {
    /// Lines written successfully
    pub lines_written: u64,
    /// Lines lost to writer errors
    pub write_errors: u64,
}
