//! Actor implementations

pub mod sink;

pub use sink::{OutputSink, OutputSinkArgs};
