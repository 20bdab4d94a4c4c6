//! Trace output.
//!
//! `trace(e)` logs the traced value with its source location through a
//! [`TraceWriter`] chosen by the embedder at evaluator construction. The
//! default [`StdTrace`] writes to stderr; [`CollectStringTrace`] captures
//! lines for tests; [`NoTrace`] discards everything.

use std::io::{self, Write as _};

use crate::ast::Span;

/// Trait for handling output from `trace(...)` expressions.
pub trait TraceWriter {
    /// Called once per `trace(...)` evaluation with the value's display
    /// form and the source location of the trace expression.
    fn trace(&mut self, text: &str, span: Span);
}

/// Default writer: one line per trace call, to stderr.
#[derive(Debug, Default)]
pub struct StdTrace;

impl TraceWriter for StdTrace {
    fn trace(&mut self, text: &str, span: Span) {
        let _ = writeln!(io::stderr(), "trace: {text} (at {}:{})", span.line, span.column);
    }
}

/// Writer that collects all trace lines into a string.
///
/// Useful for testing or capturing trace output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringTrace(String);

impl CollectStringTrace {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// The collected output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl TraceWriter for CollectStringTrace {
    fn trace(&mut self, text: &str, span: Span) {
        self.0.push_str(text);
        self.0.push_str(&format!(" (at {}:{})\n", span.line, span.column));
    }
}

/// Writer that ignores all trace output.
#[derive(Debug, Default)]
pub struct NoTrace;

impl TraceWriter for NoTrace {
    fn trace(&mut self, _text: &str, _span: Span) {}
}
