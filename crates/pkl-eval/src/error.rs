//! Evaluation errors and the public error envelope.
//!
//! Internally every fallible operation returns [`EvalResult`], whose error
//! side is a boxed [`Error`] to keep `Result` one word wide. The same
//! struct is the public envelope: kind, message, primary source span, and
//! a stack of frames, serializable so front-ends can consume it unchanged.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::Span;

/// Result type alias for operations that can produce an evaluation error.
pub type EvalResult<T> = Result<T, Box<Error>>;

/// The kind of an evaluation error.
///
/// Uses strum derives for `Display`/`FromStr`; the string form is the
/// camelCase tag front-ends match on (e.g. `CircularReference` ->
/// "circularReference"). The set is open-ended: front-ends must tolerate
/// kinds they do not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
pub enum ErrorKind {
    /// A value did not conform to a declared or asserted type.
    TypeMismatch,
    /// A type's refinement constraint evaluated to false or threw.
    TypeConstraintViolated,
    /// A property name could not be found on the receiver or its parents.
    CannotFindProperty,
    /// A subscript or entry key could not be found.
    CannotFindKey,
    /// A method name could not be resolved at the call site.
    CannotFindMethod,
    /// An imported module could not be loaded.
    CannotFindModuleImport,
    /// A non-`const` property was referenced from a `const` scope.
    PropertyMustBeConst,
    /// A non-`const` method was referenced from a `const` scope.
    MethodMustBeConst,
    /// Integer arithmetic overflowed the 64-bit signed range.
    IntegerOverflow,
    /// Integer division or remainder by zero.
    DivisionByZero,
    /// A string was indexed outside its code-point range.
    CharIndexOutOfRange,
    /// A list or listing was indexed outside its element range.
    ElementIndexOutOfRange,
    /// A member was re-entered while its own evaluation was in progress.
    CircularReference,
    /// The evaluator's deadline expired.
    EvaluationTimedOut,
    /// The evaluator's stack depth limit was exceeded.
    StackOverflow,
    /// A class attempted to extend a class not marked `open` or `abstract`.
    CannotExtendFinalClass,
    /// A class named itself (directly or transitively) as its supertype.
    ClassCannotExtendSelf,
    /// A supertype reference did not resolve to a class.
    InvalidSupertype,
    /// A function or method was invoked with the wrong number of arguments.
    WrongArgumentCount,
    /// A value that is not a function or method was invoked.
    NotInvokable,
    /// Two values could not be ordered (e.g. NaN, or mixed types).
    CannotCompareValues,
    /// A user-level `throw(...)` aborted evaluation.
    UserThrow,
    /// The module loader or resource reader failed.
    IoError,
    /// A renderer-imposed constraint was violated by the value tree.
    CannotRenderValue,
}

impl ErrorKind {
    /// Whether `read?`/`import?` may recover from this kind by yielding null.
    ///
    /// Only IO and not-found failures are recoverable; type errors,
    /// constraint violations, and user throws always propagate.
    #[must_use]
    pub fn is_recoverable_io(self) -> bool {
        matches!(self, Self::IoError | Self::CannotFindModuleImport)
    }

    /// Whether `e?.x` may recover from this kind by yielding null.
    #[must_use]
    pub(crate) fn is_recoverable_lookup(self) -> bool {
        matches!(self, Self::CannotFindProperty | Self::CannotFindKey)
    }
}

/// One frame of the evaluation stack attached to an error.
///
/// `owner` is the qualified name of the member or method that was being
/// evaluated (e.g. `example#parrot`, `pkl.base#List`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source span of the frame's call or member site.
    pub span: Span,
    /// Qualified name of the owning member.
    pub owner: String,
}

impl StackFrame {
    /// Creates a stack frame.
    #[must_use]
    pub fn new(span: Span, owner: impl Into<String>) -> Self {
        Self {
            span,
            owner: owner.into(),
        }
    }
}

/// An evaluation error: kind, message, primary span, and frame stack.
///
/// The envelope is stable across front-ends; `render_report` produces the
/// canonical two-part textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    /// The error kind tag.
    pub kind: ErrorKind,
    /// Human-readable message, without location information.
    pub message: String,
    /// The span of the expression that failed.
    pub span: Span,
    /// Stack of frames, innermost first.
    pub frames: SmallVec<[StackFrame; 4]>,
}

impl Error {
    /// Creates a boxed error with no frames.
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Box<Self> {
        Box::new(Self {
            kind,
            message: message.into(),
            span,
            frames: SmallVec::new(),
        })
    }

    /// Appends a frame to the stack (outermost last).
    #[must_use]
    pub fn with_frame(mut self: Box<Self>, frame: StackFrame) -> Box<Self> {
        self.frames.push(frame);
        self
    }

    /// Renders the stable two-part report: a kind + message header line,
    /// then one location block per frame.
    ///
    /// When `source` is given, each block shows the offending line with a
    /// caret range under the span.
    #[must_use]
    pub fn render_report(&self, source: Option<&str>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", self.kind, self.message);
        let primary = StackFrame::new(self.span, String::new());
        self.render_location(&mut out, &primary, source);
        for frame in &self.frames {
            self.render_location(&mut out, frame, source);
        }
        out
    }

    fn render_location(&self, out: &mut String, frame: &StackFrame, source: Option<&str>) {
        if frame.owner.is_empty() {
            let _ = writeln!(out, "  at {}:{}", frame.span.line, frame.span.column);
        } else {
            let _ = writeln!(out, "  at {} ({}:{})", frame.owner, frame.span.line, frame.span.column);
        }
        if let Some(source) = source
            && let Some(line) = source.lines().nth(frame.span.line.saturating_sub(1) as usize)
        {
            let _ = writeln!(out, "    {line}");
            let col = frame.span.column.max(1) as usize;
            let width = frame.span.end.saturating_sub(frame.span.start).max(1) as usize;
            let width = width.min(line.len().saturating_sub(col - 1).max(1));
            let _ = writeln!(out, "    {}{}", " ".repeat(col - 1), "^".repeat(width));
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_camel_case() {
        assert_eq!(ErrorKind::CircularReference.to_string(), "circularReference");
        assert_eq!(ErrorKind::PropertyMustBeConst.to_string(), "propertyMustBeConst");
        assert_eq!(ErrorKind::IoError.to_string(), "ioError");
    }

    #[test]
    fn report_contains_header_and_location() {
        let err = Error::new(
            ErrorKind::DivisionByZero,
            "cannot divide by zero",
            Span::new(4, 9, 1, 5),
        );
        let report = err.render_report(Some("x = 1 ~/ 0"));
        assert!(report.starts_with("divisionByZero: cannot divide by zero\n"));
        assert!(report.contains("at 1:5"), "missing location line: {report}");
        assert!(report.contains('^'), "missing caret range: {report}");
    }
}
