use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RexxError>;

/// Categories of runtime failure raised by the engine.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation is the uppercase form used in
/// user-visible error messages (e.g. `MissingFunction` -> "MISSING FUNCTION").
///
/// Control transfer (EXIT, RETURN, SIGNAL jumps) is deliberately absent: those
/// travel through [`crate::interpreter::Flow`], never through errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A parse failure. Top-level source is parsed by the host before the
    /// engine runs, so at runtime this only surfaces through INTERPRET.
    #[strum(serialize = "SYNTAX")]
    Syntax,
    /// A function call that resolved to no built-in, no registered external
    /// function, and no method of the active ADDRESS target.
    #[strum(serialize = "MISSING FUNCTION")]
    MissingFunction,
    /// An ADDRESS handler raised instead of returning an outcome. Carries the
    /// handler's error code so RC can be populated before any trap fires.
    #[strum(serialize = "ADDRESS FAILURE")]
    AddressFailure,
    /// Failure inside a CALL to an external script, wrapped with script path.
    #[strum(serialize = "EXTERNAL SCRIPT")]
    ExternalScript,
    /// Failure inside an INTERPRET statement, wrapped with the snippet text.
    #[strum(serialize = "INTERPRET")]
    Interpret,
    /// Division by zero or an invalid NUMERIC setting.
    #[strum(serialize = "NUMERIC")]
    Numeric,
    /// DO with step 0, a negative repeat count, or the WHILE iteration cap.
    #[strum(serialize = "LOOP")]
    LoopInvariant,
    /// Read of an uninitialised variable while SIGNAL ON NOVALUE is armed.
    #[strum(serialize = "NOVALUE")]
    Novalue,
    /// An input source (stack, stream) was not ready for the operation.
    #[strum(serialize = "NOTREADY")]
    NotReady,
    /// IO, permission or other failures originating in the host environment.
    #[strum(serialize = "HOST")]
    Host,
}

/// A runtime error, optionally annotated with the source location it was
/// raised from.
///
/// Location fields start empty and are attached by the instruction executor
/// via [`RexxError::with_location`] as the error bubbles past the instruction
/// that raised it; the first annotation wins so wrapped errors keep the
/// innermost location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexxError {
    /// The failure category, used for trap matching and message rendering.
    pub kind: ErrorKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// 1-based source line of the instruction that raised the error.
    pub line: Option<u32>,
    /// Text of that source line.
    pub source_line: Option<String>,
    /// Script filename the error was raised in.
    pub filename: Option<String>,
    /// Handler-provided error code for ADDRESS failures; becomes RC.
    pub code: Option<i64>,
}

impl RexxError {
    /// Creates an error of the given kind with no location attached.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            source_line: None,
            filename: None,
            code: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Numeric, message)
    }

    pub fn loop_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LoopInvariant, message)
    }

    pub fn host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Host, message)
    }

    pub fn novalue(name: &str) -> Self {
        Self::new(ErrorKind::Novalue, format!("variable {name} has no value"))
    }

    /// Builds the categorized missing-function message enumerating likely causes.
    pub fn missing_function(name: &str) -> Self {
        Self::new(
            ErrorKind::MissingFunction,
            format!(
                "function {name} is not defined; it is not a built-in, was not registered by a \
                 REQUIREd library, and is not a method of the active ADDRESS target"
            ),
        )
    }

    /// Creates an ADDRESS failure carrying the handler's error code.
    pub fn address_failure(target: &str, code: Option<i64>, message: impl Into<String>) -> Self {
        let mut err = Self::new(
            ErrorKind::AddressFailure,
            format!("handler for ADDRESS {target} failed: {}", message.into()),
        );
        err.code = code;
        err
    }

    /// Wraps an error raised inside an external script with the script path.
    pub fn external_script(path: &str, inner: &Self) -> Self {
        Self::new(ErrorKind::ExternalScript, format!("in script {path}: {}", inner.message))
    }

    /// Attaches a source location if none is present yet.
    ///
    /// The innermost location wins: errors wrapped by INTERPRET or CALL keep
    /// the line they were actually raised on.
    #[must_use]
    pub fn with_location(mut self, line: u32, source_line: &str, filename: &str) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
            self.source_line = Some(source_line.to_owned());
            self.filename = Some(filename.to_owned());
        }
        self
    }

    /// The RC value this error implies: the handler code for ADDRESS
    /// failures, `1` otherwise.
    #[must_use]
    pub fn rc(&self) -> i64 {
        self.code.unwrap_or(1)
    }
}

impl fmt::Display for RexxError {
    /// Renders the user-visible failure form:
    /// `Rexx <KIND>: <source line> (<filename>: <line>)` followed by the detail.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.line, &self.source_line) {
            (Some(line), Some(source_line)) => {
                let filename = self.filename.as_deref().unwrap_or("<unknown>");
                write!(
                    f,
                    "Rexx {}: {} ({filename}: {line})\n{}",
                    self.kind,
                    source_line.trim(),
                    self.message
                )
            }
            _ => write!(f, "Rexx {}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RexxError {}
