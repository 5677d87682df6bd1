use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// What kind of activation a context frame represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum FrameKind {
    Main,
    Call,
    Interpret,
    Do,
    Select,
    If,
}

/// One entry of the execution-context stack: where execution currently is,
/// for diagnostics and error reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFrame {
    pub kind: FrameKind,
    /// 1-based line in the frame's source.
    pub line_number: u32,
    /// Text of that source line.
    pub source_line: String,
    pub filename: String,
    /// Free-form detail, e.g. the subroutine name for call frames.
    pub details: Option<String>,
}

impl fmt::Display for ContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.kind, self.filename, self.line_number)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        if !self.source_line.is_empty() {
            write!(f, ": {}", self.source_line.trim())?;
        }
        Ok(())
    }
}

/// The frame stack: the single source of truth for "where am I".
///
/// `current_line_number` is a cached projection of the top frame so hot-path
/// reads do not walk the stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextStack {
    frames: Vec<ContextFrame>,
    current_line: u32,
}

impl ContextStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ContextFrame) {
        self.current_line = frame.line_number;
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ContextFrame> {
        let frame = self.frames.pop();
        self.current_line = self.frames.last().map_or(0, |f| f.line_number);
        frame
    }

    /// Records that execution reached `line`.
    ///
    /// A top `main` frame is updated in place (created on first use); any
    /// other frame kind keeps its own location and only the cached projection
    /// moves.
    pub fn observe_line(&mut self, line: u32, source_line: &str, filename: &str) {
        self.current_line = line;
        match self.frames.last_mut() {
            Some(top) if top.kind == FrameKind::Main => {
                top.line_number = line;
                top.source_line = source_line.to_owned();
            }
            Some(_) => {}
            None => self.frames.push(ContextFrame {
                kind: FrameKind::Main,
                line_number: line,
                source_line: source_line.to_owned(),
                filename: filename.to_owned(),
                details: None,
            }),
        }
    }

    #[must_use]
    pub fn current_line_number(&self) -> u32 {
        self.current_line
    }

    #[must_use]
    pub fn top(&self) -> Option<&ContextFrame> {
        self.frames.last()
    }

    #[must_use]
    pub fn frames(&self) -> &[ContextFrame] {
        &self.frames
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Multi-line rendering of the stack, innermost frame last. Used by
    /// INTERPRET failures to enumerate the execution stack.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = String::new();
        for frame in &self.frames {
            text.push_str("  in ");
            text.push_str(&frame.to_string());
            text.push('\n');
        }
        text
    }
}
