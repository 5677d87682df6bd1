//! The TRACE facility: an event buffer over instruction execution.
//!
//! Each executed instruction can append an event to the trace buffer
//! depending on the active mode. When streaming is enabled, events of kind
//! `instruction`, `call`, and `trace` that carry a concrete line number are
//! additionally forwarded to the output sink as `>> <line> <message>`;
//! other kinds stay buffer-only.
//!
//! | Mode | Records |
//! |------|---------|
//! | `OFF` / `NORMAL` | nothing (NORMAL is the configurable default) |
//! | `A` | all instructions, calls, commands and output |
//! | `R` | results of assignments |
//! | `I` | everything, including intermediate evaluations |
//! | `O` | output only |

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Trace verbosity, set by the TRACE instruction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum TraceMode {
    #[strum(serialize = "OFF")]
    Off,
    #[strum(serialize = "A")]
    All,
    #[strum(serialize = "R")]
    Results,
    #[strum(serialize = "I")]
    Intermediates,
    #[strum(serialize = "O")]
    Output,
    #[default]
    #[strum(serialize = "NORMAL")]
    Normal,
}

/// Classification of a trace event; only the first three stream to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum TraceEventKind {
    Instruction,
    Call,
    Trace,
    Assignment,
    Intermediate,
    Output,
}

/// One recorded trace event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub message: String,
    pub line_number: Option<u32>,
    /// String form of the produced value, for assignment/intermediate events.
    pub result: Option<String>,
}

/// The trace buffer plus its active mode and streaming switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tracer {
    mode: TraceMode,
    streaming: bool,
    events: Vec<TraceEvent>,
}

impl Tracer {
    #[must_use]
    pub fn new(streaming: bool) -> Self {
        Self {
            mode: TraceMode::default(),
            streaming,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TraceMode) {
        self.mode = mode;
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn records(&self, kind: TraceEventKind) -> bool {
        match self.mode {
            TraceMode::Off | TraceMode::Normal => false,
            TraceMode::All => kind != TraceEventKind::Intermediate,
            TraceMode::Results => matches!(kind, TraceEventKind::Assignment),
            TraceMode::Intermediates => true,
            TraceMode::Output => matches!(kind, TraceEventKind::Output),
        }
    }

    /// Records an event if the active mode covers it.
    ///
    /// Returns the line to forward to the output sink when streaming applies:
    /// only `instruction`, `call` and `trace` events with a concrete line
    /// number reach the user-facing stream.
    pub fn record(
        &mut self,
        kind: TraceEventKind,
        message: impl Into<String>,
        line_number: Option<u32>,
        result: Option<String>,
    ) -> Option<String> {
        if !self.records(kind) {
            return None;
        }
        let message = message.into();
        let streamed = if self.streaming
            && matches!(
                kind,
                TraceEventKind::Instruction | TraceEventKind::Call | TraceEventKind::Trace
            ) {
            line_number.map(|line| format!(">> {line} {message}"))
        } else {
            None
        };
        self.events.push(TraceEvent {
            kind,
            message,
            line_number,
            result,
        });
        streamed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normal_mode_records_nothing() {
        let mut tracer = Tracer::new(true);
        assert_eq!(tracer.record(TraceEventKind::Instruction, "SAY x", Some(1), None), None);
        assert!(tracer.events().is_empty());
    }

    #[test]
    fn all_mode_streams_instructions_with_lines() {
        let mut tracer = Tracer::new(true);
        tracer.set_mode(TraceMode::All);
        let streamed = tracer.record(TraceEventKind::Instruction, "SAY x", Some(3), None);
        assert_eq!(streamed.as_deref(), Some(">> 3 SAY x"));
        assert_eq!(tracer.events().len(), 1);
    }

    #[test]
    fn assignment_events_never_stream() {
        let mut tracer = Tracer::new(true);
        tracer.set_mode(TraceMode::Results);
        let streamed = tracer.record(TraceEventKind::Assignment, "X = 1", Some(2), Some("1".into()));
        assert_eq!(streamed, None);
        assert_eq!(tracer.events().len(), 1);
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("a".parse::<TraceMode>().unwrap(), TraceMode::All);
        assert_eq!("OFF".parse::<TraceMode>().unwrap(), TraceMode::Off);
    }
}
