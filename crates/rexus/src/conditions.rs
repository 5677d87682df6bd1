use ahash::AHashMap;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    context::ContextFrame,
    error::ErrorKind,
    value::Value,
};

/// Named classes of run-time events for which SIGNAL ON handlers can be
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum Condition {
    #[strum(serialize = "ERROR")]
    Error,
    #[strum(serialize = "FAILURE")]
    Failure,
    #[strum(serialize = "HALT")]
    Halt,
    #[strum(serialize = "NOVALUE")]
    Novalue,
    #[strum(serialize = "SYNTAX")]
    Syntax,
    #[strum(serialize = "NOTREADY")]
    NotReady,
}

/// The condition an error kind raises when trapped.
///
/// ADDRESS failures split on the handler's code: a negative code is a
/// FAILURE, anything else an ERROR, matching the classic RC-sign convention.
#[must_use]
pub fn condition_for(kind: ErrorKind, code: Option<i64>) -> Condition {
    match kind {
        ErrorKind::Syntax | ErrorKind::Interpret => Condition::Syntax,
        ErrorKind::Novalue => Condition::Novalue,
        ErrorKind::NotReady => Condition::NotReady,
        ErrorKind::AddressFailure if code.is_some_and(|c| c < 0) => Condition::Failure,
        ErrorKind::Host => Condition::Failure,
        _ => Condition::Error,
    }
}

/// A registered condition handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trap {
    pub label: String,
    pub enabled: bool,
}

/// The trap table: at most one handler per condition.
///
/// Firing a trap disables it until the next SIGNAL ON for that condition, so
/// an error raised inside the handler body cannot re-enter the same handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrapTable {
    traps: AHashMap<Condition, Trap>,
}

impl TrapTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-arms) a handler for a condition.
    pub fn set_on(&mut self, condition: Condition, label: String) {
        self.traps.insert(condition, Trap { label, enabled: true });
    }

    pub fn set_off(&mut self, condition: Condition) {
        self.traps.remove(&condition);
    }

    #[must_use]
    pub fn is_armed(&self, condition: Condition) -> bool {
        self.traps.get(&condition).is_some_and(|t| t.enabled)
    }

    /// True if any condition has an armed handler.
    #[must_use]
    pub fn any_armed(&self) -> bool {
        self.traps.values().any(|t| t.enabled)
    }

    /// True if any handler was ever configured, armed or not. Gates the
    /// graceful-termination path for recognizable errors.
    #[must_use]
    pub fn any_configured(&self) -> bool {
        !self.traps.is_empty()
    }

    /// Takes the handler label for a raised condition, disabling the trap.
    pub fn fire(&mut self, condition: Condition) -> Option<String> {
        let trap = self.traps.get_mut(&condition)?;
        if !trap.enabled {
            return None;
        }
        trap.enabled = false;
        Some(trap.label.clone())
    }
}

/// Everything captured at the moment an error was trapped, for diagnostics
/// and the ERROR_LINE()/ERROR_MESSAGE() built-ins.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// 1-based line of the instruction that raised the error.
    pub line: u32,
    pub source_line: String,
    pub filename: String,
    pub message: String,
    /// The ADDRESS command text under dispatch, when applicable.
    pub command: Option<String>,
    /// The function name under evaluation, when applicable.
    pub function: Option<String>,
    /// Snapshot of the variable store at trap time.
    pub variables: IndexMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// The execution-context stack at trap time, outermost first.
    pub stack: Vec<ContextFrame>,
}
