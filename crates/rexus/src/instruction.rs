//! The instruction tree consumed by the executor.
//!
//! The parser emits a linear sequence of [`Instruction`] records; block
//! constructs (IF, DO, SELECT) carry their bodies as nested sequences, so
//! block acquisition happens entirely at parse time and the executor never
//! skips over body instructions positionally.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    conditions::Condition,
    expressions::{Arg, Expr, QuoteKind},
};

/// One executable instruction with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub line_number: u32,
}

impl Instruction {
    #[must_use]
    pub fn new(kind: InstructionKind, line_number: u32) -> Self {
        Self { kind, line_number }
    }
}

/// The source of an assignment's right-hand side.
///
/// The shapes are distinguished because they dispatch differently: a CALL
/// source runs a subroutine and binds its return value; a bare unquoted
/// literal may resolve to an ADDRESS method or parse as JSON; an expression
/// evaluates normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignSource {
    /// A single literal or bare token. `quote` is `None` for a bare token;
    /// quoted literals never JSON-parse and never dispatch as ADDRESS
    /// methods, and double-quoted ones interpolate.
    Literal { text: String, quote: Option<QuoteKind> },
    Expr(Expr),
    FunctionCall { name: String, args: Vec<Arg> },
    Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalAction {
    /// `SIGNAL ON cond NAME label` (label defaults to the condition name).
    On { condition: Condition, label: String },
    /// `SIGNAL OFF cond`.
    Off { condition: Condition },
    /// Bare `SIGNAL label`: unconditional jump.
    Jump { label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NumericAction {
    Digits(Expr),
    Fuzz(Expr),
    Form(String),
}

/// Where PARSE takes its input from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseSource {
    /// The argv of the current subroutine or script.
    Arg,
    /// The top of the data stack.
    Pull,
    /// The string form of a named variable.
    Var(String),
}

/// The iteration shape of a DO instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DoSpec {
    /// `DO ... END` with no loop: a plain block.
    Plain,
    /// `DO v = start TO end [BY step]`.
    Range {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
    },
    /// `DO WHILE cond`.
    While { condition: Expr },
    /// `DO FOREVER`: loops until RETURN, EXIT, or a SIGNAL transfer, under
    /// the same iteration cap as WHILE.
    Forever,
    /// `DO n`: fixed repetition count.
    Repeat { count: Expr },
    /// `DO v OVER collection`.
    Over { var: String, collection: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenClause {
    pub condition: Expr,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpretMode {
    /// Full variable and handler sharing; every mutation flows back.
    /// `Classic` is the explicit opt-in spelling of the same semantics.
    Classic,
    /// Fresh child engine; only named variables cross the boundary.
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretSpec {
    pub mode: InterpretMode,
    /// Variables copied into an isolated child before execution.
    pub imports: SmallVec<[String; 2]>,
    /// Variables copied back out of an isolated child after execution.
    pub exports: SmallVec<[String; 2]>,
    pub source: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Switch the active ADDRESS target.
    Address { target: String },
    /// One-shot dispatch of a command to a target without switching.
    AddressWithString { target: String, command: Expr },
    Signal(SignalAction),
    /// Jump targets are collected before execution; executing a label is a
    /// no-op.
    Label { name: String },
    Numeric(NumericAction),
    Parse {
        source: ParseSource,
        /// Template variable names; comma-delimited templates map argv
        /// entries positionally, blank-delimited templates split words.
        template: SmallVec<[String; 4]>,
        comma_form: bool,
    },
    Push { value: Expr },
    Pull { template: SmallVec<[String; 4]> },
    Queue { value: Expr },
    Call { name: String, args: Vec<Expr> },
    Return { value: Option<Expr> },
    Trace { mode: String },
    /// A bare function call in statement position.
    FunctionCall { name: String, args: Vec<Arg> },
    Assignment { target: String, source: AssignSource },
    If {
        condition: Expr,
        then_body: Vec<Instruction>,
        else_body: Vec<Instruction>,
    },
    Do { spec: DoSpec, body: Vec<Instruction> },
    Select {
        whens: Vec<WhenClause>,
        otherwise: Vec<Instruction>,
    },
    Exit { value: Option<Expr> },
    Say { parts: Vec<Expr> },
    Interpret(InterpretSpec),
    /// Blocks every later INTERPRET in the program.
    NoInterpret,
    /// A bare quoted string: a command for the active ADDRESS target.
    QuotedString { command: String, quote: QuoteKind },
    /// A heredoc command string for the active ADDRESS target.
    HeredocString { command: String },
    /// Load a library through the host's loader, registering its functions
    /// and ADDRESS targets.
    Require { library: Expr, as_clause: Option<String> },
}
