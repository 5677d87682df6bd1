#![doc = include_str!("../../../README.md")]

mod address;
mod conditions;
mod context;
mod error;
mod expressions;
mod functions;
mod instruction;
mod interpreter;
mod io;
mod limits;
mod loader;
mod numeric;
mod parse;
mod run;
mod stack;
mod tracer;
mod value;
mod variables;

pub use crate::{
    address::{
        AddressContext, AddressHandler, AddressRegistry, AddressTarget, CommandOutcome, DEFAULT_TARGET,
        HandlerFailure, SourceContext,
    },
    conditions::{Condition, ErrorContext, TrapTable},
    context::{ContextFrame, ContextStack, FrameKind},
    error::{ErrorKind, RexxError, RunResult},
    expressions::{Arg, BinaryOp, Expr, InterpolationConfig, QuoteKind, UnaryOp},
    functions::{ExternalFn, FunctionRegistry},
    instruction::{
        AssignSource, DoSpec, Instruction, InstructionKind, InterpretMode, InterpretSpec, NumericAction, ParseSource,
        SignalAction, WhenClause,
    },
    io::{CollectSink, NullSink, OutputSink, StdSink},
    limits::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_INTERPRET_DEPTH, Limits, MAX_WHILE_ITERATIONS},
    loader::{AsClause, LibraryLoader, LibraryMetadata, LoadedLibrary, NoLibraries},
    numeric::{NumericForm, NumericSettings},
    parse::parse,
    run::{ExternalScriptRunner, NoExternalScripts, RunOutcome, Runner},
    stack::DataStack,
    tracer::{TraceEvent, TraceEventKind, TraceMode, Tracer},
    value::Value,
    variables::VariableStore,
};
