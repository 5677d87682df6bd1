//! Public interface for running rexus programs.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::{
    address::{AddressHandler, AddressRegistry, AddressTarget},
    error::{ErrorKind, RunResult},
    expressions::InterpolationConfig,
    functions::FunctionRegistry,
    instruction::{Instruction, InstructionKind},
    interpreter::Interpreter,
    io::{CollectSink, OutputSink},
    limits::Limits,
    loader::{LibraryLoader, LibraryMetadata, NoLibraries},
    parse::parse,
    tracer::TraceEvent,
    value::Value,
};

/// How a program finished.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// EXIT code; 0 for natural completion and non-numeric EXIT operands.
    pub exit_code: i32,
    /// The top-level RETURN value, if the program ended with one.
    pub result: Option<Value>,
    /// The rendered message when a recognizable error terminated the
    /// program gracefully instead of propagating.
    pub error: Option<String>,
    /// Buffered TRACE events from the run.
    pub trace: Vec<TraceEvent>,
}

/// The host side of CALL to an external script.
///
/// Targets that follow the external-script convention (a filename with an
/// extension or path separator) delegate here. The runner is expected to
/// execute a fresh engine for the script, pass `argv` through, and return
/// the script's RETURN value.
pub trait ExternalScriptRunner {
    fn run_script(&self, path: &str, argv: &[Value]) -> Result<Option<Value>, String>;
}

/// Default runner for hosts without script support: every external CALL
/// fails with a categorized message.
#[derive(Debug, Default)]
pub struct NoExternalScripts;

impl ExternalScriptRunner for NoExternalScripts {
    fn run_script(&self, path: &str, _argv: &[Value]) -> Result<Option<Value>, String> {
        Err(format!("no external script runner is configured (CALL {path})"))
    }
}

/// Primary interface for running rexus programs.
///
/// A `Runner` parses once and can run many times; each run starts from a
/// fresh variable store, data stack, and trap table. Registration methods
/// configure the registries every run starts from.
///
/// # Example
/// ```
/// use rexus::{CollectSink, Runner};
///
/// let runner = Runner::new("SAY \"hello\"", "hello.rexx").unwrap();
/// let mut sink = CollectSink::new();
/// let outcome = runner.run(&mut sink).unwrap();
/// assert_eq!(outcome.exit_code, 0);
/// assert_eq!(sink.output(), "hello\n");
/// ```
pub struct Runner {
    pub(crate) program: Vec<Instruction>,
    pub(crate) labels: AHashMap<String, usize>,
    pub(crate) source: String,
    pub(crate) filename: String,
    pub(crate) functions: FunctionRegistry,
    pub(crate) address: AddressRegistry,
    pub(crate) limits: Limits,
    pub(crate) interpolation: InterpolationConfig,
    pub(crate) recognizable: AHashSet<ErrorKind>,
    pub(crate) script_runner: Rc<dyn ExternalScriptRunner>,
    pub(crate) loader: Rc<dyn LibraryLoader>,
    pub(crate) stream_trace: bool,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("filename", &self.filename)
            .field("instructions", &self.program.len())
            .field("labels", &self.labels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Parses the given source into a runnable program.
    ///
    /// # Errors
    /// Returns a syntax error (annotated with the offending line) when the
    /// source cannot be parsed.
    pub fn new(source: impl Into<String>, filename: &str) -> RunResult<Self> {
        let source = source.into();
        let program = parse(&source, filename)?;
        let labels = collect_labels(&program);
        let mut recognizable = AHashSet::new();
        recognizable.insert(ErrorKind::AddressFailure);
        recognizable.insert(ErrorKind::MissingFunction);
        Ok(Self {
            program,
            labels,
            source,
            filename: filename.to_owned(),
            functions: FunctionRegistry::new(),
            address: AddressRegistry::new(),
            limits: Limits::default(),
            interpolation: InterpolationConfig::default(),
            recognizable,
            script_runner: Rc::new(NoExternalScripts),
            loader: Rc::new(NoLibraries),
            stream_trace: false,
        })
    }

    /// The source text this runner was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Registers a host function callable from expressions.
    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + 'static,
    {
        self.functions.register(name, Rc::new(function));
    }

    /// Registers an ADDRESS target with its handler, method set, and
    /// metadata.
    ///
    /// # Errors
    /// Fails when a handler is already registered under the name.
    pub fn register_address_target(
        &mut self,
        name: &str,
        handler: Rc<dyn AddressHandler>,
        methods: impl IntoIterator<Item = String>,
        metadata: LibraryMetadata,
    ) -> Result<(), String> {
        self.address.register(
            AddressTarget {
                name: name.to_owned(),
                handler,
                methods: methods.into_iter().collect(),
                metadata,
            },
            None,
        )
    }

    /// Suppresses RESULT updates for commands dispatched to the named
    /// target (the `expectations` convention is pre-seeded).
    pub fn suppress_result_for(&mut self, target: &str) {
        self.address.suppress_result_for(target);
    }

    /// Replaces the set of error kinds that terminate gracefully (with an
    /// exit code) instead of propagating, when at least one trap was
    /// configured.
    pub fn set_recognizable_kinds(&mut self, kinds: impl IntoIterator<Item = ErrorKind>) {
        self.recognizable = kinds.into_iter().collect();
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    pub fn set_interpolation(&mut self, config: InterpolationConfig) {
        self.interpolation = config;
    }

    pub fn set_script_runner(&mut self, runner: Rc<dyn ExternalScriptRunner>) {
        self.script_runner = runner;
    }

    pub fn set_loader(&mut self, loader: Rc<dyn LibraryLoader>) {
        self.loader = loader;
    }

    /// Forwards trace events of kind instruction/call/trace to the output
    /// sink as `>> <line> <message>` while the program runs.
    pub fn set_stream_trace(&mut self, stream: bool) {
        self.stream_trace = stream;
    }

    /// Runs the program against the given output sink.
    ///
    /// # Errors
    /// Propagates unhandled errors annotated with their source location;
    /// recognizable errors with a configured trap come back as a
    /// [`RunOutcome`] carrying the exit code and message instead.
    pub fn run(&self, sink: &mut impl OutputSink) -> RunResult<RunOutcome> {
        Interpreter::new(self, sink).run()
    }

    /// Runs the program collecting output, for tests and embedding.
    ///
    /// # Errors
    /// Same contract as [`Runner::run`].
    pub fn run_collect(&self) -> RunResult<(RunOutcome, String)> {
        let mut sink = CollectSink::new();
        let outcome = self.run(&mut sink)?;
        Ok((outcome, sink.into_output()))
    }
}

/// Collects top-level labels; the first definition of a name wins.
fn collect_labels(program: &[Instruction]) -> AHashMap<String, usize> {
    let mut labels = AHashMap::new();
    for (index, instruction) in program.iter().enumerate() {
        if let InstructionKind::Label { name } = &instruction.kind {
            labels.entry(name.clone()).or_insert(index);
        }
    }
    labels
}
