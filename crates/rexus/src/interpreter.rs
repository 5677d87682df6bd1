//! The instruction executor: walks the instruction sequence, evaluates
//! expressions, and orchestrates every other subsystem.
//!
//! Control transfer is modelled as the typed [`Flow`] result bubbling up
//! through the recursive descent, never as an error: errors are reserved for
//! genuine failures and are first offered to the SIGNAL trap table at the
//! enclosing program loop.

use chrono::Utc;

use crate::{
    address::{self, AddressContext, CommandOutcome, SourceContext},
    conditions::{Condition, ErrorContext, TrapTable, condition_for},
    context::{ContextFrame, ContextStack, FrameKind},
    error::{ErrorKind, RexxError, RunResult},
    expressions::{self, Arg, Expr, QuoteKind},
    instruction::{
        AssignSource, DoSpec, Instruction, InstructionKind, InterpretMode, InterpretSpec, NumericAction, ParseSource,
        SignalAction,
    },
    io::OutputSink,
    numeric::NumericSettings,
    parse::parse,
    run::{RunOutcome, Runner},
    stack::DataStack,
    tracer::{TraceEventKind, TraceMode, Tracer},
    value::Value,
    variables::VariableStore,
};

/// How a block or program segment finished.
///
/// `Return` bubbles to the nearest CALL activation (or ends the program);
/// `Exit` always terminates the program; `Jump` unwinds nested blocks until
/// the enclosing program loop can resolve the label.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Return(Option<Value>),
    Exit(i32),
    Jump(String),
}

/// Result of a CALL dispatch.
enum CallOutcome {
    /// The callee returned (possibly without a value).
    Value(Option<Value>),
    /// The callee executed EXIT; the whole program terminates.
    Exit(i32),
}

pub(crate) struct Interpreter<'a, S: OutputSink> {
    // immutable program context, shared with INTERPRET children
    program: &'a [Instruction],
    labels: &'a ahash::AHashMap<String, usize>,
    source_lines: Vec<&'a str>,
    filename: &'a str,
    limits: &'a crate::limits::Limits,
    interpolation: &'a expressions::InterpolationConfig,
    recognizable: &'a ahash::AHashSet<ErrorKind>,
    script_runner: &'a dyn crate::run::ExternalScriptRunner,
    loader: &'a dyn crate::loader::LibraryLoader,

    // registries: cloned from the runner so REQUIRE can register mid-run
    functions: crate::functions::FunctionRegistry,
    address: crate::address::AddressRegistry,

    sink: &'a mut S,

    // engine state, owned exclusively by this instance
    vars: VariableStore,
    stack: DataStack,
    traps: TrapTable,
    numeric: NumericSettings,
    tracer: Tracer,
    context: ContextStack,
    active_address: String,
    call_depth: usize,
    interpret_depth: usize,
    no_interpret: bool,
    last_error: Option<ErrorContext>,
    current_command: Option<String>,
    current_function: Option<String>,
}

impl<'a, S: OutputSink> Interpreter<'a, S> {
    pub fn new(runner: &'a Runner, sink: &'a mut S) -> Self {
        Self {
            program: &runner.program,
            labels: &runner.labels,
            source_lines: runner.source.lines().collect(),
            filename: &runner.filename,
            limits: &runner.limits,
            interpolation: &runner.interpolation,
            recognizable: &runner.recognizable,
            script_runner: &*runner.script_runner,
            loader: &*runner.loader,
            functions: runner.functions.clone(),
            address: runner.address.clone(),
            sink,
            vars: VariableStore::new(),
            stack: DataStack::new(),
            traps: TrapTable::new(),
            numeric: NumericSettings::default(),
            tracer: Tracer::new(runner.stream_trace),
            context: ContextStack::new(),
            active_address: address::DEFAULT_TARGET.to_owned(),
            call_depth: 0,
            interpret_depth: 0,
            no_interpret: false,
            last_error: None,
            current_command: None,
            current_function: None,
        }
    }

    /// Runs the program to completion.
    ///
    /// Errors that carry a recognizable kind terminate gracefully with
    /// `exit_code = RC or 1` when at least one trap was configured anywhere;
    /// everything else propagates annotated with its source location.
    pub fn run(&mut self) -> RunResult<RunOutcome> {
        match self.run_program(0) {
            Ok(flow) => {
                let (exit_code, result) = match flow {
                    Flow::Exit(code) => (code, None),
                    Flow::Return(value) => (0, value),
                    Flow::Normal => (0, None),
                    Flow::Jump(label) => {
                        return Err(RexxError::syntax(format!("SIGNAL to unknown label {label}")));
                    }
                };
                Ok(RunOutcome {
                    exit_code,
                    result,
                    error: None,
                    trace: std::mem::take(&mut self.tracer).into_events(),
                })
            }
            Err(err) if self.recognizable.contains(&err.kind) && self.traps.any_configured() => Ok(RunOutcome {
                exit_code: err.rc() as i32,
                result: None,
                error: Some(err.to_string()),
                trace: std::mem::take(&mut self.tracer).into_events(),
            }),
            Err(err) => Err(err),
        }
    }

    /// The program-counter loop over the top-level instruction sequence.
    ///
    /// This is the only place label jumps resolve and trapped errors resume:
    /// nested blocks bubble `Flow::Jump` and errors up to here.
    fn run_program(&mut self, start: usize) -> RunResult<Flow> {
        let program = self.program;
        let mut pc = start;
        while pc < program.len() {
            let instruction = &program[pc];
            match self.execute(instruction) {
                Ok(Flow::Normal) => pc += 1,
                Ok(Flow::Jump(label)) => pc = self.resolve_label(&label)?,
                Ok(flow) => return Ok(flow),
                Err(err) => {
                    let label = self.trap_error(err, instruction)?;
                    pc = self.resolve_label(&label)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn resolve_label(&self, label: &str) -> RunResult<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| RexxError::syntax(format!("label {label} is not defined")))
    }

    /// Offers a raised error to the trap table.
    ///
    /// The error context is captured and RC/ERRORTEXT/SIGL are populated
    /// whether or not a handler is armed; an armed handler yields its label,
    /// otherwise the error propagates.
    fn trap_error(&mut self, err: RexxError, instruction: &Instruction) -> RunResult<String> {
        let line = instruction.line_number;
        let source_line = self.source_text(line).to_owned();
        let err = err.with_location(line, &source_line, self.filename);

        self.vars.set_rc(err.rc());
        self.vars.set_errortext(&err.message);
        self.vars.set_sigl(err.line.unwrap_or(line));
        self.last_error = Some(ErrorContext {
            line: err.line.unwrap_or(line),
            source_line: err.source_line.clone().unwrap_or_default(),
            filename: self.filename.to_owned(),
            message: err.message.clone(),
            command: self.current_command.take(),
            function: self.current_function.take(),
            variables: self.vars.snapshot(),
            timestamp: Utc::now(),
            stack: self.context.frames().to_vec(),
        });

        let condition = condition_for(err.kind, err.code);
        match self.traps.fire(condition) {
            Some(label) => {
                if let Some(streamed) =
                    self.tracer
                        .record(TraceEventKind::Trace, format!("{condition} -> {label}"), err.line, None)
                {
                    self.sink.write_line(&streamed)?;
                }
                Ok(label)
            }
            None => Err(err),
        }
    }

    /// Runs a nested instruction block. Any non-normal flow bubbles.
    fn run_block(&mut self, instructions: &[Instruction]) -> RunResult<Flow> {
        for instruction in instructions {
            match self.execute(instruction)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn source_text(&self, line: u32) -> &str {
        if self.interpret_depth > 0 {
            return "";
        }
        self.source_lines.get(line as usize - 1).copied().unwrap_or("")
    }

    fn execute(&mut self, instruction: &Instruction) -> RunResult<Flow> {
        let line = instruction.line_number;
        let source_line = self.source_text(line).trim().to_owned();
        self.context.observe_line(line, &source_line, self.filename);

        let trace_message = if source_line.is_empty() {
            instruction_tag(&instruction.kind)
        } else {
            source_line.as_str()
        };
        if let Some(streamed) = self
            .tracer
            .record(TraceEventKind::Instruction, trace_message, Some(line), None)
        {
            self.sink.write_line(&streamed)?;
        }

        self.execute_kind(&instruction.kind, line)
            .map_err(|e| e.with_location(line, &source_line, self.filename))
    }

    fn execute_kind(&mut self, kind: &InstructionKind, line: u32) -> RunResult<Flow> {
        match kind {
            InstructionKind::Label { .. } | InstructionKind::NoInterpret => {
                if matches!(kind, InstructionKind::NoInterpret) {
                    self.no_interpret = true;
                }
                Ok(Flow::Normal)
            }
            InstructionKind::Say { parts } => self.run_say(parts, line),
            InstructionKind::Assignment { target, source } => self.run_assignment(target, source, line),
            InstructionKind::If {
                condition,
                then_body,
                else_body,
            } => self.run_if(condition, then_body, else_body, line),
            InstructionKind::Select { whens, otherwise } => self.run_select(whens, otherwise, line),
            InstructionKind::Do { spec, body } => self.run_do(spec, body, line),
            InstructionKind::Call { name, args } => {
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(self.eval(arg)?);
                }
                match self.run_call(name, argv, line)? {
                    CallOutcome::Exit(code) => Ok(Flow::Exit(code)),
                    CallOutcome::Value(value) => {
                        // invariant: RESULT reflects the return value only
                        // when CALL is not the right-hand side of a LET
                        self.vars.set_result(value);
                        Ok(Flow::Normal)
                    }
                }
            }
            InstructionKind::Return { value } => {
                let value = match value {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }
            InstructionKind::Exit { value } => {
                let code = match value {
                    Some(expr) => self.eval(expr)?.as_number().map_or(0, |n| n as i32),
                    None => 0,
                };
                Ok(Flow::Exit(code))
            }
            InstructionKind::Signal(action) => self.run_signal(action, line),
            InstructionKind::Address { target } => {
                self.active_address = target.clone();
                Ok(Flow::Normal)
            }
            InstructionKind::AddressWithString { target, command } => {
                let (text, interpolatable) = match command {
                    Expr::StringLit { value, quote } => (value.clone(), *quote == QuoteKind::Double),
                    other => {
                        let value = self.eval(other)?;
                        (value.string_form(&self.numeric).into_owned(), false)
                    }
                };
                self.dispatch_command(target, text, interpolatable, line)?;
                Ok(Flow::Normal)
            }
            InstructionKind::QuotedString { command, quote } => {
                let target = self.active_address.clone();
                self.dispatch_command(&target, command.clone(), *quote == QuoteKind::Double, line)?;
                Ok(Flow::Normal)
            }
            InstructionKind::HeredocString { command } => {
                let target = self.active_address.clone();
                self.dispatch_command(&target, command.clone(), true, line)?;
                Ok(Flow::Normal)
            }
            InstructionKind::Numeric(action) => self.run_numeric(action),
            InstructionKind::Parse {
                source,
                template,
                comma_form,
            } => self.run_parse(source, template, *comma_form),
            InstructionKind::Push { value } => {
                let value = self.eval(value)?;
                self.stack.push(value);
                Ok(Flow::Normal)
            }
            InstructionKind::Queue { value } => {
                let value = self.eval(value)?;
                self.stack.queue(value);
                Ok(Flow::Normal)
            }
            InstructionKind::Pull { template } => {
                self.run_pull(template);
                Ok(Flow::Normal)
            }
            InstructionKind::Trace { mode } => {
                let mode: TraceMode = mode
                    .parse()
                    .map_err(|_| RexxError::syntax(format!("invalid TRACE mode {mode}")))?;
                self.tracer.set_mode(mode);
                Ok(Flow::Normal)
            }
            InstructionKind::FunctionCall { name, args } => {
                self.eval_function_call(name, args, line)?;
                Ok(Flow::Normal)
            }
            InstructionKind::Interpret(spec) => self.run_interpret(spec, line),
            InstructionKind::Require { library, as_clause } => self.run_require(library, as_clause.as_deref()),
        }
    }

    // === SAY ===

    /// Resolves the SAY parts and writes one line.
    ///
    /// Bare tokens are blank-separated; a quoted literal abuts the token that
    /// follows it (`SAY "n=" x` prints `n=1`, `SAY a b` prints their values
    /// blank-separated).
    fn run_say(&mut self, parts: &[Expr], line: u32) -> RunResult<Flow> {
        let mut text = String::new();
        for (index, part) in parts.iter().enumerate() {
            if index > 0 && !matches!(parts[index - 1], Expr::StringLit { .. }) {
                text.push(' ');
            }
            let value = self.eval(part)?;
            text.push_str(&value.string_form(&self.numeric));
        }
        if let Some(streamed) = self.tracer.record(TraceEventKind::Output, text.clone(), Some(line), None) {
            self.sink.write_line(&streamed)?;
        }
        self.sink.write_line(&text)?;
        Ok(Flow::Normal)
    }

    // === assignment ===

    fn run_assignment(&mut self, target: &str, source: &AssignSource, line: u32) -> RunResult<Flow> {
        let value = match source {
            AssignSource::Call { name, args } => {
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(self.eval(arg)?);
                }
                match self.run_call(name, argv, line)? {
                    CallOutcome::Exit(code) => return Ok(Flow::Exit(code)),
                    CallOutcome::Value(value) => value.unwrap_or_else(|| Value::Str(String::new())),
                }
            }
            AssignSource::FunctionCall { name, args } => self.eval_function_call(name, args, line)?,
            AssignSource::Expr(expr) => {
                if let Some(name) = expr.bare_name()
                    && self.active_method(name).is_some()
                {
                    self.dispatch_address_method(name, &[], line)?
                } else {
                    self.eval(expr)?
                }
            }
            AssignSource::Literal { text, quote } => self.resolve_literal_source(text, *quote, line)?,
        };

        if let Some(streamed) = self.tracer.record(
            TraceEventKind::Assignment,
            format!("{} = {}", target.to_uppercase(), value.string_form(&self.numeric)),
            Some(line),
            Some(value.string_form(&self.numeric).into_owned()),
        ) {
            self.sink.write_line(&streamed)?;
        }
        self.vars.set(target, value);
        Ok(Flow::Normal)
    }

    /// Resolves a single-token assignment source.
    ///
    /// Quoted literals interpolate (double quotes) or pass through (single
    /// quotes). A bare token first tries the active target's methods, then
    /// number and variable resolution; if the final string form is valid
    /// JSON the structured value is bound instead.
    fn resolve_literal_source(&mut self, text: &str, quote: Option<QuoteKind>, line: u32) -> RunResult<Value> {
        match quote {
            Some(QuoteKind::Double) => Ok(Value::Str(self.interpolate(text)?)),
            Some(QuoteKind::Single) => Ok(Value::Str(text.to_owned())),
            None => {
                if self.active_method(text).is_some() {
                    return self.dispatch_address_method(text, &[], line);
                }
                let resolved = if let Some(number) = crate::numeric::parse_number(text) {
                    Value::Number(number)
                } else {
                    self.read_var(text)?
                };
                let string_form = resolved.string_form(&self.numeric);
                if let Some(structured) = Value::try_parse_json(&string_form) {
                    return Ok(structured);
                }
                Ok(resolved)
            }
        }
    }

    // === control flow ===

    fn run_if(&mut self, condition: &Expr, then_body: &[Instruction], else_body: &[Instruction], line: u32) -> RunResult<Flow> {
        let truthy = self.eval(condition)?.is_truthy(&self.numeric);
        self.push_frame(FrameKind::If, line, None);
        let result = if truthy {
            self.run_block(then_body)
        } else {
            self.run_block(else_body)
        };
        self.context.pop();
        result
    }

    fn run_select(
        &mut self,
        whens: &[crate::instruction::WhenClause],
        otherwise: &[Instruction],
        line: u32,
    ) -> RunResult<Flow> {
        self.push_frame(FrameKind::Select, line, None);
        let result = (|| {
            for when in whens {
                if self.eval(&when.condition)?.is_truthy(&self.numeric) {
                    return self.run_block(&when.body);
                }
            }
            self.run_block(otherwise)
        })();
        self.context.pop();
        result
    }

    fn run_do(&mut self, spec: &DoSpec, body: &[Instruction], line: u32) -> RunResult<Flow> {
        self.push_frame(FrameKind::Do, line, None);
        let result = self.run_do_inner(spec, body);
        self.context.pop();
        result
    }

    fn run_do_inner(&mut self, spec: &DoSpec, body: &[Instruction]) -> RunResult<Flow> {
        match spec {
            DoSpec::Plain => self.run_block(body),
            DoSpec::Range { var, start, end, step } => {
                let start = self.eval_integer(start, "DO start")?;
                let end = self.eval_integer(end, "DO end")?;
                let step = match step {
                    Some(expr) => self.eval_integer(expr, "DO step")?,
                    None => 1,
                };
                if step == 0 {
                    return Err(RexxError::loop_invariant("DO step must not be zero"));
                }
                let prior = self.vars.get(var).cloned();
                let mut v = start;
                while (step > 0 && v <= end) || (step < 0 && v >= end) {
                    self.vars.set(var, Value::Number(v as f64));
                    match self.run_block(body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                    v += step;
                }
                // the control variable holds the first value that failed the
                // test, unless it existed before the loop
                self.vars.set(var, Value::Number(v as f64));
                if let Some(prior) = prior {
                    self.vars.set(var, prior);
                }
                Ok(Flow::Normal)
            }
            DoSpec::While { condition } => {
                let mut iterations: u64 = 0;
                while self.eval(condition)?.is_truthy(&self.numeric) {
                    iterations += 1;
                    if iterations > self.limits.max_while_iterations {
                        return Err(RexxError::loop_invariant(format!(
                            "DO WHILE exceeded {} iterations",
                            self.limits.max_while_iterations
                        )));
                    }
                    match self.run_block(body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            DoSpec::Forever => {
                let mut iterations: u64 = 0;
                loop {
                    iterations += 1;
                    if iterations > self.limits.max_while_iterations {
                        return Err(RexxError::loop_invariant(format!(
                            "DO FOREVER exceeded {} iterations",
                            self.limits.max_while_iterations
                        )));
                    }
                    match self.run_block(body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
            }
            DoSpec::Repeat { count } => {
                let count = self.eval_integer(count, "DO count")?;
                if count < 0 {
                    return Err(RexxError::loop_invariant(format!("DO repeat count must be non-negative, got {count}")));
                }
                for _ in 0..count {
                    match self.run_block(body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            DoSpec::Over { var, collection } => {
                let collection = self.eval(collection)?;
                let items = collection.iteration_items(&self.numeric);
                let prior = self.vars.get(var).cloned();
                for item in items {
                    self.vars.set(var, item);
                    match self.run_block(body)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                // restore a pre-existing value; otherwise the variable keeps
                // the last visited item
                if let Some(prior) = prior {
                    self.vars.set(var, prior);
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn eval_integer(&mut self, expr: &Expr, what: &str) -> RunResult<i64> {
        let value = self.eval(expr)?;
        let number = value.as_number().ok_or_else(|| {
            RexxError::numeric(format!("{what} must be numeric, got {}", value.string_form(&self.numeric)))
        })?;
        if number.fract() != 0.0 {
            return Err(RexxError::numeric(format!("{what} must be an integer, got {number}")));
        }
        Ok(number as i64)
    }

    // === CALL ===

    fn run_call(&mut self, name: &str, argv: Vec<Value>, line: u32) -> RunResult<CallOutcome> {
        if let Some(streamed) = self.tracer.record(TraceEventKind::Call, format!("CALL {name}"), Some(line), None) {
            self.sink.write_line(&streamed)?;
        }

        if let Some(&label_index) = self.labels.get(name) {
            if self.call_depth >= self.limits.max_call_depth {
                return Err(RexxError::host(format!(
                    "CALL nesting exceeds {} activations",
                    self.limits.max_call_depth
                )));
            }
            self.push_frame(FrameKind::Call, line, Some(name.to_owned()));
            self.call_depth += 1;
            let saved_argv = self.vars.replace_argv(argv);
            let result = self.run_program(label_index + 1);
            self.vars.replace_argv(saved_argv);
            self.call_depth -= 1;
            self.context.pop();
            return match result? {
                Flow::Return(value) => Ok(CallOutcome::Value(value)),
                Flow::Normal => Ok(CallOutcome::Value(None)),
                Flow::Exit(code) => Ok(CallOutcome::Exit(code)),
                Flow::Jump(label) => Err(RexxError::syntax(format!("SIGNAL to unknown label {label}"))),
            };
        }

        if is_external_script_name(name) {
            self.current_function = Some(name.to_owned());
            let result = self
                .script_runner
                .run_script(name, &argv)
                .map_err(|message| RexxError::new(ErrorKind::ExternalScript, format!("in script {name}: {message}")));
            self.current_function = None;
            return Ok(CallOutcome::Value(result?));
        }

        Err(RexxError::new(
            ErrorKind::MissingFunction,
            format!("subroutine {name} is neither a label in this program nor an external script"),
        ))
    }

    // === SIGNAL ===

    fn run_signal(&mut self, action: &SignalAction, line: u32) -> RunResult<Flow> {
        match action {
            SignalAction::On { condition, label } => {
                // the label must exist now, not when the condition fires
                self.resolve_label(label)?;
                self.traps.set_on(*condition, label.clone());
                Ok(Flow::Normal)
            }
            SignalAction::Off { condition } => {
                self.traps.set_off(*condition);
                Ok(Flow::Normal)
            }
            SignalAction::Jump { label } => {
                self.vars.set_sigl(line);
                Ok(Flow::Jump(label.clone()))
            }
        }
    }

    // === NUMERIC ===

    fn run_numeric(&mut self, action: &NumericAction) -> RunResult<Flow> {
        match action {
            NumericAction::Digits(expr) => {
                let digits = self.eval_integer(expr, "NUMERIC DIGITS")?;
                self.numeric.set_digits(digits).map_err(RexxError::numeric)?;
            }
            NumericAction::Fuzz(expr) => {
                let fuzz = self.eval_integer(expr, "NUMERIC FUZZ")?;
                self.numeric.set_fuzz(fuzz).map_err(RexxError::numeric)?;
            }
            NumericAction::Form(form) => {
                self.numeric.set_form(form).map_err(RexxError::numeric)?;
            }
        }
        Ok(Flow::Normal)
    }

    // === PARSE / PULL ===

    fn run_parse(&mut self, source: &ParseSource, template: &[String], comma_form: bool) -> RunResult<Flow> {
        match source {
            ParseSource::Arg => {
                if comma_form {
                    // comma template: argv entries map positionally, types kept
                    let argv = self.vars.argv().to_vec();
                    for (index, var) in template.iter().enumerate() {
                        let value = argv.get(index).cloned().unwrap_or_else(|| Value::Str(String::new()));
                        self.vars.set(var, value);
                    }
                } else {
                    let joined = self
                        .vars
                        .argv()
                        .iter()
                        .map(|v| v.string_form(&self.numeric).into_owned())
                        .collect::<Vec<_>>()
                        .join(" ");
                    self.assign_words(template, &joined);
                }
            }
            ParseSource::Pull => {
                let value = self.stack.pull();
                if template.len() == 1 {
                    self.vars.set(&template[0], value);
                } else {
                    let text = value.string_form(&self.numeric).into_owned();
                    self.assign_words(template, &text);
                }
            }
            ParseSource::Var(name) => {
                let text = self.read_var(name)?.string_form(&self.numeric).into_owned();
                self.assign_words(template, &text);
            }
        }
        Ok(Flow::Normal)
    }

    fn run_pull(&mut self, template: &[String]) {
        let value = self.stack.pull();
        if template.len() == 1 {
            self.vars.set(&template[0], value);
        } else {
            let text = value.string_form(&self.numeric).into_owned();
            self.assign_words(template, &text);
        }
    }

    /// Blank-delimited template assignment: each variable takes one word,
    /// the last takes the remainder.
    fn assign_words(&mut self, template: &[String], text: &str) {
        let words: Vec<&str> = text.split_whitespace().collect();
        for (index, var) in template.iter().enumerate() {
            let value = if index + 1 == template.len() {
                words.get(index..).map(|rest| rest.join(" ")).unwrap_or_default()
            } else {
                (*words.get(index).unwrap_or(&"")).to_owned()
            };
            self.vars.set(var, Value::Str(value));
        }
    }

    // === ADDRESS dispatch ===

    fn dispatch_command(&mut self, target: &str, command: String, interpolatable: bool, line: u32) -> RunResult<()> {
        let Some((handler, handles_interpolation)) = self
            .address
            .get(target)
            .map(|record| (record.handler.clone(), record.metadata.interpreter_handles_interpolation))
        else {
            if target == address::DEFAULT_TARGET {
                // no handler: SAY-style echo
                self.sink.write_line(&command)?;
                self.vars.set_rc(0);
                return Ok(());
            }
            return Err(RexxError::address_failure(
                target,
                None,
                "no handler is registered for this target",
            ));
        };

        let final_command = if interpolatable && handles_interpolation {
            self.interpolate(&command)?
        } else {
            command
        };

        self.current_command = Some(final_command.clone());
        if let Some(streamed) = self.tracer.record(
            TraceEventKind::Trace,
            format!("ADDRESS {target}: {final_command}"),
            Some(line),
            None,
        ) {
            self.sink.write_line(&streamed)?;
        }

        let context = self.make_address_context(line);
        let raw = handler
            .handle(&final_command, &context)
            .map_err(|failure| RexxError::address_failure(target, failure.code, failure.message))?;
        self.current_command = None;

        let outcome = address::interpret_handler_value(raw);
        self.apply_command_outcome(target, outcome);
        Ok(())
    }

    fn apply_command_outcome(&mut self, target: &str, outcome: CommandOutcome) {
        self.vars.set_rc(outcome.rc);
        if let Some(errortext) = &outcome.errortext {
            self.vars.set_errortext(errortext);
        }
        for (name, value) in outcome.variables {
            self.vars.set(&name, value);
        }
        if !self.address.suppresses_result(target) {
            self.vars.set_result(Some(outcome.result));
        }
    }

    /// The registered spelling of `name` as a method of the active target,
    /// if the active target has one.
    fn active_method(&self, name: &str) -> Option<String> {
        if self.active_address == address::DEFAULT_TARGET {
            return None;
        }
        self.address
            .get(&self.active_address)
            .and_then(|record| record.find_method(name))
            .map(str::to_owned)
    }

    fn dispatch_address_method(&mut self, name: &str, params: &[Value], line: u32) -> RunResult<Value> {
        let target = self.active_address.clone();
        let record = self
            .address
            .get(&target)
            .ok_or_else(|| RexxError::address_failure(&target, None, "no handler is registered for this target"))?;
        let method = record.find_method(name).unwrap_or(name).to_owned();
        let handler = record.handler.clone();
        let context = self.make_address_context(line);
        self.current_function = Some(method.clone());
        let raw = handler
            .handle_method(&method, params, &context)
            .map_err(|failure| RexxError::address_failure(&target, failure.code, failure.message))?;
        self.current_function = None;

        let outcome = address::interpret_handler_value(raw);
        self.vars.set_rc(outcome.rc);
        if let Some(errortext) = &outcome.errortext {
            self.vars.set_errortext(errortext);
        }
        for (var, value) in outcome.variables {
            self.vars.set(&var, value);
        }
        Ok(outcome.result)
    }

    fn make_address_context(&self, line: u32) -> AddressContext {
        AddressContext {
            variables: self.vars.snapshot(),
            source: SourceContext {
                filename: self.filename.to_owned(),
                line,
                source_line: self.source_text(line).trim().to_owned(),
            },
        }
    }

    // === INTERPRET ===

    fn run_interpret(&mut self, spec: &InterpretSpec, line: u32) -> RunResult<Flow> {
        if self.no_interpret {
            return Err(RexxError::new(
                ErrorKind::Interpret,
                "INTERPRET is disabled by an earlier NO-INTERPRET directive",
            ));
        }
        if self.interpret_depth >= self.limits.max_interpret_depth {
            return Err(RexxError::new(
                ErrorKind::Interpret,
                format!("INTERPRET nesting exceeds {} levels", self.limits.max_interpret_depth),
            ));
        }

        let snippet = self.eval(&spec.source)?.string_form(&self.numeric).into_owned();
        let instructions =
            parse(&snippet, "<interpret>").map_err(|e| self.wrap_interpret_error(&snippet, e))?;

        match spec.mode {
            InterpretMode::Classic => {
                self.push_frame(FrameKind::Interpret, line, Some(snippet.clone()));
                self.interpret_depth += 1;
                let result = self.run_block(&instructions);
                self.interpret_depth -= 1;
                self.context.pop();
                result.map_err(|e| self.wrap_interpret_error(&snippet, e))
            }
            InterpretMode::Isolated => self.run_isolated(spec, &instructions, &snippet, line),
        }
    }

    /// Runs instructions in a fresh child engine sharing only the function
    /// registry, labels/subroutines, and the ADDRESS registry. Named imports
    /// are copied in before execution and named exports copied back after;
    /// nothing else crosses the boundary.
    fn run_isolated(
        &mut self,
        spec: &InterpretSpec,
        instructions: &[Instruction],
        snippet: &str,
        line: u32,
    ) -> RunResult<Flow> {
        let mut child_vars = VariableStore::new();
        for name in &spec.imports {
            if let Some(value) = self.vars.get(name) {
                child_vars.set(name, value.clone());
            }
        }

        let mut child = Interpreter {
            program: self.program,
            labels: self.labels,
            source_lines: self.source_lines.clone(),
            filename: self.filename,
            limits: self.limits,
            interpolation: self.interpolation,
            recognizable: self.recognizable,
            script_runner: self.script_runner,
            loader: self.loader,
            functions: self.functions.clone(),
            address: self.address.clone(),
            sink: &mut *self.sink,
            vars: child_vars,
            stack: DataStack::new(),
            traps: TrapTable::new(),
            numeric: self.numeric,
            tracer: Tracer::new(false),
            context: ContextStack::new(),
            active_address: address::DEFAULT_TARGET.to_owned(),
            call_depth: 0,
            interpret_depth: self.interpret_depth + 1,
            no_interpret: self.no_interpret,
            last_error: None,
            current_command: None,
            current_function: None,
        };
        child.context.push(ContextFrame {
            kind: FrameKind::Interpret,
            line_number: line,
            source_line: snippet.to_owned(),
            filename: self.filename.to_owned(),
            details: None,
        });

        let flow = child.run_block(instructions);
        let exports: Vec<(String, Value)> = spec
            .exports
            .iter()
            .filter_map(|name| child.vars.get(name).map(|value| (name.clone(), value.clone())))
            .collect();
        drop(child);

        for (name, value) in exports {
            self.vars.set(&name, value);
        }

        match flow.map_err(|e| self.wrap_interpret_error(snippet, e))? {
            Flow::Exit(code) => Ok(Flow::Exit(code)),
            Flow::Jump(label) => Err(RexxError::new(
                ErrorKind::Interpret,
                format!("SIGNAL to label {label} cannot leave an isolated INTERPRET"),
            )),
            Flow::Return(_) | Flow::Normal => Ok(Flow::Normal),
        }
    }

    /// Composes the INTERPRET failure message: the snippet plus the
    /// execution stack, keeping the innermost source location.
    fn wrap_interpret_error(&self, snippet: &str, inner: RexxError) -> RexxError {
        let mut wrapped = RexxError::new(
            ErrorKind::Interpret,
            format!(
                "in INTERPRET \"{snippet}\": {}\n{}",
                inner.message,
                self.context.describe()
            ),
        );
        wrapped.line = inner.line;
        wrapped.source_line = inner.source_line;
        wrapped.filename = inner.filename;
        wrapped.code = inner.code;
        wrapped
    }

    // === REQUIRE ===

    fn run_require(&mut self, library: &Expr, as_clause: Option<&str>) -> RunResult<Flow> {
        let name = self.eval(library)?.string_form(&self.numeric).into_owned();
        let loaded = self
            .loader
            .load(&name)
            .map_err(|message| RexxError::host(format!("REQUIRE {name} failed: {message}")))?;

        let clause = as_clause.map(crate::loader::AsClause::parse);
        for (function_name, function) in loaded.functions {
            let final_name = match &clause {
                Some(clause) => clause.apply(&function_name).map_err(RexxError::host)?,
                None => function_name,
            };
            self.functions.register(&final_name, function);
        }
        for target in loaded.address_targets {
            self.address.register(target, clause.as_ref()).map_err(RexxError::host)?;
        }
        Ok(Flow::Normal)
    }

    // === expression evaluation ===

    fn eval(&mut self, expr: &Expr) -> RunResult<Value> {
        match expr {
            Expr::NumberLit(n) => Ok(Value::Number(*n)),
            Expr::StringLit { value, quote } => match quote {
                QuoteKind::Double => Ok(Value::Str(self.interpolate(value)?)),
                QuoteKind::Single => Ok(Value::Str(value.clone())),
            },
            Expr::Var(name) => self.eval_var(name),
            Expr::FunctionCall { name, args } => {
                // needs a line for handler source context; the context stack
                // projection is current by the time expressions evaluate
                let line = self.context.current_line_number();
                self.eval_function_call(name, args, line)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                expressions::apply_unary(*op, &operand, &self.numeric)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                let result = expressions::apply_binary(*op, &lhs, &rhs, &self.numeric)?;
                if let Some(streamed) = self.tracer.record(
                    TraceEventKind::Intermediate,
                    format!(
                        "{} . {} -> {}",
                        lhs.string_form(&self.numeric),
                        rhs.string_form(&self.numeric),
                        result.string_form(&self.numeric)
                    ),
                    None,
                    Some(result.string_form(&self.numeric).into_owned()),
                ) {
                    self.sink.write_line(&streamed)?;
                }
                Ok(result)
            }
            Expr::Concat(parts) => {
                let mut text = String::new();
                for part in parts {
                    let value = self.eval(part)?;
                    text.push_str(&value.string_form(&self.numeric));
                }
                Ok(Value::Str(text))
            }
        }
    }

    /// Variable reference resolution.
    ///
    /// A bare name in an active ADDRESS context resolves in the canonical
    /// order: methods of the active target dispatch before the variable
    /// store, even when a variable of the same name is bound (matching
    /// assignment-source resolution). Dotted names can never be methods and
    /// go straight to the store; an unresolved name reads as `Absent`, or
    /// raises NOVALUE when that trap is armed.
    fn eval_var(&mut self, name: &str) -> RunResult<Value> {
        if !name.contains('.') && self.active_method(name).is_some() {
            let line = self.context.current_line_number();
            return self.dispatch_address_method(name, &[], line);
        }
        self.read_var(name)
    }

    fn read_var(&mut self, name: &str) -> RunResult<Value> {
        if let Some(value) = self.vars.resolve_dotted(name) {
            return Ok(value);
        }
        if self.traps.is_armed(Condition::Novalue) {
            return Err(RexxError::novalue(name));
        }
        Ok(Value::Absent(name.to_uppercase()))
    }

    /// Function-call resolution, in deterministic order: engine-state
    /// specials, built-ins, externally registered functions, methods of the
    /// active ADDRESS target, and finally a missing-function error.
    fn eval_function_call(&mut self, name: &str, args: &[Arg], line: u32) -> RunResult<Value> {
        // RESULT() with no parameters is a read of the RESULT variable
        if name == "RESULT" && args.is_empty() {
            return self.read_var(crate::variables::RESULT);
        }
        if let Some(value) = self.eval_engine_builtin(name, args)? {
            return Ok(value);
        }

        let mut pairs = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval(&arg.expr)?;
            pairs.push((arg.name.clone(), value));
        }
        let positional = crate::functions::convert_named_args(name, pairs)
            .map_err(|message| RexxError::new(ErrorKind::MissingFunction, message))?;

        if let Some(result) = crate::functions::FunctionRegistry::call_builtin(name, &positional, &self.numeric) {
            self.current_function = Some(name.to_owned());
            let value = result.map_err(|message| RexxError::new(ErrorKind::MissingFunction, format!("{name}: {message}")));
            self.current_function = None;
            return value;
        }

        if let Some(function) = self.functions.external(name) {
            let function = function.clone();
            self.current_function = Some(name.to_owned());
            let result =
                (*function)(&positional).map_err(|message| RexxError::host(format!("{name}: {message}")));
            self.current_function = None;
            return result;
        }

        if self.active_method(name).is_some() {
            return self.dispatch_address_method(name, &positional, line);
        }

        Err(RexxError::missing_function(name))
    }

    /// Built-ins that read engine state rather than just their arguments.
    fn eval_engine_builtin(&mut self, name: &str, args: &[Arg]) -> RunResult<Option<Value>> {
        if !args.is_empty() {
            return Ok(None);
        }
        let value = match name {
            "ERROR_LINE" => Value::Number(self.last_error.as_ref().map_or(0.0, |e| f64::from(e.line))),
            "ERROR_MESSAGE" => Value::Str(self.last_error.as_ref().map(|e| e.message.clone()).unwrap_or_default()),
            "QUEUED" => Value::Number(self.stack.queued() as f64),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn interpolate(&mut self, text: &str) -> RunResult<String> {
        let config = self.interpolation;
        config.interpolate(text, |name| {
            let value = self.read_var(name)?;
            Ok(value.string_form(&self.numeric).into_owned())
        })
    }

    fn push_frame(&mut self, kind: FrameKind, line: u32, details: Option<String>) {
        self.context.push(ContextFrame {
            kind,
            line_number: line,
            source_line: self.source_text(line).trim().to_owned(),
            filename: self.filename.to_owned(),
            details,
        });
    }
}

/// CALL targets that follow the external-script convention: a filename with
/// an extension or path separator rather than a plain label name.
fn is_external_script_name(name: &str) -> bool {
    name.contains('/') || name.contains('.')
}

fn instruction_tag(kind: &InstructionKind) -> &'static str {
    match kind {
        InstructionKind::Address { .. } | InstructionKind::AddressWithString { .. } => "ADDRESS",
        InstructionKind::Signal(_) => "SIGNAL",
        InstructionKind::Label { .. } => "LABEL",
        InstructionKind::Numeric(_) => "NUMERIC",
        InstructionKind::Parse { .. } => "PARSE",
        InstructionKind::Push { .. } => "PUSH",
        InstructionKind::Pull { .. } => "PULL",
        InstructionKind::Queue { .. } => "QUEUE",
        InstructionKind::Call { .. } => "CALL",
        InstructionKind::Return { .. } => "RETURN",
        InstructionKind::Trace { .. } => "TRACE",
        InstructionKind::FunctionCall { .. } => "FUNCTION",
        InstructionKind::Assignment { .. } => "LET",
        InstructionKind::If { .. } => "IF",
        InstructionKind::Do { .. } => "DO",
        InstructionKind::Select { .. } => "SELECT",
        InstructionKind::Exit { .. } => "EXIT",
        InstructionKind::Say { .. } => "SAY",
        InstructionKind::Interpret(_) => "INTERPRET",
        InstructionKind::NoInterpret => "NO-INTERPRET",
        InstructionKind::QuotedString { .. } | InstructionKind::HeredocString { .. } => "COMMAND",
        InstructionKind::Require { .. } => "REQUIRE",
    }
}
