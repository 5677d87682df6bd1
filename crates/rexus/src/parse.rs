//! The dialect parser: source text to the instruction tree of
//! [`crate::instruction`].
//!
//! Parsing is line-oriented. Comments (`/* ... */` and `--` to end of line)
//! are stripped first with line structure preserved, then statements are
//! recognized by their leading keyword. Block constructs (IF/DO/SELECT)
//! consume following lines until their END, so the emitted tree nests bodies
//! instead of relying on positional skips.
//!
//! Top-level source is parsed by the host before execution; INTERPRET
//! re-enters [`parse`] at runtime with the same contract.

use smallvec::SmallVec;

use crate::{
    conditions::Condition,
    error::{RexxError, RunResult},
    expressions::{Arg, BinaryOp, Expr, QuoteKind, UnaryOp},
    instruction::{
        AssignSource, DoSpec, Instruction, InstructionKind, InterpretMode, InterpretSpec, NumericAction, ParseSource,
        SignalAction, WhenClause,
    },
};

/// Maximum nesting of block constructs; prevents stack overflow from
/// pathological input.
pub const MAX_BLOCK_DEPTH: u16 = 100;

/// Parses source text into the instruction sequence the engine consumes.
///
/// Every instruction carries a 1-based line number into `source`.
pub fn parse(source: &str, filename: &str) -> RunResult<Vec<Instruction>> {
    let stripped = strip_comments(source);
    let lines: Vec<(u32, String)> = stripped
        .lines()
        .enumerate()
        .map(|(index, text)| (index as u32 + 1, text.to_owned()))
        .collect();
    let mut cursor = LineCursor {
        lines: &lines,
        index: 0,
        pending: std::collections::VecDeque::new(),
    };
    let mut instructions = Vec::new();
    while let Some((line, text)) = cursor.next_nonblank() {
        let instruction = parse_statement(&text, line, &mut cursor, 0)
            .map_err(|e| e.with_location(line, &text, filename))?;
        instructions.push(instruction);
    }
    Ok(instructions)
}

/// Removes comments while preserving line structure.
///
/// Block comments (`/* ... */`, possibly spanning lines) become spaces and
/// newlines; `--` starts a line comment. Both are ignored inside quoted
/// strings.
fn strip_comments(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_block = false;
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            } else if c == '\n' {
                output.push('\n');
            }
            continue;
        }
        match quote {
            Some(q) => {
                output.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    output.push(c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    in_block = true;
                    output.push(' ');
                }
                '-' if chars.peek() == Some(&'-') => {
                    // line comment: drop to end of line
                    for rest in chars.by_ref() {
                        if rest == '\n' {
                            output.push('\n');
                            break;
                        }
                    }
                }
                _ => output.push(c),
            },
        }
    }
    output
}

struct LineCursor<'a> {
    lines: &'a [(u32, String)],
    index: usize,
    /// Statements split off a line by top-level `;`, not yet consumed.
    pending: std::collections::VecDeque<(u32, String)>,
}

impl LineCursor<'_> {
    /// Next statement: lines split on top-level `;` separators, blanks
    /// skipped.
    fn next_nonblank(&mut self) -> Option<(u32, String)> {
        loop {
            if let Some(statement) = self.pending.pop_front() {
                return Some(statement);
            }
            if self.index >= self.lines.len() {
                return None;
            }
            let (line, text) = &self.lines[self.index];
            self.index += 1;
            for statement in split_top_level(text, |c| c == ';') {
                self.pending.push_back((*line, statement));
            }
        }
    }

    fn peek_nonblank(&self) -> Option<(u32, String)> {
        if let Some(statement) = self.pending.front() {
            return Some(statement.clone());
        }
        let mut index = self.index;
        while index < self.lines.len() {
            let (line, text) = &self.lines[index];
            if let Some(statement) = split_top_level(text, |c| c == ';').into_iter().next() {
                return Some((*line, statement));
            }
            index += 1;
        }
        None
    }

    /// Next raw line; heredoc bodies keep blank lines and `;` characters.
    fn next_raw(&mut self) -> Option<(u32, String)> {
        if self.index < self.lines.len() {
            let (line, text) = &self.lines[self.index];
            self.index += 1;
            return Some((*line, text.clone()));
        }
        None
    }
}

fn parse_statement(text: &str, line: u32, cursor: &mut LineCursor, depth: u16) -> RunResult<Instruction> {
    if depth > MAX_BLOCK_DEPTH {
        return Err(RexxError::syntax("blocks nested too deeply"));
    }
    let (keyword, rest) = split_first_word(text);
    let upper = keyword.to_uppercase();

    let kind = match upper.as_str() {
        "SAY" => InstructionKind::Say { parts: parse_say_parts(rest)? },
        "LET" => return parse_assignment_statement(rest, line),
        "IF" => return parse_if(rest, line, cursor, depth),
        "SELECT" => return parse_select(rest, line, cursor, depth),
        "DO" => return parse_do(rest, line, cursor, depth),
        "CALL" => parse_call(rest)?,
        "RETURN" => InstructionKind::Return {
            value: if rest.is_empty() { None } else { Some(parse_expr_text(rest)?) },
        },
        "EXIT" => InstructionKind::Exit {
            value: if rest.is_empty() { None } else { Some(parse_expr_text(rest)?) },
        },
        "SIGNAL" => InstructionKind::Signal(parse_signal(rest)?),
        "ADDRESS" => parse_address(rest)?,
        "NUMERIC" => InstructionKind::Numeric(parse_numeric(rest)?),
        "PARSE" => parse_parse(rest)?,
        "PUSH" => InstructionKind::Push { value: parse_expr_text(rest)? },
        "QUEUE" => InstructionKind::Queue { value: parse_expr_text(rest)? },
        "PULL" => InstructionKind::Pull { template: parse_template(rest)?.0 },
        "TRACE" => InstructionKind::Trace { mode: rest.trim().to_owned() },
        "INTERPRET" => InstructionKind::Interpret(parse_interpret(rest)?),
        "NO-INTERPRET" | "NO_INTERPRET" => InstructionKind::NoInterpret,
        "REQUIRE" => parse_require(rest)?,
        "END" | "ELSE" | "WHEN" | "OTHERWISE" => {
            return Err(RexxError::syntax(format!("{upper} outside of its block construct")));
        }
        _ => return parse_fallback(text, line, cursor),
    };
    Ok(Instruction::new(kind, line))
}

/// Statements that do not start with a keyword: labels, bare command
/// strings, heredocs, assignments without LET, and bare function calls.
fn parse_fallback(text: &str, line: u32, cursor: &mut LineCursor) -> RunResult<Instruction> {
    // label: an identifier followed by a colon, alone on its line
    if let Some(name) = text.strip_suffix(':')
        && is_plain_identifier(name)
    {
        return Ok(Instruction::new(InstructionKind::Label { name: name.to_uppercase() }, line));
    }

    // heredoc command string: <<MARKER ... MARKER
    if let Some(marker) = text.strip_prefix("<<") {
        let marker = marker.trim();
        if !is_plain_identifier(marker) {
            return Err(RexxError::syntax(format!("invalid heredoc marker {marker}")));
        }
        let mut body = Vec::new();
        loop {
            let Some((_, raw)) = cursor.next_raw() else {
                return Err(RexxError::syntax(format!("unterminated heredoc {marker}")));
            };
            if raw.trim() == marker {
                break;
            }
            body.push(raw);
        }
        return Ok(Instruction::new(InstructionKind::HeredocString { command: body.join("\n") }, line));
    }

    // bare quoted string: a command for the active ADDRESS target
    if text.starts_with('"') || text.starts_with('\'') {
        let tokens = tokenize(text)?;
        if let [Tok::Str { value, quote }] = tokens.as_slice() {
            return Ok(Instruction::new(
                InstructionKind::QuotedString {
                    command: value.clone(),
                    quote: *quote,
                },
                line,
            ));
        }
        return Err(RexxError::syntax("command string must be a single quoted string"));
    }

    // assignment without LET: ident = expr
    if let Some((target, source)) = split_assignment(text) {
        return Ok(Instruction::new(
            InstructionKind::Assignment {
                target,
                source: parse_assign_source(&source)?,
            },
            line,
        ));
    }

    // bare function call statement: name(args), or a lone name that may
    // resolve as a parameterless ADDRESS method at run time
    let expr = parse_expr_text(text)?;
    match expr {
        Expr::FunctionCall { name, args } => Ok(Instruction::new(InstructionKind::FunctionCall { name, args }, line)),
        Expr::Var(name) if !name.contains('.') => {
            Ok(Instruction::new(InstructionKind::FunctionCall { name, args: Vec::new() }, line))
        }
        _ => Err(RexxError::syntax(format!("unrecognized statement: {text}"))),
    }
}

fn parse_assignment_statement(rest: &str, line: u32) -> RunResult<Instruction> {
    let Some((target, source)) = split_assignment(rest) else {
        return Err(RexxError::syntax("LET requires the form LET name = value"));
    };
    Ok(Instruction::new(
        InstructionKind::Assignment {
            target,
            source: parse_assign_source(&source)?,
        },
        line,
    ))
}

/// Splits `name = rest`, rejecting `==` so comparisons are not mistaken for
/// assignments.
fn split_assignment(text: &str) -> Option<(String, String)> {
    let eq = find_top_level_char(text, '=')?;
    if text[eq + 1..].starts_with('=') {
        return None;
    }
    let target = text[..eq].trim();
    if !is_assignable_name(target) {
        return None;
    }
    Some((target.to_owned(), text[eq + 1..].trim().to_owned()))
}

fn parse_assign_source(text: &str) -> RunResult<AssignSource> {
    if let Some(call_rest) = strip_keyword(text, "CALL") {
        let InstructionKind::Call { name, args } = parse_call(call_rest)? else {
            unreachable!("parse_call only builds Call");
        };
        return Ok(AssignSource::Call { name, args });
    }
    let tokens = tokenize(text)?;
    match tokens.as_slice() {
        [Tok::Str { value, quote }] => {
            return Ok(AssignSource::Literal {
                text: value.clone(),
                quote: Some(*quote),
            });
        }
        [Tok::Num(_)] | [Tok::Ident(_)] => {
            return Ok(AssignSource::Literal {
                text: text.trim().to_owned(),
                quote: None,
            });
        }
        _ => {}
    }
    let expr = parse_expr_text(text)?;
    if let Expr::FunctionCall { name, args } = expr {
        return Ok(AssignSource::FunctionCall { name, args });
    }
    Ok(AssignSource::Expr(expr))
}

fn parse_if(rest: &str, line: u32, cursor: &mut LineCursor, depth: u16) -> RunResult<Instruction> {
    let Some(then_at) = find_keyword(rest, "THEN") else {
        return Err(RexxError::syntax("IF requires THEN on the same line"));
    };
    let condition = parse_expr_text(&rest[..then_at])?;
    let then_text = rest[then_at + "THEN".len()..].trim();
    if then_text.is_empty() {
        return Err(RexxError::syntax("expected a statement after THEN"));
    }
    let then_body = vec![parse_statement(then_text, line, cursor, depth + 1)?];

    let mut else_body = Vec::new();
    if let Some((else_line, next)) = cursor.peek_nonblank() {
        let (word, else_rest) = split_first_word(&next);
        if word.eq_ignore_ascii_case("ELSE") {
            cursor.next_nonblank();
            let else_rest = else_rest.trim();
            if else_rest.is_empty() {
                return Err(RexxError::syntax("expected a statement after ELSE"));
            }
            else_body.push(parse_statement(else_rest, else_line, cursor, depth + 1)?);
        }
    }

    Ok(Instruction::new(
        InstructionKind::If {
            condition,
            then_body,
            else_body,
        },
        line,
    ))
}

fn parse_select(rest: &str, line: u32, cursor: &mut LineCursor, depth: u16) -> RunResult<Instruction> {
    if !rest.trim().is_empty() {
        return Err(RexxError::syntax("SELECT takes no operand"));
    }
    let mut whens = Vec::new();
    let mut otherwise = Vec::new();
    loop {
        let Some((when_line, text)) = cursor.next_nonblank() else {
            return Err(RexxError::syntax("SELECT without END"));
        };
        let (word, word_rest) = split_first_word(&text);
        match word.to_uppercase().as_str() {
            "WHEN" => {
                let Some(then_at) = find_keyword(word_rest, "THEN") else {
                    return Err(RexxError::syntax("WHEN requires THEN on the same line"));
                };
                let condition = parse_expr_text(&word_rest[..then_at])?;
                let body_text = word_rest[then_at + "THEN".len()..].trim();
                if body_text.is_empty() {
                    return Err(RexxError::syntax("expected a statement after THEN"));
                }
                let body = vec![parse_statement(body_text, when_line, cursor, depth + 1)?];
                whens.push(WhenClause { condition, body });
            }
            "OTHERWISE" => {
                let rest = word_rest.trim();
                if !rest.is_empty() {
                    otherwise.push(parse_statement(rest, when_line, cursor, depth + 1)?);
                }
                loop {
                    let Some((body_line, body_text)) = cursor.next_nonblank() else {
                        return Err(RexxError::syntax("SELECT without END"));
                    };
                    if body_text.eq_ignore_ascii_case("END") {
                        return Ok(Instruction::new(InstructionKind::Select { whens, otherwise }, line));
                    }
                    otherwise.push(parse_statement(&body_text, body_line, cursor, depth + 1)?);
                }
            }
            "END" => return Ok(Instruction::new(InstructionKind::Select { whens, otherwise }, line)),
            _ => return Err(RexxError::syntax(format!("expected WHEN, OTHERWISE or END in SELECT, got {word}"))),
        }
    }
}

fn parse_do(rest: &str, line: u32, cursor: &mut LineCursor, depth: u16) -> RunResult<Instruction> {
    let spec = parse_do_spec(rest)?;
    let mut body = Vec::new();
    loop {
        let Some((body_line, text)) = cursor.next_nonblank() else {
            return Err(RexxError::syntax("DO without END"));
        };
        if text.eq_ignore_ascii_case("END") {
            break;
        }
        body.push(parse_statement(&text, body_line, cursor, depth + 1)?);
    }
    Ok(Instruction::new(InstructionKind::Do { spec, body }, line))
}

fn parse_do_spec(rest: &str) -> RunResult<DoSpec> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(DoSpec::Plain);
    }
    if let Some(condition) = strip_keyword(rest, "WHILE") {
        return Ok(DoSpec::While {
            condition: parse_expr_text(condition)?,
        });
    }
    if rest.eq_ignore_ascii_case("FOREVER") {
        return Ok(DoSpec::Forever);
    }

    // DO v = start TO end [BY step]
    if let Some(eq) = find_top_level_char(rest, '=') {
        let var = rest[..eq].trim();
        if !is_plain_identifier(var) {
            return Err(RexxError::syntax(format!("invalid DO control variable {var}")));
        }
        let spec_rest = &rest[eq + 1..];
        let Some(to_at) = find_keyword(spec_rest, "TO") else {
            return Err(RexxError::syntax("DO range requires TO"));
        };
        let start = parse_expr_text(&spec_rest[..to_at])?;
        let after_to = &spec_rest[to_at + "TO".len()..];
        let (end_text, step) = match find_keyword(after_to, "BY") {
            Some(by_at) => (
                &after_to[..by_at],
                Some(parse_expr_text(&after_to[by_at + "BY".len()..])?),
            ),
            None => (after_to, None),
        };
        return Ok(DoSpec::Range {
            var: var.to_uppercase(),
            start,
            end: parse_expr_text(end_text)?,
            step,
        });
    }

    // DO v OVER collection
    if let Some(over_at) = find_keyword(rest, "OVER") {
        let var = rest[..over_at].trim();
        if !is_plain_identifier(var) {
            return Err(RexxError::syntax(format!("invalid DO OVER variable {var}")));
        }
        return Ok(DoSpec::Over {
            var: var.to_uppercase(),
            collection: parse_expr_text(&rest[over_at + "OVER".len()..])?,
        });
    }

    // DO n: fixed repetition count
    Ok(DoSpec::Repeat {
        count: parse_expr_text(rest)?,
    })
}

fn parse_call(rest: &str) -> RunResult<InstructionKind> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(RexxError::syntax("CALL requires a subroutine name"));
    }
    // quoted target: always an external script
    if rest.starts_with('"') || rest.starts_with('\'') {
        let tokens = tokenize(rest)?;
        let Some(Tok::Str { value, .. }) = tokens.first() else {
            return Err(RexxError::syntax("invalid CALL target"));
        };
        let name = value.clone();
        let arg_text = rest[quoted_span_len(rest)..].trim();
        return Ok(InstructionKind::Call {
            name,
            args: parse_call_args(arg_text)?,
        });
    }

    // CALL name(a, b): the whole operand is one call expression
    if rest.split_whitespace().next().is_some_and(|w| w.contains('(')) {
        let Expr::FunctionCall { name, args } = parse_expr_text(rest)? else {
            return Err(RexxError::syntax(format!("invalid CALL target {rest}")));
        };
        return Ok(InstructionKind::Call {
            name,
            args: args.into_iter().map(|arg| arg.expr).collect(),
        });
    }

    let (name, arg_text) = split_first_word(rest);
    if !is_call_target(name) {
        return Err(RexxError::syntax(format!("invalid CALL target {name}")));
    }
    // script paths keep their case; label names are uppercased like all
    // other identifiers
    let name = if name.contains('.') || name.contains('/') {
        name.to_owned()
    } else {
        name.to_uppercase()
    };
    Ok(InstructionKind::Call {
        name,
        args: parse_call_args(arg_text)?,
    })
}

/// CALL arguments: comma-separated when a top-level comma is present;
/// otherwise the whole operand is tried as one expression (`CALL fact n - 1`)
/// before falling back to blank-separated arguments (`CALL add 2 3`).
fn parse_call_args(text: &str) -> RunResult<Vec<Expr>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if find_top_level_char(text, ',').is_some() {
        return split_top_level(text, |c| c == ',')
            .iter()
            .map(|chunk| parse_expr_text(chunk))
            .collect();
    }
    if let Ok(expr) = parse_expr_text(text) {
        return Ok(vec![expr]);
    }
    split_top_level(text, char::is_whitespace)
        .iter()
        .map(|chunk| parse_expr_text(chunk))
        .collect()
}

fn quoted_span_len(text: &str) -> usize {
    let quote = text.chars().next().unwrap_or('"');
    let mut len = quote.len_utf8();
    for c in text[len..].chars() {
        len += c.len_utf8();
        if c == quote {
            break;
        }
    }
    len
}

fn parse_signal(rest: &str) -> RunResult<SignalAction> {
    let (word, word_rest) = split_first_word(rest);
    match word.to_uppercase().as_str() {
        "ON" => {
            let (cond_word, cond_rest) = split_first_word(word_rest);
            let condition = parse_condition(cond_word)?;
            let label = match strip_keyword(cond_rest.trim(), "NAME") {
                Some(label) => {
                    let label = label.trim();
                    if !is_plain_identifier(label) {
                        return Err(RexxError::syntax(format!("invalid handler label {label}")));
                    }
                    label.to_uppercase()
                }
                None if cond_rest.trim().is_empty() => cond_word.to_uppercase(),
                None => return Err(RexxError::syntax("expected NAME label after SIGNAL ON condition")),
            };
            Ok(SignalAction::On { condition, label })
        }
        "OFF" => {
            let condition = parse_condition(word_rest.trim())?;
            Ok(SignalAction::Off { condition })
        }
        _ => {
            if !is_plain_identifier(word) || !word_rest.trim().is_empty() {
                return Err(RexxError::syntax(format!("invalid SIGNAL target {rest}")));
            }
            Ok(SignalAction::Jump { label: word.to_uppercase() })
        }
    }
}

fn parse_condition(word: &str) -> RunResult<Condition> {
    word.parse()
        .map_err(|_| RexxError::syntax(format!("unknown condition {word}")))
}

fn parse_address(rest: &str) -> RunResult<InstructionKind> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(InstructionKind::Address {
            target: crate::address::DEFAULT_TARGET.to_owned(),
        });
    }
    let (target, command_text) = split_first_word(rest);
    if !is_plain_identifier(target) {
        return Err(RexxError::syntax(format!("invalid ADDRESS target {target}")));
    }
    let command_text = command_text.trim();
    if command_text.is_empty() {
        return Ok(InstructionKind::Address {
            target: target.to_lowercase(),
        });
    }
    Ok(InstructionKind::AddressWithString {
        target: target.to_lowercase(),
        command: parse_expr_text(command_text)?,
    })
}

fn parse_numeric(rest: &str) -> RunResult<NumericAction> {
    let (word, word_rest) = split_first_word(rest);
    let word_rest = word_rest.trim();
    match word.to_uppercase().as_str() {
        "DIGITS" => Ok(NumericAction::Digits(parse_expr_text(word_rest)?)),
        "FUZZ" => Ok(NumericAction::Fuzz(parse_expr_text(word_rest)?)),
        "FORM" => Ok(NumericAction::Form(word_rest.to_owned())),
        other => Err(RexxError::syntax(format!("unknown NUMERIC setting {other}"))),
    }
}

fn parse_parse(rest: &str) -> RunResult<InstructionKind> {
    let (word, word_rest) = split_first_word(rest);
    match word.to_uppercase().as_str() {
        "ARG" => {
            let (template, comma_form) = parse_template(word_rest)?;
            Ok(InstructionKind::Parse {
                source: ParseSource::Arg,
                template,
                comma_form,
            })
        }
        "PULL" => {
            let (template, comma_form) = parse_template(word_rest)?;
            Ok(InstructionKind::Parse {
                source: ParseSource::Pull,
                template,
                comma_form,
            })
        }
        "VAR" => {
            let (name, template_text) = split_first_word(word_rest.trim());
            if !is_plain_identifier(name) {
                return Err(RexxError::syntax(format!("invalid PARSE VAR name {name}")));
            }
            let (template, comma_form) = parse_template(template_text)?;
            Ok(InstructionKind::Parse {
                source: ParseSource::Var(name.to_uppercase()),
                template,
                comma_form,
            })
        }
        other => Err(RexxError::syntax(format!("unknown PARSE source {other}"))),
    }
}

/// A parse template: variable names separated by commas (positional
/// argument mapping) or blanks (word splitting).
fn parse_template(text: &str) -> RunResult<(SmallVec<[String; 4]>, bool)> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RexxError::syntax("expected a template of variable names"));
    }
    let comma_form = text.contains(',');
    let separators: &[char] = if comma_form { &[','] } else { &[' ', '\t'] };
    let mut template = SmallVec::new();
    for part in text.split(separators.as_ref()) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !is_plain_identifier(part) {
            return Err(RexxError::syntax(format!("invalid template variable {part}")));
        }
        template.push(part.to_uppercase());
    }
    Ok((template, comma_form))
}

fn parse_interpret(rest: &str) -> RunResult<InterpretSpec> {
    let mut rest = rest.trim();
    let mut mode = InterpretMode::Classic;
    let mut imports = SmallVec::new();
    let mut exports = SmallVec::new();
    loop {
        if let Some(after) = strip_keyword(rest, "CLASSIC") {
            mode = InterpretMode::Classic;
            rest = after.trim();
        } else if let Some(after) = strip_keyword(rest, "ISOLATED") {
            mode = InterpretMode::Isolated;
            rest = after.trim();
        } else if let Some((names, after)) = parse_name_group(rest, "IMPORT")? {
            imports = names;
            rest = after;
        } else if let Some((names, after)) = parse_name_group(rest, "EXPORT")? {
            exports = names;
            rest = after;
        } else {
            break;
        }
    }
    if rest.is_empty() {
        return Err(RexxError::syntax("INTERPRET requires a source expression"));
    }
    Ok(InterpretSpec {
        mode,
        imports,
        exports,
        source: parse_expr_text(rest)?,
    })
}

/// Parses a `KEYWORD(a, b)` group, returning the names and the remainder.
fn parse_name_group<'a>(text: &'a str, keyword: &str) -> RunResult<Option<(SmallVec<[String; 2]>, &'a str)>> {
    let Some(head) = text.get(..keyword.len()) else {
        return Ok(None);
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return Ok(None);
    }
    let after_keyword = text[keyword.len()..].trim_start();
    let Some(body_start) = after_keyword.strip_prefix('(') else {
        return Ok(None);
    };
    let Some(close) = body_start.find(')') else {
        return Err(RexxError::syntax(format!("unterminated {keyword}(...) group")));
    };
    let mut names = SmallVec::new();
    for part in body_start[..close].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !is_plain_identifier(part) {
            return Err(RexxError::syntax(format!("invalid variable name {part} in {keyword}(...)")));
        }
        names.push(part.to_uppercase());
    }
    Ok(Some((names, body_start[close + 1..].trim_start())))
}

fn parse_require(rest: &str) -> RunResult<InstructionKind> {
    let rest = rest.trim();
    match find_keyword(rest, "AS") {
        Some(as_at) => Ok(InstructionKind::Require {
            library: parse_expr_text(&rest[..as_at])?,
            as_clause: Some(rest[as_at + "AS".len()..].trim().to_owned()),
        }),
        None => Ok(InstructionKind::Require {
            library: parse_expr_text(rest)?,
            as_clause: None,
        }),
    }
}

/// SAY operand parsing.
///
/// A `||` anywhere makes the whole operand a single concatenation
/// expression. Otherwise the operand is tried as one expression; if tokens
/// remain, it is split into top-level blank-separated tokens that resolve
/// individually (quoted literals abut their right neighbor, bare tokens get
/// a single blank).
fn parse_say_parts(rest: &str) -> RunResult<Vec<Expr>> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(vec![Expr::StringLit {
            value: String::new(),
            quote: QuoteKind::Single,
        }]);
    }
    if find_operator(rest, "||") {
        return Ok(vec![parse_expr_text(rest)?]);
    }
    if let Ok(expr) = parse_expr_text(rest) {
        return Ok(vec![expr]);
    }
    split_top_level(rest, char::is_whitespace)
        .iter()
        .map(|chunk| parse_expr_text(chunk))
        .collect()
}

// === text scanning helpers ===

fn split_first_word(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim_start()),
        None => (text, ""),
    }
}

fn is_plain_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Assignment targets additionally allow compound (dotted) names.
fn is_assignable_name(text: &str) -> bool {
    !text.is_empty() && text.split('.').all(is_plain_identifier)
}

/// CALL targets allow dots (external script convention) and an attached
/// argument list.
fn is_call_target(text: &str) -> bool {
    let base = text.split_once('(').map_or(text, |(name, _)| name);
    !base.is_empty()
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/'))
}

/// Finds a standalone keyword (case-insensitive, word-bounded) outside
/// quotes and parentheses. Returns its byte offset.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let kw = keyword.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {
                    if depth == 0
                        && i + kw.len() <= bytes.len()
                        && bytes[i..i + kw.len()].eq_ignore_ascii_case(kw)
                        && (i == 0 || !is_word_byte(bytes[i - 1]))
                        && (i + kw.len() == bytes.len() || !is_word_byte(bytes[i + kw.len()]))
                    {
                        return Some(i);
                    }
                }
            },
        }
        i += 1;
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Byte offset of the first occurrence of `needle` outside quotes and
/// parentheses.
fn find_top_level_char(text: &str, needle: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (at, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if depth == 0 && c == needle => return Some(at),
                _ => {}
            },
        }
    }
    None
}

/// True when the operator text appears outside quotes and parentheses.
fn find_operator(text: &str, operator: &str) -> bool {
    let bytes = text.as_bytes();
    let op = operator.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ if depth == 0 && bytes[i..].starts_with(op) => return true,
                _ => {}
            },
        }
        i += 1;
    }
    false
}

/// Splits on a separator predicate at paren depth 0, outside quotes.
fn split_top_level(text: &str, is_separator: fn(char) -> bool) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => {
                if depth == 0 && is_separator(c) {
                    if !current.trim().is_empty() {
                        chunks.push(current.trim().to_owned());
                    }
                    current.clear();
                    continue;
                }
                match c {
                    '"' | '\'' => quote = Some(c),
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                current.push(c);
            }
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_owned());
    }
    chunks
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let head = text.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword)
        && text[keyword.len()..].chars().next().is_none_or(|c| c.is_whitespace() || c == '(')
    {
        Some(&text[keyword.len()..])
    } else {
        None
    }
}

// === expression tokenizer and parser ===

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str { value: String, quote: QuoteKind },
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(text: &str) -> RunResult<Vec<Tok>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = if c == '"' { QuoteKind::Double } else { QuoteKind::Single };
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&next) = chars.get(i) else {
                    return Err(RexxError::syntax("unterminated string literal"));
                };
                i += 1;
                if next == c {
                    // doubled quote is an escaped quote character
                    if chars.get(i) == Some(&c) {
                        value.push(c);
                        i += 1;
                        continue;
                    }
                    break;
                }
                value.push(next);
            }
            tokens.push(Tok::Str { value, quote });
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if matches!(chars.get(i), Some('e' | 'E'))
                && chars
                    .get(i + 1)
                    .is_some_and(|&n| n.is_ascii_digit() || n == '+' || n == '-')
            {
                i += 2;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let number = crate::numeric::parse_number(&text)
                .ok_or_else(|| RexxError::syntax(format!("invalid number {text}")))?;
            tokens.push(Tok::Num(number));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let op = match two.as_str() {
            "||" => Some("||"),
            "**" => Some("**"),
            "//" => Some("//"),
            "\\=" => Some("\\="),
            "<>" | "><" | "!=" => Some("<>"),
            "<=" => Some("<="),
            ">=" => Some(">="),
            "==" => Some("=="),
            _ => None,
        };
        if let Some(op) = op {
            tokens.push(Tok::Op(op));
            i += 2;
            continue;
        }
        let single = match c {
            '+' => Some("+"),
            '-' => Some("-"),
            '*' => Some("*"),
            '/' => Some("/"),
            '%' => Some("%"),
            '=' => Some("="),
            '<' => Some("<"),
            '>' => Some(">"),
            '&' => Some("&"),
            '|' => Some("|"),
            '\\' => Some("\\"),
            _ => None,
        };
        if let Some(op) = single {
            tokens.push(Tok::Op(op));
            i += 1;
            continue;
        }
        match c {
            '(' => tokens.push(Tok::LParen),
            ')' => tokens.push(Tok::RParen),
            ',' => tokens.push(Tok::Comma),
            other => return Err(RexxError::syntax(format!("unexpected character {other}"))),
        }
        i += 1;
    }
    Ok(tokens)
}

/// Parses text as exactly one expression; leftover tokens are an error.
pub(crate) fn parse_expr_text(text: &str) -> RunResult<Expr> {
    let tokens = tokenize(text.trim())?;
    if tokens.is_empty() {
        return Err(RexxError::syntax("expected an expression"));
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(RexxError::syntax(format!("trailing tokens in expression {text}")));
    }
    Ok(expr)
}

struct ExprParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Tok> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if *o == op) {
            self.pos += 1;
            return true;
        }
        false
    }

    // precedence, loosest first: | > & > comparison > || > additive >
    // multiplicative > power > unary > primary
    fn expression(&mut self) -> RunResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> RunResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat_op("|") {
            let rhs = self.and_expr()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> RunResult<Expr> {
        let mut lhs = self.comparison()?;
        while self.eat_op("&") {
            let rhs = self.comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> RunResult<Expr> {
        let lhs = self.concat()?;
        let op = match self.peek() {
            Some(Tok::Op("=" | "==")) => BinaryOp::Equal,
            Some(Tok::Op("\\=" | "<>")) => BinaryOp::NotEqual,
            Some(Tok::Op("<")) => BinaryOp::Less,
            Some(Tok::Op("<=")) => BinaryOp::LessOrEqual,
            Some(Tok::Op(">")) => BinaryOp::Greater,
            Some(Tok::Op(">=")) => BinaryOp::GreaterOrEqual,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.concat()?;
        Ok(binary(op, lhs, rhs))
    }

    fn concat(&mut self) -> RunResult<Expr> {
        let first = self.additive()?;
        if !matches!(self.peek(), Some(Tok::Op("||"))) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat_op("||") {
            parts.push(self.additive()?);
        }
        Ok(Expr::Concat(parts))
    }

    fn additive(&mut self) -> RunResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op("+")) => BinaryOp::Add,
                Some(Tok::Op("-")) => BinaryOp::Subtract,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> RunResult<Expr> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op("*")) => BinaryOp::Multiply,
                Some(Tok::Op("/")) => BinaryOp::Divide,
                Some(Tok::Op("%")) => BinaryOp::IntegerDivide,
                Some(Tok::Op("//")) => BinaryOp::Remainder,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.power()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn power(&mut self) -> RunResult<Expr> {
        let mut lhs = self.unary()?;
        while self.eat_op("**") {
            let rhs = self.unary()?;
            lhs = binary(BinaryOp::Power, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> RunResult<Expr> {
        let op = match self.peek() {
            Some(Tok::Op("-")) => Some(UnaryOp::Minus),
            Some(Tok::Op("+")) => Some(UnaryOp::Plus),
            Some(Tok::Op("\\")) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> RunResult<Expr> {
        match self.advance() {
            Some(Tok::Num(n)) => Ok(Expr::NumberLit(n)),
            Some(Tok::Str { value, quote }) => Ok(Expr::StringLit { value, quote }),
            Some(Tok::Ident(name)) => {
                if matches!(self.peek(), Some(Tok::LParen)) {
                    self.pos += 1;
                    let args = self.call_args()?;
                    return Ok(Expr::FunctionCall {
                        name: name.to_uppercase(),
                        args,
                    });
                }
                Ok(Expr::Var(name.to_uppercase()))
            }
            Some(Tok::LParen) => {
                let inner = self.expression()?;
                if !matches!(self.advance(), Some(Tok::RParen)) {
                    return Err(RexxError::syntax("missing closing parenthesis"));
                }
                Ok(inner)
            }
            other => Err(RexxError::syntax(format!("unexpected token {other:?} in expression"))),
        }
    }

    fn call_args(&mut self) -> RunResult<Vec<Arg>> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Tok::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            // named argument: ident = expr (but not ident == expr)
            let name = if let (Some(Tok::Ident(name)), Some(Tok::Op("="))) =
                (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
            {
                let name = name.clone();
                self.pos += 2;
                Some(name)
            } else {
                None
            };
            let expr = self.expression()?;
            args.push(Arg { name, expr });
            match self.advance() {
                Some(Tok::Comma) => {}
                Some(Tok::RParen) => return Ok(args),
                _ => return Err(RexxError::syntax("missing closing parenthesis in call")),
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_one(source: &str) -> Instruction {
        let mut instructions = parse(source, "test.rexx").unwrap();
        assert_eq!(instructions.len(), 1, "expected one instruction from {source}");
        instructions.remove(0)
    }

    #[test]
    fn let_assignment_with_number() {
        let instruction = parse_one("LET x = 0");
        assert_eq!(
            instruction.kind,
            InstructionKind::Assignment {
                target: "x".to_owned(),
                source: AssignSource::Literal {
                    text: "0".to_owned(),
                    quote: None,
                },
            }
        );
        assert_eq!(instruction.line_number, 1);
    }

    #[test]
    fn say_splits_blank_separated_tokens() {
        let instruction = parse_one("SAY RC RESULT.result");
        let InstructionKind::Say { parts } = instruction.kind else {
            panic!("expected SAY");
        };
        assert_eq!(parts, vec![Expr::Var("RC".to_owned()), Expr::Var("RESULT.RESULT".to_owned())]);
    }

    #[test]
    fn say_with_concat_is_one_expression() {
        let instruction = parse_one("SAY \"a\" || b");
        let InstructionKind::Say { parts } = instruction.kind else {
            panic!("expected SAY");
        };
        assert_eq!(parts.len(), 1);
        assert!(matches!(parts[0], Expr::Concat(_)));
    }

    #[test]
    fn signal_on_with_name() {
        let instruction = parse_one("SIGNAL ON ERROR NAME ERR");
        assert_eq!(
            instruction.kind,
            InstructionKind::Signal(SignalAction::On {
                condition: Condition::Error,
                label: "ERR".to_owned(),
            })
        );
    }

    #[test]
    fn do_range_with_by() {
        let source = "DO i = 1 TO 10 BY 2\nSAY i\nEND";
        let instruction = parse_one(source);
        let InstructionKind::Do { spec, body } = instruction.kind else {
            panic!("expected DO");
        };
        assert_eq!(body.len(), 1);
        let DoSpec::Range { var, step, .. } = spec else {
            panic!("expected range spec");
        };
        assert_eq!(var, "I");
        assert!(step.is_some());
    }

    #[test]
    fn do_over_collection() {
        let instruction = parse_one("DO item OVER items\nSAY item\nEND");
        let InstructionKind::Do { spec, .. } = instruction.kind else {
            panic!("expected DO");
        };
        assert_eq!(
            spec,
            DoSpec::Over {
                var: "ITEM".to_owned(),
                collection: Expr::Var("ITEMS".to_owned()),
            }
        );
    }

    #[test]
    fn call_with_blank_separated_args() {
        let instruction = parse_one("CALL add 2 3");
        assert_eq!(
            instruction.kind,
            InstructionKind::Call {
                name: "ADD".to_owned(),
                args: vec![Expr::NumberLit(2.0), Expr::NumberLit(3.0)],
            }
        );
    }

    #[test]
    fn if_then_else_single_statements() {
        let source = "IF x > 1 THEN SAY \"big\"\nELSE SAY \"small\"";
        let instruction = parse_one(source);
        let InstructionKind::If {
            then_body, else_body, ..
        } = instruction.kind
        else {
            panic!("expected IF");
        };
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn select_with_otherwise() {
        let source = "SELECT\nWHEN x = 1 THEN SAY \"one\"\nOTHERWISE\nSAY \"other\"\nEND";
        let instruction = parse_one(source);
        let InstructionKind::Select { whens, otherwise } = instruction.kind else {
            panic!("expected SELECT");
        };
        assert_eq!(whens.len(), 1);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn interpret_isolated_with_imports() {
        let instruction = parse_one("INTERPRET ISOLATED IMPORT(a) \"LET a = 99\"");
        let InstructionKind::Interpret(spec) = instruction.kind else {
            panic!("expected INTERPRET");
        };
        assert_eq!(spec.mode, InterpretMode::Isolated);
        assert_eq!(spec.imports.as_slice(), ["A".to_owned()]);
        assert!(spec.exports.is_empty());
    }

    #[test]
    fn heredoc_collects_lines_until_marker() {
        let source = "<<SQL\nSELECT 1\nFROM t\nSQL";
        let instruction = parse_one(source);
        assert_eq!(
            instruction.kind,
            InstructionKind::HeredocString {
                command: "SELECT 1\nFROM t".to_owned(),
            }
        );
    }

    #[test]
    fn comments_are_stripped() {
        let source = "/* header\nspans lines */\nSAY 1 -- trailing";
        let instructions = parse(source, "test.rexx").unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].line_number, 3);
    }

    #[test]
    fn labels_are_recognized() {
        let instruction = parse_one("cleanup:");
        assert_eq!(instruction.kind, InstructionKind::Label { name: "CLEANUP".to_owned() });
    }

    #[test]
    fn unterminated_do_is_a_syntax_error() {
        let err = parse("DO\nSAY 1", "test.rexx").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
    }

    #[test]
    fn parse_arg_comma_template() {
        let instruction = parse_one("PARSE ARG x, y");
        let InstructionKind::Parse {
            source,
            template,
            comma_form,
        } = instruction.kind
        else {
            panic!("expected PARSE");
        };
        assert_eq!(source, ParseSource::Arg);
        assert_eq!(template.as_slice(), ["X".to_owned(), "Y".to_owned()]);
        assert!(comma_form);
    }
}
