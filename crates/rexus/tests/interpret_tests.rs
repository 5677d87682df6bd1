//! INTERPRET: scope sharing, isolation boundaries, and the NO-INTERPRET latch.

use pretty_assertions::assert_eq;
use rexus::{ErrorKind, Runner};

fn run_lines(source: &str) -> Vec<String> {
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    output.lines().map(str::to_owned).collect()
}

#[test]
fn classic_interpret_shares_every_mutation() {
    let source = "\
LET a = 1
LET b = 10
INTERPRET \"LET a = a + b\"
SAY a";
    assert_eq!(run_lines(source), vec!["11"]);
}

#[test]
fn interpret_source_can_be_built_at_runtime() {
    let source = "\
LET stmt = 'LET x = 6 * 7'
INTERPRET stmt
SAY x";
    assert_eq!(run_lines(source), vec!["42"]);
}

#[test]
fn isolated_interpret_sees_only_imports() {
    let source = "\
LET visible = 1
LET hidden = 2
INTERPRET ISOLATED IMPORT(visible) \"SAY visible; SAY hidden\"";
    // the non-imported variable reads as its own uppercased name
    assert_eq!(run_lines(source), vec!["1", "HIDDEN"]);
}

#[test]
fn isolated_interpret_exports_only_named_variables() {
    let source = "\
LET kept = 1
INTERPRET ISOLATED EXPORT(wanted) \"LET wanted = 7; LET leaked = 8\"
SAY wanted
SAY leaked";
    assert_eq!(run_lines(source), vec!["7", "LEAKED"]);
}

#[test]
fn isolated_interpret_does_not_leak_writes_back() {
    let source = "\
LET a = 5
INTERPRET ISOLATED IMPORT(a) \"LET a = 99\"
SAY a";
    assert_eq!(run_lines(source), vec!["5"]);
}

#[test]
fn isolated_interpret_can_call_program_subroutines() {
    let source = "\
INTERPRET ISOLATED EXPORT(r) \"LET r = CALL double 21\"
SAY r
EXIT
double:
PARSE ARG n
RETURN n * 2";
    assert_eq!(run_lines(source), vec!["42"]);
}

#[test]
fn no_interpret_blocks_later_interprets_only() {
    let source = "\
INTERPRET \"LET early = 1\"
SAY early
NO-INTERPRET
INTERPRET \"LET late = 2\"";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Interpret);
    assert!(err.message.contains("NO-INTERPRET"), "got {}", err.message);
}

#[test]
fn interpret_parse_failures_are_wrapped_with_the_snippet() {
    let source = "INTERPRET \"DO\"";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Interpret);
    assert!(err.message.contains("in INTERPRET"), "got {}", err.message);
}

#[test]
fn interpret_failures_can_be_trapped_as_syntax() {
    let source = "\
SIGNAL ON SYNTAX NAME bad
INTERPRET \"DO\"
SAY \"unreachable\"
bad:
SAY \"trapped\"
EXIT 0";
    assert_eq!(run_lines(source), vec!["trapped"]);
}

#[test]
fn classic_interpret_runtime_error_is_wrapped() {
    let source = "INTERPRET \"LET x = 1 / 0\"";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Interpret);
    assert!(err.message.contains("division by zero"), "got {}", err.message);
}

#[test]
fn exit_inside_interpret_terminates_the_program() {
    let source = "\
INTERPRET \"EXIT 3\"
SAY \"unreachable\"";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (outcome, output) = runner.run_collect().unwrap();
    assert_eq!(outcome.exit_code, 3);
    assert_eq!(output, "");
}
