//! End-to-end scenarios driving the public Runner API.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use rexus::{AddressContext, AddressHandler, HandlerFailure, LibraryMetadata, Runner};

/// Handler that echoes the command back as `{success: true, result: <cmd>}`.
struct EchoHandler;

impl AddressHandler for EchoHandler {
    fn handle(&self, command: &str, _context: &AddressContext) -> Result<serde_json::Value, HandlerFailure> {
        Ok(serde_json::json!({"success": true, "result": command}))
    }
}

fn run_lines(source: &str) -> (rexus::RunOutcome, Vec<String>) {
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (outcome, output) = runner.run_collect().unwrap();
    (outcome, output.lines().map(str::to_owned).collect())
}

#[test]
fn signal_on_error_and_error_line() {
    let source = "\
LET x = 0
SIGNAL ON ERROR NAME ERR
LET y = 10 / x
SAY \"unreachable\"
ERR:
SAY \"caught line=\" ERROR_LINE()
EXIT 0";
    let (outcome, lines) = run_lines(source);
    assert_eq!(lines, vec!["caught line=3"]);
    assert_eq!(outcome.exit_code, 0);
}

#[test]
fn sigl_matches_the_raising_line() {
    let source = "\
LET x = 0
SIGNAL ON ERROR NAME ERR
LET y = 10 / x
ERR:
SAY SIGL";
    let (_, lines) = run_lines(source);
    assert_eq!(lines, vec!["3"]);
}

#[test]
fn do_over_one_indexed_collection() {
    let source = "\
LET json = '{\"1\":\"a\",\"2\":\"b\",\"3\":\"c\"}'
LET coll = json
DO v OVER coll
SAY v
END
SAY v";
    let (_, lines) = run_lines(source);
    assert_eq!(lines, vec!["a", "b", "c", "c"]);
}

#[test]
fn address_dispatch_sets_rc_and_result() {
    let source = "\
ADDRESS sql
\"SELECT 1\"
SAY RC RESULT.result";
    let mut runner = Runner::new(source, "test.rexx").unwrap();
    runner
        .register_address_target("sql", Rc::new(EchoHandler), [], LibraryMetadata::default())
        .unwrap();
    let (outcome, output) = runner.run_collect().unwrap();
    assert_eq!(output, "0 SELECT 1\n");
    assert_eq!(outcome.exit_code, 0);
}

#[test]
fn interpret_classic_vs_isolated() {
    let source = "\
LET a = 1
INTERPRET \"LET a = a + 1\"
SAY a
INTERPRET ISOLATED IMPORT(a) \"LET a = 99\"
SAY a";
    let (_, lines) = run_lines(source);
    assert_eq!(lines, vec!["2", "2"]);
}

#[test]
fn call_populates_result() {
    let source = "\
CALL add 2 3
SAY RESULT
EXIT
add:
  PARSE ARG x, y
  RETURN x + y";
    let (outcome, lines) = run_lines(source);
    assert_eq!(lines, vec!["5"]);
    assert_eq!(outcome.exit_code, 0);
}

#[test]
fn numeric_digits_limits_precision() {
    let source = "\
NUMERIC DIGITS 3
SAY 1/3";
    let (_, lines) = run_lines(source);
    assert_eq!(lines, vec!["0.333"]);
}

#[test]
fn runs_are_deterministic() {
    let source = "\
LET total = 0
DO i = 1 TO 5
LET total = total + i * i
END
SAY total
PUSH \"x\"
SAY QUEUED()";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, first) = runner.run_collect().unwrap();
    let (_, second) = runner.run_collect().unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "55\n1\n");
}
