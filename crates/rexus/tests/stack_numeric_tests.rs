//! PUSH/PULL/QUEUE semantics and NUMERIC settings.

use pretty_assertions::assert_eq;
use rexus::{ErrorKind, Runner};

fn run_lines(source: &str) -> Vec<String> {
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    output.lines().map(str::to_owned).collect()
}

#[test]
fn push_then_pull_is_lifo() {
    let source = "\
PUSH \"first\"
PUSH \"second\"
PULL a
PULL b
SAY a
SAY b";
    assert_eq!(run_lines(source), vec!["second", "first"]);
}

#[test]
fn queue_reads_fifo_from_the_bottom() {
    let source = "\
QUEUE \"one\"
QUEUE \"two\"
PULL a
SAY a";
    assert_eq!(run_lines(source), vec!["one"]);
}

#[test]
fn push_beats_queue_at_the_top() {
    let source = "\
QUEUE \"bottom\"
PUSH \"top\"
PULL a
PULL b
SAY a b";
    assert_eq!(run_lines(source), vec!["top bottom"]);
}

#[test]
fn empty_pull_yields_the_empty_string() {
    let source = "\
PULL a
SAY LENGTH(a)";
    assert_eq!(run_lines(source), vec!["0"]);
}

#[test]
fn queued_reports_the_depth() {
    let source = "\
SAY QUEUED()
PUSH 1
QUEUE 2
SAY QUEUED()
PULL x
SAY QUEUED()";
    assert_eq!(run_lines(source), vec!["0", "2", "1"]);
}

#[test]
fn pull_with_template_splits_words() {
    let source = "\
PUSH \"alpha beta gamma delta\"
PULL a b rest
SAY a
SAY b
SAY rest";
    assert_eq!(run_lines(source), vec!["alpha", "beta", "gamma delta"]);
}

#[test]
fn parse_var_splits_a_variable() {
    let source = "\
LET line = \"GET /index.html HTTP/1.1\"
PARSE VAR line verb path rest
SAY verb
SAY path
SAY rest";
    assert_eq!(run_lines(source), vec!["GET", "/index.html", "HTTP/1.1"]);
}

#[test]
fn pulled_values_keep_their_type() {
    let source = "\
PUSH 41
PULL n
SAY n + 1";
    assert_eq!(run_lines(source), vec!["42"]);
}

#[test]
fn numeric_digits_round_arithmetic_results() {
    let source = "\
NUMERIC DIGITS 5
SAY 2/3";
    assert_eq!(run_lines(source), vec!["0.66667"]);
}

#[test]
fn numeric_digits_persist_across_subroutines() {
    // NUMERIC scope is interpreter-wide, not lexically restored
    let source = "\
CALL narrow
SAY 1/3
EXIT
narrow:
NUMERIC DIGITS 3
RETURN";
    assert_eq!(run_lines(source), vec!["0.333"]);
}

#[test]
fn numeric_fuzz_loosens_comparison() {
    let source = "\
NUMERIC DIGITS 5
NUMERIC FUZZ 3
IF 100.4 = 100.3 THEN SAY \"equal\"
ELSE SAY \"different\"";
    assert_eq!(run_lines(source), vec!["equal"]);
}

#[test]
fn numeric_form_engineering() {
    let source = "\
NUMERIC DIGITS 3
NUMERIC FORM ENGINEERING
SAY 12345 * 1";
    assert_eq!(run_lines(source), vec!["12.3E+3"]);
}

#[test]
fn invalid_numeric_settings_raise_numeric_errors() {
    let runner = Runner::new("NUMERIC DIGITS 0", "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Numeric);

    let runner = Runner::new("NUMERIC FUZZ 9", "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Numeric);
}

#[test]
fn division_by_zero_is_numeric() {
    let runner = Runner::new("SAY 1/0", "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Numeric);
    assert_eq!(err.line, Some(1));
}
