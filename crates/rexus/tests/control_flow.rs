//! IF / SELECT / DO semantics.

use pretty_assertions::assert_eq;
use rexus::{ErrorKind, Limits, Runner};

fn run_lines(source: &str) -> Vec<String> {
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    output.lines().map(str::to_owned).collect()
}

fn run_error(source: &str) -> rexus::RexxError {
    let runner = Runner::new(source, "test.rexx").unwrap();
    runner.run_collect().unwrap_err()
}

#[test]
fn if_then_else_blocks() {
    let source = "\
LET x = 5
IF x > 1 THEN DO
SAY \"big\"
END
ELSE DO
SAY \"small\"
END";
    assert_eq!(run_lines(source), vec!["big"]);
}

#[test]
fn if_single_statement_else() {
    let source = "\
LET x = 0
IF x THEN SAY \"yes\"
ELSE SAY \"no\"";
    assert_eq!(run_lines(source), vec!["no"]);
}

#[test]
fn select_first_true_when_wins() {
    let source = "\
LET x = 2
SELECT
WHEN x = 1 THEN SAY \"one\"
WHEN x = 2 THEN SAY \"two\"
WHEN x > 0 THEN SAY \"positive\"
OTHERWISE
SAY \"other\"
END";
    assert_eq!(run_lines(source), vec!["two"]);
}

#[test]
fn select_falls_through_to_otherwise() {
    let source = "\
LET x = 9
SELECT
WHEN x = 1 THEN SAY \"one\"
OTHERWISE
SAY \"other\"
END";
    assert_eq!(run_lines(source), vec!["other"]);
}

#[test]
fn do_range_iterates_inclusive() {
    let source = "\
DO i = 1 TO 3
SAY i
END";
    assert_eq!(run_lines(source), vec!["1", "2", "3"]);
}

#[test]
fn do_range_with_step_counts_correctly() {
    // sign(s)*(b-a) >= 0 with s=3: floor(9/3)+1 = 4 iterations
    let source = "\
LET n = 0
DO i = 1 TO 10 BY 3
LET n = n + 1
END
SAY n";
    assert_eq!(run_lines(source), vec!["4"]);
}

#[test]
fn do_range_negative_step() {
    let source = "\
DO i = 3 TO 1 BY -1
SAY i
END";
    assert_eq!(run_lines(source), vec!["3", "2", "1"]);
}

#[test]
fn do_range_restores_preexisting_control_variable() {
    let source = "\
LET i = 99
DO i = 1 TO 3
END
SAY i";
    assert_eq!(run_lines(source), vec!["99"]);
}

#[test]
fn do_range_keeps_final_value_for_new_variable() {
    // the control variable holds the first value that failed the test
    let source = "\
DO i = 1 TO 3
END
SAY i";
    assert_eq!(run_lines(source), vec!["4"]);
}

#[test]
fn do_step_zero_is_an_error() {
    let err = run_error("DO i = 1 TO 3 BY 0\nEND");
    assert_eq!(err.kind, ErrorKind::LoopInvariant);
}

#[test]
fn do_while_respects_the_iteration_cap() {
    let source = "\
LET n = 0
DO WHILE 1
LET n = n + 1
END";
    let mut runner = Runner::new(source, "test.rexx").unwrap();
    runner.set_limits(Limits {
        max_while_iterations: 5,
        ..Limits::default()
    });
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::LoopInvariant);
}

#[test]
fn do_while_stops_when_condition_turns_false() {
    let source = "\
LET n = 0
DO WHILE n < 3
LET n = n + 1
END
SAY n";
    assert_eq!(run_lines(source), vec!["3"]);
}

#[test]
fn do_forever_exits_via_signal() {
    let source = "\
LET n = 0
DO FOREVER
LET n = n + 1
IF n = 3 THEN SIGNAL out
END
out:
SAY n";
    assert_eq!(run_lines(source), vec!["3"]);
}

#[test]
fn do_forever_respects_the_iteration_cap() {
    let source = "\
DO FOREVER
END";
    let mut runner = Runner::new(source, "test.rexx").unwrap();
    runner.set_limits(Limits {
        max_while_iterations: 5,
        ..Limits::default()
    });
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::LoopInvariant);
}

#[test]
fn do_forever_returns_out_of_a_subroutine() {
    let source = "\
CALL scan
SAY RESULT
EXIT
scan:
LET i = 0
DO FOREVER
LET i = i + 1
IF i = 4 THEN RETURN i
END";
    assert_eq!(run_lines(source), vec!["4"]);
}

#[test]
fn do_repeat_runs_a_fixed_count() {
    let source = "\
DO 3
SAY \"tick\"
END";
    assert_eq!(run_lines(source), vec!["tick", "tick", "tick"]);
}

#[test]
fn do_repeat_rejects_negative_counts() {
    let err = run_error("DO -1\nEND");
    assert_eq!(err.kind, ErrorKind::LoopInvariant);
}

#[test]
fn do_over_string_iterates_characters() {
    let source = "\
DO c OVER \"ab\"
SAY c
END";
    assert_eq!(run_lines(source), vec!["a", "b"]);
}

#[test]
fn return_bubbles_out_of_nested_blocks() {
    let source = "\
CALL find
SAY RESULT
EXIT
find:
DO i = 1 TO 10
IF i = 4 THEN RETURN i
END
RETURN 0";
    assert_eq!(run_lines(source), vec!["4"]);
}

#[test]
fn exit_terminates_from_inside_a_loop() {
    let source = "\
DO i = 1 TO 10
IF i = 2 THEN EXIT 7
SAY i
END";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (outcome, output) = runner.run_collect().unwrap();
    assert_eq!(output, "1\n");
    assert_eq!(outcome.exit_code, 7);
}
