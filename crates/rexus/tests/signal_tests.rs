//! SIGNAL: unconditional jumps, condition traps, and error context capture.

use pretty_assertions::assert_eq;
use rexus::{ErrorKind, Runner};

fn run_lines(source: &str) -> Vec<String> {
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    output.lines().map(str::to_owned).collect()
}

#[test]
fn bare_signal_jumps_and_sets_sigl() {
    let source = "\
SIGNAL skip
SAY \"never\"
skip:
SAY \"after\"
SAY SIGL";
    assert_eq!(run_lines(source), vec!["after", "1"]);
}

#[test]
fn signal_jump_abandons_active_loops() {
    let source = "\
DO i = 1 TO 10
IF i = 2 THEN SIGNAL out
SAY i
END
out:
SAY \"out\"";
    assert_eq!(run_lines(source), vec!["1", "out"]);
}

#[test]
fn trap_populates_rc_errortext_and_sigl() {
    let source = "\
SIGNAL ON ERROR NAME handler
LET x = 1 / 0
handler:
SAY RC
SAY SIGL
SAY ERRORTEXT";
    let lines = run_lines(source);
    assert_eq!(lines[0], "1");
    assert_eq!(lines[1], "2");
    assert!(lines[2].contains("division by zero"), "got {:?}", lines[2]);
}

#[test]
fn error_message_builtin_reads_the_context() {
    let source = "\
SIGNAL ON ERROR NAME handler
LET x = 1 / 0
handler:
SAY ERROR_MESSAGE()";
    let lines = run_lines(source);
    assert!(lines[0].contains("division by zero"));
}

#[test]
fn fired_trap_is_disabled_inside_its_handler() {
    // the second failure must not re-enter the handler
    let source = "\
SIGNAL ON ERROR NAME handler
LET x = 1 / 0
handler:
SAY \"in handler\"
LET y = 2 / 0";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Numeric);
    assert_eq!(err.line, Some(5));
}

#[test]
fn signal_on_rearms_a_fired_trap() {
    let source = "\
SIGNAL ON ERROR NAME handler
LET tries = 0
LET x = 1 / 0
done:
SAY tries
EXIT 0
handler:
LET tries = tries + 1
IF tries < 2 THEN DO
SIGNAL ON ERROR NAME handler
LET x = 1 / 0
END
SIGNAL done";
    assert_eq!(run_lines(source), vec!["2"]);
}

#[test]
fn signal_off_clears_a_trap() {
    let source = "\
SIGNAL ON ERROR NAME handler
SIGNAL OFF ERROR
LET x = 1 / 0
handler:
SAY \"handled\"";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Numeric);
}

#[test]
fn novalue_trap_fires_on_uninitialised_read() {
    let source = "\
SIGNAL ON NOVALUE NAME nov
SAY missing
SAY \"unreachable\"
nov:
SAY \"caught\"
EXIT 0";
    assert_eq!(run_lines(source), vec!["caught"]);
}

#[test]
fn without_novalue_trap_absent_reads_as_name() {
    assert_eq!(run_lines("SAY missing"), vec!["MISSING"]);
}

#[test]
fn signal_on_requires_an_existing_label() {
    let runner = Runner::new("SIGNAL ON ERROR NAME nowhere", "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn recognizable_error_terminates_gracefully_when_a_trap_was_configured() {
    let source = "\
SIGNAL ON ERROR NAME handler
nosuchfunc()
handler:
nosuchagain()";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (outcome, _) = runner.run_collect().unwrap();
    assert_eq!(outcome.exit_code, 1);
    let message = outcome.error.expect("graceful termination message");
    assert!(message.contains("NOSUCHAGAIN"), "got {message}");
}

#[test]
fn unrecognizable_error_without_traps_propagates() {
    let runner = Runner::new("nosuchfunc()", "test.rexx").unwrap();
    let err = runner.run_collect().unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingFunction);
    assert_eq!(err.line, Some(1));
    assert_eq!(err.filename.as_deref(), Some("test.rexx"));
}
