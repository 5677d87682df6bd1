//! Parser failure modes surfaced through Runner::new.

use pretty_assertions::assert_eq;
use rexus::{ErrorKind, Runner};

fn parse_err(source: &str) -> rexus::RexxError {
    Runner::new(source, "bad.rexx").unwrap_err()
}

#[test]
fn if_without_then_fails() {
    let err = parse_err("IF x > 1\nSAY 1");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.line, Some(1));
    assert_eq!(err.filename.as_deref(), Some("bad.rexx"));
}

#[test]
fn do_without_end_fails() {
    let err = parse_err("DO\nSAY 1");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn select_requires_when_or_otherwise() {
    let err = parse_err("SELECT\nSAY 1\nEND");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn stray_end_fails() {
    let err = parse_err("END");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn unterminated_string_fails() {
    let err = parse_err("SAY \"oops");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn unterminated_heredoc_fails() {
    let err = parse_err("<<SQL\nSELECT 1");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn unknown_condition_fails() {
    let err = parse_err("SIGNAL ON BOGUS NAME h\nh:");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn error_message_carries_the_source_line() {
    let err = parse_err("LET x = 1\nIF x > 1\nSAY 1");
    let rendered = err.to_string();
    assert!(rendered.contains("IF x > 1"), "got {rendered}");
    assert!(rendered.contains("bad.rexx: 2"), "got {rendered}");
}

#[test]
fn semicolons_separate_statements_on_one_line() {
    let source = "LET a = 1; LET b = 2; SAY a + b";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    assert_eq!(output, "3\n");
}

#[test]
fn block_comments_may_span_lines() {
    let source = "\
/* a long
   header */
SAY 1 /* inline */ + 2";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    assert_eq!(output, "3\n");
}

#[test]
fn line_comments_are_ignored() {
    let source = "SAY 5 -- the answer, roughly";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    assert_eq!(output, "5\n");
}

#[test]
fn comment_markers_inside_strings_are_preserved() {
    let source = "SAY '5 -- not a comment'";
    let runner = Runner::new(source, "test.rexx").unwrap();
    let (_, output) = runner.run_collect().unwrap();
    assert_eq!(output, "5 -- not a comment\n");
}
