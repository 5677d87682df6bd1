//! Expression shapes produced by the parser and the pure parts of their
//! evaluation.
//!
//! Operator application and interpolation live here because they only need
//! values and NUMERIC settings; resolving variables, function calls, and
//! ADDRESS methods needs engine state and happens in the interpreter.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    error::{RexxError, RunResult},
    numeric::NumericSettings,
    value::Value,
};

/// Quote style of a string literal. Double-quoted strings interpolate
/// placeholders; single-quoted strings are taken verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteKind {
    Double,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Remainder,
    Power,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOp {
    /// True for the operators that require numeric operands.
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::IntegerDivide | Self::Remainder | Self::Power
        )
    }
}

/// One argument in a function call; named arguments are converted to
/// positional order by the registry's conversion table before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub expr: Expr,
}

impl Arg {
    #[must_use]
    pub fn positional(expr: Expr) -> Self {
        Self { name: None, expr }
    }
}

/// An expression as produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A quoted string; `quote` decides whether interpolation applies.
    StringLit { value: String, quote: QuoteKind },
    NumberLit(f64),
    /// A variable reference; dotted names resolve through compound keys and
    /// structured values.
    Var(String),
    FunctionCall { name: String, args: Vec<Arg> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Explicit `||` concatenation. Adjacency is resolved by the parser, so
    /// the engine only ever sees this form.
    Concat(Vec<Expr>),
}

impl Expr {
    /// The bare variable name this expression reads, if it is a plain
    /// reference. Used for ADDRESS method dispatch on assignment sources.
    #[must_use]
    pub fn bare_name(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            _ => None,
        }
    }
}

/// Applies a unary operator to a value.
pub fn apply_unary(op: UnaryOp, operand: &Value, settings: &NumericSettings) -> RunResult<Value> {
    match op {
        UnaryOp::Minus => {
            let n = require_number(operand, settings, "prefix -")?;
            Ok(Value::Number(settings.apply(-n)))
        }
        UnaryOp::Plus => {
            let n = require_number(operand, settings, "prefix +")?;
            Ok(Value::Number(settings.apply(n)))
        }
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy(settings))),
    }
}

/// Applies a binary operator under REXX rules.
///
/// Arithmetic requires both operands to parse as numbers and rounds the
/// result to the active DIGITS. Comparison is numeric when both operands are
/// numeric, string comparison otherwise. Logical operators use truthiness.
pub fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value, settings: &NumericSettings) -> RunResult<Value> {
    if op.is_arithmetic() {
        let a = require_number(lhs, settings, operator_text(op))?;
        let b = require_number(rhs, settings, operator_text(op))?;
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    return Err(RexxError::numeric("division by zero"));
                }
                a / b
            }
            BinaryOp::IntegerDivide => {
                if b == 0.0 {
                    return Err(RexxError::numeric("integer division by zero"));
                }
                (a / b).trunc()
            }
            BinaryOp::Remainder => {
                if b == 0.0 {
                    return Err(RexxError::numeric("remainder by zero"));
                }
                a % b
            }
            BinaryOp::Power => a.powf(b),
            _ => unreachable!("non-arithmetic op filtered above"),
        };
        if !result.is_finite() {
            return Err(RexxError::numeric(format!("arithmetic overflow in {}", operator_text(op))));
        }
        return Ok(Value::Number(settings.apply(result)));
    }

    match op {
        BinaryOp::Equal => Ok(Value::Bool(lhs.compare(rhs, settings) == Ordering::Equal)),
        BinaryOp::NotEqual => Ok(Value::Bool(lhs.compare(rhs, settings) != Ordering::Equal)),
        BinaryOp::Less => Ok(Value::Bool(lhs.compare(rhs, settings) == Ordering::Less)),
        BinaryOp::LessOrEqual => Ok(Value::Bool(lhs.compare(rhs, settings) != Ordering::Greater)),
        BinaryOp::Greater => Ok(Value::Bool(lhs.compare(rhs, settings) == Ordering::Greater)),
        BinaryOp::GreaterOrEqual => Ok(Value::Bool(lhs.compare(rhs, settings) != Ordering::Less)),
        BinaryOp::And => Ok(Value::Bool(lhs.is_truthy(settings) && rhs.is_truthy(settings))),
        BinaryOp::Or => Ok(Value::Bool(lhs.is_truthy(settings) || rhs.is_truthy(settings))),
        _ => unreachable!("arithmetic op filtered above"),
    }
}

fn require_number(value: &Value, settings: &NumericSettings, context: &str) -> RunResult<f64> {
    value.as_number().ok_or_else(|| {
        RexxError::numeric(format!(
            "non-numeric operand \"{}\" for {context}",
            value.string_form(settings)
        ))
    })
}

fn operator_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::IntegerDivide => "%",
        BinaryOp::Remainder => "//",
        BinaryOp::Power => "**",
        BinaryOp::Equal => "=",
        BinaryOp::NotEqual => "\\=",
        BinaryOp::Less => "<",
        BinaryOp::LessOrEqual => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterOrEqual => ">=",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
    }
}

/// Placeholder delimiters for string interpolation inside double-quoted
/// strings. The engine consumes the resolved placeholder name; the syntax is
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpolationConfig {
    start: String,
    end: String,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            start: "{".to_owned(),
            end: "}".to_owned(),
        }
    }
}

impl InterpolationConfig {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Replaces each delimited placeholder with the resolver's output.
    ///
    /// Text without delimiters is returned unchanged; an unterminated
    /// placeholder is kept verbatim.
    pub fn interpolate<F>(&self, text: &str, mut resolve: F) -> RunResult<String>
    where
        F: FnMut(&str) -> RunResult<String>,
    {
        if !text.contains(self.start.as_str()) {
            return Ok(text.to_owned());
        }
        let mut output = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start_at) = rest.find(self.start.as_str()) {
            output.push_str(&rest[..start_at]);
            let after_start = &rest[start_at + self.start.len()..];
            let Some(end_at) = after_start.find(self.end.as_str()) else {
                output.push_str(&rest[start_at..]);
                return Ok(output);
            };
            let name = &after_start[..end_at];
            output.push_str(&resolve(name)?);
            rest = &after_start[end_at + self.end.len()..];
        }
        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn settings() -> NumericSettings {
        NumericSettings::default()
    }

    #[test]
    fn arithmetic_rounds_to_digits() {
        let mut s = NumericSettings::default();
        s.set_digits(3).unwrap();
        let result = apply_binary(BinaryOp::Divide, &Value::Number(1.0), &Value::Number(3.0), &s).unwrap();
        assert_eq!(result, Value::Number(0.333));
    }

    #[test]
    fn division_by_zero_is_a_numeric_error() {
        let err = apply_binary(BinaryOp::Divide, &Value::Number(1.0), &Value::Number(0.0), &settings()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Numeric);
    }

    #[test]
    fn remainder_keeps_dividend_sign() {
        let result = apply_binary(BinaryOp::Remainder, &Value::Number(-7.0), &Value::Number(2.0), &settings()).unwrap();
        assert_eq!(result, Value::Number(-1.0));
    }

    #[test]
    fn interpolation_replaces_placeholders() {
        let config = InterpolationConfig::default();
        let result = config
            .interpolate("hello {name}!", |name| Ok(name.to_uppercase()))
            .unwrap();
        assert_eq!(result, "hello NAME!");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let config = InterpolationConfig::default();
        let result = config.interpolate("open {name", |_| Ok(String::new())).unwrap();
        assert_eq!(result, "open {name");
    }
}
