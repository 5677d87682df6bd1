//! The function-call surface: built-ins, externally registered functions,
//! and the named-to-positional argument conversion table.
//!
//! Built-ins that only need their arguments live here as plain functions.
//! The handful that read engine state (ERROR_LINE, ERROR_MESSAGE, QUEUED,
//! RESULT) are resolved by the interpreter before this registry is consulted,
//! so resolution order stays: special variable, built-in, external function,
//! ADDRESS method, variable store.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    numeric::NumericSettings,
    value::Value,
};

/// A pure built-in: arguments in, value out, message on misuse.
pub type BuiltinFn = fn(&[Value], &NumericSettings) -> Result<Value, String>;

/// A host-registered function. `Rc` keeps the registry cheaply clonable for
/// isolated INTERPRET children; the engine is single-threaded by contract.
pub type ExternalFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// Positional parameter order for functions that accept named arguments.
///
/// Keyed on the uppercased function name; names not listed only take
/// positional arguments.
#[must_use]
pub fn param_order(name: &str) -> Option<&'static [&'static str]> {
    Some(match name {
        "SUBSTR" => &["STRING", "START", "LENGTH"],
        "POS" => &["NEEDLE", "HAYSTACK", "START"],
        "WORD" => &["STRING", "N"],
        "COPIES" => &["STRING", "COUNT"],
        "LEFT" | "RIGHT" => &["STRING", "LENGTH", "PAD"],
        "SPACE" => &["STRING", "N"],
        _ => return None,
    })
}

/// Reorders a mixed named/positional argument list into positional order.
///
/// Positional arguments keep their slots; named arguments are placed by the
/// conversion table. Unknown names and named arguments for functions without
/// a table entry are rejected.
pub fn convert_named_args(name: &str, args: Vec<(Option<String>, Value)>) -> Result<Vec<Value>, String> {
    if args.iter().all(|(n, _)| n.is_none()) {
        return Ok(args.into_iter().map(|(_, v)| v).collect());
    }
    let Some(order) = param_order(name) else {
        return Err(format!("function {name} does not accept named arguments"));
    };
    let mut slots: Vec<Option<Value>> = vec![None; order.len()];
    let mut next_positional = 0;
    for (arg_name, value) in args {
        match arg_name {
            Some(arg_name) => {
                let upper = arg_name.to_uppercase();
                let Some(slot) = order.iter().position(|p| *p == upper) else {
                    return Err(format!("unknown parameter {arg_name} for function {name}"));
                };
                slots[slot] = Some(value);
            }
            None => {
                while next_positional < slots.len() && slots[next_positional].is_some() {
                    next_positional += 1;
                }
                if next_positional >= slots.len() {
                    return Err(format!("too many arguments for function {name}"));
                }
                slots[next_positional] = Some(value);
            }
        }
    }
    // Trim trailing omitted parameters, reject holes.
    while slots.last().is_some_and(Option::is_none) {
        slots.pop();
    }
    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| format!("missing argument for function {name}")))
        .collect()
}

/// Registry of callable functions visible to expression evaluation.
///
/// Built-ins are resolved by a static match so they always win over external
/// registrations of the same name, preserving composability with ADDRESS
/// method dispatch.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    external: AHashMap<String, ExternalFn>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("external", &self.external.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a host function under the given (already renamed) name.
    pub fn register(&mut self, name: &str, function: ExternalFn) {
        self.external.insert(name.to_uppercase(), function);
    }

    #[must_use]
    pub fn is_builtin(name: &str) -> bool {
        builtin(&name.to_uppercase()).is_some()
    }

    #[must_use]
    pub fn has_external(&self, name: &str) -> bool {
        self.external.contains_key(&name.to_uppercase())
    }

    #[must_use]
    pub fn external(&self, name: &str) -> Option<&ExternalFn> {
        self.external.get(&name.to_uppercase())
    }

    /// Calls a built-in if one exists under this name.
    pub fn call_builtin(name: &str, args: &[Value], settings: &NumericSettings) -> Option<Result<Value, String>> {
        builtin(&name.to_uppercase()).map(|f| f(args, settings))
    }
}

fn builtin(upper: &str) -> Option<BuiltinFn> {
    Some(match upper {
        "LENGTH" => length,
        "UPPER" => upper_fn,
        "LOWER" => lower,
        "SUBSTR" => substr,
        "POS" => pos,
        "WORD" => word,
        "WORDS" => words,
        "STRIP" => strip,
        "SPACE" => space,
        "COPIES" => copies,
        "REVERSE" => reverse,
        "LEFT" => left,
        "RIGHT" => right,
        "ABS" => abs,
        "MAX" => max,
        "MIN" => min,
        "DATATYPE" => datatype,
        _ => return None,
    })
}

fn arg_str(args: &[Value], index: usize, name: &str, settings: &NumericSettings) -> Result<String, String> {
    args.get(index)
        .map(|v| v.string_form(settings).into_owned())
        .ok_or_else(|| format!("{name} requires at least {} argument(s)", index + 1))
}

fn arg_num(args: &[Value], index: usize, name: &str) -> Result<f64, String> {
    let value = args.get(index).ok_or_else(|| format!("{name} requires at least {} argument(s)", index + 1))?;
    value
        .as_number()
        .ok_or_else(|| format!("{name} argument {} must be numeric", index + 1))
}

fn length(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "LENGTH", settings)?;
    Ok(Value::Number(s.chars().count() as f64))
}

fn upper_fn(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    Ok(Value::Str(arg_str(args, 0, "UPPER", settings)?.to_uppercase()))
}

fn lower(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    Ok(Value::Str(arg_str(args, 0, "LOWER", settings)?.to_lowercase()))
}

/// SUBSTR(string, start[, length]) with REXX 1-based indexing; out-of-range
/// spans are padded with nothing (the short result is returned).
fn substr(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "SUBSTR", settings)?;
    let start = arg_num(args, 1, "SUBSTR")? as usize;
    if start == 0 {
        return Err("SUBSTR start must be at least 1".to_owned());
    }
    let chars: Vec<char> = s.chars().collect();
    let from = (start - 1).min(chars.len());
    let taken: String = match args.get(2) {
        Some(len_value) => {
            let len = len_value.as_number().ok_or("SUBSTR length must be numeric")? as usize;
            chars[from..].iter().take(len).collect()
        }
        None => chars[from..].iter().collect(),
    };
    Ok(Value::Str(taken))
}

/// POS(needle, haystack[, start]): 1-based position, 0 when not found.
fn pos(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let needle = arg_str(args, 0, "POS", settings)?;
    let haystack = arg_str(args, 1, "POS", settings)?;
    let start = match args.get(2) {
        Some(v) => (v.as_number().ok_or("POS start must be numeric")? as usize).max(1),
        None => 1,
    };
    let chars: Vec<char> = haystack.chars().collect();
    if needle.is_empty() || start > chars.len() {
        return Ok(Value::Number(0.0));
    }
    let tail: String = chars[start - 1..].iter().collect();
    match tail.find(&needle) {
        Some(byte_at) => {
            let char_at = tail[..byte_at].chars().count();
            Ok(Value::Number((start + char_at) as f64))
        }
        None => Ok(Value::Number(0.0)),
    }
}

fn word(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "WORD", settings)?;
    let n = arg_num(args, 1, "WORD")? as usize;
    if n == 0 {
        return Err("WORD index must be at least 1".to_owned());
    }
    Ok(Value::Str(s.split_whitespace().nth(n - 1).unwrap_or("").to_owned()))
}

fn words(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "WORDS", settings)?;
    Ok(Value::Number(s.split_whitespace().count() as f64))
}

fn strip(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "STRIP", settings)?;
    Ok(Value::Str(s.trim().to_owned()))
}

/// SPACE(string[, n]): collapse word gaps to `n` spaces (default 1).
fn space(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "SPACE", settings)?;
    let n = match args.get(1) {
        Some(v) => v.as_number().ok_or("SPACE count must be numeric")? as usize,
        None => 1,
    };
    let separator = " ".repeat(n);
    Ok(Value::Str(s.split_whitespace().collect::<Vec<_>>().join(&separator)))
}

fn copies(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "COPIES", settings)?;
    let n = arg_num(args, 1, "COPIES")?;
    if n < 0.0 {
        return Err("COPIES count must be non-negative".to_owned());
    }
    Ok(Value::Str(s.repeat(n as usize)))
}

fn reverse(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "REVERSE", settings)?;
    Ok(Value::Str(s.chars().rev().collect()))
}

fn left(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "LEFT", settings)?;
    let len = arg_num(args, 1, "LEFT")? as usize;
    let pad = pad_char(args, 2, settings)?;
    let mut chars: Vec<char> = s.chars().take(len).collect();
    while chars.len() < len {
        chars.push(pad);
    }
    Ok(Value::Str(chars.into_iter().collect()))
}

fn right(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "RIGHT", settings)?;
    let len = arg_num(args, 1, "RIGHT")? as usize;
    let pad = pad_char(args, 2, settings)?;
    let chars: Vec<char> = s.chars().collect();
    let mut taken: Vec<char> = chars[chars.len().saturating_sub(len)..].to_vec();
    while taken.len() < len {
        taken.insert(0, pad);
    }
    Ok(Value::Str(taken.into_iter().collect()))
}

fn pad_char(args: &[Value], index: usize, settings: &NumericSettings) -> Result<char, String> {
    match args.get(index) {
        Some(v) => v
            .string_form(settings)
            .chars()
            .next()
            .ok_or_else(|| "pad must be a single character".to_owned()),
        None => Ok(' '),
    }
}

fn abs(args: &[Value], _settings: &NumericSettings) -> Result<Value, String> {
    Ok(Value::Number(arg_num(args, 0, "ABS")?.abs()))
}

fn max(args: &[Value], _settings: &NumericSettings) -> Result<Value, String> {
    fold_numeric(args, "MAX", f64::max)
}

fn min(args: &[Value], _settings: &NumericSettings) -> Result<Value, String> {
    fold_numeric(args, "MIN", f64::min)
}

fn fold_numeric(args: &[Value], name: &str, combine: fn(f64, f64) -> f64) -> Result<Value, String> {
    if args.is_empty() {
        return Err(format!("{name} requires at least 1 argument"));
    }
    let mut best = arg_num(args, 0, name)?;
    for index in 1..args.len() {
        best = combine(best, arg_num(args, index, name)?);
    }
    Ok(Value::Number(best))
}

/// DATATYPE(value): "NUM" when the value parses as a REXX number, else "CHAR".
fn datatype(args: &[Value], settings: &NumericSettings) -> Result<Value, String> {
    let s = arg_str(args, 0, "DATATYPE", settings)?;
    let kind = if crate::numeric::parse_number(&s).is_some() { "NUM" } else { "CHAR" };
    Ok(Value::Str(kind.to_owned()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn settings() -> NumericSettings {
        NumericSettings::default()
    }

    fn call(name: &str, args: &[Value]) -> Value {
        FunctionRegistry::call_builtin(name, args, &settings()).unwrap().unwrap()
    }

    #[test]
    fn substr_is_one_based() {
        assert_eq!(
            call("SUBSTR", &["hello".into(), 2.0.into(), 3.0.into()]),
            Value::Str("ell".into())
        );
        assert_eq!(call("SUBSTR", &["hello".into(), 4.0.into()]), Value::Str("lo".into()));
    }

    #[test]
    fn pos_returns_zero_when_absent() {
        assert_eq!(call("POS", &["ll".into(), "hello".into()]), Value::Number(3.0));
        assert_eq!(call("POS", &["zz".into(), "hello".into()]), Value::Number(0.0));
    }

    #[test]
    fn word_extraction() {
        assert_eq!(call("WORD", &["one two three".into(), 2.0.into()]), Value::Str("two".into()));
        assert_eq!(call("WORDS", &["one two three".into()]), Value::Number(3.0));
    }

    #[test]
    fn named_args_convert_to_positional() {
        let converted = convert_named_args(
            "SUBSTR",
            vec![
                (Some("start".to_owned()), Value::Number(2.0)),
                (Some("string".to_owned()), Value::Str("hello".into())),
            ],
        )
        .unwrap();
        assert_eq!(converted, vec![Value::Str("hello".into()), Value::Number(2.0)]);
    }

    #[test]
    fn builtins_resolve_case_insensitively() {
        assert!(FunctionRegistry::is_builtin("length"));
        assert!(FunctionRegistry::is_builtin("LENGTH"));
        assert!(!FunctionRegistry::is_builtin("NOPE"));
    }
}
