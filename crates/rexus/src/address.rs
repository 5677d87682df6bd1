//! The ADDRESS subsystem: a registry of named command targets and the
//! dispatch rules for command strings and method calls.
//!
//! A target owns a handler and an optional method set. Commands (bare quoted
//! strings, heredocs, `ADDRESS target expr`) go to the handler of the active
//! target; bare names in an active ADDRESS context may dispatch as method
//! calls after built-ins have had first refusal.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    loader::{AsClause, LibraryMetadata},
    value::Value,
};

/// The target in effect before any ADDRESS instruction: no handler, SAY-style
/// echo of commands.
pub const DEFAULT_TARGET: &str = "default";

/// Where a command was dispatched from, for handler diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceContext {
    pub filename: String,
    /// 1-based line of the dispatching instruction.
    pub line: u32,
    pub source_line: String,
}

/// The execution context passed to a handler: a clone of the variable store
/// plus the dispatch location. Handlers never mutate engine state directly;
/// writes travel back through `rexxVariables` in the outcome.
#[derive(Debug, Clone)]
pub struct AddressContext {
    pub variables: IndexMap<String, Value>,
    pub source: SourceContext,
}

/// A handler error: the command could not be executed at all (as opposed to
/// executing and reporting failure through the structured outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Becomes RC; negative codes raise FAILURE instead of ERROR.
    pub code: Option<i64>,
    pub message: String,
}

impl HandlerFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// A command target's handler.
///
/// The returned JSON value is either a plain value (treated as an opaque
/// RESULT with RC=0) or an object with the recognized keys `success`,
/// `errorCode`, `errorMessage`, and `rexxVariables`.
///
/// Handlers are synchronous from the engine's point of view; a host backed
/// by an async runtime blocks inside its implementation, and host-side
/// timeouts surface as [`HandlerFailure`].
pub trait AddressHandler {
    fn handle(&self, command: &str, context: &AddressContext) -> Result<serde_json::Value, HandlerFailure>;

    /// Method-call dispatch: a bare name matching the target's method set,
    /// invoked with an empty command payload. The default forwards the
    /// method name as the command string.
    fn handle_method(
        &self,
        method: &str,
        params: &[Value],
        context: &AddressContext,
    ) -> Result<serde_json::Value, HandlerFailure> {
        let _ = params;
        self.handle(method, context)
    }
}

/// A registered ADDRESS target record.
#[derive(Clone)]
pub struct AddressTarget {
    pub name: String,
    pub handler: Rc<dyn AddressHandler>,
    /// Names dispatchable as method calls on this target.
    pub methods: AHashSet<String>,
    pub metadata: LibraryMetadata,
}

impl std::fmt::Debug for AddressTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressTarget")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl AddressTarget {
    /// The registered spelling of a method, matched case-insensitively
    /// (the parser uppercases names; libraries register their own casing).
    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<&str> {
        if let Some(exact) = self.methods.get(name) {
            return Some(exact);
        }
        self.methods
            .iter()
            .find(|m| m.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.find_method(name).is_some()
    }
}

/// The handler registry: at most one handler per target name.
#[derive(Debug, Clone)]
pub struct AddressRegistry {
    targets: AHashMap<String, AddressTarget>,
    /// Targets whose commands do not overwrite RESULT; seeded with the
    /// test-framework convention.
    result_exclusions: AHashSet<String>,
}

impl Default for AddressRegistry {
    fn default() -> Self {
        let mut result_exclusions = AHashSet::new();
        result_exclusions.insert("expectations".to_owned());
        Self {
            targets: AHashMap::new(),
            result_exclusions,
        }
    }
}

impl AddressRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target, applying an optional AS rename.
    ///
    /// Target renames must be literal; regex AS clauses are forbidden for
    /// targets (they remain available for function registration). A second
    /// registration under the same name is rejected.
    pub fn register(&mut self, mut target: AddressTarget, as_clause: Option<&AsClause>) -> Result<(), String> {
        if let Some(clause) = as_clause {
            match clause {
                AsClause::Literal(name) => target.name.clone_from(name),
                AsClause::Prefix(_) | AsClause::Regex { .. } => {
                    return Err(format!(
                        "ADDRESS target {} cannot be renamed with a prefix or regex AS clause",
                        target.name
                    ));
                }
            }
        }
        let key = target.name.to_lowercase();
        if self.targets.contains_key(&key) {
            return Err(format!("ADDRESS target {} is already registered", target.name));
        }
        self.targets.insert(key, target);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AddressTarget> {
        self.targets.get(&name.to_lowercase())
    }

    /// Adds a target name to the RESULT exclusion set.
    pub fn suppress_result_for(&mut self, name: &str) {
        self.result_exclusions.insert(name.to_lowercase());
    }

    #[must_use]
    pub fn suppresses_result(&self, name: &str) -> bool {
        self.result_exclusions.contains(&name.to_lowercase())
    }
}

/// The engine-facing effect of one handler return value.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The RC to set: 0 on success, `errorCode` (default 1) on failure.
    pub rc: i64,
    /// The RESULT to set, unless the target suppresses it.
    pub result: Value,
    /// ERRORTEXT, set on failure only.
    pub errortext: Option<String>,
    /// Variables the handler asks the engine to set.
    pub variables: Vec<(String, Value)>,
}

/// Interprets a handler's raw return per the ADDRESS contract.
///
/// An object with a boolean `success` key is a structured outcome: RC comes
/// from `success`/`errorCode`, ERRORTEXT from `errorMessage`, variable writes
/// from `rexxVariables`, and RESULT is the whole object. Anything else is a
/// plain value: RC=0 and the value becomes an opaque RESULT.
#[must_use]
pub fn interpret_handler_value(raw: serde_json::Value) -> CommandOutcome {
    let serde_json::Value::Object(ref entries) = raw else {
        return plain(raw);
    };
    let Some(success) = entries.get("success").and_then(serde_json::Value::as_bool) else {
        return plain(raw);
    };

    let rc = if success {
        0
    } else {
        entries.get("errorCode").and_then(serde_json::Value::as_i64).unwrap_or(1)
    };
    let errortext = if success {
        None
    } else {
        entries
            .get("errorMessage")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    };
    let variables = entries
        .get("rexxVariables")
        .and_then(serde_json::Value::as_object)
        .map(|vars| {
            vars.iter()
                .map(|(name, value)| (name.clone(), Value::from_json(value.clone())))
                .collect()
        })
        .unwrap_or_default();

    CommandOutcome {
        rc,
        result: Value::from_json(raw),
        errortext,
        variables,
    }
}

fn plain(raw: serde_json::Value) -> CommandOutcome {
    CommandOutcome {
        rc: 0,
        result: Value::Opaque(raw),
        errortext: None,
        variables: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_value_sets_rc_zero() {
        let outcome = interpret_handler_value(json!("hello"));
        assert_eq!(outcome.rc, 0);
        assert_eq!(outcome.result, Value::Opaque(json!("hello")));
        assert_eq!(outcome.errortext, None);
    }

    #[test]
    fn structured_failure_carries_code_and_message() {
        let outcome = interpret_handler_value(json!({
            "success": false,
            "errorCode": 8,
            "errorMessage": "no such table",
        }));
        assert_eq!(outcome.rc, 8);
        assert_eq!(outcome.errortext.as_deref(), Some("no such table"));
    }

    #[test]
    fn structured_success_keeps_whole_object_as_result() {
        let outcome = interpret_handler_value(json!({"success": true, "rows": [1, 2]}));
        assert_eq!(outcome.rc, 0);
        let Value::Map(entries) = &outcome.result else {
            panic!("expected map result");
        };
        assert!(entries.contains_key("rows"));
    }

    #[test]
    fn rexx_variables_become_writes() {
        let outcome = interpret_handler_value(json!({
            "success": true,
            "rexxVariables": {"COUNT": 3},
        }));
        assert_eq!(outcome.variables, vec![("COUNT".to_owned(), Value::Number(3.0))]);
    }

    #[test]
    fn object_without_success_key_is_plain() {
        let outcome = interpret_handler_value(json!({"rows": []}));
        assert_eq!(outcome.rc, 0);
        assert!(matches!(outcome.result, Value::Opaque(_)));
    }
}
