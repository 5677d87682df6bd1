use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Reserved variable updated with the return code of ADDRESS commands and
/// trapped errors.
pub const RC: &str = "RC";
/// Reserved variable holding the last ADDRESS or CALL result.
pub const RESULT: &str = "RESULT";
/// Reserved variable holding the message of the last trapped error.
pub const ERRORTEXT: &str = "ERRORTEXT";
/// Reserved variable holding the source line of the last SIGNAL trigger.
pub const SIGL: &str = "SIGL";

/// The variable store: scalars and compound (`STEM.TAIL`) names in one flat,
/// insertion-ordered mapping.
///
/// Names are normalized to uppercase, the REXX canonical form, which makes
/// lookup case-insensitive. Compound names are stored as flat keys; dotted
/// resolution additionally walks into structured values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableStore {
    vars: IndexMap<String, Value>,
    /// CALL-time arguments of the currently executing subroutine or script.
    argv: Vec<Value>,
}

fn normalize(name: &str) -> String {
    name.to_uppercase()
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a variable.
    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(normalize(name), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(&normalize(name))
    }

    /// The value of a variable, or `Absent` with the uppercased name when it
    /// was never assigned.
    #[must_use]
    pub fn get_or_absent(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_else(|| Value::Absent(normalize(name)))
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(&normalize(name))
    }

    pub fn delete(&mut self, name: &str) -> Option<Value> {
        self.vars.shift_remove(&normalize(name))
    }

    /// Resolves a dotted name like `A.B.C`.
    ///
    /// The longest prefix stored as a flat key wins (compound variables are
    /// flat keys), and any remaining segments are walked into the value:
    /// mapping keys or sequence indices.
    #[must_use]
    pub fn resolve_dotted(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get(name) {
            return Some(value.clone());
        }
        let segments: Vec<&str> = name.split('.').collect();
        for split in (1..segments.len()).rev() {
            let prefix = segments[..split].join(".");
            let Some(base) = self.get(&prefix) else {
                continue;
            };
            let mut current = base.clone();
            for segment in &segments[split..] {
                current = current.get_segment(segment)?;
            }
            return Some(current);
        }
        None
    }

    /// Copies of all variables under their canonical names, for error
    /// contexts and ADDRESS handler snapshots.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.vars.clone()
    }

    #[must_use]
    pub fn argv(&self) -> &[Value] {
        &self.argv
    }

    pub fn set_argv(&mut self, argv: Vec<Value>) {
        self.argv = argv;
    }

    /// Swaps in a callee's argv, returning the caller's for restoration.
    pub fn replace_argv(&mut self, argv: Vec<Value>) -> Vec<Value> {
        std::mem::replace(&mut self.argv, argv)
    }

    pub fn set_rc(&mut self, rc: i64) {
        self.set(RC, Value::Number(rc as f64));
    }

    /// Sets RESULT, or drops it when the operation produced no value
    /// (REXX drops RESULT after a valueless RETURN).
    pub fn set_result(&mut self, result: Option<Value>) {
        match result {
            Some(value) => self.set(RESULT, value),
            None => {
                self.delete(RESULT);
            }
        }
    }

    pub fn set_errortext(&mut self, text: &str) {
        self.set(ERRORTEXT, Value::Str(text.to_owned()));
    }

    pub fn set_sigl(&mut self, line: u32) {
        self.set(SIGL, Value::Number(f64::from(line)));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut store = VariableStore::new();
        store.set("Greeting", Value::Str("hi".into()));
        assert_eq!(store.get("GREETING"), Some(&Value::Str("hi".into())));
        assert_eq!(store.get("greeting"), Some(&Value::Str("hi".into())));
        assert!(store.has("gReEtInG"));
    }

    #[test]
    fn absent_carries_uppercased_name() {
        let store = VariableStore::new();
        assert_eq!(store.get_or_absent("missing"), Value::Absent("MISSING".into()));
    }

    #[test]
    fn compound_names_are_flat_keys() {
        let mut store = VariableStore::new();
        store.set("STEM.TAIL", Value::Number(1.0));
        assert_eq!(store.resolve_dotted("stem.tail"), Some(Value::Number(1.0)));
    }

    #[test]
    fn dotted_resolution_walks_structured_values() {
        let mut store = VariableStore::new();
        let value = Value::try_parse_json(r#"{"inner": {"leaf": 7}}"#).unwrap();
        store.set("obj", value);
        assert_eq!(store.resolve_dotted("obj.inner.leaf"), Some(Value::Number(7.0)));
        assert_eq!(store.resolve_dotted("obj.inner.gone"), None);
    }
}
