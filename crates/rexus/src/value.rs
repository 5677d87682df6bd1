use std::borrow::Cow;
use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::numeric::{self, NumericSettings};

/// Primary value type representing REXX data at runtime.
///
/// REXX is a string language at heart: every value has a canonical string
/// form, and typed variants exist for the arithmetic fast path and for
/// structured data returned by ADDRESS handlers or parsed from JSON.
///
/// `Absent` represents an uninitialised variable; per REXX tradition its
/// string form is the uppercased variable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Number(f64),
    Bool(bool),
    /// Ordered sequence, indexable from DO OVER and dotted access.
    List(Vec<Value>),
    /// String-keyed mapping with insertion order preserved.
    Map(IndexMap<String, Value>),
    /// Handler-returned object kept in its JSON shape.
    Opaque(serde_json::Value),
    /// Uninitialised variable; carries the uppercased name.
    Absent(String),
}

impl Value {
    /// The canonical REXX string form of this value.
    ///
    /// Numbers are formatted under the active NUMERIC settings; booleans are
    /// "1"/"0"; structured values render as JSON.
    #[must_use]
    pub fn string_form(&self, settings: &NumericSettings) -> Cow<'_, str> {
        match self {
            Self::Str(s) => Cow::Borrowed(s),
            Self::Number(n) => Cow::Owned(numeric::format_number(*n, settings)),
            Self::Bool(b) => Cow::Borrowed(if *b { "1" } else { "0" }),
            Self::List(_) | Self::Map(_) => Cow::Owned(serde_json::to_string(&self.to_json()).unwrap_or_default()),
            Self::Opaque(json) => match json {
                serde_json::Value::String(s) => Cow::Borrowed(s),
                other => Cow::Owned(serde_json::to_string(other).unwrap_or_default()),
            },
            Self::Absent(name) => Cow::Borrowed(name),
        }
    }

    /// REXX truthiness: "0" and the empty string are false, "1" and any
    /// numerically non-zero value are true; non-numeric non-empty strings
    /// are true.
    #[must_use]
    pub fn is_truthy(&self, settings: &NumericSettings) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::Opaque(json) => !json.is_null(),
            Self::Str(_) | Self::Absent(_) => {
                let text = self.string_form(settings);
                if text.is_empty() {
                    return false;
                }
                match numeric::parse_number(&text) {
                    Some(n) => n != 0.0,
                    None => true,
                }
            }
        }
    }

    /// The numeric interpretation of this value, if it has one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(f64::from(*b)),
            Self::Str(s) => numeric::parse_number(s),
            Self::Opaque(serde_json::Value::Number(n)) => n.as_f64(),
            Self::Opaque(serde_json::Value::String(s)) => numeric::parse_number(s),
            _ => None,
        }
    }

    /// Ordered comparison under REXX rules: numeric comparison (with FUZZ
    /// digits ignored) when both operands parse as numbers, lexicographic
    /// comparison of string forms otherwise.
    #[must_use]
    pub fn compare(&self, other: &Self, settings: &NumericSettings) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return numeric::fuzzy_compare(a, b, settings);
        }
        self.string_form(settings).cmp(&other.string_form(settings))
    }

    /// Length as observed by built-ins and DO OVER: characters for strings,
    /// element count for sequences and mappings.
    #[must_use]
    pub fn len(&self, settings: &NumericSettings) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::Map(entries) => entries.len(),
            Self::Opaque(serde_json::Value::Array(items)) => items.len(),
            Self::Opaque(serde_json::Value::Object(entries)) => entries.len(),
            _ => self.string_form(settings).chars().count(),
        }
    }

    #[must_use]
    pub fn is_empty(&self, settings: &NumericSettings) -> bool {
        self.len(settings) == 0
    }

    /// Converts a JSON document into the closest REXX value.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Str(String::new()),
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Converts this value to JSON, the observation format for structured data.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or_else(|| serde_json::Value::String(n.to_string()), serde_json::Value::Number),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => {
                serde_json::Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            Self::Opaque(json) => json.clone(),
            Self::Absent(name) => serde_json::Value::String(name.clone()),
        }
    }

    /// Parses a string that syntactically looks like a JSON object or array
    /// into a structured value. Used by assignments whose source was not a
    /// quoted literal.
    #[must_use]
    pub fn try_parse_json(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return None;
        }
        serde_json::from_str::<serde_json::Value>(trimmed).ok().map(Self::from_json)
    }

    /// Looks up one dotted-path segment inside a structured value.
    ///
    /// Mapping segments match by key, exact first and case-insensitively
    /// otherwise (variable references uppercase their segments; handler
    /// objects keep their own casing). Sequence segments parse as indices.
    #[must_use]
    pub fn get_segment(&self, segment: &str) -> Option<Self> {
        match self {
            Self::Map(entries) => entries
                .get(segment)
                .or_else(|| {
                    entries
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(segment))
                        .map(|(_, value)| value)
                })
                .cloned(),
            Self::List(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index).cloned()
            }
            Self::Opaque(json) => match json {
                serde_json::Value::Object(entries) => entries
                    .get(segment)
                    .or_else(|| {
                        entries
                            .iter()
                            .find(|(key, _)| key.eq_ignore_ascii_case(segment))
                            .map(|(_, value)| value)
                    })
                    .cloned()
                    .map(Self::from_json),
                serde_json::Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    items.get(index).cloned().map(Self::from_json)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// The items DO OVER visits for this value.
    ///
    /// Sequences yield their elements and strings their characters. For
    /// mappings the indexing convention is heuristic: a `"1"` key without a
    /// `"0"` key means 1-based (iterate 1..=len), a `"0"` key means 0-based
    /// (iterate 0..len); otherwise the values are visited in insertion order.
    #[must_use]
    pub fn iteration_items(&self, settings: &NumericSettings) -> Vec<Self> {
        match self {
            Self::List(items) => items.clone(),
            Self::Opaque(json) => Self::from_json(json.clone()).iteration_items(settings),
            Self::Map(entries) => {
                let len = entries.len();
                if entries.contains_key("1") && !entries.contains_key("0") {
                    (1..=len).filter_map(|i| entries.get(i.to_string().as_str()).cloned()).collect()
                } else if entries.contains_key("0") {
                    (0..len).filter_map(|i| entries.get(i.to_string().as_str()).cloned()).collect()
                } else {
                    entries.values().cloned().collect()
                }
            }
            _ => self
                .string_form(settings)
                .chars()
                .map(|c| Self::Str(c.to_string()))
                .collect(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}
