use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    address::AddressTarget,
    functions::ExternalFn,
};

/// Renaming applied to a REQUIREd library's registrations.
///
/// Functions accept all three forms; ADDRESS targets only accept `Literal`
/// (enforced by the address registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsClause {
    /// Prepend a prefix to every registered function name.
    Prefix(String),
    /// Rewrite names through a regex substitution.
    Regex { pattern: String, replacement: String },
    /// Replace the name outright.
    Literal(String),
}

impl AsClause {
    /// Parses the textual AS clause: `prefix_` (trailing underscore),
    /// `/pattern/replacement/`, or a literal name.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if let Some(body) = text.strip_prefix('/').and_then(|t| t.strip_suffix('/'))
            && let Some((pattern, replacement)) = body.split_once('/')
        {
            return Self::Regex {
                pattern: pattern.to_owned(),
                replacement: replacement.to_owned(),
            };
        }
        if text.ends_with('_') {
            return Self::Prefix(text.to_owned());
        }
        Self::Literal(text.to_owned())
    }

    /// Applies the rename to a function name.
    pub fn apply(&self, name: &str) -> Result<String, String> {
        match self {
            Self::Prefix(prefix) => Ok(format!("{prefix}{name}")),
            Self::Regex { pattern, replacement } => {
                let regex = Regex::new(pattern).map_err(|e| format!("invalid AS regex {pattern}: {e}"))?;
                Ok(regex.replace(name, replacement.as_str()).into_owned())
            }
            Self::Literal(literal) => Ok(literal.clone()),
        }
    }
}

/// Metadata a library declares alongside its registrations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub library_name: String,
    /// The export name this registration was published under in the library.
    pub export_name: String,
    /// When set, the engine interpolates command strings before dispatching
    /// them to this library's ADDRESS handlers; otherwise the raw string is
    /// passed through.
    pub interpreter_handles_interpolation: bool,
}

/// Everything a loaded library contributes to the engine.
///
/// Ownership passes to the engine on registration; the loader never mutates
/// a library after handing it over.
pub struct LoadedLibrary {
    pub functions: Vec<(String, ExternalFn)>,
    pub address_targets: Vec<AddressTarget>,
}

impl std::fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("functions", &self.functions.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("address_targets", &self.address_targets)
            .finish()
    }
}

/// The host side of REQUIRE: resolves a library name to its registrations.
///
/// Resolution internals (URLs, caches, sandboxes, permission prompts) are
/// opaque to the engine; REQUIRE is the only operation that reaches the
/// loader, and it may perform I/O.
pub trait LibraryLoader {
    fn load(&self, name: &str) -> Result<LoadedLibrary, String>;
}

/// Default loader for hosts without a library system: every REQUIRE fails.
#[derive(Debug, Default)]
pub struct NoLibraries;

impl LibraryLoader for NoLibraries {
    fn load(&self, name: &str) -> Result<LoadedLibrary, String> {
        Err(format!("no library loader is configured (REQUIRE {name})"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn prefix_clause_prepends() {
        let clause = AsClause::parse("str_");
        assert_eq!(clause.apply("length").unwrap(), "str_length");
    }

    #[test]
    fn regex_clause_rewrites() {
        let clause = AsClause::parse("/^lib/x/");
        assert_eq!(clause, AsClause::Regex {
            pattern: "^lib".to_owned(),
            replacement: "x".to_owned()
        });
        assert_eq!(clause.apply("libFoo").unwrap(), "xFoo");
    }

    #[test]
    fn literal_clause_replaces() {
        let clause = AsClause::parse("sql");
        assert_eq!(clause.apply("postgres").unwrap(), "sql");
    }
}
