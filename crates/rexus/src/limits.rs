use serde::{Deserialize, Serialize};

/// Cap on DO WHILE iterations; exceeding it is a loop-invariant violation.
pub const MAX_WHILE_ITERATIONS: u64 = 10_000;

/// Default maximum nesting of CALL activations.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Default maximum nesting of INTERPRET activations.
pub const DEFAULT_MAX_INTERPRET_DEPTH: usize = 64;

/// Engine limits checked by the instruction executor.
///
/// The WHILE cap is part of the dialect's semantics; the depth caps guard
/// against runaway recursion through CALL and INTERPRET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_while_iterations: u64,
    pub max_call_depth: usize,
    pub max_interpret_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_while_iterations: MAX_WHILE_ITERATIONS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_interpret_depth: DEFAULT_MAX_INTERPRET_DEPTH,
        }
    }
}
