use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The PUSH/PULL/QUEUE data stack.
///
/// One stack per engine instance. PUSH places at the top (LIFO), QUEUE at
/// the bottom (FIFO), PULL removes from the top; a PULL on an empty stack
/// yields the empty string. All operations are amortized constant time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataStack {
    items: VecDeque<Value>,
}

impl DataStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// PUSH: place at the top.
    pub fn push(&mut self, value: Value) {
        self.items.push_front(value);
    }

    /// QUEUE: place at the bottom.
    pub fn queue(&mut self, value: Value) {
        self.items.push_back(value);
    }

    /// PULL: remove from the top; the empty string when the stack is empty.
    pub fn pull(&mut self) -> Value {
        self.items.pop_front().unwrap_or_else(|| Value::Str(String::new()))
    }

    /// Number of stacked entries, as reported by the QUEUED() built-in.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn push_then_pull_is_lifo() {
        let mut stack = DataStack::new();
        stack.push(Value::Str("first".into()));
        stack.push(Value::Str("second".into()));
        assert_eq!(stack.pull(), Value::Str("second".into()));
        assert_eq!(stack.pull(), Value::Str("first".into()));
    }

    #[test]
    fn queue_places_at_the_bottom() {
        let mut stack = DataStack::new();
        stack.push(Value::Str("top".into()));
        stack.queue(Value::Str("bottom".into()));
        assert_eq!(stack.pull(), Value::Str("top".into()));
        assert_eq!(stack.pull(), Value::Str("bottom".into()));
    }

    #[test]
    fn empty_pull_yields_empty_string() {
        let mut stack = DataStack::new();
        assert_eq!(stack.pull(), Value::Str(String::new()));
    }
}
