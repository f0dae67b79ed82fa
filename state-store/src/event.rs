//! State change events
//!
//! Every effective mutation of a watched context produces a
//! `StateChanged` event carrying the new value. Events belonging to one
//! batch update share a timestamp and only the final one has `last` set.

use std::time::Instant;

use serde_json::Value;

/// A change event emitted when a variable changes
///
/// # Example
///
/// ```rust,ignore
/// for event in dict.changes() {
///     if event.context == "player" && event.variable == "status" {
///         println!("status is now {}", event.value);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StateChanged {
    /// Context path, e.g. `"player/current_time"`
    pub context: String,

    /// Variable name inside the context
    pub variable: String,

    /// The new value (`Value::Null` when the variable was removed)
    pub value: Value,

    /// Whether this is the final event of a batch
    pub last: bool,

    /// When the change was applied
    pub timestamp: Instant,
}

impl StateChanged {
    /// Create a new change event that closes its batch
    pub fn new(context: impl Into<String>, variable: impl Into<String>, value: Value) -> Self {
        Self {
            context: context.into(),
            variable: variable.into(),
            value,
            last: true,
            timestamp: Instant::now(),
        }
    }

    /// Create a change event with an explicit `last` flag and timestamp
    pub fn with_batch(
        context: impl Into<String>,
        variable: impl Into<String>,
        value: Value,
        last: bool,
        timestamp: Instant,
    ) -> Self {
        Self {
            context: context.into(),
            variable: variable.into(),
            value,
            last,
            timestamp,
        }
    }

    /// Check whether this event targets the given slot
    pub fn is(&self, context: &str, variable: &str) -> bool {
        self.context == context && self.variable == variable
    }
}

impl PartialEq for StateChanged {
    fn eq(&self, other: &Self) -> bool {
        // Timestamp not included in equality
        self.context == other.context
            && self.variable == other.variable
            && self.value == other.value
            && self.last == other.last
    }
}
