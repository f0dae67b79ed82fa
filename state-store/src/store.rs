//! Context/variable storage with change detection
//!
//! This module provides the core storage primitives:
//! - `ContextVars`: the variables of a single context
//! - `StateDict`: all contexts, shared between adapters and observers

use std::collections::{BTreeMap, HashSet};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::event::StateChanged;
use crate::iter::ChangeIterator;
use crate::property::Property;

// ============================================================================
// ContextVars - variables of a single context
// ============================================================================

/// Ordered variable storage for one context
///
/// Change detection compares the JSON values, so setting a variable to
/// its current value is a no-op.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use state_store::ContextVars;
///
/// let mut vars = ContextVars::new();
/// assert!(vars.set("volume", json!(0.5)));
/// assert!(!vars.set("volume", json!(0.5)));
/// assert!(vars.set("volume", json!(0.75)));
/// assert_eq!(vars.get("volume"), Some(&json!(0.75)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextVars {
    values: BTreeMap<String, Value>,
}

impl ContextVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variable: &str) -> Option<&Value> {
        self.values.get(variable)
    }

    /// Set a variable, returning whether the value changed
    pub fn set(&mut self, variable: &str, value: Value) -> bool {
        if self.values.get(variable) == Some(&value) {
            return false;
        }
        self.values.insert(variable.to_string(), value);
        true
    }

    /// Remove a variable, returning whether it existed
    pub fn remove(&mut self, variable: &str) -> bool {
        self.values.remove(variable).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

// ============================================================================
// StateDict - shared state dictionary
// ============================================================================

#[derive(Debug, Default)]
struct WatchSet {
    all: bool,
    contexts: HashSet<String>,
}

impl WatchSet {
    /// A watched context also covers its sub-contexts (`player` covers
    /// `player/current_time`).
    fn covers(&self, context: &str) -> bool {
        if self.all {
            return true;
        }
        let mut path = context;
        loop {
            if self.contexts.contains(path) {
                return true;
            }
            match path.rfind('/') {
                Some(pos) => path = &path[..pos],
                None => return false,
            }
        }
    }
}

/// Hierarchical state dictionary keyed by `(context, variable)`
///
/// Backends publish into it, observers read from it and consume
/// `StateChanged` events for the contexts they watch. Cloning the
/// dictionary yields another handle to the same state.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use state_store::StateDict;
///
/// let dict = StateDict::new();
/// dict.watch("player");
///
/// assert!(dict.set("player", "status", json!("playing")));
/// assert!(!dict.set("player", "status", json!("playing")));
///
/// let event = dict.changes().try_recv().unwrap();
/// assert_eq!(event.value, json!("playing"));
/// ```
pub struct StateDict {
    /// context -> variables
    contexts: Arc<RwLock<BTreeMap<String, ContextVars>>>,

    /// Contexts whose changes are emitted
    watched: Arc<RwLock<WatchSet>>,

    event_tx: mpsc::Sender<StateChanged>,

    /// Receiver shared by every clone
    event_rx: Arc<Mutex<mpsc::Receiver<StateChanged>>>,
}

impl StateDict {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel();

        Self {
            contexts: Arc::new(RwLock::new(BTreeMap::new())),
            watched: Arc::new(RwLock::new(WatchSet::default())),
            event_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
        }
    }

    /// Get a variable's current value
    pub fn get(&self, context: &str, variable: &str) -> Option<Value> {
        let contexts = self.contexts.read().ok()?;
        contexts.get(context)?.get(variable).cloned()
    }

    /// Get a variable deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self, context: &str, variable: &str) -> Option<T> {
        let value = self.get(context, variable)?;
        serde_json::from_value(value).ok()
    }

    /// Set a variable, returning whether it changed
    ///
    /// A change of a watched context emits one event with `last` set.
    pub fn set(&self, context: &str, variable: &str, value: Value) -> bool {
        let changed = {
            let mut contexts = match self.contexts.write() {
                Ok(c) => c,
                Err(_) => return false,
            };
            contexts
                .entry(context.to_string())
                .or_default()
                .set(variable, value.clone())
        };

        if changed {
            self.maybe_emit(vec![(variable.to_string(), value)], context);
        }
        changed
    }

    /// Set several variables of one context as a batch
    ///
    /// Only changed variables produce events; the final emitted event
    /// carries the `last` flag. Returns the number of changed variables.
    pub fn set_batch<I, K>(&self, context: &str, values: I) -> usize
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let changed: Vec<(String, Value)> = {
            let mut contexts = match self.contexts.write() {
                Ok(c) => c,
                Err(_) => return 0,
            };
            let vars = contexts.entry(context.to_string()).or_default();
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .filter(|(k, v)| vars.set(k, v.clone()))
                .collect()
        };

        let count = changed.len();
        if count > 0 {
            self.maybe_emit(changed, context);
        }
        count
    }

    /// Remove a variable; watchers see a `Null` value
    pub fn remove(&self, context: &str, variable: &str) -> bool {
        let removed = self
            .contexts
            .write()
            .map(|mut c| c.get_mut(context).map(|vars| vars.remove(variable)).unwrap_or(false))
            .unwrap_or(false);

        if removed {
            self.maybe_emit(vec![(variable.to_string(), Value::Null)], context);
        }
        removed
    }

    /// Remove a whole context without emitting events
    pub fn remove_context(&self, context: &str) -> bool {
        self.contexts
            .write()
            .map(|mut c| c.remove(context).is_some())
            .unwrap_or(false)
    }

    /// Store a typed property
    pub fn set_property<P: Property>(&self, value: &P) -> bool {
        match serde_json::to_value(value) {
            Ok(json) => self.set(P::CONTEXT, P::KEY, json),
            Err(e) => {
                tracing::warn!("cannot serialize {}/{}: {}", P::CONTEXT, P::KEY, e);
                false
            }
        }
    }

    /// Read a typed property
    pub fn get_property<P: Property>(&self) -> Option<P> {
        self.get_as(P::CONTEXT, P::KEY)
    }

    /// All context paths currently holding variables
    pub fn contexts(&self) -> Vec<String> {
        self.contexts
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Variable names of one context
    pub fn variables(&self, context: &str) -> Vec<String> {
        self.contexts
            .read()
            .ok()
            .and_then(|c| c.get(context).map(|vars| vars.names().map(String::from).collect()))
            .unwrap_or_default()
    }

    /// The whole dictionary as `{context: {variable: value}}`
    pub fn snapshot(&self) -> Value {
        let contexts = match self.contexts.read() {
            Ok(c) => c,
            Err(_) => return Value::Null,
        };
        let map: Map<String, Value> = contexts
            .iter()
            .map(|(ctx, vars)| (ctx.clone(), vars.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Emit events for a context (and its sub-contexts)
    pub fn watch(&self, context: &str) {
        if let Ok(mut watched) = self.watched.write() {
            watched.contexts.insert(context.to_string());
        }
    }

    /// Emit events for every context
    pub fn watch_all(&self) {
        if let Ok(mut watched) = self.watched.write() {
            watched.all = true;
        }
    }

    pub fn unwatch(&self, context: &str) {
        if let Ok(mut watched) = self.watched.write() {
            watched.contexts.remove(context);
        }
    }

    pub fn is_watched(&self, context: &str) -> bool {
        self.watched
            .read()
            .map(|w| w.covers(context))
            .unwrap_or(false)
    }

    /// Iterator over change events of watched contexts
    pub fn changes(&self) -> ChangeIterator {
        ChangeIterator::new(Arc::clone(&self.event_rx))
    }

    /// Number of contexts
    pub fn len(&self) -> usize {
        self.contexts.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all contexts and watches
    pub fn clear(&self) {
        if let Ok(mut contexts) = self.contexts.write() {
            contexts.clear();
        }
        if let Ok(mut watched) = self.watched.write() {
            *watched = WatchSet::default();
        }
    }

    /// Sender for injecting events from outside the dictionary
    pub fn event_sender(&self) -> mpsc::Sender<StateChanged> {
        self.event_tx.clone()
    }

    fn maybe_emit(&self, changed: Vec<(String, Value)>, context: &str) {
        if !self.is_watched(context) {
            return;
        }

        let timestamp = Instant::now();
        let last_index = changed.len().saturating_sub(1);
        for (i, (variable, value)) in changed.into_iter().enumerate() {
            let event = StateChanged::with_batch(context, variable, value, i == last_index, timestamp);
            let _ = self.event_tx.send(event);
        }
    }
}

impl Default for StateDict {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateDict {
    fn clone(&self) -> Self {
        Self {
            contexts: Arc::clone(&self.contexts),
            watched: Arc::clone(&self.watched),
            event_tx: self.event_tx.clone(),
            event_rx: Arc::clone(&self.event_rx),
        }
    }
}

impl std::fmt::Debug for StateDict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDict")
            .field("context_count", &self.len())
            .finish()
    }
}
