//! Shared State Store.
//!
//! Process-wide record of each operation's lifecycle phase, start parameters, auxiliary
//! fields and last-known result. Every read and write goes through one coarse lock, so a
//! status query always observes a consistent snapshot. The lock is never held across I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StateError;

/// Lifecycle phase of one operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
        })
    }
}

#[derive(Clone, Debug, Default)]
struct OperationState {
    phase: Phase,
    params: Map<String, Value>,
    fields: Map<String, Value>,
    started_at: Option<f64>,
    runs: u64,
}

#[derive(Default)]
struct StoreInner {
    operations: BTreeMap<String, OperationState>,
    results: BTreeMap<String, Value>,
}

/// Read-only view of one operation, as reported by status queries.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationView {
    pub running: bool,
    pub phase: Phase,
    pub params: Map<String, Value>,
    pub fields: Map<String, Value>,
    pub started_at: Option<f64>,
    pub runs: u64,
    pub result: Value,
}

/// Consistent copy of every operation's state.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StateSnapshot {
    pub operations: BTreeMap<String, OperationView>,
}

impl StateSnapshot {
    pub fn get(&self, name: &str) -> Option<&OperationView> {
        self.operations.get(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.get(name).map(|view| view.running).unwrap_or(false)
    }
}

/// The single-lock state store. The set of operation names is fixed at construction.
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let operations = names
            .into_iter()
            .map(|name| (name.into(), OperationState::default()))
            .collect();
        Self {
            inner: Mutex::new(StoreInner {
                operations,
                results: BTreeMap::new(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().operations.contains_key(name)
    }

    /// Atomically checks that `name` is idle and marks it running with `params`.
    /// This is the single-flight gate.
    pub fn begin(&self, name: &str, params: Map<String, Value>) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let state = inner
            .operations
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownOperation(name.to_string()))?;

        if state.phase != Phase::Idle {
            return Err(StateError::Busy {
                name: name.to_string(),
                phase: state.phase,
            });
        }

        state.phase = Phase::Running;
        state.params = params;
        state.fields.clear();
        state.started_at = Some(Utc::now().timestamp_millis() as f64 / 1000.0);
        state.runs += 1;
        Ok(())
    }

    /// Moves a running operation to `Stopping`. Returns whether a transition happened.
    pub fn request_stop(&self, name: &str) -> Result<bool, StateError> {
        let mut inner = self.inner.lock();
        let state = inner
            .operations
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownOperation(name.to_string()))?;

        if state.phase == Phase::Running {
            state.phase = Phase::Stopping;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns the operation to `Idle` and clears its auxiliary fields.
    /// Start parameters are kept as the last target.
    pub fn complete(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.operations.get_mut(name) {
            state.phase = Phase::Idle;
            state.fields.clear();
        }
    }

    pub fn phase(&self, name: &str) -> Option<Phase> {
        self.inner.lock().operations.get(name).map(|state| state.phase)
    }

    /// True only while the operation is `Running`; this is the flag routines poll.
    pub fn is_running(&self, name: &str) -> bool {
        self.phase(name) == Some(Phase::Running)
    }

    pub fn params(&self, name: &str) -> Option<Map<String, Value>> {
        self.inner.lock().operations.get(name).map(|state| state.params.clone())
    }

    pub fn set_field(&self, name: &str, key: &str, value: Value) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.operations.get_mut(name) {
            state.fields.insert(key.to_string(), value);
        }
    }

    pub fn field(&self, name: &str, key: &str) -> Option<Value> {
        let inner = self.inner.lock();
        inner.operations.get(name).and_then(|state| state.fields.get(key).cloned())
    }

    pub fn set_result(&self, name: &str, value: Value) {
        self.inner.lock().results.insert(name.to_string(), value);
    }

    /// Mutates the stored result in place; a missing result starts as `null`.
    pub fn update_result<F>(&self, name: &str, update: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut inner = self.inner.lock();
        let slot = inner.results.entry(name.to_string()).or_insert(Value::Null);
        update(slot);
    }

    pub fn result(&self, name: &str) -> Option<Value> {
        self.inner.lock().results.get(name).cloned()
    }

    /// Names of operations not currently idle.
    pub fn active(&self) -> Vec<String> {
        self.inner
            .lock()
            .operations
            .iter()
            .filter(|(_, state)| state.phase != Phase::Idle)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock();
        let operations = inner
            .operations
            .iter()
            .map(|(name, state)| {
                let view = OperationView {
                    running: state.phase == Phase::Running,
                    phase: state.phase,
                    params: state.params.clone(),
                    fields: state.fields.clone(),
                    started_at: state.started_at,
                    runs: state.runs,
                    result: inner.results.get(name).cloned().unwrap_or(Value::Null),
                };
                (name.clone(), view)
            })
            .collect();
        StateSnapshot { operations }
    }
}
