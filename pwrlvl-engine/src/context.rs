//! The handle an operation routine uses to talk to the rest of the system.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use pwrlvl_core::{
    process_key, EventBus, EventLevel, ProcessHandle, ProcessRegistry, ProcessSpec, StateStore,
    Termination,
};
use pwrlvl_telemetry::MetricsRecorder;

use crate::error::OperationError;
use crate::loot::Loot;
use crate::progress::{ProgressStore, Tally};
use crate::settings::EngineSettings;
use crate::tools::{run_command, CommandOutput, ToolLocator};
use crate::wireless;

/// Components shared by every controller and routine.
pub struct Services {
    pub bus: Arc<EventBus>,
    pub state: Arc<StateStore>,
    pub registry: Arc<ProcessRegistry>,
    pub progress: Arc<ProgressStore>,
    pub loot: Arc<Loot>,
    pub tools: ToolLocator,
    pub settings: EngineSettings,
    pub metrics: Option<Arc<MetricsRecorder>>,
}

impl Services {
    pub(crate) fn record_terminations(&self, outcomes: &[Termination]) {
        if let Some(metrics) = &self.metrics {
            let killed = outcomes.iter().filter(|t| **t == Termination::Killed).count();
            metrics.processes_killed.inc_by(killed as u64);
        }
    }
}

/// Per-run view of [`Services`], bound to one operation name.
#[derive(Clone)]
pub struct OperationContext {
    name: &'static str,
    services: Arc<Services>,
}

impl OperationContext {
    pub(crate) fn new(name: &'static str, services: Arc<Services>) -> Self {
        Self { name, services }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.services.settings
    }

    pub fn loot(&self) -> &Loot {
        &self.services.loot
    }

    /// The cooperative cancellation flag. Routines must check it between blocking steps.
    pub fn is_running(&self) -> bool {
        self.services.state.is_running(self.name)
    }

    /// `Err(Cancelled)` once a stop was requested.
    pub fn ensure_running(&self) -> Result<(), OperationError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(OperationError::Cancelled)
        }
    }

    pub fn publish(&self, level: EventLevel, message: impl Into<String>) {
        self.services.bus.publish(level, message);
    }

    pub fn publish_with(&self, level: EventLevel, message: impl Into<String>, data: Value) {
        self.services.bus.publish_with(level, message, data);
    }

    pub fn set_result(&self, value: Value) {
        self.services.state.set_result(self.name, value);
    }

    pub fn update_result<F: FnOnce(&mut Value)>(&self, update: F) {
        self.services.state.update_result(self.name, update);
    }

    pub fn set_field(&self, key: &str, value: impl Into<Value>) {
        self.services.state.set_field(self.name, key, value.into());
    }

    pub fn award(&self, points: u64, reason: &str) {
        self.services.progress.award(points, reason);
    }

    pub fn bump(&self, tally: Tally) {
        self.services.progress.bump(tally);
    }

    pub fn locate(&self, names: &[&str]) -> Option<PathBuf> {
        self.services.tools.locate_any(names)
    }

    pub fn require(&self, names: &[&str]) -> Result<PathBuf, OperationError> {
        self.services.tools.require(names)
    }

    /// Launches a process and registers it under this operation (and `role`, if any).
    /// Refuses to launch once a stop was requested; a stop that lands while the process is
    /// starting terminates it before returning `Cancelled`.
    pub fn spawn(
        &self,
        role: Option<&str>,
        spec: ProcessSpec,
    ) -> Result<Arc<ProcessHandle>, OperationError> {
        self.ensure_running()?;
        let key = process_key(self.name, role);
        let handle = Arc::new(spec.spawn()?);

        if let Err(e) = self.services.registry.register(&key, handle.clone()) {
            handle.kill();
            return Err(e.into());
        }
        debug!(key = %key, pid = handle.pid(), "Registered process");

        if !self.is_running() {
            self.finish(role);
            return Err(OperationError::Cancelled);
        }
        Ok(handle)
    }

    /// Terminates and deregisters the process filling `role`.
    pub fn finish(&self, role: Option<&str>) -> Option<Termination> {
        let key = process_key(self.name, role);
        let outcome = self.services.registry.terminate(&key, self.services.settings.grace)?;
        self.services.record_terminations(&[outcome]);
        Some(outcome)
    }

    /// Sleeps up to `duration` in poll-interval slices. Returns whether the operation is
    /// still running afterwards.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(self.services.settings.poll_interval));
        }
        false
    }

    /// Runs a helper command (`iw`, `ip`) with the configured timeout. Launch failures
    /// and missing tools yield `None`; helpers are best effort.
    pub fn run_short(&self, program: &str, args: &[&str]) -> Option<CommandOutput> {
        let path = self.services.tools.locate(program)?;
        match run_command(&path, args, self.services.settings.command_timeout) {
            Ok(output) => Some(output),
            Err(e) => {
                debug!(program, error = %e, "Helper command failed");
                None
            }
        }
    }

    pub fn set_monitor(&self, iface: &str, enable: bool) {
        let timeout = self.services.settings.command_timeout;
        wireless::set_monitor(&self.services.tools, iface, enable, timeout);
    }

    pub fn set_channel(&self, iface: &str, channel: u64) {
        let timeout = self.services.settings.command_timeout;
        wireless::set_channel(&self.services.tools, iface, channel, timeout);
    }
}
