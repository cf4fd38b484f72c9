//! The task orchestrator: the operation catalog plus the components every controller shares.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use pwrlvl_config::validation::validate_interface;
use pwrlvl_config::PwrlvlConfig;
use pwrlvl_core::{EventBus, EventLevel, Phase, ProcessRegistry, StateSnapshot, StateStore};
use pwrlvl_telemetry::{EventLogger, MetricsRecorder};

use crate::context::Services;
use crate::controller::Controller;
use crate::error::OperationError;
use crate::loot::{Loot, LootError};
use crate::operation::Operation;
use crate::operations;
use crate::params::Params;
use crate::progress::ProgressStore;
use crate::settings::EngineSettings;
use crate::tools::ToolLocator;
use crate::wireless;

pub struct Orchestrator {
    services: Arc<Services>,
    controllers: BTreeMap<&'static str, Controller>,
}

impl Orchestrator {
    /// Builds the orchestrator with the full operation catalog.
    pub fn new(
        config: &PwrlvlConfig,
        bus: Arc<EventBus>,
        metrics: Option<Arc<MetricsRecorder>>,
    ) -> Self {
        Self::with_operations(
            EngineSettings::from_config(config),
            bus,
            metrics,
            operations::catalog(),
        )
    }

    /// Builds the orchestrator over an explicit set of operations.
    pub fn with_operations(
        settings: EngineSettings,
        bus: Arc<EventBus>,
        metrics: Option<Arc<MetricsRecorder>>,
        catalog: Vec<Arc<dyn Operation>>,
    ) -> Self {
        let names: Vec<&'static str> = catalog.iter().map(|op| op.name()).collect();
        let loot = Arc::new(Loot::new(&settings.loot_dir, &settings.handshake_dir));
        if let Err(e) = loot.ensure_dirs() {
            warn!(error = %e, "Could not create loot directories");
        }

        let services = Arc::new(Services {
            progress: Arc::new(ProgressStore::new(&settings.loot_dir, bus.clone())),
            bus,
            state: Arc::new(StateStore::new(names.iter().copied())),
            registry: Arc::new(ProcessRegistry::new()),
            loot,
            tools: ToolLocator::new(settings.search_dirs.clone()),
            settings,
            metrics,
        });

        let controllers = catalog
            .into_iter()
            .map(|op| (op.name(), Controller::new(op, services.clone())))
            .collect();

        info!(operations = ?names, "Orchestrator ready");
        Self {
            services,
            controllers,
        }
    }

    fn controller(&self, name: &str) -> Result<&Controller, OperationError> {
        self.controllers
            .get(name)
            .ok_or_else(|| OperationError::UnknownOperation(name.to_string()))
    }

    /// Starts `name`. Returns the acknowledgement message; the routine runs in the background.
    pub fn start(&self, name: &str, params: &Params) -> Result<String, OperationError> {
        self.controller(name)?.start(params)
    }

    /// Stops `name`. Succeeds whether or not it was running.
    pub fn stop(&self, name: &str) -> Result<String, OperationError> {
        let controller = self.controller(name)?;
        Ok(if controller.stop()? {
            format!("{name} stopping")
        } else {
            format!("{name} not running")
        })
    }

    pub fn status(&self) -> StateSnapshot {
        self.services.state.snapshot()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.controllers.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.services.bus
    }

    pub fn state(&self) -> &StateStore {
        &self.services.state
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.services.registry
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.services.progress
    }

    pub fn loot(&self) -> &Loot {
        &self.services.loot
    }

    pub fn tools(&self) -> &ToolLocator {
        &self.services.tools
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.services.settings
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRecorder>> {
        self.services.metrics.as_ref()
    }

    /// Blocks until `name` is idle or `timeout` elapses. Returns whether it is idle.
    pub fn wait_idle(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if matches!(self.services.state.phase(name), None | Some(Phase::Idle)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Stops every operation, kills every registered process and waits for the routines to
    /// finish their cleanup, bounded by twice the grace window.
    #[instrument(skip_all)]
    pub fn shutdown(&self) {
        let grace = self.services.settings.grace;
        for controller in self.controllers.values() {
            if let Err(e) = controller.stop() {
                warn!(operation = controller.name(), error = %e, "Stop during shutdown failed");
            }
        }
        let outcomes = self.services.registry.terminate_all(grace);
        self.services.record_terminations(&outcomes);

        let deadline = Instant::now() + grace * 2;
        for name in self.controllers.keys() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.wait_idle(name, remaining) {
                warn!(operation = name, "Routine still running at shutdown");
            }
        }
        EventLogger::log_action("shutdown", "*", "complete");
    }

    /// Wireless interfaces present on the host.
    pub fn interfaces(&self) -> Vec<String> {
        wireless::list_interfaces(&self.services.tools, self.services.settings.command_timeout)
    }

    /// Switches an interface to `monitor` or `managed` mode.
    pub fn set_monitor(&self, iface: &str, mode: &str) -> Result<String, OperationError> {
        if validate_interface(iface).is_err() {
            return Err(OperationError::InvalidParams(format!("invalid iface: {iface}")));
        }
        let enable = match mode {
            "monitor" => true,
            "managed" => false,
            other => return Err(OperationError::InvalidParams(format!("invalid mode: {other}"))),
        };
        wireless::set_monitor(
            &self.services.tools,
            iface,
            enable,
            self.services.settings.command_timeout,
        );
        self.services
            .bus
            .publish(EventLevel::Info, format!("{iface} → {mode} mode"));
        Ok(format!("{iface} set to {mode}"))
    }

    /// Converts a handshake capture to a hashcat input file.
    pub fn convert(&self, file: &str) -> Result<String, LootError> {
        self.services.loot.convert(
            file,
            &self.services.tools,
            self.services.settings.command_timeout,
        )
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if !self.services.registry.is_empty() {
            let outcomes = self.services.registry.terminate_all(self.services.settings.grace);
            self.services.record_terminations(&outcomes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn empty(dir: &std::path::Path) -> Orchestrator {
        let settings = EngineSettings {
            loot_dir: dir.join("loot"),
            handshake_dir: dir.join("hs"),
            scratch_dir: dir.to_path_buf(),
            ..EngineSettings::default()
        };
        Orchestrator::with_operations(settings, EventBus::new(20, 20, 5), None, Vec::new())
    }

    #[traced_test]
    #[test]
    fn creates_loot_dirs_and_logs_ready() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = empty(dir.path());
        assert!(dir.path().join("loot").is_dir());
        assert!(dir.path().join("hs").is_dir());
        assert!(orchestrator.names().is_empty());
        assert!(logs_contain("Orchestrator ready"));
    }

    #[test]
    fn unknown_names_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = empty(dir.path());
        assert!(matches!(
            orchestrator.start("warp", &Params::new()),
            Err(OperationError::UnknownOperation(_))
        ));
        assert!(matches!(
            orchestrator.stop("warp"),
            Err(OperationError::UnknownOperation(_))
        ));
    }

    #[test]
    fn monitor_mode_arguments_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = empty(dir.path());
        assert!(orchestrator.set_monitor("wlan0;id", "monitor").is_err());
        assert!(orchestrator.set_monitor("wlan0", "promiscuous").is_err());
    }
}
