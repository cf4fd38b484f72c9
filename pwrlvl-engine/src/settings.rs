//! Runtime settings the engine derives from the configuration tree.

use std::path::PathBuf;
use std::time::Duration;

use pwrlvl_config::PwrlvlConfig;

#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Terminate→kill escalation window.
    pub grace: Duration,
    /// Granularity of cooperative cancellation checks.
    pub poll_interval: Duration,
    pub command_timeout: Duration,
    pub loot_dir: PathBuf,
    pub handshake_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub search_dirs: Vec<PathBuf>,
    pub default_iface: String,
    pub default_ap_iface: String,
}

impl EngineSettings {
    pub fn from_config(config: &PwrlvlConfig) -> Self {
        Self {
            grace: Duration::from_millis(config.orchestrator.grace_ms),
            poll_interval: Duration::from_millis(config.orchestrator.poll_interval_ms),
            command_timeout: Duration::from_secs(config.orchestrator.command_timeout_secs),
            loot_dir: config.loot.loot_dir.clone(),
            handshake_dir: config.loot.handshake_dir.clone(),
            scratch_dir: config.loot.scratch_dir.clone(),
            search_dirs: config.tools.search_dirs.clone(),
            default_iface: config.tools.default_iface.clone(),
            default_ap_iface: config.tools.default_ap_iface.clone(),
        }
    }

    /// A path under the scratch directory.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.scratch_dir.join(name)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&PwrlvlConfig::default())
    }
}
