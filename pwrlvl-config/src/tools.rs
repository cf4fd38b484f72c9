//! External tool lookup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Where to look for external binaries and which interfaces to default to.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directories searched after `PATH`.
    pub search_dirs: Vec<PathBuf>,

    /// Interface used when a request does not name one.
    #[validate(custom(function = validation::validate_interface))]
    pub default_iface: String,

    /// Interface used for the rogue access point.
    #[validate(custom(function = validation::validate_interface))]
    pub default_ap_iface: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let search_dirs = [
            "/usr/sbin",
            "/usr/bin",
            "/usr/local/sbin",
            "/usr/local/bin",
            "/mmc/usr/sbin",
            "/mmc/usr/bin",
            "/opt/usr/sbin",
            "/opt/usr/bin",
            "/sbin",
            "/bin",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        Self {
            search_dirs,
            default_iface: "wlan0".into(),
            default_ap_iface: "wlan1".into(),
        }
    }
}
