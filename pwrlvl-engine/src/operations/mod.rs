//! The operation catalog.
//!
//! One module per external tool family. Each routine follows the same shape: announce,
//! locate its tools, launch through the context, poll until done or stopped, then report.
//! Process cleanup is left to the controller, which terminates everything the routine
//! registered no matter how it returns.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::OperationError;
use crate::operation::Operation;

mod attack;
mod beacon;
mod capture;
mod crack;
mod netscan;
mod pmkid;
mod probe;
mod rogueap;
mod scan;
mod wps;

pub use attack::Attack;
pub use beacon::Beacon;
pub use capture::Capture;
pub use crack::Crack;
pub use netscan::{HostReport, NetScan, OpenPort};
pub use pmkid::Pmkid;
pub use probe::{Probe, PROBE_PREFIX};
pub use rogueap::RogueAp;
pub use scan::{Scan, SCAN_PREFIX};
pub use wps::{WpsAttack, WpsScan};

/// Every operation the server exposes.
pub fn catalog() -> Vec<Arc<dyn Operation>> {
    vec![
        Arc::new(Scan),
        Arc::new(Attack),
        Arc::new(Crack),
        Arc::new(Probe),
        Arc::new(Pmkid),
        Arc::new(Beacon),
        Arc::new(RogueAp),
        Arc::new(WpsScan),
        Arc::new(WpsAttack),
        Arc::new(Capture),
        Arc::new(NetScan),
    ]
}

/// CSV file airodump-ng writes for `--write <prefix>`.
pub fn csv_path(prefix: &Path) -> PathBuf {
    PathBuf::from(format!("{}-01.csv", prefix.display()))
}

/// Removes files left under `<prefix>*` by an earlier run.
pub(crate) fn clear_scratch(prefix: &Path) {
    let (Some(dir), Some(stem)) = (prefix.parent(), prefix.file_name()) else {
        return;
    };
    let stem = stem.to_string_lossy();
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        if entry.file_name().to_string_lossy().starts_with(stem.as_ref()) {
            if let Err(e) = fs::remove_file(entry.path()) {
                debug!(path = %entry.path().display(), error = %e, "Could not remove scratch file");
            }
        }
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn unix_seconds() -> i64 {
    Utc::now().timestamp()
}

/// A scratch file removed when dropped.
pub(crate) struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Writes `contents` to `path`.
    pub(crate) fn write(path: PathBuf, contents: &str) -> Result<Self, OperationError> {
        fs::write(&path, contents)?;
        Ok(Self { path })
    }

    /// Takes ownership of a path some tool will write, removing any stale copy.
    pub(crate) fn claim(path: PathBuf) -> Self {
        let _ = fs::remove_file(&path);
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let names: HashSet<&str> = catalog().iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), 11);
        for name in ["scan", "attack", "crack", "wps-scan", "wps-attack", "netscan"] {
            assert!(names.contains(name), "{name} missing");
        }
    }

    #[test]
    fn scratch_files_are_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("pwrlvl_scan");
        fs::write(dir.path().join("pwrlvl_scan-01.csv"), "x").unwrap();
        fs::write(dir.path().join("pwrlvl_scan-02.csv"), "x").unwrap();
        fs::write(dir.path().join("keep.txt"), "x").unwrap();

        clear_scratch(&prefix);
        assert!(!csv_path(&prefix).exists());
        assert!(dir.path().join("keep.txt").exists());

        let conf = dir.path().join("hostapd.conf");
        {
            let file = ScratchFile::write(conf.clone(), "ssid=x\n").unwrap();
            assert_eq!(fs::read_to_string(file.path()).unwrap(), "ssid=x\n");
        }
        assert!(!conf.exists());
    }
}
