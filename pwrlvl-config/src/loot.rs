//! Artifact directories.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Where captures, handshakes, cracked keys and the progress record are written.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct LootConfig {
    /// Captures, cracked keys and `xp.json`.
    pub loot_dir: PathBuf,
    /// Handshake captures (`*.cap`, `*.pcapng`, converted hashes).
    pub handshake_dir: PathBuf,
    /// Scratch files for tool output (CSV dumps, generated configs).
    pub scratch_dir: PathBuf,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            loot_dir: PathBuf::from("/root/loot/pwrlvl9000"),
            handshake_dir: PathBuf::from("/root/loot/handshakes"),
            scratch_dir: PathBuf::from("/tmp"),
        }
    }
}
