//! Loot store: handshake captures, packet captures and recovered keys on disk.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use pwrlvl_config::validation::validate_filename;

use crate::tools::{run_command, ToolLocator};

const HANDSHAKE_EXTENSIONS: [&str; 4] = ["cap", "pcap", "hccapx", "22000"];
const CAPTURE_EXTENSIONS: [&str; 2] = ["pcap", "pcapng"];

#[derive(Debug, Error)]
pub enum LootError {
    #[error("forbidden file name: {0}")]
    Forbidden(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("no conversion tool (need hcxtools or aircrack-ng)")]
    NoConverter,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LootFile {
    pub name: String,
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: f64,
    /// Recovered key for handshake files, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cracked: Option<String>,
}

pub struct Loot {
    loot_dir: PathBuf,
    handshake_dir: PathBuf,
}

impl Loot {
    pub fn new(loot_dir: impl Into<PathBuf>, handshake_dir: impl Into<PathBuf>) -> Self {
        Self {
            loot_dir: loot_dir.into(),
            handshake_dir: handshake_dir.into(),
        }
    }

    /// Creates both directories.
    pub fn ensure_dirs(&self) -> Result<(), LootError> {
        fs::create_dir_all(&self.loot_dir)?;
        fs::create_dir_all(&self.handshake_dir)?;
        Ok(())
    }

    pub fn loot_dir(&self) -> &Path {
        &self.loot_dir
    }

    pub fn handshake_dir(&self) -> &Path {
        &self.handshake_dir
    }

    /// Handshake artifacts, newest first, joined with keys from `cracked.txt`.
    pub fn handshakes(&self) -> Vec<LootFile> {
        let cracked = self.cracked();
        let mut files = list_files(&self.handshake_dir, &HANDSHAKE_EXTENSIONS);
        for file in &mut files {
            let base = Path::new(&file.name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            file.cracked = cracked
                .get(&file.name)
                .or_else(|| cracked.get(&base))
                .cloned();
        }
        files
    }

    /// Packet captures in the loot directory, newest first.
    pub fn captures(&self) -> Vec<LootFile> {
        list_files(&self.loot_dir, &CAPTURE_EXTENSIONS)
    }

    /// `file:key` lines from `cracked.txt`.
    pub fn cracked(&self) -> HashMap<String, String> {
        fs::read_to_string(self.loot_dir.join("cracked.txt"))
            .map(|content| {
                content
                    .lines()
                    .filter_map(|line| line.trim().split_once(':'))
                    .map(|(file, key)| (file.trim().to_string(), key.trim().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Appends a line to a text file in the loot directory.
    pub fn append_line(&self, file: &str, line: &str) -> Result<(), LootError> {
        let mut out = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.loot_dir.join(file))?;
        writeln!(out, "{line}")?;
        Ok(())
    }

    pub fn record_cracked(&self, file: &str, key: &str) -> Result<(), LootError> {
        self.append_line("cracked.txt", &format!("{file}:{key}"))
    }

    /// Resolves a client-supplied download name to a file in the loot or handshake directory.
    pub fn resolve_download(&self, name: &str) -> Result<PathBuf, LootError> {
        if validate_filename(name).is_err() {
            return Err(LootError::Forbidden(name.to_string()));
        }
        [&self.loot_dir, &self.handshake_dir]
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| LootError::NotFound(name.to_string()))
    }

    /// Converts a handshake capture to a hashcat input file. Returns a description of the
    /// produced file.
    pub fn convert(
        &self,
        name: &str,
        tools: &ToolLocator,
        timeout: Duration,
    ) -> Result<String, LootError> {
        if validate_filename(name).is_err() {
            return Err(LootError::Forbidden(name.to_string()));
        }
        let source = self.handshake_dir.join(name);
        if !source.is_file() {
            return Err(LootError::NotFound(name.to_string()));
        }
        let base = source.with_extension("");

        if let Some(hcx) = tools.locate_any(&["hcxpcapngtool", "hcxpcaptool"]) {
            let out = base.with_extension("22000");
            let args = [path_arg(&source), "-o".to_string(), path_arg(&out)];
            if let Err(e) = run_command(&hcx, &args, timeout) {
                debug!(error = %e, "hcx conversion failed");
            }
            if out.is_file() {
                info!(file = %out.display(), "Converted handshake");
                return Ok(format!("{} (hashcat -m 22000)", file_name(&out)));
            }
        }

        if let Some(aircrack) = tools.locate("aircrack-ng") {
            let args = ["-J".to_string(), path_arg(&base), path_arg(&source)];
            if let Err(e) = run_command(&aircrack, &args, timeout) {
                debug!(error = %e, "aircrack-ng conversion failed");
            }
            let out = base.with_extension("hccapx");
            if out.is_file() {
                info!(file = %out.display(), "Converted handshake");
                return Ok(format!("{} (hashcat -m 2500)", file_name(&out)));
            }
        }

        Err(LootError::NoConverter)
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn list_files(dir: &Path, extensions: &[&str]) -> Vec<LootFile> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<LootFile> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            Some(LootFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                mtime,
                cracked: None,
            })
        })
        .collect();
    files.sort_by(|a, b| b.mtime.total_cmp(&a.mtime));
    files
}
