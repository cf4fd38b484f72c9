//! External tool lookup and short helper commands.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use pwrlvl_core::{LineEvent, ProcessSpec, ProcessStatus};

use crate::error::OperationError;

/// Finds binaries on `PATH` first, then in a fixed list of directories used by embedded
/// firmware images that do not put everything on `PATH`.
#[derive(Clone, Debug, Default)]
pub struct ToolLocator {
    search_dirs: Vec<PathBuf>,
}

impl ToolLocator {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// First of `names` that can be found, in order of preference.
    pub fn locate_any(&self, names: &[&str]) -> Option<PathBuf> {
        names.iter().find_map(|name| self.locate(name))
    }

    pub fn require(&self, names: &[&str]) -> Result<PathBuf, OperationError> {
        self.locate_any(names).ok_or_else(|| OperationError::ToolMissing {
            tools: names.iter().map(|name| name.to_string()).collect(),
        })
    }
}

/// Captured result of a helper command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the command was killed or its exit code is unknown.
    pub code: Option<i32>,
    /// Merged stdout and stderr.
    pub output: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a short command to completion, killing it once `timeout` elapses.
pub fn run_command<S: AsRef<str>>(
    program: &Path,
    args: &[S],
    timeout: Duration,
) -> Result<CommandOutput, OperationError> {
    let handle = ProcessSpec::new(program)
        .args(args.iter().map(|arg| arg.as_ref().to_string()))
        .capture_lines()
        .spawn()?;
    let deadline = Instant::now() + timeout;
    let mut output = String::new();
    let mut timed_out = false;

    if let Some(lines) = handle.take_lines() {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                timed_out = true;
                break;
            }
            match lines.next_line(remaining) {
                LineEvent::Line(line) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                LineEvent::Idle => continue,
                LineEvent::Closed => break,
            }
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    let code = match handle.wait_timeout(remaining) {
        ProcessStatus::Exited(code) if !timed_out => code,
        _ => {
            timed_out = true;
            handle.shutdown(Duration::from_millis(500));
            None
        }
    };
    debug!(program = %program.display(), ?code, timed_out, "Helper command finished");

    Ok(CommandOutput {
        code,
        output,
        timed_out,
    })
}
