//! Owned external processes.
//!
//! Every tool is launched as the leader of its own process group so that termination
//! reaches whatever the tool forks. Shutdown always escalates: SIGTERM to the group,
//! a bounded grace period, then SIGKILL.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ProcessError;

const EXIT_POLL: Duration = Duration::from_millis(50);

/// Lines buffered per process before further output is discarded.
pub const LINE_BUFFER: usize = 1024;

/// What to do with the child's stdout and stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Discard,
    /// Both streams are read line by line into a [`LineStream`].
    Lines,
}

/// Launch description for one external process.
#[derive(Clone, Debug)]
pub struct ProcessSpec {
    program: PathBuf,
    args: Vec<String>,
    output: OutputMode,
    current_dir: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output: OutputMode::Discard,
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn capture_lines(mut self) -> Self {
        self.output = OutputMode::Lines;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Launches the process in a fresh process group.
    pub fn spawn(self) -> Result<ProcessHandle, ProcessError> {
        ProcessHandle::spawn(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(Option<i32>),
}

/// How [`ProcessHandle::shutdown`] ended the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Graceful,
    Killed,
}

/// Result of waiting for the next output line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    /// Nothing arrived within the timeout; the process may still be producing output.
    Idle,
    /// Both output streams reached end of file.
    Closed,
}

/// Merged stdout/stderr lines of a child process.
pub struct LineStream {
    rx: Receiver<String>,
}

impl LineStream {
    pub fn next_line(&self, timeout: Duration) -> LineEvent {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => LineEvent::Line(line),
            Err(RecvTimeoutError::Timeout) => LineEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => LineEvent::Closed,
        }
    }

    /// Drains whatever is already buffered without waiting.
    pub fn drain(&self) -> Vec<String> {
        self.rx.try_iter().collect()
    }
}

/// A live external process. Shareable between the routine that reads it and the
/// registry that terminates it.
pub struct ProcessHandle {
    label: String,
    pid: u32,
    child: Mutex<Child>,
    lines: Mutex<Option<LineStream>>,
}

impl ProcessHandle {
    fn spawn(spec: ProcessSpec) -> Result<Self, ProcessError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        match spec.output {
            OutputMode::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputMode::Lines => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let label = spec
            .program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| spec.program.display().to_string());

        let lines = if spec.output == OutputMode::Lines {
            let (tx, rx) = channel::bounded(LINE_BUFFER);
            if let Some(stdout) = child.stdout.take() {
                pump_lines(&label, "stdout", stdout, tx.clone())?;
            }
            if let Some(stderr) = child.stderr.take() {
                pump_lines(&label, "stderr", stderr, tx)?;
            }
            Some(LineStream { rx })
        } else {
            None
        };

        let pid = child.id();
        debug!(program = %label, pid, "Process launched");

        Ok(Self {
            label,
            pid,
            child: Mutex::new(child),
            lines: Mutex::new(lines),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Takes the output stream. Only the first caller gets it.
    pub fn take_lines(&self) -> Option<LineStream> {
        self.lines.lock().take()
    }

    pub fn poll(&self) -> ProcessStatus {
        match self.child.lock().try_wait() {
            Ok(Some(status)) => ProcessStatus::Exited(status.code()),
            Ok(None) => ProcessStatus::Running,
            // the child can no longer be waited on; treat it as gone
            Err(_) => ProcessStatus::Exited(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.poll() == ProcessStatus::Running
    }

    /// Polls until the process exits or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> ProcessStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.poll();
            if status != ProcessStatus::Running || Instant::now() >= deadline {
                return status;
            }
            thread::sleep(EXIT_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Sends SIGTERM to the whole process group.
    pub fn signal_terminate(&self) {
        self.signal_group(GroupSignal::Terminate);
    }

    /// Sends SIGKILL to the whole process group and reaps the leader.
    pub fn kill(&self) {
        self.signal_group(GroupSignal::Kill);
        let mut child = self.child.lock();
        if let Err(e) = child.kill() {
            debug!(program = %self.label, pid = self.pid, error = %e, "Direct kill failed");
        }
        let _ = child.wait();
    }

    /// Terminate, wait up to `grace`, then kill.
    pub fn shutdown(&self, grace: Duration) -> Termination {
        if !self.is_running() {
            return Termination::AlreadyExited;
        }

        self.signal_terminate();
        if self.wait_timeout(grace) != ProcessStatus::Running {
            debug!(program = %self.label, pid = self.pid, "Process exited after SIGTERM");
            return Termination::Graceful;
        }

        warn!(
            program = %self.label,
            pid = self.pid,
            grace_ms = grace.as_millis() as u64,
            "Process ignored SIGTERM, killing"
        );
        self.kill();
        Termination::Killed
    }

    fn signal_group(&self, signal: GroupSignal) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let sig = match signal {
                GroupSignal::Terminate => Signal::SIGTERM,
                GroupSignal::Kill => Signal::SIGKILL,
            };
            if let Err(errno) = killpg(Pid::from_raw(self.pid as i32), sig) {
                debug!(program = %self.label, pid = self.pid, %errno, "Group signal not delivered");
            }
        }
        #[cfg(not(unix))]
        {
            if signal == GroupSignal::Kill {
                let _ = self.child.lock().kill();
            }
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupSignal {
    Terminate,
    Kill,
}

fn pump_lines<R>(label: &str, stream: &'static str, source: R, tx: Sender<String>) -> Result<(), ProcessError>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{label}-{stream}"))
        .spawn(move || {
            // read to EOF whether or not the lines are consumed
            let reader = BufReader::new(source);
            let mut discarded = 0u64;
            for line in reader.lines() {
                let Ok(line) = line else { break };
                match tx.try_send(line) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                    Err(TrySendError::Full(_)) => discarded += 1,
                }
            }
            if discarded > 0 {
                debug!(stream, discarded, "Unread output lines discarded");
            }
        })?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").args(["-c", script])
    }

    #[test]
    fn sigterm_ends_cooperative_process() {
        let handle = ProcessSpec::new("sleep").arg("30").spawn().unwrap();
        assert!(handle.is_running());
        assert_eq!(handle.shutdown(Duration::from_secs(2)), Termination::Graceful);
        assert!(!handle.is_running());
    }

    #[test]
    fn escalates_to_kill_when_term_is_ignored() {
        let handle = sh("trap '' TERM; sleep 30").spawn().unwrap();
        // give the shell time to install the trap
        thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        assert_eq!(handle.shutdown(Duration::from_millis(300)), Termination::Killed);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!handle.is_running());
    }

    #[test]
    fn shutdown_of_exited_process_is_noop() {
        let handle = ProcessSpec::new("true").spawn().unwrap();
        assert_eq!(handle.wait_timeout(Duration::from_secs(5)), ProcessStatus::Exited(Some(0)));
        assert_eq!(handle.shutdown(Duration::from_millis(100)), Termination::AlreadyExited);
    }

    #[test]
    fn collects_stdout_and_stderr_lines() {
        let handle = sh("echo one; echo two >&2; echo three").capture_lines().spawn().unwrap();
        let lines = handle.take_lines().unwrap();
        assert!(handle.take_lines().is_none());

        let mut seen = Vec::new();
        loop {
            match lines.next_line(Duration::from_secs(5)) {
                LineEvent::Line(line) => seen.push(line),
                LineEvent::Closed => break,
                LineEvent::Idle => panic!("output stalled"),
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["one", "three", "two"]);
    }

    #[test]
    fn unread_output_stays_bounded() {
        let handle = sh("i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done")
            .capture_lines()
            .spawn()
            .unwrap();
        assert_eq!(
            handle.wait_timeout(Duration::from_secs(30)),
            ProcessStatus::Exited(Some(0))
        );
        // let the reader threads reach EOF
        thread::sleep(Duration::from_millis(200));

        let lines = handle.take_lines().unwrap();
        let buffered = lines.drain();
        assert_eq!(buffered.len(), LINE_BUFFER);
        assert_eq!(buffered[0], "line0");
        assert_eq!(lines.next_line(Duration::from_secs(1)), LineEvent::Closed);
    }

    #[test]
    fn dropped_stream_does_not_stall_the_child() {
        let handle = sh("i=0; while [ $i -lt 5000 ]; do echo line$i; i=$((i+1)); done")
            .capture_lines()
            .spawn()
            .unwrap();
        drop(handle.take_lines());
        assert_eq!(
            handle.wait_timeout(Duration::from_secs(30)),
            ProcessStatus::Exited(Some(0))
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = ProcessSpec::new("/nonexistent/tool").spawn().unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/tool"));
    }
}
