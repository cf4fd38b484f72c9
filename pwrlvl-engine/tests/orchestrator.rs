//! Lifecycle tests against stand-in operations built on `sh` and `sleep`.
#![cfg(unix)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use pwrlvl_core::{process_key, Event, EventBus, EventLevel, ProcessSpec, Recv, Subscription};
use pwrlvl_engine::{
    EngineSettings, Operation, OperationContext, OperationError, Orchestrator, Params,
};

/// Holds a `sleep` child until stopped.
struct Sleeper;

impl Operation for Sleeper {
    fn name(&self) -> &'static str {
        "sleeper"
    }

    fn prepare(&self, raw: &Params, _: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new().with("seconds", raw.number_or("seconds", 30)?))
    }

    fn start_event(&self, _: &Params) -> (EventLevel, String) {
        (EventLevel::Scan, "sleeper up".into())
    }

    fn run(&self, ctx: &OperationContext, params: &Params) -> Result<(), OperationError> {
        let sleep = ctx.require(&["sleep"])?;
        let seconds = params.number_or("seconds", 30)?.to_string();
        ctx.spawn(None, ProcessSpec::new(sleep).arg(seconds))?;
        while ctx.sleep(Duration::from_millis(20)) {}
        ctx.set_result(json!({"slept": true}));
        Ok(())
    }
}

/// Launches a child that ignores SIGTERM.
struct Stubborn;

impl Operation for Stubborn {
    fn name(&self) -> &'static str {
        "stubborn"
    }

    fn prepare(&self, _: &Params, _: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new())
    }

    fn start_event(&self, _: &Params) -> (EventLevel, String) {
        (EventLevel::Info, "stubborn up".into())
    }

    fn run(&self, ctx: &OperationContext, _: &Params) -> Result<(), OperationError> {
        let sh = ctx.require(&["sh"])?;
        ctx.spawn(
            Some("worker"),
            ProcessSpec::new(sh).args(["-c", "trap '' TERM; sleep 30"]),
        )?;
        while ctx.sleep(Duration::from_millis(20)) {}
        Ok(())
    }
}

/// Publishes a domain event and a result, then returns.
struct Quick;

impl Operation for Quick {
    fn name(&self) -> &'static str {
        "quick"
    }

    fn prepare(&self, _: &Params, _: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new())
    }

    fn accepted(&self, _: &Params) -> String {
        "Quick started".into()
    }

    fn start_event(&self, _: &Params) -> (EventLevel, String) {
        (EventLevel::Scan, "quick scan".into())
    }

    fn run(&self, ctx: &OperationContext, _: &Params) -> Result<(), OperationError> {
        ctx.publish_with(EventLevel::Scan, "Found 2 APs", json!({"aps": 2}));
        ctx.set_result(json!(["AA:BB:CC:DD:EE:01", "AA:BB:CC:DD:EE:02"]));
        Ok(())
    }
}

/// Fails after launching a child.
struct Failing;

impl Operation for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn prepare(&self, _: &Params, _: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new())
    }

    fn start_event(&self, _: &Params) -> (EventLevel, String) {
        (EventLevel::Info, "failing up".into())
    }

    fn error_label(&self) -> &'static str {
        "Failing"
    }

    fn run(&self, ctx: &OperationContext, _: &Params) -> Result<(), OperationError> {
        let sleep = ctx.require(&["sleep"])?;
        ctx.spawn(None, ProcessSpec::new(sleep).arg("30"))?;
        Err(OperationError::ProcessFailure("boom".into()))
    }
}

struct Panicking;

impl Operation for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn prepare(&self, _: &Params, _: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new())
    }

    fn start_event(&self, _: &Params) -> (EventLevel, String) {
        (EventLevel::Info, "panicking up".into())
    }

    fn run(&self, _: &OperationContext, _: &Params) -> Result<(), OperationError> {
        panic!("kaboom");
    }
}

/// Needs a binary nobody has.
struct Missing;

impl Operation for Missing {
    fn name(&self) -> &'static str {
        "missing"
    }

    fn prepare(&self, _: &Params, _: &EngineSettings) -> Result<Params, OperationError> {
        Ok(Params::new())
    }

    fn start_event(&self, _: &Params) -> (EventLevel, String) {
        (EventLevel::Info, "missing up".into())
    }

    fn error_label(&self) -> &'static str {
        "Missing"
    }

    fn run(&self, ctx: &OperationContext, _: &Params) -> Result<(), OperationError> {
        ctx.require(&["pwrlvl-no-such-tool"])?;
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    orchestrator: Arc<Orchestrator>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = EngineSettings {
        grace: Duration::from_millis(300),
        poll_interval: Duration::from_millis(20),
        command_timeout: Duration::from_secs(5),
        loot_dir: dir.path().join("loot"),
        handshake_dir: dir.path().join("handshakes"),
        scratch_dir: dir.path().to_path_buf(),
        search_dirs: Vec::new(),
        default_iface: "wlan0".into(),
        default_ap_iface: "wlan1".into(),
    };
    let catalog: Vec<Arc<dyn Operation>> = vec![
        Arc::new(Sleeper),
        Arc::new(Stubborn),
        Arc::new(Quick),
        Arc::new(Failing),
        Arc::new(Panicking),
        Arc::new(Missing),
    ];
    let orchestrator =
        Orchestrator::with_operations(settings, EventBus::new(500, 500, 50), None, catalog);
    Harness {
        _dir: dir,
        orchestrator: Arc::new(orchestrator),
    }
}

/// Collects events until one satisfies `done` or the timeout elapses.
fn collect_until(sub: &Subscription, timeout: Duration, done: impl Fn(&Event) -> bool) -> Vec<Event> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Recv::Event(event) = sub.recv_timeout(Duration::from_millis(50)) {
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
    }
    events
}

fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn second_start_is_rejected() {
    let h = harness();
    let orch = &h.orchestrator;

    assert!(orch.start("sleeper", &Params::new()).is_ok());
    let err = orch.start("sleeper", &Params::new()).unwrap_err();
    assert!(matches!(err, OperationError::AlreadyRunning));
    assert_eq!(err.to_string(), "already running");
    assert_eq!(orch.state().snapshot().get("sleeper").unwrap().runs, 1);

    orch.stop("sleeper").unwrap();
    assert!(orch.wait_idle("sleeper", Duration::from_secs(5)));
    assert!(orch.start("sleeper", &Params::new()).is_ok());
    orch.stop("sleeper").unwrap();
    assert!(orch.wait_idle("sleeper", Duration::from_secs(5)));
}

#[test]
fn stopping_an_idle_operation_changes_nothing() {
    let h = harness();
    let orch = &h.orchestrator;
    let before = orch.bus().stats().published;

    assert_eq!(orch.stop("sleeper").unwrap(), "sleeper not running");
    assert_eq!(orch.stop("sleeper").unwrap(), "sleeper not running");

    assert_eq!(orch.bus().stats().published, before);
    let view = orch.status();
    assert!(!view.is_running("sleeper"));
    assert_eq!(view.get("sleeper").unwrap().runs, 0);
}

#[test]
fn stop_terminates_processes_before_returning() {
    let h = harness();
    let orch = &h.orchestrator;

    orch.start("sleeper", &Params::new().with("seconds", 60)).unwrap();
    let key = process_key("sleeper", None);
    assert!(wait_for(Duration::from_secs(5), || orch.registry().contains(&key)));
    let handle = orch.registry().get(&key).unwrap();

    orch.stop("sleeper").unwrap();
    assert!(!handle.is_running());
    assert!(!orch.registry().contains(&key));
    assert!(orch.wait_idle("sleeper", Duration::from_secs(5)));
    assert_eq!(orch.state().result("sleeper"), Some(json!({"slept": true})));
}

#[test]
fn stubborn_process_is_killed_after_grace() {
    let h = harness();
    let orch = &h.orchestrator;

    orch.start("stubborn", &Params::new()).unwrap();
    let key = process_key("stubborn", Some("worker"));
    assert!(wait_for(Duration::from_secs(5), || orch.registry().contains(&key)));
    let handle = orch.registry().get(&key).unwrap();
    // give the shell time to install its trap
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    orch.stop("stubborn").unwrap();
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(!handle.is_running());
    assert!(orch.registry().is_empty());
    assert!(orch.wait_idle("stubborn", Duration::from_secs(5)));
}

#[test]
fn completion_event_follows_progress() {
    let h = harness();
    let orch = &h.orchestrator;
    let sub = orch.bus().subscribe();

    assert_eq!(orch.start("quick", &Params::new()).unwrap(), "Quick started");
    let events = collect_until(&sub, Duration::from_secs(5), |e| {
        e.message.starts_with("quick finished")
    });

    let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["quick scan", "Found 2 APs", "quick finished (completed)"]
    );
    let done = events.last().unwrap();
    assert_eq!(done.level, EventLevel::Info);
    assert_eq!(done.payload.as_ref().unwrap()["outcome"], "completed");

    assert!(orch.wait_idle("quick", Duration::from_secs(5)));
    let view = orch.status();
    let quick = view.get("quick").unwrap();
    assert!(!quick.running);
    assert_eq!(quick.result.as_array().unwrap().len(), 2);
}

#[test]
fn failure_is_reported_and_cleaned_up() {
    let h = harness();
    let orch = &h.orchestrator;
    let sub = orch.bus().subscribe();

    orch.start("failing", &Params::new()).unwrap();
    let events = collect_until(&sub, Duration::from_secs(5), |e| {
        e.message.starts_with("failing finished")
    });

    assert!(events
        .iter()
        .any(|e| e.level == EventLevel::Error && e.message == "Failing error: boom"));
    assert_eq!(
        events.last().unwrap().payload.as_ref().unwrap()["outcome"],
        "failed"
    );
    assert!(orch.wait_idle("failing", Duration::from_secs(5)));
    assert!(orch.registry().is_empty());
}

#[test]
fn panic_is_contained() {
    let h = harness();
    let orch = &h.orchestrator;
    let sub = orch.bus().subscribe();

    orch.start("panicking", &Params::new()).unwrap();
    let events = collect_until(&sub, Duration::from_secs(5), |e| {
        e.message.starts_with("panicking finished")
    });
    assert!(events
        .iter()
        .any(|e| e.level == EventLevel::Error && e.message.contains("panic: kaboom")));

    assert!(orch.wait_idle("panicking", Duration::from_secs(5)));
    assert!(orch.start("panicking", &Params::new()).is_ok());
    assert!(orch.wait_idle("panicking", Duration::from_secs(5)));
}

#[test]
fn missing_tool_aborts_cleanly() {
    let h = harness();
    let orch = &h.orchestrator;
    let sub = orch.bus().subscribe();

    orch.start("missing", &Params::new()).unwrap();
    let events = collect_until(&sub, Duration::from_secs(5), |e| {
        e.message.starts_with("missing finished")
    });
    assert!(events
        .iter()
        .any(|e| e.message == "Missing error: pwrlvl-no-such-tool not found"));
    assert!(orch.wait_idle("missing", Duration::from_secs(5)));
}

#[test]
fn concurrent_start_and_stop_leave_no_orphans() {
    let h = harness();
    let orch = h.orchestrator.clone();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let orch = orch.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    if i % 2 == 0 {
                        let _ = orch.start("sleeper", &Params::new());
                    } else {
                        orch.stop("sleeper").unwrap();
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    orch.stop("sleeper").unwrap();
    assert!(orch.wait_idle("sleeper", Duration::from_secs(10)));
    assert!(wait_for(Duration::from_secs(5), || orch.registry().is_empty()));
    assert!(!orch.status().is_running("sleeper"));
}

#[test]
fn shutdown_stops_everything() {
    let h = harness();
    let orch = &h.orchestrator;

    orch.start("sleeper", &Params::new()).unwrap();
    orch.start("stubborn", &Params::new()).unwrap();
    assert!(wait_for(Duration::from_secs(5), || orch.registry().len() == 2));

    orch.shutdown();
    assert!(orch.registry().is_empty());
    assert!(wait_for(Duration::from_secs(5), || orch.state().active().is_empty()));
}
