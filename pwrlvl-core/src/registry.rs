//! Process Registry.
//!
//! Maps operation roles (`"scan"`, `"rogueap:hostapd"`) to the process currently filling
//! them. The lock covers only map mutation; signalling and waiting happen after the entry
//! has been removed, so a slow shutdown never blocks other operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::error::RegistryError;
use crate::process::{ProcessHandle, Termination};

/// Registry key for an operation's process, optionally qualified by a role.
pub fn process_key(operation: &str, role: Option<&str>) -> String {
    match role {
        Some(role) => format!("{operation}:{role}"),
        None => operation.to_string(),
    }
}

fn belongs_to(key: &str, operation: &str) -> bool {
    key == operation
        || key
            .strip_prefix(operation)
            .is_some_and(|rest| rest.starts_with(':'))
}

#[derive(Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<String, Arc<ProcessHandle>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` under `key`. An occupied key is refused and the existing entry kept.
    pub fn register(&self, key: &str, handle: Arc<ProcessHandle>) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Err(RegistryError::Occupied(key.to_string()));
        }
        entries.insert(key.to_string(), handle);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Arc<ProcessHandle>> {
        self.entries.lock().get(key).cloned()
    }

    /// Removes the entry without signalling the process.
    pub fn deregister(&self, key: &str) -> Option<Arc<ProcessHandle>> {
        self.entries.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Keys registered for `operation`, including role-qualified ones.
    pub fn keys_for(&self, operation: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|key| belongs_to(key, operation))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Removes and shuts down the process under `key`. `None` when nothing was registered.
    pub fn terminate(&self, key: &str, grace: Duration) -> Option<Termination> {
        let handle = self.deregister(key)?;
        let outcome = handle.shutdown(grace);
        info!(key, pid = handle.pid(), outcome = ?outcome, "Process terminated");
        Some(outcome)
    }

    /// Shuts down every process belonging to `operation` in parallel.
    pub fn terminate_operation(&self, operation: &str, grace: Duration) -> Vec<Termination> {
        let handles: Vec<(String, Arc<ProcessHandle>)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .keys()
                .filter(|key| belongs_to(key, operation))
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|handle| (key, handle)))
                .collect()
        };
        shutdown_all(handles, grace)
    }

    /// Shuts down everything. Used on server shutdown.
    pub fn terminate_all(&self, grace: Duration) -> Vec<Termination> {
        let handles: Vec<(String, Arc<ProcessHandle>)> = self.entries.lock().drain().collect();
        shutdown_all(handles, grace)
    }
}

fn shutdown_all(handles: Vec<(String, Arc<ProcessHandle>)>, grace: Duration) -> Vec<Termination> {
    thread::scope(|scope| {
        let workers: Vec<_> = handles
            .iter()
            .map(|(key, handle)| {
                scope.spawn(move || {
                    let outcome = handle.shutdown(grace);
                    info!(key = %key, pid = handle.pid(), outcome = ?outcome, "Process terminated");
                    outcome
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or(Termination::Killed))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_role_qualified() {
        assert_eq!(process_key("scan", None), "scan");
        assert_eq!(process_key("rogueap", Some("hostapd")), "rogueap:hostapd");
        assert!(belongs_to("rogueap:dnsmasq", "rogueap"));
        assert!(belongs_to("wps", "wps"));
        // prefix without separator is a different operation
        assert!(!belongs_to("wps-scan", "wps"));
    }

    #[cfg(unix)]
    mod live {
        use super::super::*;
        use crate::process::ProcessSpec;
        use std::time::Instant;

        fn sleeper() -> Arc<ProcessHandle> {
            Arc::new(ProcessSpec::new("sleep").arg("30").spawn().unwrap())
        }

        #[test]
        fn occupied_key_is_refused() {
            let registry = ProcessRegistry::new();
            registry.register("scan", sleeper()).unwrap();

            let second = sleeper();
            let err = registry.register("scan", second.clone()).unwrap_err();
            assert_eq!(err, RegistryError::Occupied("scan".into()));
            second.kill();

            assert_eq!(registry.terminate_all(Duration::from_secs(2)), vec![Termination::Graceful]);
            assert!(registry.is_empty());
        }

        #[test]
        fn terminate_removes_and_stops() {
            let registry = ProcessRegistry::new();
            let handle = sleeper();
            registry.register("capture", handle.clone()).unwrap();

            assert_eq!(
                registry.terminate("capture", Duration::from_secs(2)),
                Some(Termination::Graceful)
            );
            assert!(!registry.contains("capture"));
            assert!(!handle.is_running());
            assert_eq!(registry.terminate("capture", Duration::from_secs(2)), None);
        }

        #[test]
        fn terminate_operation_covers_all_roles_in_parallel() {
            let registry = ProcessRegistry::new();
            let stubborn = || {
                Arc::new(
                    ProcessSpec::new("sh")
                        .args(["-c", "trap '' TERM; sleep 30"])
                        .spawn()
                        .unwrap(),
                )
            };
            registry.register("rogueap:hostapd", stubborn()).unwrap();
            registry.register("rogueap:dnsmasq", stubborn()).unwrap();
            registry.register("scan", sleeper()).unwrap();
            assert_eq!(registry.keys_for("rogueap").len(), 2);
            std::thread::sleep(Duration::from_millis(200));

            let started = Instant::now();
            let outcomes = registry.terminate_operation("rogueap", Duration::from_secs(1));
            assert_eq!(outcomes, vec![Termination::Killed, Termination::Killed]);
            // two grace periods run concurrently, not back to back
            assert!(started.elapsed() < Duration::from_millis(1900));
            assert_eq!(registry.keys_for("rogueap"), Vec::<String>::new());
            assert!(registry.contains("scan"));

            registry.terminate_all(Duration::from_secs(2));
        }
    }
}
