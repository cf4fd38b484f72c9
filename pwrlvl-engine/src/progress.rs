//! Persisted progress counter (`xp.json`).
//!
//! A points total with derived level and title, plus a few activity tallies. Every award
//! is a read-modify-write under the store's lock. A missing or unreadable file counts as a
//! fresh record.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use pwrlvl_core::{EventBus, EventLevel};

/// Point thresholds, level numbers and titles, lowest first.
const LEVELS: [(u64, u32, &str); 9] = [
    (0, 1, "APPRENTICE"),
    (100, 2, "ACOLYTE"),
    (300, 3, "CONJURER"),
    (700, 4, "WARLOCK"),
    (1500, 5, "NECROMANCER"),
    (3000, 6, "LICH"),
    (6000, 7, "DREADLORD"),
    (12000, 8, "ARCHLICH"),
    (25000, 9000, "PWRLVL9000"),
];

/// Level, title and the next threshold (`None` at the top level) for a points total.
pub fn level_for(xp: u64) -> (u32, &'static str, Option<u64>) {
    let mut current = (LEVELS[0].1, LEVELS[0].2);
    for (threshold, level, title) in LEVELS {
        if xp >= threshold {
            current = (level, title);
        } else {
            return (current.0, current.1, Some(threshold));
        }
    }
    (current.0, current.1, None)
}

/// Activity tallies kept next to the points total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tally {
    Scans,
    Attacks,
    Captures,
    Cracks,
    Ports,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub xp: u64,
    pub level: u32,
    pub title: String,
    pub xp_next: Option<u64>,
    pub scans: u64,
    pub attacks: u64,
    pub captures: u64,
    pub cracks: u64,
    pub ports: u64,
}

impl Default for Progress {
    fn default() -> Self {
        let (level, title, xp_next) = level_for(0);
        Self {
            xp: 0,
            level,
            title: title.to_string(),
            xp_next,
            scans: 0,
            attacks: 0,
            captures: 0,
            cracks: 0,
            ports: 0,
        }
    }
}

impl Progress {
    fn tally_mut(&mut self, tally: Tally) -> &mut u64 {
        match tally {
            Tally::Scans => &mut self.scans,
            Tally::Attacks => &mut self.attacks,
            Tally::Captures => &mut self.captures,
            Tally::Cracks => &mut self.cracks,
            Tally::Ports => &mut self.ports,
        }
    }
}

pub struct ProgressStore {
    path: PathBuf,
    bus: Arc<EventBus>,
    lock: Mutex<()>,
}

impl ProgressStore {
    pub fn new(loot_dir: &Path, bus: Arc<EventBus>) -> Self {
        Self {
            path: loot_dir.join("xp.json"),
            bus,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Progress {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Adds `amount` points and publishes an `XP` event, plus a level-up event when the
    /// level changed.
    pub fn award(&self, amount: u64, reason: &str) -> Progress {
        let (progress, old_level) = {
            let _guard = self.lock.lock();
            let mut progress = self.read();
            let old_level = progress.level;
            progress.xp += amount;
            let (level, title, xp_next) = level_for(progress.xp);
            progress.level = level;
            progress.title = title.to_string();
            progress.xp_next = xp_next;
            self.write(&progress);
            (progress, old_level)
        };

        self.bus.publish_with(
            EventLevel::Xp,
            format!(
                "+{amount} XP [{reason}] → {} total  LVL {} {}",
                progress.xp, progress.level, progress.title
            ),
            json!({"xp": progress.xp, "level": progress.level, "title": progress.title}),
        );
        if progress.level > old_level {
            self.bus.publish_with(
                EventLevel::Xp,
                format!("★ LEVEL UP! → LVL {} {} ★", progress.level, progress.title),
                json!({"level_up": true, "level": progress.level, "title": progress.title}),
            );
        }
        progress
    }

    /// Increments an activity tally without publishing.
    pub fn bump(&self, tally: Tally) {
        let _guard = self.lock.lock();
        let mut progress = self.read();
        *progress.tally_mut(tally) += 1;
        self.write(&progress);
    }

    fn read(&self) -> Progress {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn write(&self, progress: &Progress) {
        let result = serde_json::to_vec(progress)
            .map_err(std::io::Error::other)
            .and_then(|bytes| fs::write(&self.path, bytes));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to persist progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwrlvl_core::Recv;
    use std::time::Duration;

    #[test]
    fn level_table() {
        assert_eq!(level_for(0), (1, "APPRENTICE", Some(100)));
        assert_eq!(level_for(99), (1, "APPRENTICE", Some(100)));
        assert_eq!(level_for(100), (2, "ACOLYTE", Some(300)));
        assert_eq!(level_for(24_999), (8, "ARCHLICH", Some(25_000)));
        assert_eq!(level_for(25_000), (9000, "PWRLVL9000", None));
    }

    #[test]
    fn award_persists_and_levels_up() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(50, 50, 0);
        let sub = bus.subscribe();
        let store = ProgressStore::new(dir.path(), bus.clone());

        store.award(60, "scan started");
        let progress = store.award(50, "handshake captured");
        assert_eq!(progress.xp, 110);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.xp_next, Some(300));

        let reopened = ProgressStore::new(dir.path(), bus.clone());
        assert_eq!(reopened.load(), progress);

        let mut messages = Vec::new();
        while let Recv::Event(event) = sub.recv_timeout(Duration::from_millis(50)) {
            assert_eq!(event.level, EventLevel::Xp);
            messages.push(event.message);
        }
        assert_eq!(messages.len(), 3);
        assert!(messages[2].contains("LEVEL UP"));
    }

    #[test]
    fn corrupt_file_reads_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("xp.json"), "{not json").unwrap();
        let store = ProgressStore::new(dir.path(), EventBus::new(10, 10, 0));
        assert_eq!(store.load(), Progress::default());

        store.bump(Tally::Cracks);
        store.bump(Tally::Cracks);
        assert_eq!(store.load().cracks, 2);
    }
}
