//! Watch-mode scheduling.
//!
//! File events are debounced per path. A path becomes due once it has been
//! quiet for the debounce window; the scheduler then hands out a ticket
//! stamped with the path's current generation. Any later event for the same
//! path bumps the generation, so a result computed from an older ticket is
//! rejected by [`WatchScheduler::commit`]. The last-scheduled validation wins.

use crate::core::adapter::model_owner;
use crate::core::config::ARCH_DIR;
use crate::core::violation::FileResult;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub path: String,
    pub generation: u64,
}

#[derive(Debug)]
pub struct WatchScheduler {
    debounce: Duration,
    /// Last event time per path not yet handed out.
    pending: BTreeMap<String, Instant>,
    generations: FxHashMap<String, u64>,
    latest: BTreeMap<String, FileResult>,
    superseded: u64,
}

impl Default for WatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl WatchScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: BTreeMap::new(),
            generations: FxHashMap::default(),
            latest: BTreeMap::new(),
            superseded: 0,
        }
    }

    /// Records a change event. Restarts the path's quiet period and
    /// invalidates every ticket already issued for it.
    pub fn notify(&mut self, path: &str, at: Instant) {
        *self.generations.entry(path.to_string()).or_insert(0) += 1;
        self.pending.insert(path.to_string(), at);
    }

    /// Paths whose quiet period has elapsed, removed from the pending set.
    pub fn due(&mut self, now: Instant) -> Vec<Ticket> {
        let ready: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= self.debounce)
            .map(|(path, _)| path.clone())
            .collect();
        ready
            .into_iter()
            .map(|path| {
                self.pending.remove(&path);
                let generation = self.generations.get(&path).copied().unwrap_or(0);
                Ticket { path, generation }
            })
            .collect()
    }

    /// Earliest instant at which some pending path becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|last| *last + self.debounce)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.generations.get(&ticket.path) == Some(&ticket.generation)
    }

    /// Stores `result` if `ticket` is still the latest for its path.
    pub fn commit(&mut self, ticket: &Ticket, result: FileResult) -> bool {
        if !self.is_current(ticket) {
            self.superseded += 1;
            return false;
        }
        self.latest.insert(ticket.path.clone(), result);
        true
    }

    pub fn latest(&self, path: &str) -> Option<&FileResult> {
        self.latest.get(path)
    }

    pub fn results(&self) -> impl Iterator<Item = &FileResult> {
        self.latest.values()
    }

    /// Results discarded because a newer event arrived first.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

/// What a changed project-relative path means in watch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// Registry or config edit: reload the engine and revalidate everything.
    Reload,
    /// Revalidate this source file.
    Source(String),
    Ignore,
}

/// A sidecar model edit revalidates the source file it describes.
pub fn classify_change(rel: &str, included: impl Fn(&str) -> bool) -> WatchTarget {
    if !rel.starts_with(&format!("{}/", ARCH_DIR)) {
        return if included(rel) {
            WatchTarget::Source(rel.to_string())
        } else {
            WatchTarget::Ignore
        };
    }
    if rel.ends_with(".toml") {
        return WatchTarget::Reload;
    }
    match model_owner(rel) {
        Some(owner) if included(owner) => WatchTarget::Source(owner.to_string()),
        _ => WatchTarget::Ignore,
    }
}
