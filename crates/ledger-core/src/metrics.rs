//! Global atomic counters for engine observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI invocation).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    sessions_opened: AtomicU64,
    edits_applied: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    discards: AtomicU64,
    undos: AtomicU64,
    redos: AtomicU64,
    restores: AtomicU64,
    rollbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($inc:ident, $get:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = stringify!($field), "counter incremented");
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            edits_applied: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            discards: AtomicU64::new(0),
            undos: AtomicU64::new(0),
            redos: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    counter!(inc_sessions_opened, sessions_opened, sessions_opened);
    counter!(inc_edits_applied, edits_applied, edits_applied);
    counter!(inc_commits, commits, commits);
    counter!(inc_conflicts, conflicts, conflicts);
    counter!(inc_discards, discards, discards);
    counter!(inc_undos, undos, undos);
    counter!(inc_redos, redos, redos);
    counter!(inc_restores, restores, restores);
    counter!(inc_rollbacks, rollbacks, rollbacks);

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            sessions_opened = self.sessions_opened(),
            edits_applied = self.edits_applied(),
            commits = self.commits(),
            conflicts = self.conflicts(),
            discards = self.discards(),
            undos = self.undos(),
            redos = self.redos(),
            restores = self.restores(),
            rollbacks = self.rollbacks(),
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.sessions_opened,
            &self.edits_applied,
            &self.commits,
            &self.conflicts,
            &self.discards,
            &self.undos,
            &self.redos,
            &self.restores,
            &self.rollbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
