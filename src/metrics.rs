//! Process-wide counters for the poll and persistence paths.
use std::sync::atomic::{AtomicU64, Ordering};

static READS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static READS_TIMED_OUT: AtomicU64 = AtomicU64::new(0);
static READS_CANCELLED: AtomicU64 = AtomicU64::new(0);
static STALE_RESULTS_DROPPED: AtomicU64 = AtomicU64::new(0);
static SETTINGS_SAVES: AtomicU64 = AtomicU64::new(0);
static SETTINGS_SAVE_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_reads_completed() {
    READS_COMPLETED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_reads_timed_out() {
    READS_TIMED_OUT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_reads_cancelled() {
    READS_CANCELLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_stale_results_dropped() {
    STALE_RESULTS_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_settings_saves() {
    SETTINGS_SAVES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_settings_save_failures() {
    SETTINGS_SAVE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub reads_completed: u64,
    pub reads_timed_out: u64,
    pub reads_cancelled: u64,
    pub stale_results_dropped: u64,
    pub settings_saves: u64,
    pub settings_save_failures: u64,
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reads={} timeouts={} cancelled={} stale={} saves={} save_failures={}",
            self.reads_completed,
            self.reads_timed_out,
            self.reads_cancelled,
            self.stale_results_dropped,
            self.settings_saves,
            self.settings_save_failures
        )
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        reads_completed: READS_COMPLETED.load(Ordering::Relaxed),
        reads_timed_out: READS_TIMED_OUT.load(Ordering::Relaxed),
        reads_cancelled: READS_CANCELLED.load(Ordering::Relaxed),
        stale_results_dropped: STALE_RESULTS_DROPPED.load(Ordering::Relaxed),
        settings_saves: SETTINGS_SAVES.load(Ordering::Relaxed),
        settings_save_failures: SETTINGS_SAVE_FAILURES.load(Ordering::Relaxed),
    }
}
