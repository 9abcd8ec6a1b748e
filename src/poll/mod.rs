//! # Pin Polling
//!
//! - [`ResultsBuffer`] - shared, lock-protected store of poll results scoped per refresh cycle
//! - [`worker`] - reads a single pin through a [`crate::device::Transaction`]
//! - [`scheduler`] - dispatches one worker task per pin for each refresh cycle
//!
//! Workers write into the buffer from many tasks; the display loop reads
//! snapshots from its own thread. Results arrive in any order and are always
//! matched to pins by name.

pub mod scheduler;
pub mod worker;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics;

/// Outcome of reading one pin during one refresh cycle.
///
/// An empty `value` is the sentinel for "the device returned no data".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollResult {
    pub pin_name: String,
    pub value: String,
    pub cycle: u64,
    pub read_at: DateTime<Utc>,
}

impl PollResult {
    pub fn new(pin_name: impl Into<String>, value: impl Into<String>, cycle: u64) -> Self {
        Self {
            pin_name: pin_name.into(),
            value: value.into(),
            cycle,
            read_at: Utc::now(),
        }
    }

    /// Sentinel result for a pin whose read produced nothing.
    pub fn no_data(pin_name: impl Into<String>, cycle: u64) -> Self {
        Self::new(pin_name, String::new(), cycle)
    }

    pub fn is_no_data(&self) -> bool {
        self.value.is_empty()
    }
}

#[derive(Debug, Default)]
struct Cycles {
    cycle: u64,
    current: Vec<PollResult>,
    previous: Vec<PollResult>,
}

/// Shared poll results, replaced cycle by cycle.
///
/// [`begin_cycle`](Self::begin_cycle) starts a new cycle; results from the
/// cycle before it stay visible in snapshots until the same pin reports again,
/// so the view does not blank between refreshes. Appends tagged with an older
/// cycle are dropped.
#[derive(Debug, Clone, Default)]
pub struct ResultsBuffer {
    inner: Arc<Mutex<Cycles>>,
}

impl ResultsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Cycles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new cycle and return its id.
    pub fn begin_cycle(&self) -> u64 {
        let mut guard = self.lock();
        guard.cycle += 1;
        if !guard.current.is_empty() {
            let done = std::mem::take(&mut guard.current);
            guard.previous = done;
        }
        guard.cycle
    }

    pub fn current_cycle(&self) -> u64 {
        self.lock().cycle
    }

    /// Record a result. Returns false when it belongs to a superseded cycle.
    pub fn append(&self, result: PollResult) -> bool {
        let mut guard = self.lock();
        if result.cycle != guard.cycle {
            metrics::inc_stale_results_dropped();
            return false;
        }
        guard.current.push(result);
        true
    }

    /// Results reported so far in the current cycle, in arrival order.
    pub fn current_results(&self) -> Vec<PollResult> {
        self.lock().current.clone()
    }

    /// Freshest result for every pin: the current cycle first, then the
    /// previous cycle for pins that have not reported yet.
    pub fn snapshot(&self) -> Vec<PollResult> {
        let guard = self.lock();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::with_capacity(guard.current.len() + guard.previous.len());
        for r in guard.current.iter().chain(guard.previous.iter()) {
            if seen.insert(r.pin_name.as_str()) {
                out.push(r.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.lock();
        guard.current.is_empty() && guard.previous.is_empty()
    }

    /// Drop every stored result. The cycle counter keeps counting.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.current.clear();
        guard.previous.clear();
    }
}
