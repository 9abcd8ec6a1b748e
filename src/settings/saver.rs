//! Debounced settings persistence.
//!
//! A single long-lived task owns the write path for the settings file. Dirty
//! notifications travel over a channel with capacity one, so any number of marks
//! made while a wake-up is already queued collapse into that one wake-up. After
//! waking, the task waits out the debounce window, drains anything that arrived
//! meanwhile, and writes once if the store is still dirty.
//!
//! ```text
//!   Idle --(dirty signal)--> Woken --(flag set)--> Saving --> Idle
//!                              \--(flag clear)-----------/
//! ```
//!
//! [`SaverHandle::shutdown`] flushes a pending change before the task exits so a
//! mark made just before quitting is never lost.

use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use super::SettingsStore;

/// Observable saver state, mainly for logs and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaverState {
    Idle,
    Woken,
    Saving,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaverStats {
    /// Times the task woke on a dirty signal
    pub wakeups: u64,
    /// Successful writes
    pub saves: u64,
    /// Failed writes
    pub failures: u64,
    /// Extra signals absorbed during a debounce window
    pub coalesced: u64,
}

enum SaverCommand {
    Snapshot(oneshot::Sender<SaverStats>),
    Shutdown(oneshot::Sender<SaverStats>),
}

/// Saver bound to a store but not yet running.
///
/// Creating it wires the store's dirty signal; marks made before
/// [`start`](Self::start) stay queued and are handled once it runs.
pub struct DebouncedSaver {
    store: SettingsStore,
    debounce: Duration,
    wake_rx: mpsc::Receiver<()>,
}

#[derive(Clone, Debug)]
pub struct SaverHandle {
    tx: mpsc::UnboundedSender<SaverCommand>,
}

impl SaverHandle {
    pub async fn snapshot(&self) -> Option<SaverStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SaverCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Flush any pending change and stop the task. Returns final stats.
    pub async fn shutdown(&self) -> Option<SaverStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SaverCommand::Shutdown(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }
}

impl DebouncedSaver {
    pub fn new(store: &SettingsStore, debounce: Duration) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel::<()>(1);
        store.set_notifier(wake_tx);
        Self {
            store: store.clone(),
            debounce,
            wake_rx,
        }
    }

    /// Spawn the saver on the current tokio runtime.
    pub fn start(self) -> SaverHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<SaverCommand>();
        let handle = SaverHandle { tx };
        let DebouncedSaver {
            store,
            debounce,
            mut wake_rx,
        } = self;

        tokio::spawn(async move {
            let mut stats = SaverStats::default();
            let mut state = SaverState::Idle;
            loop {
                tokio::select! {
                    biased;
                    Some(cmd) = rx.recv() => {
                        match cmd {
                            SaverCommand::Snapshot(resp) => { let _ = resp.send(stats); }
                            SaverCommand::Shutdown(done) => {
                                if store.is_dirty() {
                                    flush(&store, &mut stats);
                                }
                                let _ = done.send(stats);
                                break;
                            }
                        }
                    }
                    Some(()) = wake_rx.recv() => {
                        state = transition(state, SaverState::Woken);
                        stats.wakeups += 1;
                        if !debounce.is_zero() {
                            tokio::time::sleep(debounce).await;
                        }
                        while wake_rx.try_recv().is_ok() {
                            stats.coalesced += 1;
                        }
                        if store.is_dirty() {
                            state = transition(state, SaverState::Saving);
                            flush(&store, &mut stats);
                        }
                        state = transition(state, SaverState::Idle);
                    }
                    else => break,
                }
            }
            debug!("settings saver terminated ({:?})", stats);
        });

        handle
    }
}

fn transition(from: SaverState, to: SaverState) -> SaverState {
    if from != to {
        debug!("saver {:?} -> {:?}", from, to);
    }
    to
}

fn flush(store: &SettingsStore, stats: &mut SaverStats) {
    match store.save() {
        Ok(()) => stats.saves += 1,
        Err(e) => {
            stats.failures += 1;
            warn!("Failed to save settings to {}: {}", store.path().display(), e);
        }
    }
}
