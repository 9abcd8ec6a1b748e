//! Refresh-cycle dispatch.
//!
//! [`PollScheduler::refresh`] snapshots the pin table, opens a new cycle in the
//! [`ResultsBuffer`] and spawns one task per pin, then returns without waiting.
//! Reads run through a bounded pool (a semaphore sized by
//! `poll.max_concurrent_reads`) and every task watches the scheduler's
//! cancellation signal. The scheduler lives as long as one data view; dropping
//! or [`cancel`](PollScheduler::cancel)ling it stops every queued or in-flight
//! read, and those reads append nothing.

use std::sync::Arc;

use log::debug;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use super::worker::PollWorker;
use super::ResultsBuffer;
use crate::config::PollConfig;
use crate::device::Transaction;
use crate::metrics;
use crate::settings::{PinDef, SettingsStore};

/// Handle on one dispatched refresh cycle.
///
/// Dropping it detaches the tasks; [`join`](Self::join) waits for them.
#[derive(Debug)]
pub struct Refresh {
    pub cycle: u64,
    pub dispatched: usize,
    tasks: Vec<JoinHandle<()>>,
}

impl Refresh {
    /// Wait until every task of this cycle has finished or been cancelled.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

pub struct PollScheduler {
    runtime: Handle,
    worker: PollWorker,
    buffer: ResultsBuffer,
    permits: Arc<Semaphore>,
    cancel_tx: watch::Sender<bool>,
}

impl PollScheduler {
    pub fn new(
        runtime: Handle,
        transaction: Arc<dyn Transaction>,
        buffer: ResultsBuffer,
        cfg: &PollConfig,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            runtime,
            worker: PollWorker::new(transaction, cfg.read_timeout()),
            buffer,
            permits: Arc::new(Semaphore::new(cfg.max_concurrent_reads.max(1))),
            cancel_tx,
        }
    }

    pub fn buffer(&self) -> &ResultsBuffer {
        &self.buffer
    }

    /// Dispatch a read for every pin currently configured in `store`.
    pub fn refresh(&self, store: &SettingsStore) -> Refresh {
        self.refresh_pins(store.pins_snapshot())
    }

    /// Dispatch a read for each of `pins`.
    pub fn refresh_pins(&self, pins: Vec<(String, PinDef)>) -> Refresh {
        if self.is_cancelled() {
            return Refresh {
                cycle: self.buffer.current_cycle(),
                dispatched: 0,
                tasks: Vec::new(),
            };
        }
        let cycle = self.buffer.begin_cycle();
        let mut tasks = Vec::with_capacity(pins.len());
        for (name, pin) in pins {
            let worker = self.worker.clone();
            let buffer = self.buffer.clone();
            let permits = Arc::clone(&self.permits);
            let mut cancel = self.cancel_tx.subscribe();
            tasks.push(self.runtime.spawn(async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return,
                    },
                    _ = cancelled(&mut cancel) => {
                        metrics::inc_reads_cancelled();
                        return;
                    }
                };
                let result = tokio::select! {
                    r = worker.read(&name, &pin, cycle) => r,
                    _ = cancelled(&mut cancel) => {
                        metrics::inc_reads_cancelled();
                        return;
                    }
                };
                buffer.append(result);
            }));
        }
        debug!("refresh cycle {} dispatched {} read(s)", cycle, tasks.len());
        Refresh {
            cycle,
            dispatched: tasks.len(),
            tasks,
        }
    }

    /// Stop all queued and in-flight reads. Later refreshes dispatch nothing.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Resolves once cancellation is requested or the scheduler is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PlaceholderTransaction;

    fn scheduler(buffer: ResultsBuffer) -> PollScheduler {
        PollScheduler::new(
            Handle::current(),
            Arc::new(PlaceholderTransaction::default()),
            buffer,
            &PollConfig::default(),
        )
    }

    #[tokio::test]
    async fn one_task_per_pin() {
        let buffer = ResultsBuffer::new();
        let sched = scheduler(buffer.clone());
        let pins = vec![
            ("A".to_string(), PinDef::new("1", "1")),
            ("B".to_string(), PinDef::new("2", "1")),
            ("C".to_string(), PinDef::new("3", "1")),
        ];
        let refresh = sched.refresh_pins(pins);
        assert_eq!(refresh.dispatched, 3);
        refresh.join().await;
        assert_eq!(buffer.current_results().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_scheduler_dispatches_nothing() {
        let buffer = ResultsBuffer::new();
        let sched = scheduler(buffer.clone());
        sched.cancel();
        let refresh = sched.refresh_pins(vec![("A".to_string(), PinDef::new("1", "1"))]);
        assert_eq!(refresh.dispatched, 0);
        refresh.join().await;
        assert!(buffer.is_empty());
    }
}
