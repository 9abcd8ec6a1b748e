//! Single-pin read.
//!
//! A worker never fails: any error, empty reply or timeout from the
//! transaction becomes a [`PollResult::no_data`] sentinel so one bad pin cannot
//! hold up the others.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use super::PollResult;
use crate::device::Transaction;
use crate::errors::DeviceError;
use crate::logutil::{escape_log, value_preview};
use crate::metrics;
use crate::settings::PinDef;

#[derive(Clone)]
pub struct PollWorker {
    transaction: Arc<dyn Transaction>,
    read_timeout: Duration,
}

impl PollWorker {
    pub fn new(transaction: Arc<dyn Transaction>, read_timeout: Duration) -> Self {
        Self {
            transaction,
            read_timeout,
        }
    }

    /// Read one pin for `cycle`.
    pub async fn read(&self, pin_name: &str, pin: &PinDef, cycle: u64) -> PollResult {
        debug!("Serial read requested for device: {}", escape_log(pin_name));
        match self.transact(pin).await {
            Ok(value) => {
                metrics::inc_reads_completed();
                debug!(
                    "read {} (cycle {}): {}",
                    escape_log(pin_name),
                    cycle,
                    value_preview(&value)
                );
                PollResult::new(pin_name, value, cycle)
            }
            Err(e) => {
                metrics::inc_reads_timed_out();
                warn!(
                    "Empty read result for device {}: {}",
                    escape_log(pin_name),
                    e
                );
                PollResult::no_data(pin_name, cycle)
            }
        }
    }

    async fn transact(&self, pin: &PinDef) -> Result<String, DeviceError> {
        let tx = Arc::clone(&self.transaction);
        let position = pin.position.clone();
        let send_value = pin.send_value.clone();
        let blocking =
            tokio::task::spawn_blocking(move || tx.transact(&position, &send_value));
        let timed_out = || DeviceError::Timeout {
            position: pin.position.clone(),
            after: self.read_timeout,
        };
        match tokio::time::timeout(self.read_timeout, blocking).await {
            Ok(Ok(Ok(value))) if value.is_empty() => Err(timed_out()),
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DeviceError::Serial(format!(
                "read task failed: {}",
                join_err
            ))),
            Err(_) => Err(timed_out()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PlaceholderTransaction;

    struct Silent;
    impl Transaction for Silent {
        fn transact(&self, _position: &str, _send_value: &str) -> Result<String, DeviceError> {
            Ok(String::new())
        }
    }

    struct Slow;
    impl Transaction for Slow {
        fn transact(&self, _position: &str, _send_value: &str) -> Result<String, DeviceError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn placeholder_read_succeeds() {
        let worker = PollWorker::new(
            Arc::new(PlaceholderTransaction::default()),
            Duration::from_secs(1),
        );
        let r = worker.read("Temp", &PinDef::new("A0", "1"), 7).await;
        assert_eq!(r.pin_name, "Temp");
        assert_eq!(r.value, "100oC");
        assert_eq!(r.cycle, 7);
    }

    #[tokio::test]
    async fn empty_reply_becomes_sentinel() {
        let worker = PollWorker::new(Arc::new(Silent), Duration::from_secs(1));
        let r = worker.read("Temp", &PinDef::new("A0", "1"), 1).await;
        assert!(r.is_no_data());
        assert_eq!(r.pin_name, "Temp");
    }

    #[tokio::test]
    async fn slow_read_times_out_to_sentinel() {
        let worker = PollWorker::new(Arc::new(Slow), Duration::from_millis(20));
        let r = worker.read("Slow", &PinDef::new("4", "9"), 1).await;
        assert!(r.is_no_data());
    }
}
