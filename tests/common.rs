//! Test utilities & fixtures shared by the integration tests.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pinwatch::display::{DisplayView, Frame};
use pinwatch::errors::DeviceError;
use pinwatch::device::Transaction;
use pinwatch::settings::{BoardConfig, PinDef, SettingsStore};

/// Board with the given `(name, position, send_value)` pins.
#[allow(dead_code)]
pub fn board(pins: &[(&str, &str, &str)]) -> BoardConfig {
    let mut map = BTreeMap::new();
    for (name, position, send) in pins {
        map.insert(name.to_string(), PinDef::new(*position, *send));
    }
    BoardConfig {
        connection: "/dev/ttyACM0".into(),
        pins: map,
        baud_rate: 9600,
    }
}

/// Store in `dir` already holding `config`, with a clean dirty flag.
#[allow(dead_code)]
pub fn store_with(dir: &Path, config: BoardConfig) -> SettingsStore {
    let store = SettingsStore::new(dir.join("settings.json"));
    store.replace(config);
    store.save().expect("seed save");
    store
}

/// View that records frames and asks to close after a number of ticks.
#[allow(dead_code)]
pub struct ScriptedView {
    pub frames: Arc<Mutex<Vec<Frame>>>,
    pub closed: Arc<AtomicUsize>,
    close_after: usize,
    waits: usize,
}

#[allow(dead_code)]
impl ScriptedView {
    pub fn new(close_after: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
            close_after,
            waits: 0,
        }
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.frames.lock().unwrap().last().cloned()
    }
}

impl DisplayView for ScriptedView {
    fn render(&mut self, frame: &Frame) -> io::Result<()> {
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn wait_for_close(&mut self, _timeout: Duration) -> io::Result<bool> {
        self.waits += 1;
        Ok(self.waits > self.close_after)
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transaction that counts calls, can sleep, and fails for chosen positions.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedTransaction {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub delay: Duration,
    pub silent_positions: Vec<String>,
}

impl Transaction for ScriptedTransaction {
    fn transact(&self, position: &str, send_value: &str) -> Result<String, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.silent_positions.iter().any(|p| p == position) {
            return Err(DeviceError::Timeout {
                position: position.to_string(),
                after: self.delay,
            });
        }
        Ok(format!("{}:{}", position, send_value))
    }
}
