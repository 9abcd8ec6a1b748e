//! # Data View
//!
//! The display loop is a cooperative, single-threaded tick loop. Each tick it
//!
//! 1. waits up to one tick for the view to report a close request,
//! 2. starts a new refresh cycle when the refresh interval has elapsed,
//! 3. renders the freshest results from the shared [`ResultsBuffer`].
//!
//! One refresh is dispatched eagerly when the view opens. The view itself is
//! abstracted behind [`DisplayView`]; [`terminal::TerminalView`] draws it with
//! crossterm. Closing the view cancels any reads still in flight.

pub mod datalog;
pub mod terminal;

use std::io;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::metrics;
use crate::poll::scheduler::PollScheduler;
use crate::poll::{PollResult, ResultsBuffer};
use crate::settings::SettingsStore;
use datalog::DataLog;

pub const TITLE: &str = "Data display window";
pub const NO_DATA_WARNING: &str = "Timeout error. Check connections";
pub const PENDING_TEXT: &str = "Data";
pub const SENTINEL_TEXT: &str = "No data";

/// Loop state. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayState {
    Waiting,
    Refreshing,
    Rendering,
    Closed,
}

/// One named text field in the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub text: String,
}

/// Everything the view needs to draw one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub title: String,
    pub info: String,
    pub warning: bool,
    pub fields: Vec<Field>,
}

impl Frame {
    /// Text of the field for `name`, if the view has one.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.text.as_str())
    }

    /// Build a frame for `pins` from a results snapshot.
    ///
    /// Results are matched to fields by pin name; results for pins that are not
    /// in the layout are ignored.
    pub fn build(pins: &[String], snapshot: &[PollResult], refresh_interval: Duration) -> Self {
        let (info, warning) = if snapshot.is_empty() {
            (NO_DATA_WARNING.to_string(), true)
        } else {
            (
                format!(
                    "Updating data every {} seconds",
                    refresh_interval.as_secs()
                ),
                false,
            )
        };
        let fields = pins
            .iter()
            .map(|name| {
                let text = match snapshot.iter().find(|r| &r.pin_name == name) {
                    Some(r) if r.is_no_data() => SENTINEL_TEXT.to_string(),
                    Some(r) => r.value.clone(),
                    None => PENDING_TEXT.to_string(),
                };
                Field {
                    name: name.clone(),
                    text,
                }
            })
            .collect();
        Frame {
            title: TITLE.to_string(),
            info,
            warning,
            fields,
        }
    }
}

/// Rendering surface for the data view.
pub trait DisplayView {
    /// Draw the frame.
    fn render(&mut self, frame: &Frame) -> io::Result<()>;

    /// Wait at most `timeout` for a close request. Returns true to close.
    fn wait_for_close(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Release view resources. Called once when the loop ends.
    fn close(&mut self) {}
}

pub struct DisplayLoop {
    store: SettingsStore,
    scheduler: PollScheduler,
    buffer: ResultsBuffer,
    layout: Vec<String>,
    refresh_interval: Duration,
    tick: Duration,
    last_refresh: Option<Instant>,
    state: DisplayState,
    datalog: Option<DataLog>,
}

impl DisplayLoop {
    /// Create a loop whose fields are the pins configured at this moment.
    pub fn new(
        store: SettingsStore,
        scheduler: PollScheduler,
        refresh_interval: Duration,
        tick: Duration,
    ) -> Self {
        let layout = store.pins_snapshot().into_iter().map(|(n, _)| n).collect();
        let buffer = scheduler.buffer().clone();
        Self {
            store,
            scheduler,
            buffer,
            layout,
            refresh_interval,
            tick,
            last_refresh: None,
            state: DisplayState::Waiting,
            datalog: None,
        }
    }

    /// Also append every new result to `log`.
    pub fn with_datalog(mut self, log: DataLog) -> Self {
        self.datalog = Some(log);
        self
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn layout(&self) -> &[String] {
        &self.layout
    }

    /// Dispatch the eager refresh for a freshly opened view.
    pub fn open(&mut self, now: Instant) {
        self.refresh(now);
    }

    fn refresh(&mut self, now: Instant) {
        self.state = DisplayState::Refreshing;
        let _detached = self.scheduler.refresh(&self.store);
        self.last_refresh = Some(now);
    }

    fn refresh_due(&self, now: Instant) -> bool {
        match self.last_refresh {
            Some(last) => now.saturating_duration_since(last) >= self.refresh_interval,
            None => true,
        }
    }

    /// Build the frame the view would show right now.
    pub fn frame(&self) -> Frame {
        Frame::build(&self.layout, &self.buffer.snapshot(), self.refresh_interval)
    }

    /// Run one tick at wall-clock time `now`.
    pub fn tick<V: DisplayView + ?Sized>(
        &mut self,
        view: &mut V,
        now: Instant,
    ) -> io::Result<DisplayState> {
        if self.state == DisplayState::Closed {
            return Ok(DisplayState::Closed);
        }
        self.state = DisplayState::Waiting;
        if view.wait_for_close(self.tick)? {
            self.shutdown(view);
            return Ok(DisplayState::Closed);
        }

        if self.refresh_due(now) {
            self.refresh(now);
        }

        self.state = DisplayState::Rendering;
        let snapshot = self.buffer.snapshot();
        if let Some(log) = self.datalog.as_mut() {
            if let Err(e) = log.record(&snapshot) {
                warn!("Data log write failed ({}); logging disabled", e);
                self.datalog = None;
            }
        }
        let frame = Frame::build(&self.layout, &snapshot, self.refresh_interval);
        view.render(&frame)?;
        self.state = DisplayState::Waiting;
        Ok(self.state)
    }

    /// Open the view, tick until it closes, then release it.
    pub fn run<V: DisplayView + ?Sized>(mut self, view: &mut V) -> io::Result<()> {
        debug!(
            "Data view running for {} pin(s), refresh every {}s",
            self.layout.len(),
            self.refresh_interval.as_secs()
        );
        self.open(Instant::now());
        loop {
            match self.tick(view, Instant::now()) {
                Ok(DisplayState::Closed) => break,
                Ok(_) => {}
                Err(e) => {
                    self.shutdown(view);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn shutdown<V: DisplayView + ?Sized>(&mut self, view: &mut V) {
        self.state = DisplayState::Closed;
        self.scheduler.cancel();
        view.close();
        debug!("Data view closed; {}", metrics::snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_shows_warning() {
        let frame = Frame::build(&["Temp".to_string()], &[], Duration::from_secs(3));
        assert!(frame.warning);
        assert_eq!(frame.info, NO_DATA_WARNING);
        assert_eq!(frame.field("Temp"), Some(PENDING_TEXT));
    }

    #[test]
    fn fields_match_by_name_not_position() {
        let pins = vec!["A".to_string(), "B".to_string()];
        let snapshot = vec![PollResult::new("B", "2", 1), PollResult::new("A", "1", 1)];
        let frame = Frame::build(&pins, &snapshot, Duration::from_secs(3));
        assert!(!frame.warning);
        assert_eq!(frame.info, "Updating data every 3 seconds");
        assert_eq!(frame.field("A"), Some("1"));
        assert_eq!(frame.field("B"), Some("2"));
    }

    #[test]
    fn sentinel_and_unknown_results() {
        let pins = vec!["A".to_string()];
        let snapshot = vec![PollResult::no_data("A", 1), PollResult::new("Ghost", "9", 1)];
        let frame = Frame::build(&pins, &snapshot, Duration::from_secs(3));
        assert_eq!(frame.field("A"), Some(SENTINEL_TEXT));
        assert_eq!(frame.field("Ghost"), None);
    }
}
