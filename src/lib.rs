//! # pinwatch - poll named microcontroller pins from the terminal
//!
//! pinwatch keeps a small board profile (serial connection, baud rate and a
//! table of named pins), persists it as it is edited, and shows a periodically
//! refreshed view of the value read from every pin.
//!
//! ## Features
//!
//! - **Interactive setup**: first-run prompts for baud rate, serial port and pins.
//! - **Debounced persistence**: edits mark the settings dirty; a background task
//!   coalesces bursts of edits into one atomic, file-locked write.
//! - **Concurrent polling**: one read task per pin per refresh cycle, through a
//!   bounded worker pool with per-read timeouts and cancellation on view close.
//! - **Terminal data view**: crossterm popup refreshed every few seconds, with an
//!   optional JSON-lines data log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pinwatch::config::Config;
//! use pinwatch::device::PlaceholderTransaction;
//! use pinwatch::poll::{scheduler::PollScheduler, ResultsBuffer};
//! use pinwatch::settings::SettingsStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let store = SettingsStore::new(&config.settings.file);
//!     store.load()?;
//!
//!     let buffer = ResultsBuffer::new();
//!     let scheduler = PollScheduler::new(
//!         tokio::runtime::Handle::current(),
//!         Arc::new(PlaceholderTransaction::default()),
//!         buffer.clone(),
//!         &config.poll,
//!     );
//!     scheduler.refresh(&store).join().await;
//!     for r in buffer.snapshot() {
//!         println!("{}: {}", r.pin_name, r.value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`settings`] - board settings store and the debounced saver
//! - [`poll`] - results buffer, per-pin worker and refresh scheduler
//! - [`display`] - tick loop, frames and the crossterm view
//! - [`device`] - transaction seam and serial link
//! - [`shell`] - interactive menus
//! - [`config`] - application configuration (TOML)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   edits    ┌───────────────┐  dirty  ┌────────────────┐
//! │    Shell     │ ─────────> │ SettingsStore │ ──────> │ DebouncedSaver │
//! └──────────────┘            └───────────────┘         └────────────────┘
//!        │ open view                 │ pin snapshot
//!        v                           v
//! ┌──────────────┐  refresh   ┌───────────────┐  spawn  ┌────────────────┐
//! │ DisplayLoop  │ ─────────> │ PollScheduler │ ──────> │  PollWorker xN │
//! └──────────────┘            └───────────────┘         └────────────────┘
//!        ^                                                      │
//!        └──────────────── ResultsBuffer (snapshot) <───────────┘
//! ```

pub mod config;
pub mod device;
pub mod display;
pub mod errors;
pub mod logutil;
pub mod metrics;
pub mod poll;
pub mod settings;
pub mod shell;
