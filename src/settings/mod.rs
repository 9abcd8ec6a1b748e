//! # Board Settings
//!
//! The board settings are the user-edited part of pinwatch's state: which serial
//! connection to use, at what baud rate, and the named pins to poll. They are
//! persisted as a flat JSON map:
//!
//! ```json
//! {
//!   "board_connection": "/dev/ttyACM0",
//!   "board_pins": { "Temp": ["A0", "1"] },
//!   "baud_rate": 9600
//! }
//! ```
//!
//! [`SettingsStore`] owns the in-memory [`BoardConfig`] behind a lock and is
//! cheap to clone; every clone refers to the same state. Mutations go through
//! the store, which sets the dirty flag and wakes the [`saver::DebouncedSaver`]
//! so bursts of edits collapse into a single write.

pub mod saver;

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;

use crate::errors::SettingsError;
use crate::logutil::escape_log;
use crate::metrics;

/// Physical position and trigger value for one named pin.
///
/// Serialized as a two element array `[position, send_value]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct PinDef {
    pub position: String,
    pub send_value: String,
}

impl PinDef {
    pub fn new(position: impl Into<String>, send_value: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            send_value: send_value.into(),
        }
    }
}

impl From<(String, String)> for PinDef {
    fn from((position, send_value): (String, String)) -> Self {
        Self {
            position,
            send_value,
        }
    }
}

impl From<PinDef> for (String, String) {
    fn from(pin: PinDef) -> Self {
        (pin.position, pin.send_value)
    }
}

/// Connection and pin layout for the attached board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(rename = "board_connection")]
    pub connection: String,
    #[serde(rename = "board_pins")]
    pub pins: BTreeMap<String, PinDef>,
    #[serde(deserialize_with = "deserialize_baud")]
    pub baud_rate: u32,
}

/// Older settings files stored the baud rate as the raw typed string.
fn deserialize_baud<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Baud {
        Number(u32),
        Text(String),
    }
    match Baud::deserialize(deserializer)? {
        Baud::Number(n) => Ok(n),
        Baud::Text(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("invalid baud rate '{}'", s))),
    }
}

impl BoardConfig {
    /// One line per pin, in the format used by the menus.
    pub fn pin_lines(&self) -> Vec<String> {
        self.pins
            .iter()
            .map(|(name, pin)| {
                format!(
                    "\t Name: {} on pin: {} with send value: {}",
                    name, pin.position, pin.send_value
                )
            })
            .collect()
    }

    /// Human-readable settings block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("-- Current Settings --\n");
        out.push_str(&format!("Baud rate: {}\n", self.baud_rate));
        out.push_str(&format!("Board connection: {}\n", self.connection));
        out.push_str("Board Pins: \n");
        for line in self.pin_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str("-- ---------- --\n");
        out
    }
}

struct Inner {
    path: PathBuf,
    board: RwLock<BoardConfig>,
    dirty: AtomicBool,
    notifier: Mutex<Option<mpsc::Sender<()>>>,
}

/// Shared handle to the board settings and their persisted file.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.inner.path)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl SettingsStore {
    /// Create a store backed by `path` holding an empty configuration.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                board: RwLock::new(BoardConfig::default()),
                dirty: AtomicBool::new(false),
                notifier: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn read_board(&self) -> RwLockReadGuard<'_, BoardConfig> {
        self.inner
            .board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_board(&self) -> RwLockWriteGuard<'_, BoardConfig> {
        self.inner
            .board
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wire the dirty signal to a saver's wake channel.
    pub(crate) fn set_notifier(&self, tx: mpsc::Sender<()>) {
        let mut guard = self
            .inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(tx);
    }

    /// Create an empty settings file if none exists. Returns true when created.
    pub fn ensure_file(&self) -> Result<bool, SettingsError> {
        if self.inner.path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        File::create(&self.inner.path)?;
        Ok(true)
    }

    /// Load settings from disk.
    ///
    /// Fails when the file is missing, empty or cannot be parsed. The in-memory
    /// configuration is only replaced on success, and loading never marks the
    /// store dirty.
    pub fn load(&self) -> Result<(), SettingsError> {
        let path = &self.inner.path;
        let display = path.display().to_string();
        let mut file = match OpenOptions::new().read(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SettingsError::Missing(display));
            }
            Err(e) => return Err(SettingsError::Io(e)),
        };
        if let Err(e) = file.lock_shared() {
            debug!("shared lock on {} failed, reading unlocked: {}", display, e);
        }
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        if let Err(e) = file.unlock() {
            debug!("unlock of {} failed: {}", display, e);
        }
        read?;

        let cleaned = content.trim_start_matches('\0').trim();
        if cleaned.is_empty() {
            return Err(SettingsError::Empty(display));
        }
        let value: serde_json::Value =
            serde_json::from_str(cleaned).map_err(|e| SettingsError::Corrupt {
                path: display.clone(),
                reason: e.to_string(),
            })?;
        if value.as_object().map(|m| m.is_empty()).unwrap_or(false) {
            return Err(SettingsError::Empty(display));
        }
        let board: BoardConfig =
            serde_json::from_value(value).map_err(|e| SettingsError::Corrupt {
                path: display.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Loaded settings from {}: connection={} baud={} pins={}",
            display,
            escape_log(&board.connection),
            board.baud_rate,
            board.pins.len()
        );
        *self.write_board() = board;
        Ok(())
    }

    /// Boolean form of [`load`](Self::load) for callers that only branch on success.
    pub fn try_load(&self) -> bool {
        match self.load() {
            Ok(()) => true,
            Err(e) => {
                info!("No usable settings: {}", e);
                false
            }
        }
    }

    /// Persist the current configuration.
    ///
    /// The dirty flag is cleared before the snapshot is taken, so an edit racing
    /// with the write re-marks the store and triggers another save.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.inner.dirty.store(false, Ordering::SeqCst);
        let snapshot = self.snapshot();
        let result = serde_json::to_string_pretty(&snapshot)
            .map_err(SettingsError::from)
            .and_then(|content| write_file_locked(&self.inner.path, &content));
        match result {
            Ok(()) => {
                metrics::inc_settings_saves();
                debug!("Settings saved to {}", self.inner.path.display());
                Ok(())
            }
            Err(e) => {
                self.inner.dirty.store(true, Ordering::SeqCst);
                metrics::inc_settings_save_failures();
                Err(e)
            }
        }
    }

    /// Flag the configuration as needing a save and wake the saver. Idempotent.
    pub fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
        let guard = self
            .inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            match tx.try_send(()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(())) => {
                    debug!("save already pending; dirty mark coalesced");
                }
                Err(mpsc::error::TrySendError::Closed(())) => {
                    warn!("settings saver is not running; change will be saved on exit");
                }
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BoardConfig {
        self.read_board().clone()
    }

    /// Point-in-time copy of the pin definitions for one refresh cycle.
    pub fn pins_snapshot(&self) -> Vec<(String, PinDef)> {
        self.read_board()
            .pins
            .iter()
            .map(|(name, pin)| (name.clone(), pin.clone()))
            .collect()
    }

    pub fn pin_count(&self) -> usize {
        self.read_board().pins.len()
    }

    pub fn connection(&self) -> String {
        self.read_board().connection.clone()
    }

    pub fn baud_rate(&self) -> u32 {
        self.read_board().baud_rate
    }

    pub fn render(&self) -> String {
        self.read_board().render()
    }

    /// Print the current settings to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }

    pub fn set_baud_rate(&self, baud_rate: u32) {
        self.write_board().baud_rate = baud_rate;
        self.mark_dirty();
    }

    pub fn set_connection(&self, connection: impl Into<String>) {
        self.write_board().connection = connection.into();
        self.mark_dirty();
    }

    /// Insert or replace a pin. Returns the previous definition if the name existed.
    pub fn add_pin(&self, name: impl Into<String>, pin: PinDef) -> Option<PinDef> {
        let name = name.into();
        debug!(
            "pin set: {} -> {} / {}",
            escape_log(&name),
            escape_log(&pin.position),
            escape_log(&pin.send_value)
        );
        let previous = self.write_board().pins.insert(name, pin);
        self.mark_dirty();
        previous
    }

    /// Remove a pin by exact name. Returns false when no such pin exists.
    pub fn remove_pin(&self, name: &str) -> bool {
        let removed = self.write_board().pins.remove(name).is_some();
        if removed {
            self.mark_dirty();
        }
        removed
    }

    /// Replace the whole configuration.
    pub fn replace(&self, board: BoardConfig) {
        *self.write_board() = board;
        self.mark_dirty();
    }
}

/// Write `content` to `path` under an exclusive lock via temp file and rename.
///
/// The lock is taken on the file currently at `path` and waits out readers of
/// it; the rename then replaces that inode, so a reader never sees a partial
/// write. It does not serialize two writers, since the second one locks the
/// replaced inode. Callers keep to one writer at a time (the debounced saver
/// during a session).
fn write_file_locked(path: &Path, content: &str) -> Result<(), SettingsError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    lock_file.lock_exclusive()?;

    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("settings.json");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(SettingsError::Io(e)),
        }
    };

    fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    drop(lock_file);
    Ok(())
}
