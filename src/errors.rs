use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading or persisting the board settings file.
///
/// Every variant counts as "no usable settings" for the caller, which falls back
/// to interactive setup.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file does not exist yet.
    #[error("settings file not found: {0}")]
    Missing(String),

    /// The file exists but holds no settings.
    #[error("settings file is empty: {0}")]
    Empty(String),

    /// The file could not be parsed into a board configuration.
    #[error("settings file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    /// Wrapper around IO errors (open, lock, rename).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around serde_json errors while writing.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors produced by a device transaction.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device produced no data for the requested position within the read window.
    #[error("no data from pin {position} within {after:?}")]
    Timeout { position: String, after: Duration },

    /// The operation needs a capability this build does not have.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The serial link reported an error.
    #[error("serial error: {0}")]
    Serial(String),
}

/// Invalid interactive input; the shell reprompts on these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Not a number: {0}")]
    NotANumber(String),

    #[error("Choice {choice} is out of range (1-{max})")]
    OutOfRange { choice: usize, max: usize },

    #[error("Value cannot be empty")]
    Empty,

    #[error("Input closed")]
    Closed,
}
