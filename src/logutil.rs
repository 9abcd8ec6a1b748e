//! Log helpers for user-entered strings (pin names, positions, read values).
//! Keeps every log record on a single line and caps its length.
//!
//! Also holds the console mute used while the full-screen data view owns the
//! terminal: console log lines are held back and replayed once it closes.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

const MAX_PREVIEW: usize = 120;
const MAX_DEFERRED: usize = 500;

static CONSOLE_MUTED: AtomicBool = AtomicBool::new(false);
static DEFERRED: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Escape a user-supplied string so it cannot break a log line.
///
/// Newlines, carriage returns and tabs become their escaped forms, other control
/// characters become `\xNN`, and anything past [`MAX_PREVIEW`] characters is cut
/// with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Render a read value for logs, showing the sentinel explicitly.
pub fn value_preview(value: &str) -> String {
    if value.is_empty() {
        "<no data>".to_string()
    } else {
        escape_log(value)
    }
}

/// Keeps console logging off the terminal until dropped.
///
/// Lines logged meanwhile are queued (up to a cap) and written to stderr on drop.
/// The log file, when configured, still receives every record immediately.
#[derive(Debug)]
pub struct ConsoleMute {
    _private: (),
}

impl ConsoleMute {
    pub fn engage() -> Self {
        CONSOLE_MUTED.store(true, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Drop for ConsoleMute {
    fn drop(&mut self) {
        CONSOLE_MUTED.store(false, Ordering::SeqCst);
        let lines = std::mem::take(&mut *DEFERRED.lock().unwrap_or_else(PoisonError::into_inner));
        for line in lines {
            eprintln!("{}", line);
        }
    }
}

pub fn console_muted() -> bool {
    CONSOLE_MUTED.load(Ordering::SeqCst)
}

/// Queue a console line while muted. Returns false when the console is live
/// and the caller should write the line itself.
pub fn defer_console_line(line: &str) -> bool {
    if !console_muted() {
        return false;
    }
    let mut queue = DEFERRED.lock().unwrap_or_else(PoisonError::into_inner);
    if queue.len() < MAX_DEFERRED {
        queue.push(line.to_string());
    }
    true
}
