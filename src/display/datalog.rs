//! "Read and log" output: one JSON object per line for every new result.
//!
//! ```text
//! {"ts":"2024-05-01T10:00:00Z","cycle":3,"pin":"Temp","value":"100oC"}
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::poll::PollResult;

#[derive(Serialize)]
struct DataLine<'a> {
    ts: DateTime<Utc>,
    cycle: u64,
    pin: &'a str,
    value: &'a str,
}

impl<'a> From<&'a PollResult> for DataLine<'a> {
    fn from(r: &'a PollResult) -> Self {
        Self {
            ts: r.read_at,
            cycle: r.cycle,
            pin: &r.pin_name,
            value: &r.value,
        }
    }
}

pub struct DataLog {
    path: PathBuf,
    file: File,
    /// Newest cycle already written, per pin.
    last_cycle: HashMap<String, u64>,
}

impl DataLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            last_cycle: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append results not yet written. Returns how many lines were written.
    ///
    /// A pin is written again only once it reports from a newer cycle, so the
    /// same snapshot can be offered every tick without duplicating lines, however
    /// old the results in it are.
    pub fn record(&mut self, results: &[PollResult]) -> io::Result<usize> {
        let mut written = 0;
        for r in results {
            if let Some(&last) = self.last_cycle.get(&r.pin_name) {
                if r.cycle <= last {
                    continue;
                }
            }
            let line = serde_json::to_string(&DataLine::from(r))?;
            writeln!(self.file, "{}", line)?;
            self.last_cycle.insert(r.pin_name.clone(), r.cycle);
            written += 1;
        }
        if written > 0 {
            self.file.flush()?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_snapshots_log_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = DataLog::open(&path).unwrap();
        let snap = vec![PollResult::new("Temp", "100oC", 1)];
        assert_eq!(log.record(&snap).unwrap(), 1);
        assert_eq!(log.record(&snap).unwrap(), 0);
        let next = vec![PollResult::new("Temp", "101oC", 2)];
        assert_eq!(log.record(&next).unwrap(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["pin"], "Temp");
        assert_eq!(first["value"], "100oC");
        assert!(first["ts"].is_string());
        assert_eq!(first["cycle"], 1);
    }

    #[test]
    fn results_older_than_one_cycle_are_not_relogged() {
        use crate::poll::ResultsBuffer;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = DataLog::open(&path).unwrap();
        let buf = ResultsBuffer::new();

        let c1 = buf.begin_cycle();
        buf.append(PollResult::new("Temp", "20oC", c1));
        buf.append(PollResult::new("Light", "300", c1));
        assert_eq!(log.record(&buf.snapshot()).unwrap(), 2);

        // Cycles whose reads never land keep cycle 1 visible in snapshots.
        for _ in 0..3 {
            buf.begin_cycle();
            assert_eq!(log.record(&buf.snapshot()).unwrap(), 0);
        }
        let c5 = buf.begin_cycle();
        buf.append(PollResult::new("Light", "310", c5));
        for _ in 0..10 {
            log.record(&buf.snapshot()).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }
}
