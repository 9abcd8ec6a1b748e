//! # Device Access
//!
//! Two seams separate the poll loop from the hardware:
//!
//! - [`Transaction`]: one request/response exchange for a single pin. The poll
//!   workers only ever talk to this trait. The shipped implementation,
//!   [`PlaceholderTransaction`], answers with a fixed value and performs no
//!   I/O, which keeps the polling skeleton usable without a board attached.
//! - [`SerialLink`]: an open/close handle on the configured serial port, used by
//!   the device menu to check that the port and baud rate are usable.
//!
//! Serial support is behind the `serial` feature (enabled by default). Without
//! it, [`list_ports`] returns nothing and [`SerialLink::open`] reports
//! [`DeviceError::Unsupported`].

use std::time::Duration;

use log::{debug, info};

use crate::errors::DeviceError;
use crate::logutil::escape_log;

#[cfg(feature = "serial")]
use serialport::SerialPort;

/// A single pin exchange: send `send_value` to `position`, return the reply.
///
/// Implementations may block; workers run them on the blocking pool and bound
/// them with a timeout. Returning [`DeviceError::Timeout`] signals "no data".
pub trait Transaction: Send + Sync {
    fn transact(&self, position: &str, send_value: &str) -> Result<String, DeviceError>;
}

/// Answers every read with the same configured value.
#[derive(Debug, Clone)]
pub struct PlaceholderTransaction {
    value: String,
}

impl PlaceholderTransaction {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Default for PlaceholderTransaction {
    fn default() -> Self {
        Self::new("100oC")
    }
}

impl Transaction for PlaceholderTransaction {
    fn transact(&self, position: &str, send_value: &str) -> Result<String, DeviceError> {
        debug!(
            "placeholder read: pin={} send={}",
            escape_log(position),
            escape_log(send_value)
        );
        Ok(self.value.clone())
    }
}

/// Names of serial ports visible to the OS.
pub fn list_ports() -> Vec<String> {
    #[cfg(feature = "serial")]
    {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                log::warn!("Unable to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }
    #[cfg(not(feature = "serial"))]
    {
        Vec::new()
    }
}

/// Open/close handle on the board's serial port.
pub struct SerialLink {
    timeout: Duration,
    #[cfg(feature = "serial")]
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
}

impl SerialLink {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            #[cfg(feature = "serial")]
            port: None,
            port_name: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port_name.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Open `port_name` at `baud_rate`, replacing any port already open.
    pub fn open(&mut self, port_name: &str, baud_rate: u32) -> Result<(), DeviceError> {
        if port_name.trim().is_empty() {
            return Err(DeviceError::Serial("no connection configured".into()));
        }
        if baud_rate == 0 {
            return Err(DeviceError::Serial("baud rate not set".into()));
        }
        self.close();
        info!("Opening serial port {} at {} baud", port_name, baud_rate);

        #[cfg(feature = "serial")]
        {
            let mut builder = serialport::new(port_name, baud_rate).timeout(self.timeout);
            #[cfg(unix)]
            {
                builder = builder
                    .data_bits(serialport::DataBits::Eight)
                    .stop_bits(serialport::StopBits::One)
                    .parity(serialport::Parity::None);
            }
            let port = builder
                .open()
                .map_err(|e| DeviceError::Serial(format!("failed to open {}: {}", port_name, e)))?;
            // Boards that reset on connect leave boot chatter in the buffer.
            let _ = port.clear(serialport::ClearBuffer::All);
            self.port = Some(port);
            self.port_name = Some(port_name.to_string());
            Ok(())
        }

        #[cfg(not(feature = "serial"))]
        {
            let _ = self.timeout;
            Err(DeviceError::Unsupported("serial support not compiled in"))
        }
    }

    /// Close the port if open. Returns true when a port was closed.
    pub fn close(&mut self) -> bool {
        #[cfg(feature = "serial")]
        {
            self.port = None;
        }
        match self.port_name.take() {
            Some(name) => {
                info!("Closed serial port {}", name);
                true
            }
            None => false,
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_returns_configured_value() {
        let tx = PlaceholderTransaction::new("42");
        assert_eq!(tx.transact("A0", "1").unwrap(), "42");
        assert_eq!(
            PlaceholderTransaction::default().transact("3", "x").unwrap(),
            "100oC"
        );
    }

    #[test]
    fn open_requires_connection_and_baud() {
        let mut link = SerialLink::new(Duration::from_millis(50));
        assert!(link.open("", 9600).is_err());
        assert!(link.open("/dev/ttyFAKE0", 0).is_err());
        assert!(!link.is_open());
    }

    #[test]
    fn close_without_open_is_noop() {
        let mut link = SerialLink::new(Duration::from_millis(50));
        assert!(!link.close());
    }
}
