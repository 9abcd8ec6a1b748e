//! Interactive menu shell.
//!
//! Line-oriented prompts over any `BufRead`/`Write` pair. The shell edits
//! settings through [`SettingsStore`] (saves happen in the background via the
//! debounced saver) and opens the data view from the device submenu.
//!
//! Main menu:
//!
//! ```text
//! 1 :: Set Baud
//! 2 :: Set Connection Name
//! 3 :: Edit Pins
//! 4 :: Print Settings
//! 5 :: Read Data
//! X :: Exit Program
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::runtime::Handle;

use crate::config::Config;
use crate::device::{self, PlaceholderTransaction, SerialLink, Transaction};
use crate::display::datalog::DataLog;
use crate::display::terminal::TerminalView;
use crate::display::{DisplayLoop, DisplayView};
use crate::errors::InputError;
use crate::poll::scheduler::PollScheduler;
use crate::poll::ResultsBuffer;
use crate::settings::{PinDef, SettingsStore};

pub const MAIN_MENU: &[(&str, &str)] = &[
    ("1", "Set Baud"),
    ("2", "Set Connection Name"),
    ("3", "Edit Pins"),
    ("4", "Print Settings"),
    ("5", "Read Data"),
    ("X", "Exit Program"),
];

pub const BOARD_MENU: &[(&str, &str)] = &[
    ("1", "Read Data (will print data from all current pins)"),
    ("1a", "Read and log data (stores data in a text file)"),
    ("2", "Open Connection (for testing)"),
    ("3", "Close connection (for testing)"),
    ("4", "Main Menu"),
];

type ViewFactory = Box<dyn FnMut() -> io::Result<Box<dyn DisplayView>>>;

pub struct Shell<R, W> {
    input: R,
    out: W,
    store: SettingsStore,
    config: Config,
    runtime: Handle,
    transaction: Arc<dyn Transaction>,
    link: SerialLink,
    port_source: fn() -> Vec<String>,
    view_factory: ViewFactory,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(input: R, out: W, store: SettingsStore, config: Config, runtime: Handle) -> Self {
        let transaction: Arc<dyn Transaction> = Arc::new(PlaceholderTransaction::new(
            config.poll.placeholder_value.clone(),
        ));
        let link = SerialLink::new(std::time::Duration::from_millis(config.serial.timeout_ms));
        Self {
            input,
            out,
            store,
            config,
            runtime,
            transaction,
            link,
            port_source: device::list_ports,
            view_factory: Box::new(|| -> io::Result<Box<dyn DisplayView>> {
                Ok(Box::new(TerminalView::setup()?))
            }),
        }
    }

    pub fn with_port_source(mut self, source: fn() -> Vec<String>) -> Self {
        self.port_source = source;
        self
    }

    pub fn with_view_factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut() -> io::Result<Box<dyn DisplayView>> + 'static,
    {
        self.view_factory = Box::new(factory);
        self
    }

    pub fn with_transaction(mut self, transaction: Arc<dyn Transaction>) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Full interactive session: load or create settings, then the main menu.
    ///
    /// End of input is treated like choosing Exit.
    pub fn run(&mut self) -> Result<()> {
        match self.session() {
            Ok(()) => Ok(()),
            Err(e) if is_closed(&e) => {
                info!("Input closed; leaving menu");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn session(&mut self) -> Result<()> {
        writeln!(self.out, "Welcome to the pinwatch terminal app")?;
        writeln!(self.out, "Connect your board to this computer over serial or Bluetooth.")?;
        writeln!(self.out)?;
        self.load_or_setup()?;
        self.print_settings()?;
        self.main_menu()
    }

    /// Load persisted settings, falling back to interactive setup.
    pub fn load_or_setup(&mut self) -> Result<()> {
        match self.store.ensure_file() {
            Ok(true) => writeln!(
                self.out,
                "Files will be saved to {}",
                self.store.path().display()
            )?,
            Ok(false) => {}
            Err(e) => warn!("Unable to create settings file: {}", e),
        }
        writeln!(self.out, "Loading settings...")?;
        if let Err(e) = self.store.load() {
            info!("Settings not loaded: {}", e);
            writeln!(self.out, "No previous settings (or the file was deleted)")?;
            writeln!(self.out, "Entering setup...")?;
            self.initial_setup()?;
        }
        Ok(())
    }

    pub fn initial_setup(&mut self) -> Result<()> {
        self.set_baud()?;
        self.set_connection()?;
        let answer = self.prompt("Do you want to add pins now (y or n)? ")?;
        if answer.eq_ignore_ascii_case("y") {
            self.add_pins()?;
        } else {
            writeln!(self.out, "Pins can be added from the main menu later.")?;
        }
        Ok(())
    }

    pub fn main_menu(&mut self) -> Result<()> {
        loop {
            print_menu(&mut self.out, None, MAIN_MENU)?;
            let option = self.prompt("Which option #? ")?;
            match option.as_str() {
                "1" => self.set_baud()?,
                "2" => self.set_connection()?,
                "3" => self.alter_pins()?,
                "4" => self.print_settings()?,
                "5" => self.board_menu()?,
                "X" | "x" => return Ok(()),
                other => writeln!(self.out, "Unknown option '{}'", other)?,
            }
        }
    }

    pub fn set_baud(&mut self) -> Result<()> {
        let question = format!(
            "What is the baud rate for your connection (usually {})? ",
            self.config.serial.default_baud
        );
        let baud = loop {
            let answer = self.prompt(&question)?;
            match parse_baud(&answer) {
                Ok(b) => break b,
                Err(e) => writeln!(self.out, "{}", e)?,
            }
        };
        self.store.set_baud_rate(baud);
        Ok(())
    }

    pub fn set_connection(&mut self) -> Result<()> {
        let ports = (self.port_source)();
        writeln!(self.out)?;
        writeln!(self.out, "-- Connected Ports --")?;
        for (i, port) in ports.iter().enumerate() {
            writeln!(self.out, "{} :: {}", i + 1, port)?;
        }
        writeln!(self.out, "-- ---- --")?;

        let chosen = if ports.is_empty() {
            writeln!(self.out, "No serial ports detected.")?;
            self.prompt_non_empty("Enter the device path manually: ")?
        } else {
            loop {
                let answer = self.prompt("Which device should we connect to (enter number)? ")?;
                match parse_choice(&answer, ports.len()) {
                    Ok(i) => break ports[i].clone(),
                    Err(e) => writeln!(self.out, "{}", e)?,
                }
            }
        };
        writeln!(self.out, "Port {} set", chosen)?;
        self.store.set_connection(chosen);
        Ok(())
    }

    pub fn alter_pins(&mut self) -> Result<()> {
        let answer = self.prompt("Do you want to add or remove pins (a/r)? ")?;
        match answer.as_str() {
            "a" | "A" => self.add_pins(),
            "r" | "R" => self.remove_pins().map(|_| ()),
            _ => Ok(()),
        }
    }

    pub fn add_pins(&mut self) -> Result<()> {
        writeln!(self.out, "Adding devices attached to your board pins...")?;
        loop {
            let name = self.prompt_non_empty("What is the device or input name? ")?;
            let position = self.prompt_non_empty("What is the pin position (1-13 or A1-A6)? ")?;
            let send_value = self.prompt("What value should be sent to read data? ")?;
            if self
                .store
                .add_pin(name.clone(), PinDef::new(position, send_value))
                .is_some()
            {
                writeln!(self.out, "Replaced existing pin {}", name)?;
            }
            let more = self.prompt("Add more (y / n)? ")?;
            if more.eq_ignore_ascii_case("n") {
                self.print_pins()?;
                return Ok(());
            }
        }
    }

    /// Interactive pin removal. Returns false when there was nothing to remove.
    pub fn remove_pins(&mut self) -> Result<bool> {
        if self.store.pin_count() == 0 {
            writeln!(self.out, "No pins to remove")?;
            return Ok(false);
        }
        self.print_pins()?;
        loop {
            let name = self.prompt("Which pin to remove (type name exactly)? ")?;
            if !self.store.remove_pin(&name) {
                writeln!(self.out, "No pin by that name.. Sorry!")?;
            }
            if self.store.pin_count() == 0 {
                writeln!(self.out, "All pins removed!")?;
                return Ok(true);
            }
            let done = self.prompt("Done (y or n)? ")?;
            if done.eq_ignore_ascii_case("y") {
                return Ok(true);
            }
        }
    }

    pub fn print_settings(&mut self) -> Result<()> {
        write!(self.out, "{}", self.store.render())?;
        Ok(())
    }

    fn print_pins(&mut self) -> Result<()> {
        writeln!(self.out, "Current pins:")?;
        for line in self.store.snapshot().pin_lines() {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    pub fn board_menu(&mut self) -> Result<()> {
        loop {
            print_menu(&mut self.out, Some("----- Board Menu -----"), BOARD_MENU)?;
            let option = self.prompt("Which option #? ")?;
            match option.as_str() {
                "1" => self.show_data(false)?,
                "1a" => self.show_data(true)?,
                "2" => self.open_connection()?,
                "3" => self.close_connection()?,
                "4" => {
                    writeln!(self.out, "Return to main menu")?;
                    return Ok(());
                }
                other => writeln!(self.out, "Unknown option '{}'", other)?,
            }
        }
    }

    /// Open the data view until the user closes it.
    pub fn show_data(&mut self, logging: bool) -> Result<()> {
        let scheduler = PollScheduler::new(
            self.runtime.clone(),
            Arc::clone(&self.transaction),
            ResultsBuffer::new(),
            &self.config.poll,
        );
        let mut display = DisplayLoop::new(
            self.store.clone(),
            scheduler,
            self.config.poll.refresh_interval(),
            self.config.poll.tick(),
        );
        if logging {
            let path = &self.config.logging.data_log;
            let log = DataLog::open(path)
                .with_context(|| format!("Failed to open data log {}", path))?;
            writeln!(self.out, "Logging data to {}", log.path().display())?;
            display = display.with_datalog(log);
        }
        // Logged before the view takes over the terminal.
        info!(
            "Opening data view for {} pin(s), refresh every {}s",
            self.store.pin_count(),
            self.config.poll.refresh_interval().as_secs()
        );
        let mut view = (self.view_factory)().context("Failed to open data view")?;
        display.run(view.as_mut()).context("Data view failed")?;
        Ok(())
    }

    pub fn open_connection(&mut self) -> Result<()> {
        let port = self.store.connection();
        let baud = self.store.baud_rate();
        match self.link.open(&port, baud) {
            Ok(()) => writeln!(self.out, "Connection open on {} at {} baud", port, baud)?,
            Err(e) => writeln!(self.out, "Could not open connection: {}", e)?,
        }
        Ok(())
    }

    pub fn close_connection(&mut self) -> Result<()> {
        if self.link.close() {
            writeln!(self.out, "Connection closed")?;
        } else {
            writeln!(self.out, "No open connection")?;
        }
        Ok(())
    }

    fn prompt(&mut self, question: &str) -> Result<String> {
        write!(self.out, "{}", question)?;
        self.out.flush()?;
        let mut line = String::new();
        let n = self.input.read_line(&mut line)?;
        if n == 0 {
            return Err(InputError::Closed.into());
        }
        Ok(line.trim().to_string())
    }

    fn prompt_non_empty(&mut self, question: &str) -> Result<String> {
        loop {
            let answer = self.prompt(question)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            writeln!(self.out, "{}", InputError::Empty)?;
        }
    }
}

fn print_menu<W: Write>(out: &mut W, header: Option<&str>, options: &[(&str, &str)]) -> io::Result<()> {
    writeln!(out)?;
    if let Some(h) = header {
        writeln!(out, "{}", h)?;
    }
    for (key, label) in options {
        writeln!(out, "{} :: {}", key, label)?;
    }
    Ok(())
}

fn is_closed(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<InputError>(), Some(InputError::Closed))
}

/// Parse a baud rate entered at the prompt.
pub fn parse_baud(s: &str) -> Result<u32, InputError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(InputError::Empty);
    }
    match s.parse::<u32>() {
        Ok(0) | Err(_) => Err(InputError::NotANumber(s.to_string())),
        Ok(b) => Ok(b),
    }
}

/// Parse a 1-based menu choice into a 0-based index below `max`.
pub fn parse_choice(s: &str, max: usize) -> Result<usize, InputError> {
    let s = s.trim();
    let n: usize = s
        .parse()
        .map_err(|_| InputError::NotANumber(s.to_string()))?;
    if n == 0 || n > max {
        return Err(InputError::OutOfRange { choice: n, max });
    }
    Ok(n - 1)
}
