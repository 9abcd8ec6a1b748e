//! crossterm rendering of the data view.
//!
//! The view takes over the terminal (alternate screen, raw mode, hidden cursor)
//! for as long as it is open. `q`, `c`, `Esc` or Ctrl-C close it.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::{self, Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::{cursor, terminal, ExecutableCommand, QueueableCommand};

use super::{DisplayView, Frame};
use crate::logutil::ConsoleMute;

const WIDTH: usize = 80;

pub struct TerminalView {
    stdout: io::Stdout,
    active: bool,
    // Log lines would draw over the frame; released after the terminal is restored.
    mute: Option<ConsoleMute>,
}

impl TerminalView {
    pub fn setup() -> io::Result<Self> {
        let mute = ConsoleMute::engage();
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        stdout.execute(terminal::EnterAlternateScreen)?;
        stdout.execute(cursor::Hide)?;
        Ok(Self {
            stdout,
            active: true,
            mute: Some(mute),
        })
    }

    fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let _ = self.stdout.execute(cursor::Show);
        let _ = self.stdout.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
        let _ = self.stdout.flush();
        self.mute.take();
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        self.stdout.queue(style::Print(text))?;
        self.stdout.queue(cursor::MoveToNextLine(1))?;
        Ok(())
    }
}

impl DisplayView for TerminalView {
    fn render(&mut self, frame: &Frame) -> io::Result<()> {
        self.stdout.queue(cursor::MoveTo(0, 0))?;
        self.stdout
            .queue(terminal::Clear(terminal::ClearType::All))?;

        self.stdout.queue(SetAttribute(Attribute::Bold))?;
        self.line(&frame.title)?;
        self.stdout.queue(SetAttribute(Attribute::Reset))?;

        if frame.warning {
            self.stdout.queue(SetForegroundColor(Color::Yellow))?;
        }
        self.line(&frame.info)?;
        self.stdout.queue(ResetColor)?;

        self.line(&"-".repeat(WIDTH))?;
        self.line("Data pins")?;
        for field in &frame.fields {
            let row = format!("{:<24} {}", field.name, field.text);
            self.line(&row)?;
        }
        self.stdout.queue(cursor::MoveToNextLine(1))?;
        self.stdout.queue(SetAttribute(Attribute::Dim))?;
        self.line("Press q or Esc to close")?;
        self.stdout.queue(SetAttribute(Attribute::Reset))?;
        self.stdout.flush()
    }

    fn wait_for_close(&mut self, timeout: Duration) -> io::Result<bool> {
        if !event::poll(timeout)? {
            return Ok(false);
        }
        if let Event::Key(k) = event::read()? {
            if k.kind != KeyEventKind::Press {
                return Ok(false);
            }
            // 'c' doubles as Ctrl-C since raw mode swallows SIGINT.
            let quit = matches!(
                k.code,
                KeyCode::Char('q') | KeyCode::Char('c') | KeyCode::Esc
            );
            return Ok(quit);
        }
        Ok(false)
    }

    fn close(&mut self) {
        self.teardown();
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        self.teardown();
    }
}
