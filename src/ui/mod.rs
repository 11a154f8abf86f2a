//! Terminal front-end
//!
//! - `menu` - key handling for lists and text input
//! - `render` - drawing a prompt frame
//!
//! [`TerminalPrompter`] owns the terminal for as long as it lives: raw mode
//! and the alternate screen are entered on construction and always restored
//! on drop, including when the installer unwinds with an error.

mod menu;
mod render;

use std::io::{self, Stdout, stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::debug;

use crate::error::{InstallError, Result};
use crate::process_guard::InterruptFlag;
use crate::prompt::Prompter;

pub use menu::{MenuState, Outcome, TextInput};
pub use render::{Body, PendingSummary, Screen};

/// How often a waiting prompt looks at the interrupt flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn term_err(err: io::Error) -> InstallError {
    InstallError::terminal(err.to_string())
}

pub struct TerminalPrompter {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    title: String,
    options: Vec<String>,
    summary: Option<PendingSummary>,
    notice: Option<String>,
    active: bool,
    interrupt: InterruptFlag,
}

impl TerminalPrompter {
    /// A raised `interrupt` ends any prompt that is waiting for a key.
    pub fn new(interrupt: InterruptFlag) -> Result<Self> {
        enter_screen().map_err(term_err)?;
        let terminal = match Terminal::new(CrosstermBackend::new(stdout())) {
            Ok(terminal) => terminal,
            Err(err) => {
                leave_screen();
                return Err(term_err(err));
            }
        };
        Ok(Self {
            terminal,
            title: String::new(),
            options: Vec::new(),
            summary: None,
            notice: None,
            active: true,
            interrupt,
        })
    }

    fn draw(&mut self, body: Body) -> Result<()> {
        let screen = Screen {
            title: &self.title,
            summary: self.summary.as_ref(),
            notice: self.notice.as_deref(),
            body,
        };
        self.terminal
            .draw(|f| render::draw(f, &screen))
            .map_err(term_err)?;
        Ok(())
    }

    /// `None` on timeout or a non-key event.
    fn next_key(&self) -> Result<Option<event::KeyEvent>> {
        if self.interrupt.is_raised() {
            debug!("Interrupt received while waiting for input");
            return Err(InstallError::Cancelled);
        }
        if !event::poll(POLL_INTERVAL).map_err(term_err)? {
            return Ok(None);
        }
        match event::read().map_err(term_err)? {
            Event::Key(key) => Ok(Some(key)),
            _ => Ok(None),
        }
    }
}

fn enter_screen() -> io::Result<()> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)
}

fn leave_screen() {
    // Best effort: the terminal may already be gone
    let _ = disable_raw_mode();
    let _ = execute!(stdout(), LeaveAlternateScreen);
}

impl Prompter for TerminalPrompter {
    fn render_choices(&mut self, title: &str, options: &[String]) -> Result<()> {
        self.title = title.to_string();
        self.options = options.to_vec();
        let options = self.options.clone();
        self.draw(Body::Choices {
            options: &options,
            selected: 0,
        })
    }

    fn read_selection(&mut self) -> Result<usize> {
        let options = self.options.clone();
        let mut menu = MenuState::new(options.len());
        let result = loop {
            let Some(key) = self.next_key()? else {
                continue;
            };
            match menu.handle_key(key) {
                Outcome::Pending => self.draw(Body::Choices {
                    options: &options,
                    selected: menu.selected(),
                })?,
                Outcome::Done(index) => break Ok(index),
                Outcome::Cancelled => break Err(InstallError::Cancelled),
            }
        };
        self.summary = None;
        self.notice = None;
        result
    }

    fn read_text(&mut self, title: &str, hidden: bool) -> Result<String> {
        self.title = title.to_string();
        let mut input = TextInput::new(hidden);
        self.draw(Body::Input {
            text: input.display(),
        })?;
        let result = loop {
            let Some(key) = self.next_key()? else {
                continue;
            };
            match input.handle_key(key) {
                Outcome::Pending => self.draw(Body::Input {
                    text: input.display(),
                })?,
                Outcome::Done(text) => break Ok(text),
                Outcome::Cancelled => break Err(InstallError::Cancelled),
            }
        };
        self.notice = None;
        result
    }

    fn render_summary(&mut self, title: &str, rows: &[(String, String)]) -> Result<()> {
        self.summary = Some(PendingSummary {
            title: title.to_string(),
            rows: rows.to_vec(),
        });
        Ok(())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        self.notice = Some(message.to_string());
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        if self.active {
            debug!("Releasing terminal");
            disable_raw_mode().map_err(term_err)?;
            execute!(stdout(), LeaveAlternateScreen).map_err(term_err)?;
            self.active = false;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if !self.active {
            enter_screen().map_err(term_err)?;
            self.terminal.clear().map_err(term_err)?;
            self.active = true;
        }
        Ok(())
    }
}

impl Drop for TerminalPrompter {
    fn drop(&mut self) {
        if self.active {
            leave_screen();
        }
        let _ = self.terminal.show_cursor();
    }
}
