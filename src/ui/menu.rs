//! Widget state and key handling
//!
//! Pure state machines for the two kinds of prompt: a single-choice list and
//! a line of (optionally masked) text. Rendering lives in `render`.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use zeroize::Zeroizing;

/// What a key press did to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Pending,
    Done(T),
    Cancelled,
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

/// Single-choice list. Movement stops at both ends.
#[derive(Debug, Clone, Default)]
pub struct MenuState {
    selected: usize,
    len: usize,
}

impl MenuState {
    pub fn new(len: usize) -> Self {
        Self { selected: 0, len }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Outcome<usize> {
        if key.kind != KeyEventKind::Press {
            return Outcome::Pending;
        }
        if is_interrupt(&key) {
            return Outcome::Cancelled;
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.len {
                    self.selected += 1;
                }
            }
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = self.len.saturating_sub(1),
            KeyCode::Enter if self.len > 0 => return Outcome::Done(self.selected),
            KeyCode::Esc => return Outcome::Cancelled,
            _ => {}
        }
        Outcome::Pending
    }
}

/// Longest input accepted, in bytes.
pub const MAX_INPUT_LEN: usize = 256;

/// Line editor. The buffer is wiped on drop; masked input is never rendered.
///
/// The buffer is allocated once at [`MAX_INPUT_LEN`] and never grows, so no
/// reallocation leaves a stale copy of a password on the heap.
#[derive(Debug)]
pub struct TextInput {
    buffer: Zeroizing<String>,
    hidden: bool,
}

impl TextInput {
    pub fn new(hidden: bool) -> Self {
        Self {
            buffer: Zeroizing::new(String::with_capacity(MAX_INPUT_LEN)),
            hidden,
        }
    }

    /// What the screen shows: the text, or one `*` per character.
    pub fn display(&self) -> String {
        if self.hidden {
            "*".repeat(self.buffer.chars().count())
        } else {
            self.buffer.to_string()
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Outcome<String> {
        if key.kind != KeyEventKind::Press {
            return Outcome::Pending;
        }
        if is_interrupt(&key) {
            return Outcome::Cancelled;
        }
        match key.code {
            // Ctrl+U, Alt+b and friends are not text
            KeyCode::Char(_) if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {}
            KeyCode::Char(c) => {
                if self.buffer.len() + c.len_utf8() <= MAX_INPUT_LEN {
                    self.buffer.push(c);
                }
            }
            KeyCode::Backspace => {
                self.buffer.pop();
            }
            // Moves the text out without copying; the wrapper keeps an empty string
            KeyCode::Enter => return Outcome::Done(std::mem::take(&mut *self.buffer)),
            KeyCode::Esc => return Outcome::Cancelled,
            _ => {}
        }
        Outcome::Pending
    }
}
