//! Interactive capability
//!
//! The orchestrator talks to the operator only through [`Prompter`], so the
//! whole install flow can be driven by the ratatui front-end in production
//! and by [`ScriptedPrompter`] in tests.

use std::collections::VecDeque;

use crate::error::{InstallError, Result};

pub trait Prompter {
    /// Show a titled list of options. The next [`read_selection`](Self::read_selection)
    /// picks one of them.
    fn render_choices(&mut self, title: &str, options: &[String]) -> Result<()>;

    /// Index into the last rendered options. Esc yields [`InstallError::Cancelled`].
    fn read_selection(&mut self) -> Result<usize>;

    /// Read a line of text. `hidden` masks the input on screen.
    fn read_text(&mut self, title: &str, hidden: bool) -> Result<String>;

    /// Show `(label, value)` rows above the next list of choices.
    fn render_summary(&mut self, title: &str, rows: &[(String, String)]) -> Result<()>;

    /// Show a one-line notice (validation errors) with the next prompt.
    fn notify(&mut self, message: &str) -> Result<()>;

    /// Give the terminal back while external commands print to it.
    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    /// Take the terminal again after [`suspend`](Self::suspend).
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Render `options` and return the chosen index.
    fn choose(&mut self, title: &str, options: &[String]) -> Result<usize> {
        self.render_choices(title, options)?;
        self.read_selection()
    }
}

/// One scripted operator action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Pick by index.
    Select(usize),
    /// Pick the option with this label.
    Choice(String),
    Text(String),
    /// Press Esc.
    Cancel,
}

impl Answer {
    pub fn choice(label: &str) -> Self {
        Self::Choice(label.to_string())
    }

    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Headless [`Prompter`] answering from a queue.
///
/// Running out of answers is an error, so a test that forgets a prompt fails
/// instead of hanging.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    options: Vec<String>,
    /// Titles of every prompt shown, in order.
    pub titles: Vec<String>,
    pub summaries: Vec<Vec<(String, String)>>,
    pub notices: Vec<String>,
    pub suspended: bool,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_answer(&mut self) -> Result<Answer> {
        self.answers
            .pop_front()
            .ok_or_else(|| InstallError::terminal("scripted answers exhausted"))
    }
}

impl Prompter for ScriptedPrompter {
    fn render_choices(&mut self, title: &str, options: &[String]) -> Result<()> {
        self.titles.push(title.to_string());
        self.options = options.to_vec();
        Ok(())
    }

    fn read_selection(&mut self) -> Result<usize> {
        match self.next_answer()? {
            Answer::Select(index) if index < self.options.len() => Ok(index),
            Answer::Select(index) => Err(InstallError::terminal(format!(
                "scripted index {} out of range for {:?}",
                index, self.options
            ))),
            Answer::Choice(label) => self
                .options
                .iter()
                .position(|o| *o == label)
                .ok_or_else(|| {
                    InstallError::terminal(format!("'{}' is not one of {:?}", label, self.options))
                }),
            Answer::Cancel => Err(InstallError::Cancelled),
            Answer::Text(text) => Err(InstallError::terminal(format!(
                "expected a selection, script has text '{}'",
                text
            ))),
        }
    }

    fn read_text(&mut self, title: &str, _hidden: bool) -> Result<String> {
        self.titles.push(title.to_string());
        match self.next_answer()? {
            Answer::Text(text) => Ok(text),
            Answer::Cancel => Err(InstallError::Cancelled),
            other => Err(InstallError::terminal(format!(
                "expected text for '{}', script has {:?}",
                title, other
            ))),
        }
    }

    fn render_summary(&mut self, _title: &str, rows: &[(String, String)]) -> Result<()> {
        self.summaries.push(rows.to_vec());
        Ok(())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        self.notices.push(message.to_string());
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.suspended = false;
        Ok(())
    }
}
