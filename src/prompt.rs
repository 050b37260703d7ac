//! Terminal prompter: reads answers from stdin, hiding the spinner while a
//! question is on screen.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;

use indicatif::ProgressBar;
use twig_core::prompt::{is_yes, Prompter};
use twig_core::{Result, TwigError};

#[derive(Default)]
pub struct TerminalPrompter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spinner to suspend while asking; `None` detaches it.
    pub fn attach(&self, spinner: Option<ProgressBar>) {
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = spinner;
        }
    }

    fn read_line(question: &str) -> Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{} ", question).map_err(|e| TwigError::prompt(question, e))?;
        stdout.flush().map_err(|e| TwigError::prompt(question, e))?;
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| TwigError::prompt(question, e))?;
        if read == 0 {
            return Err(TwigError::prompt(question, "stdin closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&self, question: &str) -> Result<String> {
        if !self.is_interactive() {
            return Err(TwigError::prompt(question, "stdin is not a terminal"));
        }
        let spinner = self.spinner.lock().ok().and_then(|s| s.clone());
        match spinner {
            Some(bar) => bar.suspend(|| Self::read_line(question)),
            None => Self::read_line(question),
        }
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        Ok(is_yes(&self.ask(question)?))
    }

    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }
}
