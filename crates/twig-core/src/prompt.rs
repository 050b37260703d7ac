//! Interactive question capability. The library never reads a terminal itself.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{Result, TwigError};
use crate::sync::LockManager;

/// Lock name every session prompt is funneled through.
pub const PROMPT_LOCK: &str = "prompt";

pub trait Prompter: Send + Sync {
    fn ask(&self, question: &str) -> Result<String>;

    fn confirm(&self, question: &str) -> Result<bool>;

    /// False when no human can answer; callers with a sane fallback skip asking.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Non-interactive default: every question is an error naming the question.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&self, question: &str) -> Result<String> {
        Err(TwigError::prompt(question, "no interactive terminal available"))
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        Err(TwigError::prompt(question, "no interactive terminal available"))
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Answers queued up front; records every question asked.
#[derive(Default)]
pub struct Scripted {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scripted {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn next(&self, question: &str) -> Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .ok_or_else(|| TwigError::prompt(question, "no scripted answer left"))
    }
}

impl Prompter for Scripted {
    fn ask(&self, question: &str) -> Result<String> {
        self.next(question)
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        Ok(is_yes(&self.next(question)?))
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Wraps a prompter so concurrent resolutions never interleave questions.
pub struct SerializedPrompter {
    inner: Arc<dyn Prompter>,
    locks: Arc<LockManager>,
}

impl SerializedPrompter {
    pub fn new(inner: Arc<dyn Prompter>, locks: Arc<LockManager>) -> Self {
        SerializedPrompter { inner, locks }
    }
}

impl Prompter for SerializedPrompter {
    fn ask(&self, question: &str) -> Result<String> {
        self.locks.with_lock(PROMPT_LOCK, || self.inner.ask(question))
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        self.locks.with_lock(PROMPT_LOCK, || self.inner.confirm(question))
    }

    fn is_interactive(&self) -> bool {
        self.inner.is_interactive()
    }
}
