//! Error taxonomy for twig operations.
//! Divergence between local and remote state is not an error: it is reported
//! through the pull/push outcome enums so batched work can continue.

use std::fmt;

/// Main error type for twig operations
#[derive(Debug, Clone)]
pub enum TwigError {
    /// Malformed version, utility name or identifier
    Validation {
        operation: String,
        input: String,
        reason: String,
    },
    /// Utility or version absent locally or remotely
    NotFound {
        operation: String,
        subject: String,
    },
    /// Remote registry unreachable or rejected a request
    Transport {
        operation: String,
        url: Option<String>,
        status: Option<u16>,
        source: String,
    },
    /// Missing project manifest, invalid installation path, unusable config
    Config {
        operation: String,
        field: Option<String>,
        source: String,
    },
    /// Local filesystem errors
    Io {
        operation: String,
        path: Option<String>,
        source: String,
    },
    /// An interactive answer was required but could not be obtained
    Prompt {
        question: String,
        source: String,
    },
}

pub type Result<T> = std::result::Result<T, TwigError>;

impl TwigError {
    pub fn validation(operation: &str, input: &str, reason: &str) -> Self {
        TwigError::Validation {
            operation: operation.to_string(),
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(operation: &str, subject: impl Into<String>) -> Self {
        TwigError::NotFound {
            operation: operation.to_string(),
            subject: subject.into(),
        }
    }

    pub fn transport(operation: &str, url: Option<&str>, status: Option<u16>, source: impl fmt::Display) -> Self {
        TwigError::Transport {
            operation: operation.to_string(),
            url: url.map(String::from),
            status,
            source: source.to_string(),
        }
    }

    /// The registry already holds what we were about to create.
    pub fn conflict(operation: &str, source: impl fmt::Display) -> Self {
        Self::transport(operation, None, Some(409), source)
    }

    pub fn config(operation: &str, field: Option<&str>, source: impl fmt::Display) -> Self {
        TwigError::Config {
            operation: operation.to_string(),
            field: field.map(String::from),
            source: source.to_string(),
        }
    }

    pub fn io(operation: &str, path: &std::path::Path, source: impl fmt::Display) -> Self {
        TwigError::Io {
            operation: operation.to_string(),
            path: Some(path.display().to_string()),
            source: source.to_string(),
        }
    }

    pub fn prompt(question: &str, source: impl fmt::Display) -> Self {
        TwigError::Prompt {
            question: question.to_string(),
            source: source.to_string(),
        }
    }

    /// Fatal errors stop the whole command; validation and not-found
    /// conditions only abort the utility they were raised for.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TwigError::Transport { .. }
                | TwigError::Config { .. }
                | TwigError::Io { .. }
                | TwigError::Prompt { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            TwigError::NotFound { .. } => true,
            TwigError::Transport { status, .. } => *status == Some(404),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TwigError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for TwigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwigError::Validation { operation, input, reason } => {
                write!(f, "Validation error in {}: {} (input: {})", operation, reason, input)
            }
            TwigError::NotFound { operation, subject } => {
                write!(f, "Not found in {}: {}", operation, subject)
            }
            TwigError::Transport { operation, url, status, source } => {
                write!(f, "Network error in {}: {}", operation, source)?;
                if let Some(url) = url {
                    write!(f, " (url: {})", url)?;
                }
                if let Some(status) = status {
                    write!(f, " (status: {})", status)?;
                }
                Ok(())
            }
            TwigError::Config { operation, field, source } => {
                write!(f, "Configuration error in {}: {}", operation, source)?;
                if let Some(field) = field {
                    write!(f, " (field: {})", field)?;
                }
                Ok(())
            }
            TwigError::Io { operation, path, source } => {
                write!(f, "I/O error in {}: {}", operation, source)?;
                if let Some(path) = path {
                    write!(f, " (path: {})", path)?;
                }
                Ok(())
            }
            TwigError::Prompt { question, source } => {
                write!(f, "Prompt failed: {} (question: {})", source, question)
            }
        }
    }
}

impl std::error::Error for TwigError {}
