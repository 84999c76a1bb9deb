use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug)]
pub enum ModelError {
    InvalidFrame(String),
    UnknownSeverity(String),
    UnknownLevel(String),
    UnknownStreamKind(String),
    UnknownTaskKind(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidFrame(msg) => write!(f, "invalid frame: {msg}"),
            ModelError::UnknownSeverity(s) => write!(f, "unknown severity: {s}"),
            ModelError::UnknownLevel(s) => write!(f, "unknown detection level: {s}"),
            ModelError::UnknownStreamKind(s) => write!(f, "unknown stream kind: {s}"),
            ModelError::UnknownTaskKind(s) => write!(f, "unknown task kind: {s}"),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
