//! Error types for letterdrill.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("character {0:?} is not part of the practiced alphabet")]
    UnknownCharacter(char),

    #[error("confidence {0} is outside the range [0, 1]")]
    InvalidConfidence(f64),

    #[error("alphabet must contain at least one character")]
    EmptyAlphabet,

    #[error("alphabet lists {0:?} more than once")]
    DuplicateCharacter(char),

    #[error("unknown alphabet: {0}")]
    UnknownAlphabet(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejects confidences outside `[0, 1]`, including NaN.
pub fn check_confidence(confidence: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(Error::InvalidConfidence(confidence))
    }
}
