// src/errors.rs
use std::io;

use thiserror::Error;

/// Raised when a supplier key cannot be brought to its canonical integer form.
#[derive(Debug, Error, PartialEq)]
pub enum IdentifierError {
    #[error("supplier key '{raw}' is not numeric")]
    NotNumeric { raw: String },
    #[error("supplier key '{raw}' is not integer-valued")]
    NotIntegral { raw: String },
}

/// Errors surfaced at the oracle boundary.
///
/// The in-process LLM adapter swallows these and degrades to the sentinel;
/// the HTTP adapter returns `HttpStatus` and `Transport` to its caller.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Match API returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("oracle configuration error: {0}")]
    Configuration(String),
}

impl OracleError {
    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            OracleError::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => OracleError::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None if err.is_decode() => OracleError::MalformedResponse(err.to_string()),
            None => OracleError::Transport(err.to_string()),
        }
    }
}

/// Benchmark table problems; all fatal at load time.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Missing required column '{column}'. Found columns: {found:?}")]
    MissingColumn { column: String, found: Vec<String> },
    #[error("benchmark dataset not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File {0} does not exist")]
    MissingFile(String),
    #[error("required setting {0} is not set")]
    MissingSetting(&'static str),
    #[error("setting {name} has invalid value '{value}'")]
    InvalidSetting { name: &'static str, value: String },
}
