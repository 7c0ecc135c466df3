// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("topic must not be blank")]
    InvalidTopic,

    #[error("invalid agent count '{0}' (expected 1..=10)")]
    InvalidAgentCount(String),

    #[error("generation failed after {attempts} attempt(s): {last}")]
    Generation { attempts: u32, last: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PulseError>;
