//! Error and outcome types
//!
//! A run that finishes without a final answer is not a failure: the
//! caller gets `TrackOutcome::NoResults`. `Err` is reserved for actual
//! breakage (missing credential, transport, trace store I/O).

use std::fmt;

/// Library-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("GEMINI_API_KEY is not set")]
    MissingCredential,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("language model request failed: {0}")]
    Llm(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("trace store error: {0}")]
    Trace(#[from] std::io::Error),

    #[error("trace format error: {0}")]
    TraceFormat(#[from] serde_json::Error),

    #[error("agent error: {0}")]
    Agent(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Sentinel text returned when the agent produced no final answer
pub const NO_RESULTS: &str = "No results found";

/// Outcome of a tracking run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Free-form answer text, expected shape "Voyage: X, Arrival: Y".
    /// The agent's text is trusted as-is, no structured parsing.
    Found(String),
    /// The run completed but the agent reported no final answer
    NoResults,
}

impl TrackOutcome {
    /// Answer text if the run found one
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Found(text) => Some(text),
            Self::NoResults => None,
        }
    }
}

impl fmt::Display for TrackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(text) => f.write_str(text),
            Self::NoResults => f.write_str(NO_RESULTS),
        }
    }
}
