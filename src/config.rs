//! Configuration management

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key (required)
    pub api_key: String,

    /// Gemini model name
    pub model: String,

    /// Directory holding recorded action traces
    pub trace_dir: PathBuf,

    /// Upper bound on agent steps per run
    pub max_steps: usize,

    /// HTTP timeout for page fetches, in seconds
    pub http_timeout_secs: u64,

    /// User agent string for page fetches
    pub user_agent: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails fast when the model credential is absent.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(Error::MissingCredential)?;

        let model = std::env::var("SHIPTRACK_MODEL")
            .unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        let trace_dir = std::env::var("SHIPTRACK_TRACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("traces"));

        let max_steps = std::env::var("SHIPTRACK_MAX_STEPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let http_timeout_secs = std::env::var("SHIPTRACK_HTTP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let user_agent = std::env::var("SHIPTRACK_USER_AGENT").ok();

        if max_steps == 0 {
            return Err(Error::Config("SHIPTRACK_MAX_STEPS must be positive".into()));
        }

        Ok(Self {
            api_key,
            model,
            trace_dir,
            max_steps,
            http_timeout_secs,
            user_agent,
        })
    }
}
