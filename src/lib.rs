//! shiptrack
//!
//! Retrieves shipping voyage/arrival data for a carrier booking ID by
//! driving a page session through an LLM-planned agent loop, with
//! replay of a previously recorded action trace when one exists.
//!
//! # Architecture
//!
//! ```text
//! Booking ID ──► Tracker ──► Agent loop ──► Gemini (planning)
//!                  │            │
//!                  │            ├── PageDriver (HTTP session)
//!                  │            ├── PacingHook (pre-step)
//!                  │            └── RetryHook (post-step)
//!                  └── TraceStore (keyed replay recipes)
//! ```

pub mod agent;
pub mod browser;
pub mod config;
pub mod error;
pub mod hooks;
pub mod llm;
pub mod trace;
pub mod tracker;

pub use agent::{Action, Agent, RunResult, StepContext, StepHook};
pub use browser::{BrowserConfig, BrowserSession, PageDriver};
pub use config::Config;
pub use error::{Error, Result, TrackOutcome, NO_RESULTS};
pub use hooks::{PacingHook, RetryHook, RetryState, RETRY_INSTRUCTION};
pub use llm::{CompletionModel, GeminiClient};
pub use trace::{prepare_replay_actions, TraceStore};
pub use tracker::{Tracker, CARRIER, TARGET_URL};
