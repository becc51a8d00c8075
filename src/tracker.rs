//! Task dispatcher
//!
//! Ties the pieces together: picks fresh discovery or trace replay,
//! runs the agent with the pacing and retry hooks under the step
//! budget, and persists the reduced trace after a successful fresh
//! run. Replay runs never touch the stored trace.

use crate::agent::Agent;
use crate::browser::{BrowserConfig, BrowserSession, PageDriver};
use crate::config::Config;
use crate::error::{Result, TrackOutcome};
use crate::hooks::{PacingHook, RetryHook};
use crate::llm::CompletionModel;
use crate::trace::{prepare_replay_actions, TraceStore};
use tracing::{info, warn};

/// Carrier tracking portal the fresh-discovery task starts from
pub const TARGET_URL: &str = "http://www.seacargotracking.net/";

/// Carrier tag used to key stored traces
pub const CARRIER: &str = "hmm";

/// Retry instruction budget per run
const MAX_RETRIES: u32 = 3;

/// Task text for a first-time discovery run
pub fn fresh_task(booking_id: &str) -> String {
    format!(
        r#"Your task:
Given an HMM booking ID "{booking_id}", retrieve voyage and arrival from HMM Shipping line.
First, navigate to exactly website: {TARGET_URL}
Scroll down to find and navigate to the link "HYUNDAI Merchant Marine (HMM)" and stay on that link.
Scroll down to find "Track and Trace" and input the booking ID in the box and search.
Wait for the results to load or try refreshing the page only if blocked by the website.
Scroll down to find the voyage number and arrival date.
Only return the final answer in the format "Voyage: <voyage_number>, Arrival: <arrival_date>""#
    )
}

/// Task text for a replay run seeded with recorded actions
pub fn replay_task(booking_id: &str) -> String {
    format!(
        r#"Given an HMM booking ID "{booking_id}", retrieve voyage and arrival from HMM Shipping line."#
    )
}

/// Planner context telling a replay run the booking ID changed
pub fn replay_context(booking_id: &str) -> String {
    format!(
        r#"Replaying previous actions with new booking ID "{booking_id}".
Return the new voyage number and arrival date in the format Voyage: <voyage_number>, Arrival: <arrival_date>"#
    )
}

/// Voyage/arrival tracker for the HMM carrier portal
pub struct Tracker<M: CompletionModel> {
    config: Config,
    model: M,
    store: TraceStore,
}

impl<M: CompletionModel> Tracker<M> {
    pub fn new(config: Config, model: M) -> Self {
        let store = TraceStore::new(config.trace_dir.clone());
        Self { config, model, store }
    }

    /// The completion model backing the planner
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Fetch voyage and arrival for a booking ID using a fresh HTTP
    /// browser session
    pub async fn fetch(&self, booking_id: &str) -> Result<TrackOutcome> {
        let driver = BrowserSession::new(BrowserConfig::from_config(&self.config))?;
        self.fetch_with_driver(booking_id, driver).await
    }

    /// Fetch against a caller-supplied page driver
    pub async fn fetch_with_driver<D: PageDriver>(
        &self,
        booking_id: &str,
        driver: D,
    ) -> Result<TrackOutcome> {
        let key = TraceStore::task_key(CARRIER, TARGET_URL);
        let stored = self.store.load(CARRIER, &key)?;
        let fresh_run = stored.is_none();

        let mut agent = match stored {
            Some(actions) => {
                info!(
                    "Replaying {} recorded actions for booking {}",
                    actions.len(),
                    booking_id
                );
                Agent::new(driver, &self.model, &replay_task(booking_id))
                    .with_message_context(&replay_context(booking_id))
                    .with_initial_actions(actions)
            }
            None => {
                info!("No stored trace, running fresh discovery for booking {}", booking_id);
                Agent::new(driver, &self.model, &fresh_task(booking_id))
            }
        };
        agent = agent.with_max_steps(self.config.max_steps);

        let pacing = PacingHook::new();
        let retry = RetryHook::new(MAX_RETRIES);
        let result = agent.run(&[&pacing, &retry]).await?;

        match result.final_result() {
            Some(answer) => {
                if fresh_run {
                    let replayable = prepare_replay_actions(result.model_actions());
                    if let Err(e) = self.store.store(CARRIER, &key, &replayable) {
                        // A lost trace only costs the next run a fresh
                        // discovery, the answer still stands.
                        warn!("Failed to store action trace: {}", e);
                    }
                }
                Ok(TrackOutcome::Found(answer))
            }
            None => Ok(TrackOutcome::NoResults),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_task_contains_booking_and_target() {
        let task = fresh_task("SINI25432400");
        assert!(task.contains("\"SINI25432400\""));
        assert!(task.contains(TARGET_URL));
        assert!(task.contains("HYUNDAI Merchant Marine (HMM)"));
        assert!(task.contains("Track and Trace"));
        assert!(task.contains("Voyage: <voyage_number>, Arrival: <arrival_date>"));
    }

    #[test]
    fn test_replay_task_and_context() {
        let task = replay_task("BOOK123");
        assert!(task.contains("\"BOOK123\""));
        assert!(!task.contains(TARGET_URL));

        let context = replay_context("BOOK123");
        assert!(context.contains("new booking ID \"BOOK123\""));
        assert!(context.contains("Voyage: <voyage_number>, Arrival: <arrival_date>"));
    }
}
