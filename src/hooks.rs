//! Step lifecycle hooks
//!
//! Two hooks ship with the tracker: `PacingHook` breaks up the action
//! cadence before every step, and `RetryHook` watches the page address
//! after every step and nudges the planner back onto the task when the
//! session lands on a failure page.

use crate::agent::{StepContext, StepHook};
use crate::error::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Instruction injected when a failure page is detected
pub const RETRY_INSTRUCTION: &str = "Retry to complete the original task";

/// Substrings in a page address that mark a failed attempt
const FAILURE_MARKERS: [&str; 5] = ["error", "failed", "invalid", "incorrect", "unable"];

/// Pre-step pacing: a random 1.0-3.0 s pause, and a pointer move within
/// a fixed window on 30% of steps
pub struct PacingHook {
    rng: Mutex<StdRng>,
}

impl PacingHook {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for PacingHook {
    fn default() -> Self {
        Self::new()
    }
}

/// Delay before the next step, uniform in [1.0, 3.0] seconds
pub(crate) fn pacing_delay(rng: &mut impl Rng) -> Duration {
    Duration::from_secs_f64(rng.gen_range(1.0..=3.0))
}

/// Pointer target within x in [100, 800], y in [100, 600] on 30% of
/// draws, `None` otherwise
pub(crate) fn jiggle_target(rng: &mut impl Rng) -> Option<(u32, u32)> {
    if rng.gen::<f64>() < 0.3 {
        Some((rng.gen_range(100..=800), rng.gen_range(100..=600)))
    } else {
        None
    }
}

#[async_trait]
impl StepHook for PacingHook {
    async fn on_step_start(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        // Draw while holding the lock, sleep after releasing it.
        let (delay, target) = {
            let mut rng = self.rng.lock().expect("pacing rng poisoned");
            (pacing_delay(&mut *rng), jiggle_target(&mut *rng))
        };

        debug!("Pacing: sleeping {:.2}s", delay.as_secs_f64());
        tokio::time::sleep(delay).await;

        if let Some((x, y)) = target {
            ctx.move_mouse(x, y).await?;
        }

        Ok(())
    }
}

/// Retry progress across a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// No failure seen yet
    Normal,
    /// Failures seen, retries still available
    Retrying { attempts: u32 },
    /// Retry budget spent, no further instructions are injected
    Exhausted,
}

/// Post-step retry: inspects the page address for failure markers and
/// enqueues one retry instruction per detection, bounded by a retry cap.
/// The overall step budget remains the outer backstop.
pub struct RetryHook {
    state: Mutex<RetryState>,
    max_retries: u32,
}

impl RetryHook {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: Mutex::new(RetryState::Normal),
            max_retries,
        }
    }

    pub fn state(&self) -> RetryState {
        *self.state.lock().expect("retry state poisoned")
    }

    /// Advance the state machine on a detected failure. Returns whether
    /// a retry instruction should be injected.
    fn register_failure(&self) -> bool {
        let mut state = self.state.lock().expect("retry state poisoned");
        match *state {
            RetryState::Normal => {
                *state = RetryState::Retrying { attempts: 1 };
                true
            }
            RetryState::Retrying { attempts } if attempts < self.max_retries => {
                *state = RetryState::Retrying { attempts: attempts + 1 };
                true
            }
            RetryState::Retrying { .. } => {
                *state = RetryState::Exhausted;
                false
            }
            RetryState::Exhausted => false,
        }
    }
}

impl Default for RetryHook {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Whether a page address looks like a failed attempt
pub(crate) fn detect_failure(url: &str) -> bool {
    let lower = url.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[async_trait]
impl StepHook for RetryHook {
    async fn on_step_end(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let url = ctx.current_url();
        if !detect_failure(&url) {
            return Ok(());
        }

        if self.register_failure() {
            info!("Detected failure condition at {}, will retry", url);
            ctx.add_instruction(RETRY_INSTRUCTION);
        } else {
            info!("Detected failure condition at {}, retry budget spent", url);
        }

        Ok(())
    }
}
