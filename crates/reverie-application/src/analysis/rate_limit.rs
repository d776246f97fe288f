//! Fixed-window rate limiting for remote analysis calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);
const MAX_CALLS_PER_WINDOW: u32 = 3;
const MIN_SPACING: Duration = Duration::from_secs(2);

#[derive(Default)]
struct RateState {
    /// End of the current fixed window; `None` before the first call.
    window_reset_at: Option<Instant>,
    calls_in_window: u32,
    last_call_at: Option<Instant>,
}

/// Process-wide limiter: at most 3 remote calls per 60-second fixed
/// window, with a minimum 2-second spacing between consecutive calls.
///
/// Exceeding the window budget is a refusal (`acquire` returns
/// `false`); violating only the spacing suspends the caller for the
/// remainder instead of failing.
pub struct RateLimiter {
    state: Mutex<RateState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RateState::default()),
        }
    }

    /// Requests one remote-call slot. Returns `false` when the current
    /// window's budget is spent; otherwise waits out the minimum
    /// spacing and claims the slot.
    ///
    /// The lock is held across the spacing sleep: spacing is a
    /// process-wide guarantee, so concurrent acquirers queue behind it.
    pub async fn acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.window_reset_at {
            Some(reset_at) if now >= reset_at => {
                state.calls_in_window = 0;
                state.window_reset_at = Some(now + WINDOW);
            }
            None => state.window_reset_at = Some(now + WINDOW),
            Some(_) => {}
        }

        if state.calls_in_window >= MAX_CALLS_PER_WINDOW {
            tracing::debug!("remote call budget exhausted for this window");
            return false;
        }

        if let Some(last) = state.last_call_at {
            let elapsed = now.duration_since(last);
            if elapsed < MIN_SPACING {
                tokio::time::sleep(MIN_SPACING - elapsed).await;
            }
        }

        state.calls_in_window += 1;
        state.last_call_at = Some(Instant::now());
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
