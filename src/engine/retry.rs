use std::time::Duration;

use crate::provider::ProviderError;

use super::control::{JobControl, Wake, WakeOn};

/// Backoff budget for rate-limited provider calls.
///
/// Retry `n` (0-based) waits `base_delay * 2^n`, so the defaults wait
/// 1s, 2s and 4s before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Returns the wait before retry `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Total time spent waiting if every retry is used.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|retry| self.delay_for(retry))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Result of a call made under a retry policy.
#[derive(Debug)]
pub(crate) enum Attempt<T> {
    Finished(Result<T, ProviderError>),
    /// A stop arrived while backing off; the call was abandoned.
    Interrupted,
}

/// Calls `f`, retrying rate-limited failures with exponential backoff.
///
/// Other errors are returned immediately. Backoff sleeps wake only on a stop
/// request; pause is honored at the next row boundary instead. `on_retry`
/// receives the 1-based retry number, the wait about to happen and the error
/// that caused it.
pub(crate) fn call_with_backoff<T, F, W>(
    policy: &RetryPolicy,
    control: &JobControl,
    mut f: F,
    mut on_retry: W,
) -> Attempt<T>
where
    F: FnMut() -> Result<T, ProviderError>,
    W: FnMut(u32, Duration, &ProviderError),
{
    let mut retry = 0;
    loop {
        match f() {
            Ok(value) => return Attempt::Finished(Ok(value)),
            Err(e) if should_retry(&e) && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                retry += 1;
                on_retry(retry, delay, &e);
                if control.sleep(delay, WakeOn::Stop) == Wake::Stopped {
                    return Attempt::Interrupted;
                }
            }
            Err(e) => return Attempt::Finished(Err(e)),
        }
    }
}

/// Only rate-limit and quota failures are worth waiting out.
fn should_retry(error: &ProviderError) -> bool {
    error.is_rate_limited()
}

/// Formats a wait for status text: `"2"` for two seconds, `"0.5"` for half of one.
pub(crate) fn format_seconds(delay: Duration) -> String {
    delay.as_secs_f64().to_string()
}
