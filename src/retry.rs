//! Exponential backoff with jitter for transient browser failures.

use crate::error::{CaptureError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Substrings (lowercased) of errors worth another attempt.
const TRANSIENT_MARKERS: &[&str] = &[
    "net::err_aborted",
    "net::err_connection_reset",
    "net::err_connection_closed",
    "net::err_name_not_resolved",
    "net::err_internet_disconnected",
    "navigation failed",
    "target closed",
    "execution context was destroyed",
    "protocol error",
    "timeout",
    "has been closed",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub backoff: f64,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(350),
            backoff: 1.8,
            max_delay: Duration::from_secs(4),
            max_jitter: Duration::from_millis(150),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.base_delay.as_millis() as f64 * exp).round();
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.backoff_delay(attempt) + Duration::from_millis(jitter)
    }
}

/// Only the browser's own message is inspected, never our variant prefix.
pub fn is_transient(err: &CaptureError) -> bool {
    let message = match err {
        CaptureError::NavigationFailed(m) | CaptureError::Script(m) | CaptureError::Other(m) => {
            m.to_ascii_lowercase()
        }
        CaptureError::CdpError(e) => e.to_string().to_ascii_lowercase(),
        _ => return false,
    };
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, action: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_transient(&e) => {
                let delay = policy.jittered_delay(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                    action,
                    attempt,
                    attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                log::error!("❌ {} failed after {} attempt(s): {}", action, attempt, e);
                return Err(e);
            }
        }
    }
}
