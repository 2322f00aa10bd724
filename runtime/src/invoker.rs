//! Bounded retry for operations against a live page.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{classify_error, ErrorClass, ResolveError};
use crate::renderer::RenderContext;

/// Retry policy for page operations. Backoff is linear: `base * attempt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 450,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(attempt as u64))
    }
}

/// Run `operation`, retrying transient context-loss errors.
///
/// A page reported closed is never retried and surfaces as
/// [`ResolveError::PageClosed`]. Other errors, and the last transient error
/// once attempts run out, are returned unchanged.
pub async fn invoke<T, F, Fut>(
    ctx: &dyn RenderContext,
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if ctx.is_closed() {
                    return Err(err.context(ResolveError::PageClosed));
                }
                if classify_error(&err) != ErrorClass::Transient || attempt >= max_attempts {
                    return Err(err);
                }
                debug!(op = op_name, attempt, "transient page error, retrying: {err:#}");
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
        }
    }
}
