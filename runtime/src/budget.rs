//! Two-phase time budget for a per-page resolution.
//!
//! The resolution runs as a spawned task. When the first budget lapses the
//! caller gets a `timeout-pending` placeholder plus a [`PendingResolution`]
//! it may await once more. The task itself is never aborted: after a lapsed
//! extension it is detached and its result discarded.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cwcot_scout::{SelectionOutcome, SelectionReason};

/// Result of the first bounded wait.
#[derive(Debug)]
pub enum Budgeted {
    /// Finished within budget; the outcome is exactly what the task returned.
    Completed(SelectionOutcome),
    /// Still running.
    Pending(PendingResolution),
}

/// A resolution still running after its budget lapsed.
#[derive(Debug)]
pub struct PendingResolution {
    placeholder: SelectionOutcome,
    handle: JoinHandle<Result<SelectionOutcome>>,
}

impl PendingResolution {
    /// The `timeout-pending` outcome that stands unless the task finishes.
    pub fn placeholder(&self) -> &SelectionOutcome {
        &self.placeholder
    }

    /// Wait up to `extension` more. A result arriving in time is retagged
    /// `slow-confirmed`; otherwise the placeholder stands.
    pub async fn extend(mut self, extension: Duration) -> SelectionOutcome {
        match tokio::time::timeout(extension, &mut self.handle).await {
            Ok(Ok(Ok(mut outcome))) => {
                info!(
                    source_url = %outcome.source_url,
                    original = %outcome.selection_reason,
                    "late resolution accepted"
                );
                outcome.original_reason = Some(outcome.selection_reason);
                outcome.selection_reason = SelectionReason::SlowConfirmed;
                outcome
            }
            Ok(Ok(Err(err))) => {
                warn!(source_url = %self.placeholder.source_url, "late resolution failed: {err:#}");
                self.placeholder
            }
            Ok(Err(join_err)) => {
                warn!(source_url = %self.placeholder.source_url, "resolution task died: {join_err}");
                self.placeholder
            }
            Err(_) => {
                warn!(
                    source_url = %self.placeholder.source_url,
                    extension_ms = extension.as_millis() as u64,
                    "extension lapsed, abandoning resolution"
                );
                self.placeholder
            }
        }
    }
}

/// Run `task` with a budget.
///
/// Errors the task returns within budget propagate unchanged.
pub async fn with_budget<F>(task: F, budget: Duration, source_url: &str) -> Result<Budgeted>
where
    F: Future<Output = Result<SelectionOutcome>> + Send + 'static,
{
    let mut handle = tokio::spawn(task);
    match tokio::time::timeout(budget, &mut handle).await {
        Ok(joined) => {
            let outcome = joined.map_err(|e| anyhow!("resolution task died: {e}"))??;
            Ok(Budgeted::Completed(outcome))
        }
        Err(_) => {
            info!(%source_url, budget_ms = budget.as_millis() as u64, "budget lapsed, resolution continues");
            Ok(Budgeted::Pending(PendingResolution {
                placeholder: SelectionOutcome::timeout_pending(source_url),
                handle,
            }))
        }
    }
}

/// [`with_budget`] followed by one extension when the budget lapses.
pub async fn resolve_within<F>(
    task: F,
    budget: Duration,
    extension: Duration,
    source_url: &str,
) -> Result<SelectionOutcome>
where
    F: Future<Output = Result<SelectionOutcome>> + Send + 'static,
{
    match with_budget(task, budget, source_url).await? {
        Budgeted::Completed(outcome) => Ok(outcome),
        Budgeted::Pending(pending) => Ok(pending.extend(extension).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const PAGE: &str = "https://listing.example.com/property/42";

    async fn finish_after(delay_ms: u64, reason: SelectionReason) -> Result<SelectionOutcome> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(SelectionOutcome::empty(reason, PAGE))
    }

    #[tokio::test]
    async fn test_within_budget_returns_exact_outcome() {
        let budgeted = with_budget(
            finish_after(1, SelectionReason::NotFound),
            Duration::from_secs(2),
            PAGE,
        )
        .await
        .unwrap();
        let Budgeted::Completed(outcome) = budgeted else {
            panic!("expected completion");
        };
        assert_eq!(outcome.selection_reason, SelectionReason::NotFound);
        assert_eq!(outcome.original_reason, None);
    }

    #[tokio::test]
    async fn test_error_within_budget_propagates() {
        let result = with_budget(
            async { Err(anyhow!("page was closed")) },
            Duration::from_secs(2),
            PAGE,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_late_result_is_slow_confirmed() {
        let budgeted = with_budget(
            finish_after(80, SelectionReason::ConfirmedMatch),
            Duration::from_millis(10),
            PAGE,
        )
        .await
        .unwrap();
        let Budgeted::Pending(pending) = budgeted else {
            panic!("expected pending");
        };
        assert_eq!(
            pending.placeholder().selection_reason,
            SelectionReason::TimeoutPending
        );
        let outcome = pending.extend(Duration::from_secs(2)).await;
        assert_eq!(outcome.selection_reason, SelectionReason::SlowConfirmed);
        assert_eq!(outcome.original_reason, Some(SelectionReason::ConfirmedMatch));
    }

    #[tokio::test]
    async fn test_lapsed_extension_keeps_placeholder_and_task_runs_on() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let task = async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(SelectionOutcome::empty(SelectionReason::ConfirmedMatch, PAGE))
        };
        let outcome = resolve_within(
            task,
            Duration::from_millis(10),
            Duration::from_millis(10),
            PAGE,
        )
        .await
        .unwrap();
        assert_eq!(outcome.selection_reason, SelectionReason::TimeoutPending);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_late_error_keeps_placeholder() {
        let task = async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Err(anyhow!("Execution context was destroyed"))
        };
        let outcome = resolve_within(
            task,
            Duration::from_millis(5),
            Duration::from_secs(2),
            PAGE,
        )
        .await
        .unwrap();
        assert_eq!(outcome.selection_reason, SelectionReason::TimeoutPending);
        assert_eq!(outcome.address, None);
    }
}
