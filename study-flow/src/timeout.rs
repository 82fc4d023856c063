use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{FlowError, Result};

/// Race `operation` against a deadline.
///
/// The operation's own result or error propagates unchanged when it settles
/// first. When the deadline wins the future is dropped; work it already handed
/// to a remote service is not rolled back. A zero budget fails before the
/// future is ever polled, so no side effects are started.
pub async fn with_timeout<F, T>(operation: F, budget: Duration, label: &'static str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if budget.is_zero() {
        warn!(operation = label, "zero timeout budget, operation not started");
        return Err(FlowError::Timeout {
            operation: label,
            budget,
        });
    }

    match tokio::time::timeout(budget, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation = label, budget_ms = budget.as_millis() as u64, "operation timed out");
            Err(FlowError::Timeout {
                operation: label,
                budget,
            })
        }
    }
}
