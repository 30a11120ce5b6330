//! Drives one execution from submission to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{PollSettingsError, QueryError};
use crate::query::{ExecutionState, QueryEngine, QueryId, QueryParameters, ResultRow};

/// Wait budget and cadence of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    max_wait: Duration,
    poll_interval: Duration,
}

impl PollSettings {
    /// `poll_interval` must be non-zero. A `max_wait` shorter than one
    /// interval still gets exactly one status check.
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Result<Self, PollSettingsError> {
        if poll_interval.is_zero() {
            return Err(PollSettingsError::ZeroInterval);
        }
        Ok(Self {
            max_wait,
            poll_interval,
        })
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Submits a query and polls its execution until it finishes.
///
/// Elapsed time is accumulated in whole poll intervals and compared with
/// the budget only after each sleep, never preemptively. Wall time can
/// therefore exceed `max_wait` by up to one interval (plus request time).
pub struct ExecutionPoller {
    engine: Arc<dyn QueryEngine>,
    settings: PollSettings,
}

impl ExecutionPoller {
    pub fn new(engine: Arc<dyn QueryEngine>, settings: PollSettings) -> Self {
        Self { engine, settings }
    }

    /// Run `query` with the configured settings.
    pub async fn run(
        &self,
        query: QueryId,
        params: QueryParameters,
    ) -> Result<Vec<ResultRow>, QueryError> {
        self.run_with(query, params, self.settings).await
    }

    /// Run `query` with explicit settings.
    pub async fn run_with(
        &self,
        query: QueryId,
        params: QueryParameters,
        settings: PollSettings,
    ) -> Result<Vec<ResultRow>, QueryError> {
        let handle = self.engine.submit(query, &params).await?;
        tracing::info!(query = %query, execution = %handle, "Execution started");

        let mut waited = Duration::ZERO;
        let mut checks = 0u32;
        loop {
            let status = self.engine.check_status(&handle).await?;
            checks += 1;
            tracing::debug!(
                execution = %handle,
                state = %status.state,
                checks,
                waited_secs = waited.as_secs_f64(),
                "Execution status"
            );

            match status.state {
                ExecutionState::Completed => {
                    let rows = self.engine.fetch_results(&handle).await?;
                    tracing::info!(execution = %handle, rows = rows.len(), checks, "Execution completed");
                    return Ok(rows);
                }
                state if state.is_terminal() => {
                    tracing::warn!(execution = %handle, state = %state, "Execution did not succeed");
                    let detail = status
                        .detail
                        .unwrap_or_else(|| format!("execution {handle} ended in {state}"));
                    return Err(QueryError::Failed {
                        state,
                        detail,
                    });
                }
                _ => {}
            }

            tokio::time::sleep(settings.poll_interval).await;
            waited += settings.poll_interval;
            if waited >= settings.max_wait {
                tracing::warn!(
                    execution = %handle,
                    checks,
                    waited_secs = waited.as_secs(),
                    "Execution did not finish within budget"
                );
                return Err(QueryError::Timeout {
                    elapsed: waited,
                    max_wait: settings.max_wait,
                });
            }
        }
    }

    /// Run on a dedicated task and await its completion.
    ///
    /// The poll loop never occupies the caller's event path; dropping the
    /// returned future does not stop the spawned loop.
    pub async fn run_detached(
        self: &Arc<Self>,
        query: QueryId,
        params: QueryParameters,
    ) -> Result<Vec<ResultRow>, QueryError> {
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run(query, params).await })
            .await
            .map_err(|e| QueryError::Worker {
                reason: e.to_string(),
            })?
    }
}
