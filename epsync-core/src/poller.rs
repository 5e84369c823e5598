//! Wait for an out-of-band remote operation to reach a terminal state.
//!
//! [`await_terminal`] repeatedly runs a caller-supplied probe. Between probes
//! it sleeps, starting at `min_interval` and doubling up to `interval`. The
//! wait ends when the probe reports a terminal state, the probe fails, the
//! deadline elapses or the caller cancels.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PollTiming;
use crate::error::{ReconcileError, Result, Target};
use crate::model::OperationState;

/// Lower bound on the wait between two probes.
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Stand-in for "no deadline", roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + wait`, saturating at a far-future instant instead of overflowing.
pub(crate) fn instant_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// States in which a resource is still being provisioned or torn down.
pub const PENDING_STATES: &[OperationState] =
    &[OperationState::Pending, OperationState::InProgress];

/// Terminal outcomes of a provisioning or teardown operation.
pub const TERMINAL_STATES: &[OperationState] = &[OperationState::Ready, OperationState::Failed];

/// Parameters of a single wait.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub pending: &'static [OperationState],
    pub terminal: &'static [OperationState],
    pub delay: Duration,
    pub min_interval: Duration,
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    /// Standard provisioning/teardown wait with the given timing and deadline.
    pub fn new(timing: &PollTiming, timeout: Duration) -> Self {
        Self {
            pending: PENDING_STATES,
            terminal: TERMINAL_STATES,
            delay: timing.delay(),
            min_interval: timing.min_interval(),
            interval: timing.interval(),
            timeout,
        }
    }

    fn expected(&self) -> String {
        self.pending
            .iter()
            .chain(self.terminal)
            .map(OperationState::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What one probe saw.
#[derive(Debug, Clone)]
pub struct Observation<T> {
    pub value: T,
    pub state: OperationState,
    /// Raw status payload, reported on failure and timeout.
    pub detail: Option<String>,
}

impl<T> Observation<T> {
    pub fn new(value: T, state: OperationState) -> Self {
        Self {
            value,
            state,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn describe(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} {}", self.state, detail),
            None => self.state.to_string(),
        }
    }
}

/// Run `probe` until it reports a terminal state.
///
/// A probe error ends the wait with that error. `Failed` ends it with
/// [`ReconcileError::ConvergenceFailed`]; any other terminal state returns
/// the observed value. Running out of time yields [`ReconcileError::Timeout`]
/// carrying the last observation.
pub async fn await_terminal<T, F, Fut>(
    target: &Target,
    config: &PollConfig,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>>>,
{
    let started = Instant::now();
    let deadline = instant_after(started, config.timeout);
    let ceiling = config.interval.max(config.min_interval).max(MIN_WAIT);
    let mut wait = config.min_interval.max(MIN_WAIT);
    let mut last_observed = String::from("nothing");
    let mut attempt: u32 = 0;

    let timed_out = |last_observed: String| ReconcileError::Timeout {
        target: target.clone(),
        waited: started.elapsed(),
        last_observed,
    };
    let cancelled = || ReconcileError::Cancelled {
        target: target.clone(),
    };

    if !config.delay.is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep_until(instant_after(started, config.delay).min(deadline)) => {}
        }
    }

    loop {
        attempt += 1;
        let observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            res = timeout_at(deadline, probe()) => match res {
                Ok(observation) => observation?,
                Err(_) => return Err(timed_out(last_observed)),
            },
        };

        debug!(
            endpoint_id = ?target.endpoint_id,
            scope_id = %target.scope_id,
            attempt,
            state = %observation.state,
            "Probed operation state"
        );

        if config.terminal.contains(&observation.state) {
            if observation.state == OperationState::Failed {
                return Err(ReconcileError::ConvergenceFailed {
                    target: target.clone(),
                    payload: observation
                        .detail
                        .unwrap_or_else(|| "<no operation status>".to_string()),
                });
            }
            return Ok(observation.value);
        }

        if !config.pending.contains(&observation.state) {
            return Err(ReconcileError::UnexpectedState {
                target: target.clone(),
                state: observation.state.to_string(),
                expected: config.expected(),
            });
        }

        last_observed = observation.describe();

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(last_observed));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep_until(instant_after(now, wait).min(deadline)) => {}
        }
        wait = wait.saturating_mul(2).min(ceiling);
    }
}
