//! Poll a status probe until it reaches a terminal lifecycle state.

use std::future::Future;
use std::time::Duration;

use coldcast_core::{
    Error, LifecycleStatus, PollSettings, ResourceArn, ResourceDescription, ResourceKind, Result,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A probe response that carries a lifecycle status.
pub trait StatusBearing {
    fn lifecycle_status(&self) -> &LifecycleStatus;

    /// Service detail attached to the status, if any.
    fn status_message(&self) -> Option<&str> {
        None
    }
}

impl StatusBearing for LifecycleStatus {
    fn lifecycle_status(&self) -> &LifecycleStatus {
        self
    }
}

impl StatusBearing for ResourceDescription {
    fn lifecycle_status(&self) -> &LifecycleStatus {
        &self.status
    }

    fn status_message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Terminal statuses. Anything in neither set keeps the waiter polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSets {
    pub success: Vec<LifecycleStatus>,
    pub failure: Vec<LifecycleStatus>,
}

impl StatusSets {
    pub fn new(success: Vec<LifecycleStatus>, failure: Vec<LifecycleStatus>) -> Self {
        Self { success, failure }
    }

    /// Creation of any resource: ACTIVE, or CREATE_FAILED / CREATE_STOPPED.
    pub fn creation() -> Self {
        Self::new(
            vec![LifecycleStatus::Active],
            vec![LifecycleStatus::CreateFailed, LifecycleStatus::CreateStopped],
        )
    }

    /// Dataset group update: ACTIVE, or UPDATE_FAILED.
    pub fn update() -> Self {
        Self::new(
            vec![LifecycleStatus::Active],
            vec![LifecycleStatus::UpdateFailed],
        )
    }

    /// Deletion: success is the resource disappearing, see [`Waiter::wait_until_gone`].
    pub fn deletion() -> Self {
        Self::new(Vec::new(), vec![LifecycleStatus::DeleteFailed])
    }

    fn verdict(&self, status: &LifecycleStatus) -> Verdict {
        if self.success.contains(status) {
            Verdict::Succeeded
        } else if self.failure.contains(status) {
            Verdict::Failed
        } else {
            Verdict::Pending
        }
    }
}

enum Verdict {
    Pending,
    Succeeded,
    Failed,
}

/// Polling cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` polls until a terminal state or external interruption.
    pub max_wait: Option<Duration>,
}

impl WaitPolicy {
    pub fn new(interval: Duration, max_wait: Option<Duration>) -> Self {
        Self { interval, max_wait }
    }
}

impl From<&PollSettings> for WaitPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self::new(settings.interval(), settings.max_wait())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<R> {
    Succeeded(R),
    Failed(R),
    /// Budget exhausted; carries the last observation.
    TimedOut(R),
}

/// Result of a wait together with how long it took.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitReport<R> {
    pub outcome: WaitOutcome<R>,
    pub polls: u32,
    pub elapsed: Duration,
}

impl<R> WaitReport<R> {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, WaitOutcome::Succeeded(_))
    }
}

fn timeout_error(kind: ResourceKind, arn: &ResourceArn, elapsed: Duration) -> Error {
    Error::WaitTimeout {
        kind,
        arn: arn.to_string(),
        waited_secs: elapsed.as_secs(),
    }
}

fn failed_error<R: StatusBearing>(kind: ResourceKind, arn: &ResourceArn, r: &R) -> Error {
    Error::ResourceFailed {
        kind,
        arn: arn.to_string(),
        status: r.lifecycle_status().clone(),
        message: r.status_message().map(str::to_string),
    }
}

impl<R: StatusBearing> WaitReport<R> {
    /// Succeeded → `Ok(response)`, Failed → `ResourceFailed`, TimedOut → `WaitTimeout`.
    pub fn into_result(self, kind: ResourceKind, arn: &ResourceArn) -> Result<R> {
        match self.outcome {
            WaitOutcome::Succeeded(r) => Ok(r),
            WaitOutcome::Failed(r) => Err(failed_error(kind, arn, &r)),
            WaitOutcome::TimedOut(_) => Err(timeout_error(kind, arn, self.elapsed)),
        }
    }
}

impl<R: StatusBearing> WaitReport<Option<R>> {
    /// Like [`WaitReport::into_result`] for deletion waits.
    pub fn into_deleted(self, kind: ResourceKind, arn: &ResourceArn) -> Result<()> {
        match self.outcome {
            WaitOutcome::Succeeded(_) => Ok(()),
            WaitOutcome::Failed(Some(r)) => Err(failed_error(kind, arn, &r)),
            WaitOutcome::Failed(None) => Err(Error::Internal(format!(
                "deletion of {} {} failed without a status",
                kind, arn
            ))),
            WaitOutcome::TimedOut(_) => Err(timeout_error(kind, arn, self.elapsed)),
        }
    }
}

/// Fixed-interval lifecycle waiter.
#[derive(Debug, Clone)]
pub struct Waiter {
    policy: WaitPolicy,
}

impl Waiter {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Poll `probe` until its status lands in `sets.success` or `sets.failure`,
    /// or the budget runs out. Probe errors stop the wait and are returned as-is.
    pub async fn wait<R, E, F, Fut>(
        &self,
        sets: &StatusSets,
        probe: F,
    ) -> std::result::Result<WaitReport<R>, E>
    where
        R: StatusBearing,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
    {
        self.poll_until(probe, |r: &R| {
            let status = r.lifecycle_status();
            (sets.verdict(status), status.to_string())
        })
        .await
    }

    /// Poll a deletion. The probe yields `None` once the resource no longer
    /// exists, which is the success state; `sets.failure` still applies.
    pub async fn wait_until_gone<R, E, F, Fut>(
        &self,
        sets: &StatusSets,
        probe: F,
    ) -> std::result::Result<WaitReport<Option<R>>, E>
    where
        R: StatusBearing,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Option<R>, E>>,
    {
        self.poll_until(probe, |r: &Option<R>| match r {
            None => (Verdict::Succeeded, "GONE".to_string()),
            Some(r) => {
                let status = r.lifecycle_status();
                (sets.verdict(status), status.to_string())
            }
        })
        .await
    }

    async fn poll_until<T, E, F, Fut, C>(
        &self,
        mut probe: F,
        classify: C,
    ) -> std::result::Result<WaitReport<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        C: Fn(&T) -> (Verdict, String),
    {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            let observed = probe().await?;
            polls += 1;
            let elapsed = started.elapsed();
            let (verdict, status) = classify(&observed);

            match verdict {
                Verdict::Succeeded => {
                    info!("Reached {} after {} polls ({:?})", status, polls, elapsed);
                    return Ok(WaitReport {
                        outcome: WaitOutcome::Succeeded(observed),
                        polls,
                        elapsed,
                    });
                }
                Verdict::Failed => {
                    warn!("Reached {} after {} polls ({:?})", status, polls, elapsed);
                    return Ok(WaitReport {
                        outcome: WaitOutcome::Failed(observed),
                        polls,
                        elapsed,
                    });
                }
                Verdict::Pending => {}
            }

            let pause = match self.policy.max_wait {
                Some(max) if elapsed >= max => {
                    warn!("Still {} after {:?}, giving up", status, elapsed);
                    return Ok(WaitReport {
                        outcome: WaitOutcome::TimedOut(observed),
                        polls,
                        elapsed,
                    });
                }
                Some(max) => self.policy.interval.min(max - elapsed),
                None => self.policy.interval,
            };

            debug!("Status {} (poll {}), checking again in {:?}", status, polls, pause);
            tokio::time::sleep(pause).await;
        }
    }
}
