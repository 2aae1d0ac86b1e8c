//! Fallback chains expressed as data.
//!
//! Each counter operation gets an ordered [`FallbackPlan`] of [`Step`]s. The
//! plan is a pure function of the operation and the increment policy; running
//! it walks the steps with an executor supplied by the adapter and records
//! which step served the value and why the earlier ones failed.

use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::warn;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    RemoteAtomicIncrement,
    RemoteReadThenUpsert,
    RemoteRead,
    RemoteUpsert,
    LocalStore,
}

impl Step {
    pub fn is_remote(self) -> bool {
        !matches!(self, Step::LocalStore)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::RemoteAtomicIncrement => "remote atomic increment",
            Step::RemoteReadThenUpsert => "remote read-then-upsert",
            Step::RemoteRead => "remote read",
            Step::RemoteUpsert => "remote upsert",
            Step::LocalStore => "local store",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Increment,
}

/// What the remote side is known to support for view increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementPolicy {
    pub atomic_available: bool,
    pub allow_racy: bool,
}

impl Default for IncrementPolicy {
    fn default() -> Self {
        Self {
            atomic_available: true,
            allow_racy: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailReason {
    /// The remote could not be reached at all; later remote steps are skipped.
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("operation not available")]
    Unavailable,
    #[error("bad response: {0}")]
    Decode(String),
    #[error("step not supported by this adapter")]
    Unsupported,
}

impl FailReason {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FailReason::Unreachable(_))
    }
}

impl From<RemoteError> for FailReason {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Transport(e) => FailReason::Unreachable(e.to_string()),
            RemoteError::Status { status, .. } => FailReason::Status(status),
            RemoteError::RpcUnavailable => FailReason::Unavailable,
            RemoteError::Decode(msg) => FailReason::Decode(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Success(T),
    Fail(FailReason),
}

impl<T, E: Into<FailReason>> From<Result<T, E>> for StepOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StepOutcome::Success(value),
            Err(e) => StepOutcome::Fail(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: Step,
    pub reason: FailReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    pub value: Option<T>,
    pub served_by: Option<Step>,
    pub failures: Vec<StepFailure>,
    pub skipped: Vec<Step>,
}

impl<T> Resolution<T> {
    pub fn fell_back(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl<T: Default> Resolution<T> {
    pub fn into_value(self) -> T {
        self.value.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPlan {
    steps: Vec<Step>,
}

impl FallbackPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn for_operation(operation: Operation, policy: IncrementPolicy) -> Self {
        let steps = match operation {
            Operation::Read => vec![Step::RemoteRead, Step::LocalStore],
            Operation::Write => vec![Step::RemoteUpsert, Step::LocalStore],
            Operation::Increment => {
                let mut steps = Vec::with_capacity(3);
                if policy.atomic_available {
                    steps.push(Step::RemoteAtomicIncrement);
                }
                if policy.allow_racy {
                    steps.push(Step::RemoteReadThenUpsert);
                }
                steps.push(Step::LocalStore);
                steps
            }
        };
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the steps in order until one succeeds.
    ///
    /// Once a step reports the remote as unreachable, the remaining remote
    /// steps are skipped and recorded in [`Resolution::skipped`].
    pub async fn run<T, F, Fut>(&self, mut exec: F) -> Resolution<T>
    where
        F: FnMut(Step) -> Fut,
        Fut: Future<Output = StepOutcome<T>>,
    {
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        let mut remote_down = false;

        for &step in &self.steps {
            if remote_down && step.is_remote() {
                skipped.push(step);
                continue;
            }

            match exec(step).await {
                StepOutcome::Success(value) => {
                    return Resolution {
                        value: Some(value),
                        served_by: Some(step),
                        failures,
                        skipped,
                    };
                }
                StepOutcome::Fail(reason) => {
                    warn!("Step '{}' failed: {}", step, reason);
                    remote_down |= reason.is_unreachable();
                    failures.push(StepFailure { step, reason });
                }
            }
        }

        Resolution {
            value: None,
            served_by: None,
            failures,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn scripted(outcomes: Vec<(Step, StepOutcome<u64>)>) -> HashMap<Step, StepOutcome<u64>> {
        outcomes.into_iter().collect()
    }

    #[test]
    fn increment_plan_follows_policy() {
        let full = FallbackPlan::for_operation(Operation::Increment, IncrementPolicy::default());
        assert_eq!(
            full.steps(),
            &[Step::RemoteAtomicIncrement, Step::RemoteReadThenUpsert, Step::LocalStore]
        );

        let strict = FallbackPlan::for_operation(
            Operation::Increment,
            IncrementPolicy { atomic_available: true, allow_racy: false },
        );
        assert_eq!(strict.steps(), &[Step::RemoteAtomicIncrement, Step::LocalStore]);

        let no_rpc = FallbackPlan::for_operation(
            Operation::Increment,
            IncrementPolicy { atomic_available: false, allow_racy: true },
        );
        assert_eq!(no_rpc.steps(), &[Step::RemoteReadThenUpsert, Step::LocalStore]);
    }

    #[test]
    fn read_and_write_plans_end_locally() {
        let read = FallbackPlan::for_operation(Operation::Read, IncrementPolicy::default());
        let write = FallbackPlan::for_operation(Operation::Write, IncrementPolicy::default());
        assert_eq!(read.steps().last(), Some(&Step::LocalStore));
        assert_eq!(write.steps(), &[Step::RemoteUpsert, Step::LocalStore]);
    }

    #[tokio::test]
    async fn first_success_wins() {
        let plan = FallbackPlan::for_operation(Operation::Increment, IncrementPolicy::default());
        let outcomes = scripted(vec![
            (Step::RemoteAtomicIncrement, StepOutcome::Success(7)),
            (Step::LocalStore, StepOutcome::Success(1)),
        ]);

        let resolution = plan.run(|step| {
            let outcome = outcomes[&step].clone();
            async move { outcome }
        })
        .await;

        assert_eq!(resolution.value, Some(7));
        assert_eq!(resolution.served_by, Some(Step::RemoteAtomicIncrement));
        assert!(!resolution.fell_back());
    }

    #[tokio::test]
    async fn missing_rpc_falls_to_read_then_upsert() {
        let plan = FallbackPlan::for_operation(Operation::Increment, IncrementPolicy::default());
        let outcomes = scripted(vec![
            (Step::RemoteAtomicIncrement, StepOutcome::Fail(FailReason::Unavailable)),
            (Step::RemoteReadThenUpsert, StepOutcome::Success(4)),
            (Step::LocalStore, StepOutcome::Success(1)),
        ]);

        let resolution = plan.run(|step| {
            let outcome = outcomes[&step].clone();
            async move { outcome }
        })
        .await;

        assert_eq!(resolution.served_by, Some(Step::RemoteReadThenUpsert));
        assert_eq!(
            resolution.failures,
            vec![StepFailure { step: Step::RemoteAtomicIncrement, reason: FailReason::Unavailable }]
        );
    }

    #[tokio::test]
    async fn unreachable_remote_skips_to_local() {
        let plan = FallbackPlan::for_operation(Operation::Increment, IncrementPolicy::default());
        let mut executed = Vec::new();

        let resolution = plan
            .run(|step| {
                executed.push(step);
                async move {
                    match step {
                        Step::LocalStore => StepOutcome::Success(3),
                        _ => {
                            StepOutcome::Fail(FailReason::Unreachable("connection refused".into()))
                        }
                    }
                }
            })
            .await;

        assert_eq!(executed, vec![Step::RemoteAtomicIncrement, Step::LocalStore]);
        assert_eq!(resolution.skipped, vec![Step::RemoteReadThenUpsert]);
        assert_eq!(resolution.into_value(), 3);
    }

    #[tokio::test]
    async fn exhausted_plan_yields_default() {
        let plan = FallbackPlan::new(vec![Step::RemoteRead]);
        let resolution: Resolution<u64> = plan
            .run(|_| async { StepOutcome::Fail(FailReason::Status(500)) })
            .await;

        assert_eq!(resolution.served_by, None);
        assert_eq!(resolution.into_value(), 0);
    }
}
