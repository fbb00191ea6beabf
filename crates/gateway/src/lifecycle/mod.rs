//! Instance Lifecycle Tracker
//!
//! Drives a start or stop mutation through provider-operation completion and,
//! depending on the configured wait mode, through observed instance-state
//! convergence. Every call is independent; the tracker keeps no state between
//! invocations.

pub mod poll;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    compute::{InstanceRef, InstanceStatus, OperationHandle, OperationStatus, ResourceClient},
    config::{LifecycleConfig, WaitMode},
    metrics, Error, Result,
};
use poll::{poll_until, PollOutcome, PollPolicy};

pub const PROVISIONAL_NOTE: &str = "operation accepted; instance may still be converging";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Submitted,
    PollingOperation,
    OperationFailed,
    OperationDone,
    OperationPending,
    PollingResourceState,
    TargetReached,
    PollBudgetExhausted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Submitted => write!(f, "SUBMITTED"),
            LifecycleState::PollingOperation => write!(f, "POLLING_OPERATION"),
            LifecycleState::OperationFailed => write!(f, "OPERATION_FAILED"),
            LifecycleState::OperationDone => write!(f, "OPERATION_DONE"),
            LifecycleState::OperationPending => write!(f, "OPERATION_PENDING"),
            LifecycleState::PollingResourceState => write!(f, "POLLING_RESOURCE_STATE"),
            LifecycleState::TargetReached => write!(f, "TARGET_REACHED"),
            LifecycleState::PollBudgetExhausted => write!(f, "POLL_BUDGET_EXHAUSTED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Start,
    Stop,
}

impl Mutation {
    pub fn target_status(&self) -> InstanceStatus {
        match self {
            Mutation::Start => InstanceStatus::Running,
            Mutation::Stop => InstanceStatus::Terminated,
        }
    }

    /// Status reported while the instance has not been observed yet.
    pub fn transitional_status(&self) -> InstanceStatus {
        match self {
            Mutation::Start => InstanceStatus::Staging,
            Mutation::Stop => InstanceStatus::Stopping,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Mutation::Start => "Start",
            Mutation::Stop => "Stop",
        }
    }
}

/// Payload returned to callers for start/stop tool calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    pub state: LifecycleState,
    pub status: InstanceStatus,
    pub operation: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub provisional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_status: Option<OperationStatus>,
}

#[derive(Clone)]
pub struct LifecycleTracker {
    client: Arc<dyn ResourceClient>,
    config: LifecycleConfig,
}

impl LifecycleTracker {
    pub fn new(client: Arc<dyn ResourceClient>, config: LifecycleConfig) -> Self {
        Self { client, config }
    }

    pub fn wait_mode(&self, mutation: Mutation) -> WaitMode {
        match mutation {
            Mutation::Start => self.config.start_wait,
            Mutation::Stop => self.config.stop_wait,
        }
    }

    /// Submits `mutation` for `instance.name` and drives it to a terminal state.
    ///
    /// A provider-reported operation error aborts with
    /// [`Error::OperationFailed`]. Running out of poll budget is not an error:
    /// the result is marked provisional instead.
    pub async fn drive(
        &self,
        mutation: Mutation,
        instance: &InstanceRef,
    ) -> Result<MutationResult> {
        let name = instance
            .name
            .as_deref()
            .ok_or_else(|| Error::InvalidParams("instance name is required".to_string()))?;
        let (project, zone) = (instance.project.as_str(), instance.zone.as_str());

        let mut handle = match mutation {
            Mutation::Start => self.client.start_instance(project, zone, name).await?,
            Mutation::Stop => self.client.stop_instance(project, zone, name).await?,
        };
        info!(
            "{} submitted for {} (operation {}, {})",
            mutation.verb(),
            instance,
            handle.id,
            handle.status
        );

        let wait = self.wait_mode(mutation);
        if wait == WaitMode::Submit {
            return Ok(MutationResult {
                state: LifecycleState::Submitted,
                status: mutation.transitional_status(),
                message: format!("{} request sent for VM '{}'", mutation.verb(), name),
                operation: handle.id,
                provisional: false,
                operation_status: None,
            });
        }

        if let Some(exhausted) = self.await_operation(mutation, instance, &mut handle).await? {
            return Ok(exhausted);
        }

        if wait == WaitMode::Operation {
            return Ok(MutationResult {
                state: LifecycleState::OperationDone,
                status: mutation.transitional_status(),
                message: format!("{} operation completed for VM '{}'", mutation.verb(), name),
                operation: handle.id,
                provisional: false,
                operation_status: None,
            });
        }

        self.await_target(mutation, instance, name, handle).await
    }

    /// Polls the operation until DONE. Returns `Some` with a provisional
    /// result when the budget runs out first.
    async fn await_operation(
        &self,
        mutation: Mutation,
        instance: &InstanceRef,
        handle: &mut OperationHandle,
    ) -> Result<Option<MutationResult>> {
        debug!("{} for {}: {}", handle.id, instance, LifecycleState::PollingOperation);
        let policy = PollPolicy::new(
            self.config.operation_poll_interval,
            self.config.operation_poll_max_attempts,
        );
        let operation = handle.id.clone();

        let outcome = poll_until(
            &policy,
            |attempt| {
                let client = self.client.clone();
                let (project, zone, id) =
                    (instance.project.clone(), instance.zone.clone(), operation.clone());
                async move {
                    metrics::POLL_ATTEMPTS_TOTAL
                        .with_label_values(&["operation"])
                        .inc();
                    debug!("Polling operation {} (attempt {})", id, attempt);
                    client.get_operation(&project, &zone, &id).await
                }
            },
            |snapshot| snapshot.status.is_done(),
            |snapshot| {
                let error = snapshot.error.as_ref().filter(|_| snapshot.status.is_done())?;
                Some(Error::OperationFailed {
                    operation: operation.clone(),
                    message: error.message.clone(),
                })
            },
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "{} {} for {}: {}",
                    handle.id,
                    LifecycleState::OperationFailed,
                    instance,
                    e
                );
                return Err(e.after_submit(&handle.id));
            }
        };
        let attempts = outcome.attempts();

        match outcome {
            PollOutcome::Settled { value, .. } => {
                handle.observe(&value);
                info!("Operation {} done after {} poll(s)", handle.id, attempts);
                Ok(None)
            }
            PollOutcome::Exhausted { last, .. } => {
                handle.observe(&last);
                warn!(
                    "Operation {} still {} after {} poll(s); answering provisionally",
                    handle.id, handle.status, attempts
                );
                Ok(Some(MutationResult {
                    state: LifecycleState::OperationPending,
                    status: mutation.transitional_status(),
                    operation: handle.id.clone(),
                    message: PROVISIONAL_NOTE.to_string(),
                    provisional: true,
                    operation_status: Some(handle.status),
                }))
            }
        }
    }

    async fn await_target(
        &self,
        mutation: Mutation,
        instance: &InstanceRef,
        name: &str,
        handle: OperationHandle,
    ) -> Result<MutationResult> {
        let target = mutation.target_status();
        debug!(
            "{} for {}: {} (target {})",
            handle.id,
            instance,
            LifecycleState::PollingResourceState,
            target
        );
        let policy = PollPolicy::new(
            self.config.instance_poll_interval,
            self.config.instance_poll_max_attempts,
        );

        let outcome = poll_until(
            &policy,
            |attempt| {
                let client = self.client.clone();
                let (project, zone, name) =
                    (instance.project.clone(), instance.zone.clone(), name.to_string());
                async move {
                    metrics::POLL_ATTEMPTS_TOTAL
                        .with_label_values(&["instance"])
                        .inc();
                    debug!("Polling instance {} (attempt {})", name, attempt);
                    client.get_instance(&project, &zone, &name).await
                }
            },
            |status| *status == target,
            |_| None,
        )
        .await
        .map_err(|e| {
            warn!("Lost track of {} after operation {}: {}", instance, handle.id, e);
            e.after_submit(&handle.id)
        })?;
        let attempts = outcome.attempts();

        Ok(match outcome {
            PollOutcome::Settled { value, .. } => {
                info!("{} reached {} after {} poll(s)", instance, value, attempts);
                MutationResult {
                    state: LifecycleState::TargetReached,
                    status: value,
                    operation: handle.id,
                    message: format!("Instance '{}' is {}", name, value),
                    provisional: false,
                    operation_status: None,
                }
            }
            PollOutcome::Exhausted { last, .. } => {
                warn!(
                    "{} still {} after {} poll(s), wanted {}",
                    instance, last, attempts, target
                );
                MutationResult {
                    state: LifecycleState::PollBudgetExhausted,
                    status: last,
                    operation: handle.id,
                    message: PROVISIONAL_NOTE.to_string(),
                    provisional: true,
                    operation_status: None,
                }
            }
        })
    }
}
