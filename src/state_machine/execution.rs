use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::failure::FailureKind;

/// Lifecycle status of one node execution, as tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Errored,
    Expired,
    Aborted,
    ApprovalRejected,
    Skipped,
    InterventionWaiting,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::Errored
                | ExecutionStatus::Expired
                | ExecutionStatus::Aborted
                | ExecutionStatus::ApprovalRejected
                | ExecutionStatus::Skipped
        )
    }

    /// Terminal statuses that failure strategies react to.
    pub fn is_broken(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Failed
                | ExecutionStatus::Errored
                | ExecutionStatus::Expired
                | ExecutionStatus::ApprovalRejected
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Queued => write!(f, "QUEUED"),
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::Errored => write!(f, "ERRORED"),
            ExecutionStatus::Expired => write!(f, "EXPIRED"),
            ExecutionStatus::Aborted => write!(f, "ABORTED"),
            ExecutionStatus::ApprovalRejected => write!(f, "APPROVAL_REJECTED"),
            ExecutionStatus::Skipped => write!(f, "SKIPPED"),
            ExecutionStatus::InterventionWaiting => write!(f, "INTERVENTION_WAITING"),
        }
    }
}

/// Why a node failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub kinds: BTreeSet<FailureKind>,
    #[serde(default)]
    pub message: String,
}

impl FailureInfo {
    pub fn new(kinds: impl IntoIterator<Item = FailureKind>, message: impl Into<String>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            message: message.into(),
        }
    }
}

/// Read access to the execution state the dispatcher decides on. The engine
/// owns the state; this crate never mutates it.
pub trait NodeExecution {
    fn status(&self) -> ExecutionStatus;

    fn failure_info(&self) -> Option<&FailureInfo>;

    /// Retries already performed for this node.
    fn retry_attempt(&self) -> u32;

    fn failure_kinds(&self) -> BTreeSet<FailureKind> {
        self.failure_info()
            .map(|info| info.kinds.clone())
            .unwrap_or_default()
    }
}

/// Plain execution state, for engines without their own record type and
/// for tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionState {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    #[serde(default)]
    pub retry_attempt: u32,
}

impl NodeExecutionState {
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            failure_info: None,
            retry_attempt: 0,
        }
    }

    /// A `Failed` execution with the given failure kinds.
    pub fn failed(kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        Self::new(ExecutionStatus::Failed).with_failure(FailureInfo::new(kinds, ""))
    }

    pub fn with_failure(mut self, failure_info: FailureInfo) -> Self {
        self.failure_info = Some(failure_info);
        self
    }

    pub fn with_retry_attempt(mut self, retry_attempt: u32) -> Self {
        self.retry_attempt = retry_attempt;
        self
    }
}

impl NodeExecution for NodeExecutionState {
    fn status(&self) -> ExecutionStatus {
        self.status
    }

    fn failure_info(&self) -> Option<&FailureInfo> {
        self.failure_info.as_ref()
    }

    fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }
}
