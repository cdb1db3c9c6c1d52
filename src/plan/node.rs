use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdviseError;
use crate::failure::{FailureKind, RepairAction};
use crate::rollback::{RollbackScope, RollbackStrategyMap};
use crate::tree::NodeId;

/// Immutable compiled description of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    pub uuid: NodeId,
    pub identifier: String,
    pub name: String,
    pub step_type: String,
    /// Policy advisers first, in resolved order, then at most one default adviser.
    pub adviser_obtainments: Vec<AdviserObtainment>,
    pub rollback_strategy: RollbackStrategyMap,
    #[serde(with = "crate::duration::text")]
    pub timeout: Duration,
    pub skip_condition: Option<String>,
    pub when_condition: WhenCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviserType {
    Ignore,
    Retry,
    OnMarkSuccess,
    OnAbort,
    OnFailRollback,
    ManualIntervention,
    NextStep,
    OnSuccess,
}

impl fmt::Display for AdviserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One compiled adviser: a type tag plus its parameters as canonical JSON.
///
/// Sets and maps inside the parameters are ordered, so compiling the same
/// tree always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviserObtainment {
    pub adviser_type: AdviserType,
    pub parameters: Vec<u8>,
}

impl AdviserObtainment {
    pub fn encode(parameters: &AdviserParameters) -> Result<Self, serde_json::Error> {
        let bytes = match parameters {
            AdviserParameters::Ignore(p) => serde_json::to_vec(p)?,
            AdviserParameters::Retry(p) => serde_json::to_vec(p)?,
            AdviserParameters::OnMarkSuccess(p) => serde_json::to_vec(p)?,
            AdviserParameters::OnAbort(p) => serde_json::to_vec(p)?,
            AdviserParameters::OnFailRollback(p) => serde_json::to_vec(p)?,
            AdviserParameters::ManualIntervention(p) => serde_json::to_vec(p)?,
            AdviserParameters::NextStep(p) => serde_json::to_vec(p)?,
            AdviserParameters::OnSuccess(p) => serde_json::to_vec(p)?,
        };
        Ok(Self {
            adviser_type: parameters.adviser_type(),
            parameters: bytes,
        })
    }

    pub fn decode(&self) -> Result<AdviserParameters, AdviseError> {
        let bytes = self.parameters.as_slice();
        let decoded = match self.adviser_type {
            AdviserType::Ignore => serde_json::from_slice(bytes).map(AdviserParameters::Ignore),
            AdviserType::Retry => serde_json::from_slice(bytes).map(AdviserParameters::Retry),
            AdviserType::OnMarkSuccess => {
                serde_json::from_slice(bytes).map(AdviserParameters::OnMarkSuccess)
            }
            AdviserType::OnAbort => serde_json::from_slice(bytes).map(AdviserParameters::OnAbort),
            AdviserType::OnFailRollback => {
                serde_json::from_slice(bytes).map(AdviserParameters::OnFailRollback)
            }
            AdviserType::ManualIntervention => {
                serde_json::from_slice(bytes).map(AdviserParameters::ManualIntervention)
            }
            AdviserType::NextStep => serde_json::from_slice(bytes).map(AdviserParameters::NextStep),
            AdviserType::OnSuccess => {
                serde_json::from_slice(bytes).map(AdviserParameters::OnSuccess)
            }
        };
        decoded.map_err(|source| AdviseError::MalformedParameters {
            adviser_type: self.adviser_type,
            source,
        })
    }
}

/// Typed adviser parameters, one variant per [`AdviserType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdviserParameters {
    Ignore(IgnoreParameters),
    Retry(RetryParameters),
    OnMarkSuccess(MarkSuccessParameters),
    OnAbort(AbortParameters),
    OnFailRollback(RollbackParameters),
    ManualIntervention(ManualInterventionParameters),
    NextStep(NextStepParameters),
    OnSuccess(OnSuccessParameters),
}

impl AdviserParameters {
    pub fn adviser_type(&self) -> AdviserType {
        match self {
            AdviserParameters::Ignore(_) => AdviserType::Ignore,
            AdviserParameters::Retry(_) => AdviserType::Retry,
            AdviserParameters::OnMarkSuccess(_) => AdviserType::OnMarkSuccess,
            AdviserParameters::OnAbort(_) => AdviserType::OnAbort,
            AdviserParameters::OnFailRollback(_) => AdviserType::OnFailRollback,
            AdviserParameters::ManualIntervention(_) => AdviserType::ManualIntervention,
            AdviserParameters::NextStep(_) => AdviserType::NextStep,
            AdviserParameters::OnSuccess(_) => AdviserType::OnSuccess,
        }
    }

    /// Failure kinds a policy adviser reacts to. `None` for the default
    /// continuation advisers, which react to anything.
    pub fn applicable_failure_types(&self) -> Option<&BTreeSet<FailureKind>> {
        match self {
            AdviserParameters::Ignore(p) => Some(&p.applicable_failure_types),
            AdviserParameters::Retry(p) => Some(&p.applicable_failure_types),
            AdviserParameters::OnMarkSuccess(p) => Some(&p.applicable_failure_types),
            AdviserParameters::OnAbort(p) => Some(&p.applicable_failure_types),
            AdviserParameters::OnFailRollback(p) => Some(&p.applicable_failure_types),
            AdviserParameters::ManualIntervention(p) => Some(&p.applicable_failure_types),
            AdviserParameters::NextStep(_) | AdviserParameters::OnSuccess(_) => None,
        }
    }

    /// Next node id carried by the adviser, if it targets a sibling.
    pub fn next_node_id(&self) -> Option<&NodeId> {
        match self {
            AdviserParameters::Ignore(p) => p.next_node_id.as_ref(),
            AdviserParameters::Retry(p) => p.next_node_id.as_ref(),
            AdviserParameters::OnMarkSuccess(p) => p.next_node_id.as_ref(),
            AdviserParameters::ManualIntervention(p) => p.next_node_id.as_ref(),
            AdviserParameters::NextStep(p) => Some(&p.next_node_id),
            AdviserParameters::OnSuccess(p) => Some(&p.next_node_id),
            AdviserParameters::OnAbort(_) | AdviserParameters::OnFailRollback(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreParameters {
    pub applicable_failure_types: BTreeSet<FailureKind>,
    pub next_node_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryParameters {
    pub applicable_failure_types: BTreeSet<FailureKind>,
    pub next_node_id: Option<NodeId>,
    pub retry_count: u32,
    #[serde(with = "crate::duration::text_seq")]
    pub wait_intervals: Vec<Duration>,
    pub interval_policy: IntervalPolicy,
    pub repair_action_after_retry: RepairAction,
    pub rollback_targets: RollbackStrategyMap,
}

impl RetryParameters {
    /// Wait before the retry that follows `retries_done` earlier retries.
    pub fn wait_for(&self, retries_done: u32) -> Duration {
        let index = usize::try_from(retries_done).unwrap_or(usize::MAX);
        match self.wait_intervals.get(index) {
            Some(interval) => *interval,
            None => match self.interval_policy {
                IntervalPolicy::RepeatLast => {
                    self.wait_intervals.last().copied().unwrap_or(Duration::ZERO)
                }
                IntervalPolicy::NoWait => Duration::ZERO,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSuccessParameters {
    pub applicable_failure_types: BTreeSet<FailureKind>,
    pub next_node_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortParameters {
    pub applicable_failure_types: BTreeSet<FailureKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackParameters {
    pub applicable_failure_types: BTreeSet<FailureKind>,
    pub strategy: RollbackScope,
    pub rollback_targets: RollbackStrategyMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualInterventionParameters {
    pub applicable_failure_types: BTreeSet<FailureKind>,
    #[serde(with = "crate::duration::text")]
    pub timeout: Duration,
    pub timeout_action: RepairAction,
    pub next_node_id: Option<NodeId>,
    pub rollback_targets: RollbackStrategyMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStepParameters {
    pub next_node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnSuccessParameters {
    pub next_node_id: NodeId,
}

/// What a retry waits once the configured intervals run out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    /// Reuse the last configured interval.
    #[default]
    RepeatLast,
    /// Retry immediately.
    NoWait,
}

impl FromStr for IntervalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repeat_last" => Ok(IntervalPolicy::RepeatLast),
            "no_wait" => Ok(IntervalPolicy::NoWait),
            other => Err(format!(
                "unknown interval policy `{other}` (expected repeat_last or no_wait)"
            )),
        }
    }
}

/// Stage outcome a step's run condition is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Success,
    Failure,
    All,
}

/// When a step runs: a stage-status gate plus an optional expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhenCondition {
    pub stage_status: StageStatus,
    #[serde(default)]
    pub condition: Option<String>,
}

impl WhenCondition {
    pub fn on_stage_success() -> Self {
        Self {
            stage_status: StageStatus::Success,
            condition: None,
        }
    }

    pub fn on_stage_failure() -> Self {
        Self {
            stage_status: StageStatus::Failure,
            condition: None,
        }
    }

    /// The run-condition expression handed to the engine.
    pub fn expression(&self) -> String {
        let gate = match self.stage_status {
            StageStatus::Success => Some("<+OnStageSuccess>"),
            StageStatus::Failure => Some("<+OnStageFailure>"),
            StageStatus::All => None,
        };
        match (gate, self.condition.as_deref().map(str::trim)) {
            (Some(gate), Some(condition)) if !condition.is_empty() => {
                format!("{gate} && ({condition})")
            }
            (None, Some(condition)) if !condition.is_empty() => condition.to_string(),
            (Some(gate), _) => gate.to_string(),
            (None, _) => "true".to_string(),
        }
    }
}
