use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::kind::FailureCategory;
use crate::rollback::RollbackScope;

/// What to do when a step fails with one of the categories of a [`PolicyEntry`].
///
/// `Retry` and `ManualIntervention` carry a fallback action. The fallback is
/// itself a `FailureAction` in the pipeline definition, but it must not be
/// `Retry` or `ManualIntervention`; the compiler rejects that and lowers valid
/// fallbacks to a [`RepairAction`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec")]
pub enum FailureAction {
    Ignore,
    Retry(RetrySpec),
    MarkAsSuccess,
    Abort,
    StageRollback,
    StepGroupRollback,
    ManualIntervention(ManualInterventionSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySpec {
    pub retry_count: u32,
    #[serde(with = "crate::duration::text_seq")]
    pub retry_intervals: Vec<Duration>,
    pub on_retry_failure: Box<FailureAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualInterventionSpec {
    #[serde(with = "crate::duration::text")]
    pub timeout: Duration,
    pub on_timeout: Box<FailureAction>,
}

impl FailureAction {
    pub fn retry(retry_count: u32, retry_intervals: Vec<Duration>, on_retry_failure: FailureAction) -> Self {
        FailureAction::Retry(RetrySpec {
            retry_count,
            retry_intervals,
            on_retry_failure: Box::new(on_retry_failure),
        })
    }

    pub fn manual_intervention(timeout: Duration, on_timeout: FailureAction) -> Self {
        FailureAction::ManualIntervention(ManualInterventionSpec {
            timeout,
            on_timeout: Box::new(on_timeout),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailureAction::Ignore => "Ignore",
            FailureAction::Retry(_) => "Retry",
            FailureAction::MarkAsSuccess => "MarkAsSuccess",
            FailureAction::Abort => "Abort",
            FailureAction::StageRollback => "StageRollback",
            FailureAction::StepGroupRollback => "StepGroupRollback",
            FailureAction::ManualIntervention(_) => "ManualIntervention",
        }
    }

    /// Lowers the action to a repair action code. `None` for the two
    /// actions that carry their own fallback.
    pub fn repair_action(&self) -> Option<RepairAction> {
        match self {
            FailureAction::Ignore => Some(RepairAction::Ignore),
            FailureAction::MarkAsSuccess => Some(RepairAction::MarkAsSuccess),
            FailureAction::Abort => Some(RepairAction::EndExecution),
            FailureAction::StageRollback => Some(RepairAction::StageRollback),
            FailureAction::StepGroupRollback => Some(RepairAction::StepGroupRollback),
            FailureAction::Retry(_) | FailureAction::ManualIntervention(_) => None,
        }
    }
}

impl fmt::Display for FailureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-recursive action a compiled Retry or ManualIntervention adviser falls
/// back to once retries are exhausted or the intervention times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairAction {
    Ignore,
    MarkAsSuccess,
    EndExecution,
    StageRollback,
    StepGroupRollback,
}

impl RepairAction {
    pub fn rollback_scope(self) -> Option<RollbackScope> {
        match self {
            RepairAction::StageRollback => Some(RollbackScope::Stage),
            RepairAction::StepGroupRollback => Some(RollbackScope::StepGroup),
            RepairAction::Ignore | RepairAction::MarkAsSuccess | RepairAction::EndExecution => None,
        }
    }
}

/// One `{errors, action}` entry of a failure policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub errors: Vec<FailureCategory>,
    pub action: FailureAction,
}

impl PolicyEntry {
    pub fn new(errors: impl IntoIterator<Item = FailureCategory>, action: FailureAction) -> Self {
        Self {
            errors: errors.into_iter().collect(),
            action,
        }
    }

    fn is_catch_all_only(&self) -> bool {
        matches!(self.errors.as_slice(), [category] if category.is_catch_all())
    }
}

/// Ordered failure strategies declared at one nesting level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailurePolicy {
    entries: Vec<PolicyEntry>,
}

impl FailurePolicy {
    pub const EMPTY: FailurePolicy = FailurePolicy {
        entries: Vec::new(),
    };

    pub fn new(entries: Vec<PolicyEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether some entry names `AnyOther` and nothing else.
    pub fn has_catch_all_only_entry(&self) -> bool {
        self.entries.iter().any(PolicyEntry::is_catch_all_only)
    }
}

impl FromIterator<PolicyEntry> for FailurePolicy {
    fn from_iter<I: IntoIterator<Item = PolicyEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The nesting level a policy was declared at. Later levels in
/// [`PolicyLevel::PRECEDENCE`] override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyLevel {
    Stage,
    StepGroup,
    Step,
}

impl PolicyLevel {
    pub const PRECEDENCE: [PolicyLevel; 3] = [PolicyLevel::Stage, PolicyLevel::StepGroup, PolicyLevel::Step];
}

impl fmt::Display for PolicyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyLevel::Stage => write!(f, "stage"),
            PolicyLevel::StepGroup => write!(f, "step group"),
            PolicyLevel::Step => write!(f, "step"),
        }
    }
}
