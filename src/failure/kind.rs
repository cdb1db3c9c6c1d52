use std::fmt;

use serde::{Deserialize, Serialize};

/// Low-level cause of a step failure, as reported by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authentication,
    Authorization,
    Connectivity,
    Timeout,
    DelegateProvisioning,
    Verification,
    PolicyEvaluation,
    InputTimeout,
    Application,
    Unknown,
}

impl FailureKind {
    pub const ALL: [FailureKind; 10] = [
        FailureKind::Authentication,
        FailureKind::Authorization,
        FailureKind::Connectivity,
        FailureKind::Timeout,
        FailureKind::DelegateProvisioning,
        FailureKind::Verification,
        FailureKind::PolicyEvaluation,
        FailureKind::InputTimeout,
        FailureKind::Application,
        FailureKind::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::Authentication => "authentication",
            FailureKind::Authorization => "authorization",
            FailureKind::Connectivity => "connectivity",
            FailureKind::Timeout => "timeout",
            FailureKind::DelegateProvisioning => "delegate_provisioning",
            FailureKind::Verification => "verification",
            FailureKind::PolicyEvaluation => "policy_evaluation",
            FailureKind::InputTimeout => "input_timeout",
            FailureKind::Application => "application",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing grouping of failure kinds, as written in a policy's `errors` list.
///
/// Every category except [`FailureCategory::AnyOther`] expands to a fixed,
/// non-empty set of kinds, and no two named categories share a kind.
/// `AnyOther` is the catch-all: it has no static expansion and receives
/// whatever the other categories of a merged policy leave unclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    Authentication,
    Authorization,
    Connectivity,
    Timeout,
    DelegateProvisioning,
    Verification,
    PolicyEvaluation,
    InputTimeout,
    Unknown,
    AnyOther,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 10] = [
        FailureCategory::Authentication,
        FailureCategory::Authorization,
        FailureCategory::Connectivity,
        FailureCategory::Timeout,
        FailureCategory::DelegateProvisioning,
        FailureCategory::Verification,
        FailureCategory::PolicyEvaluation,
        FailureCategory::InputTimeout,
        FailureCategory::Unknown,
        FailureCategory::AnyOther,
    ];

    pub const fn is_catch_all(self) -> bool {
        matches!(self, FailureCategory::AnyOther)
    }

    /// Static expansion of the category. Empty for the catch-all.
    pub const fn kinds(self) -> &'static [FailureKind] {
        match self {
            FailureCategory::Authentication => &[FailureKind::Authentication],
            FailureCategory::Authorization => &[FailureKind::Authorization],
            FailureCategory::Connectivity => &[FailureKind::Connectivity],
            FailureCategory::Timeout => &[FailureKind::Timeout],
            FailureCategory::DelegateProvisioning => &[FailureKind::DelegateProvisioning],
            FailureCategory::Verification => &[FailureKind::Verification],
            FailureCategory::PolicyEvaluation => &[FailureKind::PolicyEvaluation],
            FailureCategory::InputTimeout => &[FailureKind::InputTimeout],
            FailureCategory::Unknown => &[FailureKind::Unknown],
            FailureCategory::AnyOther => &[],
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
