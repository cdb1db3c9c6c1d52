use thiserror::Error;

use crate::failure::{FailureCategory, PolicyLevel};
use crate::plan::AdviserType;
use crate::tree::NodeId;

/// Top-level error for the `advisers` binary and file loading.
#[derive(Debug, Error)]
pub enum AdvisersError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Advise(#[from] AdviseError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration errors found while compiling a plan. These are reported to
/// the pipeline author; none of them is deferred to runtime.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("ambiguous {level} failure strategy: {category} is mapped to both {first} and {second}")]
    AmbiguousCategory {
        level: PolicyLevel,
        category: FailureCategory,
        first: &'static str,
        second: &'static str,
    },

    #[error("{level} failure strategy has an entry without error categories")]
    EmptyCategories { level: PolicyLevel },

    #[error("step `{step}`: retry count must be greater than zero")]
    InvalidRetryCount { step: String },

    #[error("step `{step}`: retry intervals must not be empty")]
    EmptyRetryIntervals { step: String },

    #[error("step `{step}`: {action} cannot fall back to {fallback}")]
    NestedFallback {
        step: String,
        action: &'static str,
        fallback: &'static str,
    },

    #[error("step `{step}` is inside a rollback section and cannot use {action} as a failure strategy")]
    RollbackInsideRollback { step: String, action: &'static str },

    #[error("step `{step}`: {source}")]
    Rollback { step: String, source: RollbackError },

    #[error("stage `{stage}` must have a failure strategy whose only error is AnyOther")]
    MissingStageCatchAll { stage: String },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node {0} is not a step")]
    NotAStep(NodeId),

    #[error("failed to encode adviser parameters: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Rollback target resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    #[error("no enclosing stage to roll back")]
    NoEnclosingStage,

    #[error("no enclosing step group to roll back")]
    NoEnclosingStepGroup,

    #[error("step group `{0}` has no rollback steps")]
    MissingRollbackSteps(String),
}

/// Contract violations hit while dispatching compiled advisers. These mean
/// the plan node was not produced by the compiler, or the compiler has a bug.
#[derive(Debug, Error)]
pub enum AdviseError {
    #[error("malformed {adviser_type} adviser parameters: {source}")]
    MalformedParameters {
        adviser_type: AdviserType,
        source: serde_json::Error,
    },

    #[error("{adviser_type} adviser has no rollback target for {action}")]
    MissingRollbackTarget {
        adviser_type: AdviserType,
        action: &'static str,
    },
}

/// Structural errors while materializing a pipeline tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),
}
