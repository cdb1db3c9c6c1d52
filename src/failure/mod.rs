mod kind;
mod merge;
mod policy;

pub use kind::{FailureCategory, FailureKind};
pub use merge::{ResolvedPolicy, merge};
pub use policy::{
    FailureAction, FailurePolicy, ManualInterventionSpec, PolicyEntry, PolicyLevel, RepairAction,
    RetrySpec,
};
