//! Compiled plan nodes and the compiler that produces them.

mod compiler;
mod node;

pub use compiler::{AdviserCompiler, compile_plan_node};
pub use node::{
    AbortParameters, AdviserObtainment, AdviserParameters, AdviserType, IgnoreParameters,
    IntervalPolicy, ManualInterventionParameters, MarkSuccessParameters, NextStepParameters,
    OnSuccessParameters, PlanNode, RetryParameters, RollbackParameters, StageStatus,
    WhenCondition,
};
