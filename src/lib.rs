//! Failure-handling core of a pipeline engine.
//!
//! At plan time each step's failure strategies are merged with those of its
//! enclosing step group and stage ([`failure::merge`]) and compiled into an
//! ordered list of advisers on an immutable [`PlanNode`]
//! ([`compile_plan_node`], [`compile_plan`]). At run time [`advise`] picks the
//! adviser that applies to a terminated node and returns a [`Directive`].

pub mod config;
pub mod duration;
pub mod error;
pub mod failure;
pub mod plan;
pub mod planner;
pub mod rollback;
pub mod state_machine;
pub mod tree;

pub use config::AdvisersConfig;
pub use error::{AdviseError, AdvisersError, PolicyError, RollbackError, TreeError};
pub use plan::{PlanNode, compile_plan_node};
pub use planner::{Plan, compile_plan};
pub use state_machine::{Advice, Directive, NodeExecution, NodeExecutionState, advise};
pub use tree::{NodeId, PipelineDefinition, PipelineTree};
