//! Runtime side: execution state read from the engine and the dispatcher
//! that turns it into a directive.

mod dispatcher;
mod execution;

pub use dispatcher::{Advice, AdviserDispatcher, Directive, advise};
pub use execution::{ExecutionStatus, FailureInfo, NodeExecution, NodeExecutionState};
