//! Whole-pipeline compilation: one [`PlanNode`] per step.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::AdvisersConfig;
use crate::error::PolicyError;
use crate::plan::{AdviserCompiler, PlanNode};
use crate::tree::{NodeId, PipelineTree};

/// Every compiled step of a pipeline, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    nodes: BTreeMap<NodeId, PlanNode>,
    /// Node ids in document order.
    order: Vec<NodeId>,
}

impl Plan {
    pub fn get(&self, id: &NodeId) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    /// First step (in document order) with the given identifier.
    pub fn find_by_identifier(&self, identifier: &str) -> Option<&PlanNode> {
        self.iter().find(|node| node.identifier == identifier)
    }

    /// Plan nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = &PlanNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, node: PlanNode) {
        self.order.push(node.uuid.clone());
        self.nodes.insert(node.uuid.clone(), node);
    }
}

/// Compiles every step of `tree`. Stops at the first configuration error.
pub fn compile_plan(tree: &PipelineTree, config: &AdvisersConfig) -> Result<Plan, PolicyError> {
    check_stage_catch_all(tree, config)?;

    let compiler = AdviserCompiler::new(tree, config);
    let mut plan = Plan::default();
    let mut advisers = 0;
    for step in tree.steps() {
        let node = compiler.compile(step)?;
        advisers += node.adviser_obtainments.len();
        plan.insert(node);
    }

    info!(steps = plan.len(), advisers, "compiled plan");
    Ok(plan)
}

fn check_stage_catch_all(tree: &PipelineTree, config: &AdvisersConfig) -> Result<(), PolicyError> {
    for stage in tree.stages() {
        let node = tree.node(stage);
        if node.policy.is_empty() || node.policy.has_catch_all_only_entry() {
            continue;
        }
        let stage_name = node.identifier.clone().unwrap_or_else(|| node.id.to_string());
        if config.require_stage_catch_all {
            return Err(PolicyError::MissingStageCatchAll { stage: stage_name });
        }
        warn!(
            stage = %stage_name,
            "stage failure strategies have no AnyOther entry; unmatched failures fall back to the engine"
        );
    }
    Ok(())
}
