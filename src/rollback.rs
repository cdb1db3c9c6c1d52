//! Locates the rollback-steps entry a failing step should hand control to.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RollbackError;
use crate::tree::{NodeId, NodeIndex, NodeKind, PipelineTree};

/// Suffix appended to a stage's node id to form the id of its combined
/// rollback section.
pub const COMBINED_ROLLBACK_ID_SUFFIX: &str = "_combinedRollback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackScope {
    Stage,
    StepGroup,
}

impl fmt::Display for RollbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackScope::Stage => write!(f, "stage"),
            RollbackScope::StepGroup => write!(f, "step group"),
        }
    }
}

/// Rollback targets reachable from one step, keyed by scope.
pub type RollbackStrategyMap = BTreeMap<RollbackScope, NodeId>;

/// Resolves the rollback entry node for `scope`, walking up from `node`.
///
/// The stage target is derived from the stage id rather than looked up, since
/// the combined rollback section is synthesized by the plan for every stage.
pub fn resolve_rollback_target(
    tree: &PipelineTree,
    node: NodeIndex,
    scope: RollbackScope,
    stage_suffix: &str,
) -> Result<NodeId, RollbackError> {
    match scope {
        RollbackScope::Stage => tree
            .nearest_ancestor_of_kind(node, NodeKind::Stage)
            .map(|stage| tree.node(stage).id.with_suffix(stage_suffix))
            .ok_or(RollbackError::NoEnclosingStage),
        RollbackScope::StepGroup => {
            let group = tree
                .nearest_ancestor_of_kind(node, NodeKind::StepGroup)
                .ok_or(RollbackError::NoEnclosingStepGroup)?;
            tree.child_of_kind(group, NodeKind::RollbackSteps)
                .map(|rollback| tree.node(rollback).id.clone())
                .ok_or_else(|| {
                    RollbackError::MissingRollbackSteps(
                        tree.node(group).identifier.clone().unwrap_or_default(),
                    )
                })
        }
    }
}

/// Every rollback target that resolves for `node`. Scopes without an
/// enclosing node are left out.
pub fn rollback_strategy_map(
    tree: &PipelineTree,
    node: NodeIndex,
    stage_suffix: &str,
) -> RollbackStrategyMap {
    [RollbackScope::Stage, RollbackScope::StepGroup]
        .into_iter()
        .filter_map(|scope| {
            resolve_rollback_target(tree, node, scope, stage_suffix)
                .ok()
                .map(|target| (scope, target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailurePolicy;
    use crate::tree::{
        ExecutionDefinition, ExecutionElement, PipelineDefinition, StageDefinition, StepConfig,
        StepGroupDefinition,
    };

    fn step(id: &str) -> ExecutionElement {
        ExecutionElement::Step(StepConfig::new(id, "ShellScript").with_uuid(id))
    }

    fn group(id: &str, rollback: Option<Vec<ExecutionElement>>) -> ExecutionElement {
        ExecutionElement::StepGroup(StepGroupDefinition {
            identifier: id.into(),
            uuid: Some(id.into()),
            failure_strategies: FailurePolicy::default(),
            execution: ExecutionDefinition {
                steps: vec![step(&format!("{id}-step"))],
                rollback_steps_uuid: Some(format!("{id}-rollback").as_str().into()),
                rollback_steps: rollback,
                ..Default::default()
            },
        })
    }

    fn tree() -> PipelineTree {
        PipelineTree::from_definition(&PipelineDefinition {
            identifier: "pipeline".into(),
            uuid: None,
            stages: vec![StageDefinition {
                identifier: "deploy".into(),
                uuid: Some("stage-uuid".into()),
                failure_strategies: FailurePolicy::default(),
                execution: ExecutionDefinition {
                    steps: vec![
                        step("plain"),
                        group("with-rollback", Some(vec![step("undo")])),
                        group("without-rollback", None),
                    ],
                    ..Default::default()
                },
            }],
        })
        .unwrap()
    }

    fn at(tree: &PipelineTree, id: &str) -> NodeIndex {
        tree.find(&NodeId::from(id)).unwrap()
    }

    #[test]
    fn stage_target_is_derived_from_stage_id() {
        let tree = tree();
        let target = resolve_rollback_target(
            &tree,
            at(&tree, "plain"),
            RollbackScope::Stage,
            COMBINED_ROLLBACK_ID_SUFFIX,
        )
        .unwrap();
        assert_eq!(target.as_str(), "stage-uuid_combinedRollback");
    }

    #[test]
    fn step_group_target_is_rollback_steps_node() {
        let tree = tree();
        let target = resolve_rollback_target(
            &tree,
            at(&tree, "with-rollback-step"),
            RollbackScope::StepGroup,
            COMBINED_ROLLBACK_ID_SUFFIX,
        )
        .unwrap();
        assert_eq!(target.as_str(), "with-rollback-rollback");
    }

    #[test]
    fn step_group_scope_outside_any_group_is_not_found() {
        let tree = tree();
        let err = resolve_rollback_target(
            &tree,
            at(&tree, "plain"),
            RollbackScope::StepGroup,
            COMBINED_ROLLBACK_ID_SUFFIX,
        )
        .unwrap_err();
        assert_eq!(err, RollbackError::NoEnclosingStepGroup);
    }

    #[test]
    fn step_group_without_rollback_steps_is_reported() {
        let tree = tree();
        let err = resolve_rollback_target(
            &tree,
            at(&tree, "without-rollback-step"),
            RollbackScope::StepGroup,
            COMBINED_ROLLBACK_ID_SUFFIX,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RollbackError::MissingRollbackSteps("without-rollback".into())
        );
    }

    #[test]
    fn strategy_map_keeps_only_resolvable_scopes() {
        let tree = tree();
        let map = rollback_strategy_map(&tree, at(&tree, "plain"), "_rb");
        assert_eq!(map.len(), 1);
        assert_eq!(map[&RollbackScope::Stage].as_str(), "stage-uuid_rb");

        let map = rollback_strategy_map(&tree, at(&tree, "with-rollback-step"), "_rb");
        assert_eq!(map.len(), 2);
        assert_eq!(map[&RollbackScope::StepGroup].as_str(), "with-rollback-rollback");
    }
}
