//! Compiles one step of the pipeline tree into its [`PlanNode`].
//!
//! The step's own policy is merged with the policies of its enclosing step
//! group and stage, each resolved action becomes one adviser, and a default
//! continuation adviser is appended last. Every configuration problem is
//! reported here so that dispatch never has to.

use std::collections::BTreeSet;

use tracing::debug;

use super::node::{
    AbortParameters, AdviserObtainment, AdviserParameters, IgnoreParameters,
    ManualInterventionParameters, MarkSuccessParameters, NextStepParameters, OnSuccessParameters,
    PlanNode, RetryParameters, RollbackParameters, WhenCondition,
};
use crate::config::AdvisersConfig;
use crate::error::PolicyError;
use crate::failure::{FailureAction, FailureKind, FailurePolicy, RepairAction, ResolvedPolicy, merge};
use crate::rollback::{
    RollbackScope, RollbackStrategyMap, resolve_rollback_target, rollback_strategy_map,
};
use crate::tree::{NodeId, NodeIndex, NodeKind, PipelineTree, StepConfig};

/// Compiles the step with node id `step_id` into a [`PlanNode`].
pub fn compile_plan_node(
    tree: &PipelineTree,
    step_id: &NodeId,
    config: &AdvisersConfig,
) -> Result<PlanNode, PolicyError> {
    let step = tree
        .find(step_id)
        .ok_or_else(|| PolicyError::NodeNotFound(step_id.clone()))?;
    AdviserCompiler::new(tree, config).compile(step)
}

/// Compiles steps of one tree. Holds only shared borrows, so one compiler
/// can serve any number of steps.
pub struct AdviserCompiler<'a> {
    tree: &'a PipelineTree,
    config: &'a AdvisersConfig,
}

/// Everything the adviser builders need to know about the step being compiled.
struct StepContext<'a> {
    index: NodeIndex,
    identifier: &'a str,
    inside_rollback: bool,
    next_node_id: Option<NodeId>,
    rollback_targets: RollbackStrategyMap,
}

impl<'a> AdviserCompiler<'a> {
    pub fn new(tree: &'a PipelineTree, config: &'a AdvisersConfig) -> Self {
        Self { tree, config }
    }

    pub fn compile(&self, step: NodeIndex) -> Result<PlanNode, PolicyError> {
        let node = self.tree.node(step);
        let step_config = node
            .step
            .as_ref()
            .ok_or_else(|| PolicyError::NotAStep(node.id.clone()))?;

        let inside_rollback = self.tree.is_inside_rollback(step);
        let stage_policy = self.inherited_policy(step, NodeKind::Stage, inside_rollback);
        let group_policy = self.inherited_policy(step, NodeKind::StepGroup, inside_rollback);
        let resolved = merge(&step_config.failure_strategies, group_policy, stage_policy)?;

        let next_node_id = if self.tree.is_in_parallel(step) {
            None
        } else {
            self.tree
                .next_sibling(step)
                .map(|sibling| self.tree.node(sibling).id.clone())
        };

        let context = StepContext {
            index: step,
            identifier: &step_config.identifier,
            inside_rollback,
            next_node_id,
            rollback_targets: rollback_strategy_map(
                self.tree,
                step,
                &self.config.combined_rollback_suffix,
            ),
        };
        let adviser_obtainments = self.advisers(&context, &resolved)?;

        Ok(PlanNode {
            uuid: node.id.clone(),
            identifier: step_config.identifier.clone(),
            name: display_name(step_config),
            step_type: step_config.step_type.clone(),
            adviser_obtainments,
            rollback_strategy: context.rollback_targets,
            timeout: step_config.timeout.unwrap_or(self.config.default_timeout),
            skip_condition: step_config.skip_condition.clone(),
            when_condition: when_condition(step_config, inside_rollback),
        })
    }

    /// Policy declared on the nearest ancestor of `kind`.
    ///
    /// A step inside a rollback section only inherits from ancestors that are
    /// themselves inside a rollback section: the forward-path policy that
    /// triggered the rollback does not apply to the rollback steps.
    fn inherited_policy(
        &self,
        step: NodeIndex,
        kind: NodeKind,
        inside_rollback: bool,
    ) -> &'a FailurePolicy {
        static EMPTY: FailurePolicy = FailurePolicy::EMPTY;
        let tree = self.tree;
        match tree.nearest_ancestor_of_kind(step, kind) {
            Some(ancestor) if !inside_rollback || tree.is_inside_rollback(ancestor) => {
                &tree.node(ancestor).policy
            }
            _ => &EMPTY,
        }
    }

    fn advisers(
        &self,
        context: &StepContext<'_>,
        resolved: &ResolvedPolicy,
    ) -> Result<Vec<AdviserObtainment>, PolicyError> {
        let mut advisers = Vec::with_capacity(resolved.len() + 1);

        for (action, kinds) in resolved.iter() {
            let parameters = self.policy_adviser(context, action, kinds.clone())?;
            debug!(
                step = context.identifier,
                adviser = %parameters.adviser_type(),
                kinds = ?kinds,
                "compiled failure adviser"
            );
            advisers.push(AdviserObtainment::encode(&parameters)?);
        }

        // The default adviser goes last: it can always advise, so anything
        // after it would be unreachable.
        if let Some(next_node_id) = context.next_node_id.clone() {
            let parameters = if context.inside_rollback {
                AdviserParameters::OnSuccess(OnSuccessParameters { next_node_id })
            } else {
                AdviserParameters::NextStep(NextStepParameters { next_node_id })
            };
            advisers.push(AdviserObtainment::encode(&parameters)?);
        }

        Ok(advisers)
    }

    fn policy_adviser(
        &self,
        context: &StepContext<'_>,
        action: &FailureAction,
        applicable_failure_types: BTreeSet<FailureKind>,
    ) -> Result<AdviserParameters, PolicyError> {
        let parameters = match action {
            FailureAction::Ignore => AdviserParameters::Ignore(IgnoreParameters {
                applicable_failure_types,
                next_node_id: context.next_node_id.clone(),
            }),
            FailureAction::Retry(spec) => {
                if spec.retry_count == 0 {
                    return Err(PolicyError::InvalidRetryCount {
                        step: context.identifier.to_string(),
                    });
                }
                if spec.retry_intervals.is_empty() {
                    return Err(PolicyError::EmptyRetryIntervals {
                        step: context.identifier.to_string(),
                    });
                }
                AdviserParameters::Retry(RetryParameters {
                    applicable_failure_types,
                    next_node_id: context.next_node_id.clone(),
                    retry_count: spec.retry_count,
                    wait_intervals: spec.retry_intervals.clone(),
                    interval_policy: self.config.interval_policy,
                    repair_action_after_retry: self.fallback(
                        context,
                        action,
                        &spec.on_retry_failure,
                    )?,
                    rollback_targets: context.rollback_targets.clone(),
                })
            }
            FailureAction::MarkAsSuccess => AdviserParameters::OnMarkSuccess(MarkSuccessParameters {
                applicable_failure_types,
                next_node_id: context.next_node_id.clone(),
            }),
            FailureAction::Abort => AdviserParameters::OnAbort(AbortParameters {
                applicable_failure_types,
            }),
            FailureAction::StageRollback | FailureAction::StepGroupRollback => {
                let strategy = match action {
                    FailureAction::StageRollback => RollbackScope::Stage,
                    _ => RollbackScope::StepGroup,
                };
                self.require_rollback(context, action.name(), strategy)?;
                AdviserParameters::OnFailRollback(RollbackParameters {
                    applicable_failure_types,
                    strategy,
                    rollback_targets: context.rollback_targets.clone(),
                })
            }
            FailureAction::ManualIntervention(spec) => {
                AdviserParameters::ManualIntervention(ManualInterventionParameters {
                    applicable_failure_types,
                    timeout: spec.timeout,
                    timeout_action: self.fallback(context, action, &spec.on_timeout)?,
                    next_node_id: context.next_node_id.clone(),
                    rollback_targets: context.rollback_targets.clone(),
                })
            }
        };
        Ok(parameters)
    }

    /// Lowers the fallback of a Retry or ManualIntervention action.
    fn fallback(
        &self,
        context: &StepContext<'_>,
        owner: &FailureAction,
        fallback: &FailureAction,
    ) -> Result<RepairAction, PolicyError> {
        let repair = fallback
            .repair_action()
            .ok_or_else(|| PolicyError::NestedFallback {
                step: context.identifier.to_string(),
                action: owner.name(),
                fallback: fallback.name(),
            })?;
        if let Some(scope) = repair.rollback_scope() {
            self.require_rollback(context, fallback.name(), scope)?;
        }
        Ok(repair)
    }

    /// Rejects rollback from inside a rollback section and rollback towards a
    /// scope that has no target.
    fn require_rollback(
        &self,
        context: &StepContext<'_>,
        action: &'static str,
        scope: RollbackScope,
    ) -> Result<(), PolicyError> {
        if context.inside_rollback {
            return Err(PolicyError::RollbackInsideRollback {
                step: context.identifier.to_string(),
                action,
            });
        }
        resolve_rollback_target(
            self.tree,
            context.index,
            scope,
            &self.config.combined_rollback_suffix,
        )
        .map(|_| ())
        .map_err(|source| PolicyError::Rollback {
            step: context.identifier.to_string(),
            source,
        })
    }
}

fn display_name(step: &StepConfig) -> String {
    match step.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => step.identifier.clone(),
    }
}

fn when_condition(step: &StepConfig, inside_rollback: bool) -> WhenCondition {
    match &step.when {
        Some(when) => when.clone(),
        None if inside_rollback => WhenCondition::on_stage_failure(),
        None => WhenCondition::on_stage_success(),
    }
}
