use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::execution::NodeExecution;
use crate::duration::format_duration;
use crate::error::AdviseError;
use crate::failure::RepairAction;
use crate::plan::{AdviserParameters, AdviserType, PlanNode};
use crate::rollback::{RollbackScope, RollbackStrategyMap};
use crate::tree::NodeId;

/// What the engine should do next with a terminated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directive {
    /// Move on. `None` leaves the choice of what runs next to the engine.
    Continue { next_node_id: Option<NodeId> },
    /// Run the node again after `wait`. `on_exhausted` applies once the
    /// retry budget is spent.
    Retry {
        attempt: u32,
        #[serde(with = "crate::duration::text")]
        wait: Duration,
        on_exhausted: Box<Directive>,
    },
    MarkSuccess { next_node_id: Option<NodeId> },
    Abort,
    Rollback { target: NodeId, scope: RollbackScope },
    /// Wait for a human. `on_timeout` applies when nobody answers in time.
    Pause {
        #[serde(with = "crate::duration::text")]
        timeout: Duration,
        on_timeout: Box<Directive>,
    },
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Continue { next_node_id: Some(next) } => write!(f, "CONTINUE -> {next}"),
            Directive::Continue { next_node_id: None } => write!(f, "CONTINUE"),
            Directive::Retry {
                attempt,
                wait,
                on_exhausted,
            } => write!(
                f,
                "RETRY #{attempt} after {} (then {on_exhausted})",
                format_duration(*wait)
            ),
            Directive::MarkSuccess { next_node_id: Some(next) } => {
                write!(f, "MARK_SUCCESS -> {next}")
            }
            Directive::MarkSuccess { next_node_id: None } => write!(f, "MARK_SUCCESS"),
            Directive::Abort => write!(f, "ABORT"),
            Directive::Rollback { target, scope } => write!(f, "ROLLBACK {scope} -> {target}"),
            Directive::Pause {
                timeout,
                on_timeout,
            } => write!(
                f,
                "PAUSE for {} (then {on_timeout})",
                format_duration(*timeout)
            ),
        }
    }
}

/// Result of dispatching one terminated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Advice {
    Advised {
        by: AdviserType,
        directive: Directive,
    },
    /// No adviser applied; the engine falls back to its own default.
    NoMatch,
}

impl Advice {
    pub fn directive(&self) -> Option<&Directive> {
        match self {
            Advice::Advised { directive, .. } => Some(directive),
            Advice::NoMatch => None,
        }
    }
}

/// Picks the first compiled adviser of a plan node that applies to an
/// execution state and turns it into a [`Directive`].
///
/// Stateless: the same state and plan node always give the same advice.
pub struct AdviserDispatcher;

impl AdviserDispatcher {
    pub fn advise(state: &impl NodeExecution, node: &PlanNode) -> Result<Advice, AdviseError> {
        for obtainment in &node.adviser_obtainments {
            let parameters = obtainment.decode()?;
            if !Self::can_advise(state, &parameters) {
                continue;
            }
            let directive = Self::directive_for(state, &parameters)?;
            debug!(
                step = %node.identifier,
                status = %state.status(),
                adviser = %obtainment.adviser_type,
                %directive,
                "adviser matched"
            );
            return Ok(Advice::Advised {
                by: obtainment.adviser_type,
                directive,
            });
        }

        debug!(step = %node.identifier, status = %state.status(), "no adviser matched");
        Ok(Advice::NoMatch)
    }

    fn can_advise(state: &impl NodeExecution, parameters: &AdviserParameters) -> bool {
        let Some(applicable) = parameters.applicable_failure_types() else {
            return true;
        };
        if !state.status().is_broken() {
            return false;
        }
        if applicable.is_empty() {
            return true;
        }
        state
            .failure_info()
            .is_some_and(|info| !info.kinds.is_disjoint(applicable))
    }

    fn directive_for(
        state: &impl NodeExecution,
        parameters: &AdviserParameters,
    ) -> Result<Directive, AdviseError> {
        let directive = match parameters {
            AdviserParameters::Ignore(p) => Directive::Continue {
                next_node_id: p.next_node_id.clone(),
            },
            AdviserParameters::NextStep(p) => Directive::Continue {
                next_node_id: Some(p.next_node_id.clone()),
            },
            AdviserParameters::OnSuccess(p) => Directive::Continue {
                next_node_id: Some(p.next_node_id.clone()),
            },
            AdviserParameters::Retry(p) => {
                let on_exhausted = repair_directive(
                    AdviserType::Retry,
                    p.repair_action_after_retry,
                    p.next_node_id.as_ref(),
                    &p.rollback_targets,
                )?;
                let retries_done = state.retry_attempt();
                let attempt = retries_done.saturating_add(1);
                if attempt <= p.retry_count {
                    Directive::Retry {
                        attempt,
                        wait: p.wait_for(retries_done),
                        on_exhausted: Box::new(on_exhausted),
                    }
                } else {
                    on_exhausted
                }
            }
            AdviserParameters::OnMarkSuccess(p) => Directive::MarkSuccess {
                next_node_id: p.next_node_id.clone(),
            },
            AdviserParameters::OnAbort(_) => Directive::Abort,
            AdviserParameters::OnFailRollback(p) => rollback_directive(
                AdviserType::OnFailRollback,
                p.strategy,
                &p.rollback_targets,
            )?,
            AdviserParameters::ManualIntervention(p) => Directive::Pause {
                timeout: p.timeout,
                on_timeout: Box::new(repair_directive(
                    AdviserType::ManualIntervention,
                    p.timeout_action,
                    p.next_node_id.as_ref(),
                    &p.rollback_targets,
                )?),
            },
        };
        Ok(directive)
    }
}

/// Dispatches `state` against `node`. Shorthand for [`AdviserDispatcher::advise`].
pub fn advise(state: &impl NodeExecution, node: &PlanNode) -> Result<Advice, AdviseError> {
    AdviserDispatcher::advise(state, node)
}

fn repair_directive(
    adviser_type: AdviserType,
    repair: RepairAction,
    next_node_id: Option<&NodeId>,
    rollback_targets: &RollbackStrategyMap,
) -> Result<Directive, AdviseError> {
    let directive = match repair {
        RepairAction::Ignore => Directive::Continue {
            next_node_id: next_node_id.cloned(),
        },
        RepairAction::MarkAsSuccess => Directive::MarkSuccess {
            next_node_id: next_node_id.cloned(),
        },
        RepairAction::EndExecution => Directive::Abort,
        RepairAction::StageRollback => {
            rollback_directive(adviser_type, RollbackScope::Stage, rollback_targets)?
        }
        RepairAction::StepGroupRollback => {
            rollback_directive(adviser_type, RollbackScope::StepGroup, rollback_targets)?
        }
    };
    Ok(directive)
}

fn rollback_directive(
    adviser_type: AdviserType,
    scope: RollbackScope,
    rollback_targets: &RollbackStrategyMap,
) -> Result<Directive, AdviseError> {
    let target = rollback_targets
        .get(&scope)
        .ok_or(AdviseError::MissingRollbackTarget {
            adviser_type,
            action: match scope {
                RollbackScope::Stage => "StageRollback",
                RollbackScope::StepGroup => "StepGroupRollback",
            },
        })?;
    Ok(Directive::Rollback {
        target: target.clone(),
        scope,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::failure::FailureKind;
    use crate::plan::{
        AbortParameters, AdviserObtainment, IgnoreParameters, IntervalPolicy,
        ManualInterventionParameters, NextStepParameters, RetryParameters, RollbackParameters,
        WhenCondition,
    };
    use crate::state_machine::execution::{ExecutionStatus, NodeExecutionState};

    fn plan_node(advisers: Vec<AdviserParameters>) -> PlanNode {
        PlanNode {
            uuid: "step".into(),
            identifier: "step".into(),
            name: "step".into(),
            step_type: "ShellScript".into(),
            adviser_obtainments: advisers
                .iter()
                .map(|parameters| AdviserObtainment::encode(parameters).unwrap())
                .collect(),
            rollback_strategy: RollbackStrategyMap::new(),
            timeout: Duration::from_secs(60),
            skip_condition: None,
            when_condition: WhenCondition::on_stage_success(),
        }
    }

    fn stage_target() -> RollbackStrategyMap {
        RollbackStrategyMap::from([(RollbackScope::Stage, NodeId::from("stage_combinedRollback"))])
    }

    fn kinds(kinds: &[FailureKind]) -> BTreeSet<FailureKind> {
        kinds.iter().copied().collect()
    }

    fn retry_timeouts(count: u32, repair: RepairAction) -> AdviserParameters {
        AdviserParameters::Retry(RetryParameters {
            applicable_failure_types: kinds(&[FailureKind::Timeout]),
            next_node_id: Some("next".into()),
            retry_count: count,
            wait_intervals: vec![Duration::from_secs(1), Duration::from_secs(5)],
            interval_policy: IntervalPolicy::RepeatLast,
            repair_action_after_retry: repair,
            rollback_targets: stage_target(),
        })
    }

    fn abort_everything_else() -> AdviserParameters {
        AdviserParameters::OnAbort(AbortParameters {
            applicable_failure_types: FailureKind::ALL
                .into_iter()
                .filter(|kind| *kind != FailureKind::Timeout)
                .collect(),
        })
    }

    fn next_step() -> AdviserParameters {
        AdviserParameters::NextStep(NextStepParameters {
            next_node_id: "next".into(),
        })
    }

    #[test]
    fn timeout_retries_and_other_failures_abort() {
        let node = plan_node(vec![
            retry_timeouts(2, RepairAction::EndExecution),
            abort_everything_else(),
            next_step(),
        ]);

        let advice = advise(&NodeExecutionState::failed([FailureKind::Timeout]), &node).unwrap();
        assert_eq!(
            advice,
            Advice::Advised {
                by: AdviserType::Retry,
                directive: Directive::Retry {
                    attempt: 1,
                    wait: Duration::from_secs(1),
                    on_exhausted: Box::new(Directive::Abort),
                },
            }
        );

        let advice =
            advise(&NodeExecutionState::failed([FailureKind::Authentication]), &node).unwrap();
        assert_eq!(advice.directive(), Some(&Directive::Abort));
    }

    #[test]
    fn retry_exhaustion_falls_through_to_repair_action() {
        let node = plan_node(vec![retry_timeouts(2, RepairAction::StageRollback)]);
        let state = |retries| {
            NodeExecutionState::failed([FailureKind::Timeout]).with_retry_attempt(retries)
        };

        let second = advise(&state(1), &node).unwrap();
        assert!(matches!(
            second.directive(),
            Some(Directive::Retry { attempt: 2, wait, .. }) if *wait == Duration::from_secs(5)
        ));

        let exhausted = advise(&state(2), &node).unwrap();
        assert_eq!(
            exhausted.directive(),
            Some(&Directive::Rollback {
                target: "stage_combinedRollback".into(),
                scope: RollbackScope::Stage,
            })
        );
    }

    #[test]
    fn success_skips_policy_advisers() {
        let node = plan_node(vec![abort_everything_else(), next_step()]);
        let advice = advise(&NodeExecutionState::new(ExecutionStatus::Succeeded), &node).unwrap();
        assert_eq!(
            advice,
            Advice::Advised {
                by: AdviserType::NextStep,
                directive: Directive::Continue {
                    next_node_id: Some("next".into())
                },
            }
        );
    }

    #[test]
    fn no_applicable_adviser_is_no_match() {
        let node = plan_node(vec![retry_timeouts(1, RepairAction::Ignore)]);
        let advice =
            advise(&NodeExecutionState::failed([FailureKind::Connectivity]), &node).unwrap();
        assert_eq!(advice, Advice::NoMatch);

        let empty = plan_node(Vec::new());
        let advice = advise(&NodeExecutionState::new(ExecutionStatus::Succeeded), &empty).unwrap();
        assert_eq!(advice, Advice::NoMatch);
    }

    #[test]
    fn empty_applicable_set_matches_any_failure() {
        let node = plan_node(vec![AdviserParameters::Ignore(IgnoreParameters {
            applicable_failure_types: BTreeSet::new(),
            next_node_id: None,
        })]);
        let state = NodeExecutionState::new(ExecutionStatus::Expired);
        assert_eq!(
            advise(&state, &node).unwrap().directive(),
            Some(&Directive::Continue { next_node_id: None })
        );
    }

    #[test]
    fn manual_intervention_pauses_with_timeout_directive() {
        let node = plan_node(vec![AdviserParameters::ManualIntervention(
            ManualInterventionParameters {
                applicable_failure_types: kinds(&[FailureKind::Verification]),
                timeout: Duration::from_secs(3600),
                timeout_action: RepairAction::MarkAsSuccess,
                next_node_id: Some("next".into()),
                rollback_targets: RollbackStrategyMap::new(),
            },
        )]);
        let advice =
            advise(&NodeExecutionState::failed([FailureKind::Verification]), &node).unwrap();
        assert_eq!(
            advice.directive(),
            Some(&Directive::Pause {
                timeout: Duration::from_secs(3600),
                on_timeout: Box::new(Directive::MarkSuccess {
                    next_node_id: Some("next".into())
                }),
            })
        );
    }

    #[test]
    fn rollback_without_target_is_a_contract_violation() {
        let node = plan_node(vec![AdviserParameters::OnFailRollback(RollbackParameters {
            applicable_failure_types: kinds(&[FailureKind::Timeout]),
            strategy: RollbackScope::StepGroup,
            rollback_targets: stage_target(),
        })]);
        let err = advise(&NodeExecutionState::failed([FailureKind::Timeout]), &node).unwrap_err();
        assert!(matches!(
            err,
            AdviseError::MissingRollbackTarget {
                adviser_type: AdviserType::OnFailRollback,
                action: "StepGroupRollback",
            }
        ));
    }

    #[test]
    fn malformed_parameters_are_reported() {
        let mut node = plan_node(Vec::new());
        node.adviser_obtainments.push(AdviserObtainment {
            adviser_type: AdviserType::Retry,
            parameters: b"{}".to_vec(),
        });
        let err = advise(&NodeExecutionState::failed([FailureKind::Timeout]), &node).unwrap_err();
        assert!(matches!(
            err,
            AdviseError::MalformedParameters {
                adviser_type: AdviserType::Retry,
                ..
            }
        ));
    }

    #[test]
    fn advice_is_idempotent() {
        let node = plan_node(vec![
            retry_timeouts(3, RepairAction::EndExecution),
            abort_everything_else(),
        ]);
        let state = NodeExecutionState::failed([FailureKind::Timeout]).with_retry_attempt(1);
        assert_eq!(advise(&state, &node).unwrap(), advise(&state, &node).unwrap());
    }

    #[test]
    fn directive_display() {
        let directive = Directive::Retry {
            attempt: 1,
            wait: Duration::from_secs(90),
            on_exhausted: Box::new(Directive::Abort),
        };
        assert_eq!(directive.to_string(), "RETRY #1 after 1m30s (then ABORT)");
        assert_eq!(
            Directive::Rollback {
                target: "s_combinedRollback".into(),
                scope: RollbackScope::Stage,
            }
            .to_string(),
            "ROLLBACK stage -> s_combinedRollback"
        );
    }
}
