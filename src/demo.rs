//! Built-in scenario for `advisers demo`: a step retries timeouts twice and
//! the stage's catch-all aborts on anything else.

use std::time::Duration;

use anyhow::{Context, Result};
use pipeline_advisers::failure::{
    FailureAction, FailureCategory, FailureKind, FailurePolicy, PolicyEntry,
};
use pipeline_advisers::state_machine::{Advice, NodeExecutionState};
use pipeline_advisers::tree::{
    ExecutionDefinition, ExecutionElement, PipelineDefinition, StageDefinition, StepConfig,
};
use pipeline_advisers::{AdvisersConfig, PipelineTree, PlanNode, advise, compile_plan};

pub const DEMO_STEP: &str = "rollout";

/// One simulated termination of the demo step and the advice it got.
pub struct DemoRound {
    pub label: &'static str,
    pub state: NodeExecutionState,
    pub advice: Advice,
}

pub fn definition() -> PipelineDefinition {
    let rollout = StepConfig::new(DEMO_STEP, "K8sRollingDeploy")
        .with_uuid("rollout")
        .with_timeout(Duration::from_secs(600))
        .with_policy(FailurePolicy::new(vec![PolicyEntry::new(
            [FailureCategory::Timeout],
            FailureAction::retry(2, vec![Duration::from_secs(5)], FailureAction::Abort),
        )]));
    let verify = StepConfig::new("verify", "ShellScript").with_uuid("verify");

    PipelineDefinition {
        identifier: "demo".into(),
        uuid: Some("demo".into()),
        stages: vec![StageDefinition {
            identifier: "deploy".into(),
            uuid: Some("deploy".into()),
            failure_strategies: FailurePolicy::new(vec![PolicyEntry::new(
                [FailureCategory::AnyOther],
                FailureAction::Abort,
            )]),
            execution: ExecutionDefinition {
                steps: vec![ExecutionElement::Step(rollout), ExecutionElement::Step(verify)],
                ..Default::default()
            },
        }],
    }
}

/// Compiles the demo pipeline and returns the demo step's plan node.
pub fn plan_node(config: &AdvisersConfig) -> Result<PlanNode> {
    let tree = PipelineTree::from_definition(&definition())?;
    let plan = compile_plan(&tree, config)?;
    plan.find_by_identifier(DEMO_STEP)
        .cloned()
        .with_context(|| format!("demo step `{DEMO_STEP}` missing from plan"))
}

/// Two timeouts, then an application failure.
pub fn run(node: &PlanNode) -> Result<Vec<DemoRound>> {
    let rounds = [
        ("timeout", NodeExecutionState::failed([FailureKind::Timeout])),
        (
            "timeout again",
            NodeExecutionState::failed([FailureKind::Timeout]).with_retry_attempt(1),
        ),
        (
            "application failure",
            NodeExecutionState::failed([FailureKind::Application]).with_retry_attempt(2),
        ),
    ];

    rounds
        .into_iter()
        .map(|(label, state)| -> Result<DemoRound> {
            let advice = advise(&state, node)?;
            Ok(DemoRound {
                label,
                state,
                advice,
            })
        })
        .collect()
}
