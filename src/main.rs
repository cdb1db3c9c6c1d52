mod cli;
mod demo;
mod ui;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use pipeline_advisers::failure::FailureKind;
use pipeline_advisers::state_machine::{FailureInfo, NodeExecutionState};
use pipeline_advisers::{AdvisersConfig, PipelineDefinition, PipelineTree, advise, compile_plan};
use ui::Report;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let report = Report::default();
    match run(cli, &report) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report.error(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pipeline_advisers=debug")
    } else {
        EnvFilter::new("pipeline_advisers=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

fn run(cli: Cli, report: &Report) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AdvisersConfig::load_from(path)?,
        None => AdvisersConfig::load()?,
    };

    match cli.command {
        Command::Compile { file } => {
            let tree = load_tree(&file)?;
            let plan = compile_plan(&tree, &config)?;
            report.plan(&plan);
        }
        Command::Advise {
            file,
            node,
            status,
            kinds,
            attempt,
        } => {
            let tree = load_tree(&file)?;
            let plan = compile_plan(&tree, &config)?;
            let plan_node = plan
                .find_by_identifier(&node)
                .with_context(|| format!("no step `{node}` in {}", file.display()))?;
            let state = NodeExecutionState::new(status.into())
                .with_failure(FailureInfo::new(
                    kinds.into_iter().map(FailureKind::from),
                    "simulated",
                ))
                .with_retry_attempt(attempt);
            let advice = advise(&state, plan_node)?;
            report.plan_node(plan_node);
            report.advice(&node, &state, &advice);
        }
        Command::Demo => {
            let node = demo::plan_node(&config)?;
            report.plan_node(&node);
            for round in demo::run(&node)? {
                report.advice(round.label, &round.state, &round.advice);
            }
        }
    }

    Ok(())
}

fn load_tree(path: &Path) -> Result<PipelineTree> {
    let definition = PipelineDefinition::load(path)
        .with_context(|| format!("loading pipeline from {}", path.display()))?;
    Ok(PipelineTree::from_definition(&definition)?)
}
