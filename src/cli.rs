//! Command-line interface of the `advisers` developer tool, built on clap.
//!
//! Defines [`Cli`] with the [`Command`] subcommands (compile, advise, demo)
//! and the global flags (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pipeline_advisers::failure::FailureKind;
use pipeline_advisers::state_machine::ExecutionStatus;

/// Compiles pipeline failure strategies and shows the advice they give.
#[derive(Debug, Parser)]
#[command(name = "advisers", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (default: ./advisers.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every compiled adviser and dispatch decision.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compiles a pipeline definition and prints every plan node.
    Compile {
        /// Pipeline definition (.json, otherwise TOML).
        file: PathBuf,
    },

    /// Compiles a pipeline and prints the advice for a simulated execution state.
    Advise {
        /// Pipeline definition (.json, otherwise TOML).
        file: PathBuf,

        /// Identifier of the step that terminated.
        #[arg(long)]
        node: String,

        /// Terminal status of the step.
        #[arg(long, value_enum, default_value_t = StatusArg::Failed)]
        status: StatusArg,

        /// Failure kind reported by the step. Repeatable.
        #[arg(long = "kind", value_enum)]
        kinds: Vec<KindArg>,

        /// Retries already performed.
        #[arg(long, default_value_t = 0)]
        attempt: u32,
    },

    /// Runs the built-in timeout-retry scenario.
    Demo,
}

/// Execution status accepted on the command line, mapped to [`ExecutionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Succeeded,
    Failed,
    Errored,
    Expired,
    Aborted,
    ApprovalRejected,
    Skipped,
}

impl From<StatusArg> for ExecutionStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Succeeded => ExecutionStatus::Succeeded,
            StatusArg::Failed => ExecutionStatus::Failed,
            StatusArg::Errored => ExecutionStatus::Errored,
            StatusArg::Expired => ExecutionStatus::Expired,
            StatusArg::Aborted => ExecutionStatus::Aborted,
            StatusArg::ApprovalRejected => ExecutionStatus::ApprovalRejected,
            StatusArg::Skipped => ExecutionStatus::Skipped,
        }
    }
}

/// Failure kind accepted on the command line, mapped to [`FailureKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Authentication,
    Authorization,
    Connectivity,
    Timeout,
    DelegateProvisioning,
    Verification,
    PolicyEvaluation,
    InputTimeout,
    Application,
    Unknown,
}

impl From<KindArg> for FailureKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Authentication => FailureKind::Authentication,
            KindArg::Authorization => FailureKind::Authorization,
            KindArg::Connectivity => FailureKind::Connectivity,
            KindArg::Timeout => FailureKind::Timeout,
            KindArg::DelegateProvisioning => FailureKind::DelegateProvisioning,
            KindArg::Verification => FailureKind::Verification,
            KindArg::PolicyEvaluation => FailureKind::PolicyEvaluation,
            KindArg::InputTimeout => FailureKind::InputTimeout,
            KindArg::Application => FailureKind::Application,
            KindArg::Unknown => FailureKind::Unknown,
        }
    }
}
