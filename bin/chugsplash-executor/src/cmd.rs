use chugsplash::{BundleError, ChainError};
use clap::Parser;

use crate::{
    bundle,
    common::LogArgs,
    deploy,
    executor::{ExecutorError, SourceError},
};

/// Builds, deploys and executes `ChugSplash` deployments
#[derive(Parser, Debug)]
#[command(infer_subcommands = true, version)]
#[allow(clippy::large_enum_variant)]
pub enum MainCmd {
    /// Build the action and target bundles of a config
    Bundle(bundle::Cmd),
    /// Execute a config as its owner on an in-process chain
    Deploy(deploy::DeployCmd),
    /// Execute a config through a remote executor on an in-process chain
    Simulate(deploy::SimulateCmd),
}

impl MainCmd {
    /// The logging arguments of the subcommand.
    pub const fn log_args(&self) -> &LogArgs {
        match self {
            Self::Bundle(cmd) => &cmd.log_args,
            Self::Deploy(cmd) => &cmd.log_args,
            Self::Simulate(cmd) => &cmd.log_args,
        }
    }

    /// Runs the subcommand.
    pub async fn run(&self) -> Result<(), Error> {
        match self {
            Self::Bundle(cmd) => cmd.run().await,
            Self::Deploy(cmd) => cmd.run().await,
            Self::Simulate(cmd) => cmd.run().await,
        }
    }
}

/// Errors of the `chugsplash-executor` commands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A config or output could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The config is invalid.
    #[error(transparent)]
    Bundle(#[from] BundleError),
    /// A transaction failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A config could not be fetched.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Executing a deployment failed.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// The run did not reach the expected outcome.
    #[error("{0}")]
    Unexpected(String),
}
