use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy_primitives::{Address, U256};
use chugsplash::{
    BundleBuilder, DeploymentBundles, DeploymentConfig, DeploymentId, DeploymentStatus,
    LocalChain, Role,
};
use clap::Parser;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    common::{
        config_uri, install_missing_proxies, load_config, ChainArgs, ExecutorArgs, LogArgs,
        ManagerArgs,
    },
    executor::{
        execute_deployment, ExecutionReport, ExecutionSettings, Executor, FileSource, LocalClient,
    },
    Error,
};

/// Execute a config as its owner on an in-process chain
#[derive(Parser, Debug)]
pub struct DeployCmd {
    /// Path of the deployment config
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Chain arguments
    #[command(flatten)]
    pub chain_args: ChainArgs,

    /// Manager arguments
    #[command(flatten)]
    pub manager_args: ManagerArgs,

    /// Executor arguments
    #[command(flatten)]
    pub executor_args: ExecutorArgs,

    /// Logging arguments
    #[command(flatten)]
    pub log_args: LogArgs,
}

/// Execute a config through a remote executor on an in-process chain
#[derive(Parser, Debug)]
pub struct SimulateCmd {
    /// Path of the deployment config
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Chain arguments
    #[command(flatten)]
    pub chain_args: ChainArgs,

    /// Manager arguments
    #[command(flatten)]
    pub manager_args: ManagerArgs,

    /// Executor arguments
    #[command(flatten)]
    pub executor_args: ExecutorArgs,

    /// Logging arguments
    #[command(flatten)]
    pub log_args: LogArgs,
}

/// The outcome of `deploy` and `simulate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    /// The project's manager.
    pub manager: Address,
    /// The executed deployment.
    pub deployment_id: DeploymentId,
    /// Status of the deployment after the run.
    pub status: DeploymentStatus,
    /// What the executor did.
    pub report: ExecutionReport,
    /// Balance of the manager after the run.
    pub manager_balance: U256,
}

/// A chain with the project of a config registered and one of its deployments approved.
struct Prepared {
    chain: LocalChain,
    manager: Address,
    id: DeploymentId,
    bundles: DeploymentBundles,
}

async fn prepare(
    path: &Path,
    chain_args: &ChainArgs,
    manager_args: &ManagerArgs,
    remote_execution: bool,
    setup: impl FnOnce(&mut LocalChain) -> Result<(), Error>,
) -> Result<Prepared, Error> {
    let config: DeploymentConfig = load_config(path).await?;
    let owner = manager_args.owner;
    let mut chain = chain_args.chain(manager_args.params());
    setup(&mut chain)?;

    let manager = chain.register_project(owner, &config.project_name, owner)?;
    install_missing_proxies(&mut chain, manager, &config);
    let bundles = BundleBuilder::new(manager).build(&config)?;
    let gas_limit = chain.block().gas_limit;

    if !manager_args.deposit.is_zero() {
        let balance = chain.world().balance(owner);
        chain.fund(owner, balance + manager_args.deposit);
        chain.transact_with_value(manager, owner, gas_limit, manager_args.deposit, |manager, ctx| {
            manager.deposit(ctx)
        })?;
    }
    let proposal = bundles.proposal(config_uri(path), remote_execution);
    let (id, _) = chain
        .transact(manager, owner, gas_limit, |manager, ctx| manager.propose(ctx, proposal))?;
    chain.transact(manager, owner, gas_limit, |manager, ctx| manager.approve(ctx, id))?;
    info!(
        target: "chugsplash_executor::deploy",
        project = config.project_name,
        %manager,
        %id,
        remote_execution,
        "Approved deployment"
    );

    Ok(Prepared { chain, manager, id, bundles })
}

async fn finish(
    chain: &Mutex<LocalChain>,
    manager: Address,
    id: DeploymentId,
    report: ExecutionReport,
) -> Result<(), Error> {
    let chain = chain.lock().await;
    let status = chain
        .manager(manager)
        .map(|manager| manager.deployment_status(&id))
        .unwrap_or_default();
    let output = DeployOutput {
        manager,
        deployment_id: id,
        status,
        report,
        manager_balance: chain.world().balance(manager),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

impl DeployCmd {
    /// Proposes, approves and executes the config as its owner.
    pub async fn run(&self) -> Result<(), Error> {
        let Prepared { chain, manager, id, bundles } =
            prepare(&self.config, &self.chain_args, &self.manager_args, false, |_| Ok(())).await?;

        let settings = ExecutionSettings {
            max_batch_size: self.executor_args.max_batch_size,
            ..ExecutionSettings::for_block(
                chain.block().gas_limit,
                self.executor_args.gas_budget_divisor,
            )
        };
        let chain = Arc::new(Mutex::new(chain));
        let client = LocalClient::new(chain.clone(), self.manager_args.owner);
        let report = execute_deployment(&client, manager, id, &bundles, &settings).await?;
        finish(&chain, manager, id, report).await
    }
}

impl SimulateCmd {
    /// Proposes and approves the config as a remote deployment and lets an executor run it.
    pub async fn run(&self) -> Result<(), Error> {
        let executor = self.executor_args.executor;
        let admin = self.chain_args.registry_admin;
        let Prepared { chain, manager, id, .. } =
            prepare(&self.config, &self.chain_args, &self.manager_args, true, |chain| {
                Ok(chain.grant_role(admin, Role::RemoteExecutor, executor)?)
            })
            .await?;

        let chain = Arc::new(Mutex::new(chain));
        let client = LocalClient::new(chain.clone(), executor);
        let mut executor =
            Executor::new(client, FileSource::default(), self.executor_args.config());
        let report = executor
            .poll_once()
            .await?
            .into_iter()
            .find(|report| report.deployment_id == id)
            .ok_or_else(|| Error::Unexpected(format!("deployment {id} was not executed")))?;
        finish(&chain, manager, id, report).await
    }
}
