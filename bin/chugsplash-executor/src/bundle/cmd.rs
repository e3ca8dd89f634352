use std::path::PathBuf;

use alloy_primitives::Address;
use chugsplash::{
    constants::slots::REGISTRY_ADDRESS, BundleBuilder, DeploymentBundles, DeploymentId, Registry,
};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::{
    common::{config_uri, load_config, ChainArgs, LogArgs},
    Error,
};

/// Build the action and target bundles of a config
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Path of the deployment config
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Manager the bundles are built for. Defaults to the project's manager on the registry.
    #[arg(long = "manager")]
    pub manager: Option<Address>,

    /// URI the deployment id commits to. Defaults to `file://<CONFIG>`.
    #[arg(long = "config-uri")]
    pub config_uri: Option<String>,

    /// Write the bundles to this file instead of stdout
    #[arg(long = "out", short = 'o')]
    pub out: Option<PathBuf>,

    /// Chain arguments
    #[command(flatten)]
    pub chain_args: ChainArgs,

    /// Logging arguments
    #[command(flatten)]
    pub log_args: LogArgs,
}

/// The output of the `bundle` subcommand.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleOutput {
    /// The manager the bundles were built for.
    pub manager: Address,
    /// The URI the deployment id commits to.
    pub config_uri: String,
    /// The id of the deployment proposing the bundles under `config_uri`.
    pub deployment_id: DeploymentId,
    /// The bundles.
    pub bundles: DeploymentBundles,
}

impl Cmd {
    /// Builds the bundles and writes them out.
    pub async fn run(&self) -> Result<(), Error> {
        let config = load_config(&self.config).await?;
        let manager = self.manager.unwrap_or_else(|| {
            Registry::new(REGISTRY_ADDRESS, self.chain_args.registry_admin)
                .manager_address(&config.project_name)
        });
        let config_uri = self.config_uri.clone().unwrap_or_else(|| config_uri(&self.config));
        let bundles = BundleBuilder::new(manager).build(&config)?;
        let output = BundleOutput {
            manager,
            deployment_id: bundles.deployment_id(&config_uri),
            config_uri,
            bundles,
        };
        info!(
            target: "chugsplash_executor::bundle",
            %manager,
            id = %output.deployment_id,
            actions = output.bundles.actions.len(),
            targets = output.bundles.targets.len(),
            "Built bundles"
        );

        let json = serde_json::to_string_pretty(&output)?;
        match &self.out {
            Some(path) => tokio::fs::write(path, json).await?,
            None => println!("{json}"),
        }
        Ok(())
    }
}
