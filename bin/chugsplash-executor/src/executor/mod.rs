//! The remote executor.
//!
//! An [`Executor`] follows the registry announcements, claims approved remote deployments,
//! rebuilds their bundles from the announced config URI, verifies them against the proposal and
//! drives them to completion.

mod client;
mod error;
mod execute;
mod source;

pub use client::*;
pub use error::*;
pub use execute::*;
pub use source::*;

use std::{
    collections::{BTreeSet, HashSet},
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{Address, U256};
use chugsplash::{
    events::RegistryEvent, ActionCostModel, BundleBuilder, BundleCostModel, DeploymentBundles,
    DeploymentId, DeploymentState, ManagerError,
};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Tunables of an [`Executor`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    /// Time between two polls.
    pub poll_interval: Duration,
    /// Time a config fetch may take.
    pub fetch_timeout: Duration,
    /// Transactions use at most `block_gas_limit / gas_budget_divisor` gas.
    pub gas_budget_divisor: u64,
    /// Upper bound on the number of actions per batch.
    pub max_batch_size: Option<usize>,
    /// Withdraw the earned payment after every deployment.
    pub auto_withdraw: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
            gas_budget_divisor: 2,
            max_batch_size: None,
            auto_withdraw: true,
        }
    }
}

/// Executes the remote deployments of every manager that announces on the chain.
pub struct Executor<C, S> {
    client: C,
    source: S,
    config: ExecutorConfig,
    cost_model: Arc<dyn ActionCostModel + Send + Sync>,
    cursor: usize,
    watched: BTreeSet<Address>,
    abandoned: HashSet<DeploymentId>,
}

impl<C: fmt::Debug, S: fmt::Debug> fmt::Debug for Executor<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("client", &self.client)
            .field("source", &self.source)
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .field("watched", &self.watched)
            .field("abandoned", &self.abandoned)
            .finish_non_exhaustive()
    }
}

impl<C, S> Executor<C, S>
where
    C: ManagerClient,
    S: ConfigSource,
{
    /// An executor sending through `client` and fetching configs from `source`.
    pub fn new(client: C, source: S, config: ExecutorConfig) -> Self {
        Self {
            client,
            source,
            config,
            cost_model: Arc::new(BundleCostModel::default()),
            cursor: 0,
            watched: BTreeSet::new(),
            abandoned: HashSet::new(),
        }
    }

    /// Sizes batches with `cost_model`.
    pub fn with_cost_model(mut self, cost_model: Arc<dyn ActionCostModel + Send + Sync>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// The client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// The config source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the config source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Managers with at least one announcement.
    pub fn watched(&self) -> impl Iterator<Item = Address> + '_ {
        self.watched.iter().copied()
    }

    /// Whether `id` was given up on for good.
    pub fn is_abandoned(&self, id: &DeploymentId) -> bool {
        self.abandoned.contains(id)
    }

    /// Reads the new announcements and executes every executable remote deployment.
    ///
    /// Retryable failures leave the deployment for the next poll. Any other failure abandons it.
    pub async fn poll_once(&mut self) -> Result<Vec<ExecutionReport>, ExecutorError> {
        let logs = self.client.logs_since(self.cursor).await;
        self.cursor += logs.len();
        for log in &logs {
            if let Some(RegistryEvent::EventAnnounced { manager, event_name, .. }) =
                log.event.as_registry()
            {
                if self.watched.insert(*manager) {
                    debug!(target: "chugsplash_executor", %manager, event_name, "Watching manager");
                }
            }
        }

        let mut reports = Vec::new();
        for manager in self.watched.clone() {
            let id = match self.client.active_deployment(manager).await {
                Ok(Some(id)) => id,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        target: "chugsplash_executor",
                        %manager,
                        %err,
                        "Failed to read the active deployment"
                    );
                    continue;
                }
            };
            if self.abandoned.contains(&id) {
                continue;
            }
            match self.process(manager, id).await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(err) if err.is_retryable() => {
                    warn!(
                        target: "chugsplash_executor",
                        %manager,
                        %id,
                        %err,
                        "Deployment failed, retrying on the next poll"
                    );
                }
                Err(err) => {
                    error!(
                        target: "chugsplash_executor",
                        %manager,
                        %id,
                        %err,
                        "Abandoning deployment"
                    );
                    self.abandoned.insert(id);
                }
            }
        }
        Ok(reports)
    }

    /// Polls every [`ExecutorConfig::poll_interval`] until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(target: "chugsplash_executor", executor = %self.client.sender(), "Executor started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target: "chugsplash_executor", "Executor stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once().await {
                        warn!(target: "chugsplash_executor", %err, "Poll failed");
                    }
                }
            }
        }
    }

    async fn process(
        &self,
        manager: Address,
        id: DeploymentId,
    ) -> Result<Option<ExecutionReport>, ExecutorError> {
        let Some(state) = self.client.deployment(manager, id).await? else { return Ok(None) };
        if !state.remote_execution {
            return Ok(None);
        }
        let block = self.client.block().await;
        let settings = ExecutionSettings {
            gas_budget: block.gas_limit / self.config.gas_budget_divisor.max(1),
            cost_model: self.cost_model.clone(),
            max_batch_size: self.config.max_batch_size,
        };

        if !self.holds_claim(manager, &state, block.timestamp).await? {
            match self.client.claim_deployment(manager, settings.gas_budget).await {
                Ok(_) => info!(target: "chugsplash_executor", %manager, %id, "Claimed deployment"),
                Err(err)
                    if matches!(
                        err.manager_error(),
                        Some(ManagerError::DeploymentAlreadyClaimed { .. })
                    ) =>
                {
                    debug!(
                        target: "chugsplash_executor",
                        %manager,
                        %id,
                        "Deployment claimed by another executor"
                    );
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let config =
            fetch_config(&self.source, &state.config_uri, self.config.fetch_timeout).await?;
        let bundles = BundleBuilder::new(manager).build(&config)?;
        ensure_matches(id, &state, &bundles)?;

        let mut report = execute_deployment(&self.client, manager, id, &bundles, &settings).await?;
        if self.config.auto_withdraw {
            report.withdrawn = self.withdraw(manager, settings.gas_budget).await;
        }
        Ok(Some(report))
    }

    async fn holds_claim(
        &self,
        manager: Address,
        state: &DeploymentState,
        now: u64,
    ) -> Result<bool, ExecutorError> {
        if state.selected_executor != Some(self.client.sender()) {
            return Ok(false);
        }
        let params = self.client.manager_params(manager).await?;
        Ok(state.is_claim_active(now, params.execution_lock_time))
    }

    async fn withdraw(&self, manager: Address, gas_limit: u64) -> U256 {
        match self.client.claim_executor_payment(manager, U256::MAX, gas_limit).await {
            Ok(amount) => {
                info!(
                    target: "chugsplash_executor",
                    %manager,
                    %amount,
                    "Withdrew executor payment"
                );
                amount
            }
            Err(err) if matches!(err.manager_error(), Some(ManagerError::NothingToWithdraw)) => {
                U256::ZERO
            }
            Err(err) => {
                warn!(
                    target: "chugsplash_executor",
                    %manager,
                    %err,
                    "Failed to withdraw executor payment"
                );
                U256::ZERO
            }
        }
    }
}

/// Fails unless `bundles` rebuild the deployment `id` recorded as `state`.
fn ensure_matches(
    id: DeploymentId,
    state: &DeploymentState,
    bundles: &DeploymentBundles,
) -> Result<(), ExecutorError> {
    let matches = bundles.deployment_id(&state.config_uri) == id &&
        bundles.actions.root == state.action_root &&
        bundles.targets.root == state.target_root;
    if matches {
        Ok(())
    } else {
        Err(ExecutorError::BundleMismatch {
            deployment_id: id,
            rebuilt_action_root: bundles.actions.root,
            rebuilt_target_root: bundles.targets.root,
        })
    }
}
