use std::{fmt, sync::Arc};

use alloy_primitives::{Address, U256};
use chugsplash::{
    find_max_batch_size, ActionCostModel, ActionType, BundleCostModel, BundledAction,
    events::ManagerEvent, DeploymentBundles, DeploymentId, DeploymentState, DeploymentStatus,
    ManagerError,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{ExecutorError, ManagerClient};

/// How a deployment is split into transactions.
#[derive(Clone)]
pub struct ExecutionSettings {
    /// Gas limit of every transaction, and the budget batches are sized against.
    pub gas_budget: u64,
    /// Estimates the gas of a batch.
    pub cost_model: Arc<dyn ActionCostModel + Send + Sync>,
    /// Upper bound on the number of actions per batch.
    pub max_batch_size: Option<usize>,
}

impl ExecutionSettings {
    /// Batches bounded by `block_gas_limit / divisor`, priced with the bundle estimates.
    pub fn for_block(block_gas_limit: u64, divisor: u64) -> Self {
        Self {
            gas_budget: block_gas_limit / divisor.max(1),
            cost_model: Arc::new(BundleCostModel::default()),
            max_batch_size: None,
        }
    }
}

impl fmt::Debug for ExecutionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSettings")
            .field("gas_budget", &self.gas_budget)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}

/// Summary of an executed deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// The deployment.
    pub deployment_id: DeploymentId,
    /// Its manager.
    pub manager: Address,
    /// Number of actions of every `execute_actions` transaction, in order.
    pub batch_sizes: Vec<usize>,
    /// Number of transactions sent.
    pub transactions: u64,
    /// Gas used by all transactions.
    pub gas_used: u64,
    /// Payment withdrawn by the executor afterwards.
    pub withdrawn: U256,
}

impl ExecutionReport {
    fn record_transaction(&mut self, gas_used: u64) {
        self.transactions += 1;
        self.gas_used += gas_used;
    }
}

/// Drives the approved deployment `id` of `manager` to completion.
///
/// Contract deployments are executed first, then every proxy is locked, the storage writes are
/// applied, and the upgrade is finalized. Every step starts from a fresh read of the deployment,
/// so an interrupted run can be resumed. Completed deployments are verified against the chain.
pub async fn execute_deployment<C>(
    client: &C,
    manager: Address,
    id: DeploymentId,
    bundles: &DeploymentBundles,
    settings: &ExecutionSettings,
) -> Result<ExecutionReport, ExecutorError>
where
    C: ManagerClient + ?Sized,
{
    let mut report = ExecutionReport { deployment_id: id, manager, ..Default::default() };
    let num_deploys = (bundles.num_non_proxy_contracts + bundles.num_targets()) as usize;
    let (deploys, writes) =
        bundles.actions.actions.split_at(num_deploys.min(bundles.actions.actions.len()));

    info!(
        target: "chugsplash_executor::execute",
        %manager,
        %id,
        actions = bundles.actions.len(),
        targets = bundles.targets.len(),
        "Executing deployment"
    );
    execute_batches(client, manager, id, deploys, settings, &mut report).await?;

    if refresh(client, manager, id).await?.status == DeploymentStatus::Approved &&
        !bundles.targets.is_empty()
    {
        let receipt =
            client.initiate_upgrade(manager, &bundles.targets, settings.gas_budget).await?;
        debug!(
            target: "chugsplash_executor::execute",
            gas_used = receipt.gas_used,
            "Initiated upgrade"
        );
        report.record_transaction(receipt.gas_used);
    }

    execute_batches(client, manager, id, writes, settings, &mut report).await?;

    if refresh(client, manager, id).await?.status == DeploymentStatus::ProxiesInitiated {
        let receipt =
            client.finalize_upgrade(manager, &bundles.targets, settings.gas_budget).await?;
        debug!(
            target: "chugsplash_executor::execute",
            gas_used = receipt.gas_used,
            "Finalized upgrade"
        );
        report.record_transaction(receipt.gas_used);
    }

    let state = refresh(client, manager, id).await?;
    if state.status != DeploymentStatus::Completed {
        return Err(ExecutorError::DeploymentAborted { deployment_id: id, status: state.status });
    }
    verify_deployment(client, bundles).await?;
    info!(
        target: "chugsplash_executor::execute",
        %id,
        transactions = report.transactions,
        gas_used = report.gas_used,
        "Deployment completed"
    );
    Ok(report)
}

/// Executes every action of `actions` the deployment has not executed yet.
///
/// Batches are the largest prefix of the pending actions that fits into the gas budget. A batch
/// that runs out of gas regardless halves the batch size for the rest of the phase.
async fn execute_batches<C>(
    client: &C,
    manager: Address,
    id: DeploymentId,
    actions: &[BundledAction],
    settings: &ExecutionSettings,
    report: &mut ExecutionReport,
) -> Result<(), ExecutorError>
where
    C: ManagerClient + ?Sized,
{
    let mut max_batch_size = settings.max_batch_size.unwrap_or(usize::MAX);
    loop {
        let state = refresh(client, manager, id).await?;
        let pending: Vec<_> =
            actions.iter().filter(|bundled| !state.actions.get(bundled.index)).cloned().collect();
        if pending.is_empty() {
            return Ok(());
        }

        let candidates = &pending[..pending.len().min(max_batch_size)];
        let size =
            match find_max_batch_size(candidates, settings.cost_model.as_ref(), settings.gas_budget)
            {
                Some(size) if size > 0 => size,
                _ => return Err(ExecutorError::UnableToFindBatchSize),
            };

        match client.execute_actions(manager, &candidates[..size], settings.gas_budget).await {
            Ok(receipt) => {
                debug!(
                    target: "chugsplash_executor::execute",
                    size,
                    gas_used = receipt.gas_used,
                    "Executed batch"
                );
                report.batch_sizes.push(size);
                report.record_transaction(receipt.gas_used);
            }
            Err(err) if err.manager_error().is_some_and(ManagerError::is_out_of_gas) => {
                if size == 1 {
                    return Err(ExecutorError::UnableToFindBatchSize);
                }
                warn!(
                    target: "chugsplash_executor::execute",
                    size,
                    "Batch ran out of gas, halving the batch size"
                );
                max_batch_size = size / 2;
            }
            Err(err) => {
                let batch = &candidates[..size];
                let failing = err.manager_error().and_then(|err| failing_action(err, batch));
                let reference_names: Vec<_> =
                    batch.iter().map(|bundled| bundled.action.reference_name.as_str()).collect();
                error!(
                    target: "chugsplash_executor::execute",
                    %id,
                    %err,
                    failing = failing.unwrap_or_default(),
                    ?reference_names,
                    "Batch reverted"
                );
                return Err(err.into());
            }
        }
    }
}

/// Reference name of the action of `batch` a revert points at.
fn failing_action<'a>(err: &ManagerError, batch: &'a [BundledAction]) -> Option<&'a str> {
    let index = match err {
        ManagerError::InvalidMerkleProof(index) | ManagerError::InvalidActionIndex(index) => *index,
        _ => return None,
    };
    batch
        .iter()
        .find(|bundled| bundled.index == index)
        .map(|bundled| bundled.action.reference_name.as_str())
}

/// The current state of `id`, failing once it can no longer be executed.
async fn refresh<C>(
    client: &C,
    manager: Address,
    id: DeploymentId,
) -> Result<DeploymentState, ExecutorError>
where
    C: ManagerClient + ?Sized,
{
    let state = client
        .deployment(manager, id)
        .await?
        .ok_or(ExecutorError::UnknownDeployment { manager, deployment_id: id })?;
    match state.status {
        DeploymentStatus::Failed => Err(failure(client, manager, id).await),
        DeploymentStatus::Cancelled => {
            Err(ExecutorError::DeploymentAborted { deployment_id: id, status: state.status })
        }
        _ => Ok(state),
    }
}

/// Describes the failed deployment `id` from its `DeploymentFailed` event.
async fn failure<C>(client: &C, manager: Address, id: DeploymentId) -> ExecutorError
where
    C: ManagerClient + ?Sized,
{
    let logs = client.logs_since(0).await;
    let failed = logs
        .iter()
        .rev()
        .filter(|log| log.address == manager)
        .filter_map(|log| log.event.as_manager())
        .find_map(|event| match event {
            ManagerEvent::DeploymentFailed { deployment_id, reference_name, reason }
                if *deployment_id == id =>
            {
                Some((reference_name.clone(), reason.clone()))
            }
            _ => None,
        });
    match failed {
        Some((reference_name, reason)) => {
            ExecutorError::DeploymentFailed { deployment_id: id, reference_name, reason }
        }
        None => ExecutorError::DeploymentAborted {
            deployment_id: id,
            status: DeploymentStatus::Failed,
        },
    }
}

/// Checks that every deployed contract has code and every proxy points at its implementation.
pub async fn verify_deployment<C>(
    client: &C,
    bundles: &DeploymentBundles,
) -> Result<(), ExecutorError>
where
    C: ManagerClient + ?Sized,
{
    for bundled in &bundles.actions.actions {
        let action = &bundled.action;
        if action.action_type == ActionType::DeployContract &&
            client.code(action.addr).await.is_empty()
        {
            return Err(ExecutorError::VerificationFailed {
                reference_name: action.reference_name.clone(),
                reason: format!("no code at {}", action.addr),
            });
        }
    }
    for bundled in &bundles.targets.targets {
        let target = &bundled.target;
        let implementation = client.implementation_of(target.proxy).await;
        if implementation != target.implementation {
            return Err(ExecutorError::VerificationFailed {
                reference_name: target.reference_name.clone(),
                reason: format!(
                    "proxy {} points at {implementation} instead of {}",
                    target.proxy, target.implementation
                ),
            });
        }
    }
    Ok(())
}
