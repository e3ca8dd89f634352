//! Execution of the active deployment: actions, proxy initiation and upgrade finalization.
//!
//! Every entry point validates its whole input before it applies anything, so a batch either
//! fails without side effects or runs to the end. Indexes that are already executed, including
//! indexes repeated within the same batch, are skipped.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use tracing::{debug, warn};

use super::{execution_payments, ChugSplashManager, DeploymentState, ManagerError};
use crate::{
    constants::defaults,
    events::{announcements, ManagerEvent},
    merkle::verify_proof,
    ActionType, CallContext, ContractCreator, DeploymentId, DeploymentStatus, GasMeter,
    GasPriceOracle, ProxyAdapter, RawAction, Target,
};

/// An action whose proof and payload have been checked.
enum Step {
    Deploy { salt: B256, creation_code: Bytes },
    SetStorage { adapter: Arc<dyn ProxyAdapter>, key: B256, value: B256 },
}

enum DeployOutcome {
    Deployed,
    Skipped,
    Failed(String),
}

impl ChugSplashManager {
    /// Executes a batch of actions of the active deployment.
    ///
    /// `indexes` are positions in the committed action bundle and `proofs` their Merkle proofs.
    /// A failing constructor marks the deployment as failed without rejecting the call.
    pub fn execute_actions(
        &mut self,
        ctx: &mut CallContext<'_>,
        actions: &[RawAction],
        indexes: &[u64],
        proofs: &[Vec<B256>],
    ) -> Result<(), ManagerError> {
        self.guarded(|manager| manager.execute_actions_inner(ctx, actions, indexes, proofs))
    }

    /// Points every proxy of the active deployment at the proxy updater.
    ///
    /// Requires every contract deployment of the bundle to be executed.
    pub fn initiate_upgrade(
        &mut self,
        ctx: &mut CallContext<'_>,
        targets: &[Target],
        proofs: &[Vec<B256>],
    ) -> Result<(), ManagerError> {
        self.guarded(|manager| manager.initiate_upgrade_inner(ctx, targets, proofs))
    }

    /// Points every proxy of the active deployment at its new implementation and completes the
    /// deployment.
    ///
    /// Requires every action of the bundle to be executed.
    pub fn finalize_upgrade(
        &mut self,
        ctx: &mut CallContext<'_>,
        targets: &[Target],
        proofs: &[Vec<B256>],
    ) -> Result<(), ManagerError> {
        self.guarded(|manager| manager.finalize_upgrade_inner(ctx, targets, proofs))
    }

    fn execute_actions_inner(
        &mut self,
        ctx: &mut CallContext<'_>,
        actions: &[RawAction],
        indexes: &[u64],
        proofs: &[Vec<B256>],
    ) -> Result<(), ManagerError> {
        let (id, mut deployment) = self.active_deployment()?;
        let executor = self.ensure_executor(ctx, &deployment)?;
        if actions.len() != indexes.len() || actions.len() != proofs.len() {
            return Err(ManagerError::ArrayLengthMismatch);
        }

        let num_actions = deployment.num_actions();
        let mut steps = Vec::with_capacity(actions.len());
        for ((action, &index), proof) in actions.iter().zip(indexes).zip(proofs) {
            ctx.charge(
                self.gas_meter.calldata_gas(&action.data) + self.gas_meter.proof_gas(proof.len()),
            )?;
            if index >= num_actions {
                return Err(ManagerError::InvalidActionIndex(index));
            }
            if !verify_proof(deployment.action_root, action.leaf_hash(), index, proof, num_actions)
            {
                return Err(ManagerError::InvalidMerkleProof(index));
            }
            let step = match action.action_type {
                ActionType::DeployContract => {
                    let data = action
                        .decode_deploy_contract()
                        .ok_or(ManagerError::InvalidActionData(index))?;
                    Step::Deploy { salt: data.salt, creation_code: data.creationCode }
                }
                ActionType::SetStorage => {
                    if deployment.status != DeploymentStatus::ProxiesInitiated {
                        return Err(ManagerError::ProxiesNotInitiated);
                    }
                    let data =
                        action.decode_set_storage().ok_or(ManagerError::InvalidActionData(index))?;
                    let adapter = self.adapter(ctx, action.contract_kind_hash)?;
                    Step::SetStorage { adapter, key: data.key, value: data.value }
                }
            };
            steps.push((action, index, step));
        }

        let mut applied = false;
        let mut failed = false;
        for (action, index, step) in steps {
            if !deployment.actions.set(index) {
                debug!(
                    target: "chugsplash::manager",
                    action_index = index,
                    "Action already executed"
                );
                continue;
            }
            deployment.actions_executed += 1;
            applied = true;
            self.emit(
                ctx,
                ManagerEvent::ActionExecuted {
                    deployment_id: id,
                    executor,
                    action_index: index,
                    reference_name: action.reference_name.clone(),
                },
            )?;

            match step {
                Step::Deploy { salt, creation_code } => {
                    let outcome = self.deploy_contract(ctx, id, action, salt, &creation_code)?;
                    if let DeployOutcome::Failed(reason) = outcome {
                        self.fail_deployment(ctx, id, &mut deployment, action, reason)?;
                        failed = true;
                        break;
                    }
                }
                Step::SetStorage { adapter, key, value } => {
                    let previous =
                        adapter.set_storage(ctx.world, self.address, action.addr, key, value)?;
                    ctx.charge(self.gas_meter.set_storage_gas(previous, value))?;
                }
            }
        }

        if applied && !failed && deployment.all_actions_executed() && deployment.targets == 0 {
            self.complete_deployment(ctx, id, &mut deployment)?;
        }
        if applied && deployment.remote_execution {
            self.pay_executor(ctx, executor)?;
        }
        self.deployments.insert(id, deployment);
        Ok(())
    }

    fn initiate_upgrade_inner(
        &mut self,
        ctx: &mut CallContext<'_>,
        targets: &[Target],
        proofs: &[Vec<B256>],
    ) -> Result<(), ManagerError> {
        let (id, mut deployment) = self.active_deployment()?;
        let executor = self.ensure_executor(ctx, &deployment)?;
        if deployment.status != DeploymentStatus::Approved {
            return Err(ManagerError::DeploymentIsNotApproved(deployment.status));
        }
        if deployment.actions_executed < deployment.num_deploy_actions() {
            return Err(ManagerError::ContractDeploymentsIncomplete {
                executed: deployment.actions_executed,
                required: deployment.num_deploy_actions(),
            });
        }

        let adapters = self.verify_targets(ctx, &deployment, targets, proofs)?;
        for (target, adapter) in targets.iter().zip(adapters) {
            adapter.initiate_execution(ctx.world, self.address, target.proxy)?;
            ctx.charge(self.gas_meter.proxy_update_gas())?;
        }

        deployment.status = DeploymentStatus::ProxiesInitiated;
        self.emit(ctx, ManagerEvent::ProxiesInitiated { deployment_id: id, executor })?;
        if deployment.remote_execution {
            self.pay_executor(ctx, executor)?;
        }
        self.deployments.insert(id, deployment);
        Ok(())
    }

    fn finalize_upgrade_inner(
        &mut self,
        ctx: &mut CallContext<'_>,
        targets: &[Target],
        proofs: &[Vec<B256>],
    ) -> Result<(), ManagerError> {
        let (id, mut deployment) = self.active_deployment()?;
        let executor = self.ensure_executor(ctx, &deployment)?;
        if deployment.status != DeploymentStatus::ProxiesInitiated {
            return Err(ManagerError::ProxiesNotInitiated);
        }
        if !deployment.all_actions_executed() {
            return Err(ManagerError::FinalizedUpgradeTooEarly {
                executed: deployment.actions_executed,
                total: deployment.num_actions(),
            });
        }

        let adapters = self.verify_targets(ctx, &deployment, targets, proofs)?;
        for (target, adapter) in targets.iter().zip(adapters) {
            adapter.complete_execution(
                ctx.world,
                self.address,
                target.proxy,
                target.implementation,
            )?;
            ctx.charge(self.gas_meter.proxy_update_gas())?;
            self.emit(
                ctx,
                ManagerEvent::ProxyUpgraded {
                    deployment_id: id,
                    proxy: target.proxy,
                    implementation: target.implementation,
                },
            )?;
        }

        self.complete_deployment(ctx, id, &mut deployment)?;
        if deployment.remote_execution {
            self.pay_executor(ctx, executor)?;
        }
        self.deployments.insert(id, deployment);
        Ok(())
    }

    fn ensure_executor(
        &self,
        ctx: &CallContext<'_>,
        deployment: &DeploymentState,
    ) -> Result<Address, ManagerError> {
        let caller = ctx.caller();
        if deployment.remote_execution {
            if deployment.selected_executor == Some(caller) {
                Ok(caller)
            } else {
                Err(ManagerError::CallerIsNotSelectedExecutor(caller))
            }
        } else if caller == self.owner {
            Ok(caller)
        } else {
            Err(ManagerError::CallerIsNotOwner(caller))
        }
    }

    fn adapter(
        &self,
        ctx: &CallContext<'_>,
        kind_hash: B256,
    ) -> Result<Arc<dyn ProxyAdapter>, ManagerError> {
        ctx.registry
            .adapters()
            .get(&kind_hash)
            .cloned()
            .ok_or(ManagerError::UnsupportedContractKind(kind_hash))
    }

    /// Checks that `targets` is exactly the committed target set, in order, and resolves the
    /// adapter of every target.
    fn verify_targets(
        &self,
        ctx: &mut CallContext<'_>,
        deployment: &DeploymentState,
        targets: &[Target],
        proofs: &[Vec<B256>],
    ) -> Result<Vec<Arc<dyn ProxyAdapter>>, ManagerError> {
        if targets.len() as u64 != deployment.targets {
            return Err(ManagerError::IncorrectNumberOfTargets {
                expected: deployment.targets,
                actual: targets.len() as u64,
            });
        }
        if proofs.len() != targets.len() {
            return Err(ManagerError::ArrayLengthMismatch);
        }

        let mut adapters = Vec::with_capacity(targets.len());
        for (index, (target, proof)) in (0u64..).zip(targets.iter().zip(proofs)) {
            ctx.charge(self.gas_meter.proof_gas(proof.len()))?;
            let leaf = target.leaf_hash();
            if !verify_proof(deployment.target_root, leaf, index, proof, deployment.targets) {
                return Err(ManagerError::InvalidMerkleProof(index));
            }
            adapters.push(self.adapter(ctx, target.contract_kind_hash)?);
        }
        Ok(adapters)
    }

    fn deploy_contract(
        &self,
        ctx: &mut CallContext<'_>,
        id: DeploymentId,
        action: &RawAction,
        salt: B256,
        creation_code: &Bytes,
    ) -> Result<DeployOutcome, ManagerError> {
        let address = self.address.create2_from_code(salt.0, creation_code);
        if address != action.addr {
            return Ok(DeployOutcome::Failed(format!(
                "contract address mismatch: expected {}, got {address}",
                action.addr
            )));
        }
        if ctx.world.has_code(address) {
            self.emit(
                ctx,
                ManagerEvent::ContractDeploymentSkipped {
                    deployment_id: id,
                    reference_name: action.reference_name.clone(),
                    contract_address: address,
                },
            )?;
            return Ok(DeployOutcome::Skipped);
        }

        let runtime_code = match self.creator.create(address, creation_code) {
            Ok(code) => code,
            Err(err) => return Ok(DeployOutcome::Failed(err.to_string())),
        };
        ctx.charge(self.gas_meter.deploy_contract_gas(creation_code, &runtime_code))?;
        ctx.world.set_code(address, runtime_code);
        self.emit(
            ctx,
            ManagerEvent::ContractDeployed {
                deployment_id: id,
                reference_name: action.reference_name.clone(),
                contract_address: address,
            },
        )?;
        Ok(DeployOutcome::Deployed)
    }

    fn fail_deployment(
        &mut self,
        ctx: &mut CallContext<'_>,
        id: DeploymentId,
        deployment: &mut DeploymentState,
        action: &RawAction,
        reason: String,
    ) -> Result<(), ManagerError> {
        warn!(
            target: "chugsplash::manager",
            deployment_id = %id,
            reference_name = %action.reference_name,
            %reason,
            "Contract deployment failed"
        );
        deployment.status = DeploymentStatus::Failed;
        self.active_deployment_id = None;
        self.emit(
            ctx,
            ManagerEvent::DeploymentFailed {
                deployment_id: id,
                reference_name: action.reference_name.clone(),
                reason,
            },
        )?;
        self.announce_event(ctx, announcements::DEPLOYMENT_FAILED, None)
    }

    /// Credits the executor and the protocol for the gas consumed by the current call.
    fn pay_executor(
        &mut self,
        ctx: &mut CallContext<'_>,
        executor: Address,
    ) -> Result<(), ManagerError> {
        ctx.charge(defaults::PAYMENT_GAS_OVERHEAD)?;
        let gas_price = self.gas_price_oracle.gas_price(&ctx.block);
        let (executor_payment, protocol_payment) =
            execution_payments(ctx.gas.used(), gas_price, &self.params);
        self.ledger.credit_execution(executor, executor_payment, protocol_payment);
        ctx.emit(
            self.address,
            ManagerEvent::ExecutorPaid { executor, executor_payment, protocol_payment },
        );
        Ok(())
    }
}
