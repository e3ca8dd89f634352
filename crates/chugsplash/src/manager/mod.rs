//! The deployment manager.
//!
//! A [`ChugSplashManager`] is the authority of a single project. It keeps one
//! [`DeploymentState`] per content-addressed deployment id, allows at most one of them to be
//! active at a time, and only applies actions whose Merkle proofs verify against the roots
//! committed at proposal time.
//!
//! Every operation takes a [`CallContext`]. Operations do not undo their own partial writes when
//! they fail: the caller runs them on a snapshot and discards it on error, the way
//! [`LocalChain::transact`](crate::LocalChain::transact) does.

mod error;
pub use error::*;

mod execution;

mod ledger;
pub use ledger::*;

mod state;
pub use state::*;

use std::sync::Arc;

use alloy_primitives::{
    map::{HashMap, HashSet},
    Address, Bytes, B256, U256,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    constants::defaults,
    deployment_id,
    events::{announcements, ManagerEvent},
    CallContext, ContractCreator, DeploymentId, DeploymentStatus, DirectCreator, EvmGasMeter,
    FixedGasPrice, GasMeter, GasPriceOracle, ProxyAdapter, Registry, Role, WorldState,
};

/// Parameters fixed when a manager is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerParams {
    /// Seconds an executor keeps its claim on a remote deployment.
    pub execution_lock_time: u64,
    /// Funds the owner must leave available to approve a remote deployment.
    pub owner_bond_amount: U256,
    /// Percentage paid to the executor on top of the gas cost.
    pub executor_payment_percentage: u64,
    /// Percentage of the gas cost paid to the protocol.
    pub protocol_payment_percentage: u64,
}

impl Default for ManagerParams {
    fn default() -> Self {
        Self {
            execution_lock_time: defaults::EXECUTION_LOCK_TIME,
            owner_bond_amount: U256::from(defaults::OWNER_BOND_AMOUNT),
            executor_payment_percentage: defaults::EXECUTOR_PAYMENT_PERCENTAGE,
            protocol_payment_percentage: defaults::PROTOCOL_PAYMENT_PERCENTAGE,
        }
    }
}

/// The inputs of [`ChugSplashManager::propose`]. They fully determine the deployment id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Root of the action bundle.
    pub action_root: B256,
    /// Root of the target bundle.
    pub target_root: B256,
    /// Number of actions.
    pub num_actions: u64,
    /// Number of targets.
    pub num_targets: u64,
    /// Number of contracts deployed without a proxy.
    pub num_non_proxy_contracts: u64,
    /// Pointer to the config the bundles were built from.
    pub config_uri: String,
    /// Whether a third-party executor drives the deployment.
    pub remote_execution: bool,
}

impl Proposal {
    /// The id of the proposed deployment.
    pub fn deployment_id(&self) -> DeploymentId {
        deployment_id(
            self.action_root,
            self.target_root,
            self.num_actions,
            self.num_targets,
            self.num_non_proxy_contracts,
            &self.config_uri,
        )
    }
}

/// Flag rejecting nested entries into the guarded operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReentrancyGuard {
    entered: bool,
}

impl ReentrancyGuard {
    /// Marks the guarded section as entered.
    pub fn enter(&mut self) -> Result<(), ManagerError> {
        if self.entered {
            return Err(ManagerError::ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    /// Marks the guarded section as left.
    pub fn exit(&mut self) {
        self.entered = false;
    }

    /// Whether the guarded section is entered.
    pub const fn is_entered(&self) -> bool {
        self.entered
    }
}

/// The manager of a project.
#[derive(Clone, Debug)]
pub struct ChugSplashManager {
    address: Address,
    project_name: String,
    owner: Address,
    params: ManagerParams,
    proposers: HashSet<Address>,
    allow_managed_proposals: bool,
    deployments: HashMap<DeploymentId, DeploymentState>,
    active_deployment_id: Option<DeploymentId>,
    ledger: PaymentLedger,
    guard: ReentrancyGuard,
    gas_meter: Arc<dyn GasMeter>,
    gas_price_oracle: Arc<dyn GasPriceOracle>,
    creator: Arc<dyn ContractCreator>,
}

impl ChugSplashManager {
    /// Creates the manager of `project_name` at `address`.
    pub fn new(
        address: Address,
        project_name: impl Into<String>,
        owner: Address,
        params: ManagerParams,
    ) -> Self {
        Self {
            address,
            project_name: project_name.into(),
            owner,
            params,
            proposers: HashSet::default(),
            allow_managed_proposals: false,
            deployments: HashMap::default(),
            active_deployment_id: None,
            ledger: PaymentLedger::default(),
            guard: ReentrancyGuard::default(),
            gas_meter: Arc::new(EvmGasMeter),
            gas_price_oracle: Arc::new(FixedGasPrice::default()),
            creator: Arc::new(DirectCreator),
        }
    }

    /// Replaces the gas meter.
    pub fn with_gas_meter(mut self, gas_meter: Arc<dyn GasMeter>) -> Self {
        self.gas_meter = gas_meter;
        self
    }

    /// Replaces the gas price oracle.
    pub fn with_gas_price_oracle(mut self, oracle: Arc<dyn GasPriceOracle>) -> Self {
        self.gas_price_oracle = oracle;
        self
    }

    /// Replaces the contract creator.
    pub fn with_contract_creator(mut self, creator: Arc<dyn ContractCreator>) -> Self {
        self.creator = creator;
        self
    }

    /// The manager address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The project name.
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// The owner.
    pub const fn owner(&self) -> Address {
        self.owner
    }

    /// The immutable parameters.
    pub const fn params(&self) -> &ManagerParams {
        &self.params
    }

    /// The gas meter.
    pub fn gas_meter(&self) -> &dyn GasMeter {
        self.gas_meter.as_ref()
    }

    /// The payment ledger.
    pub const fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    /// Whether managed proposers may propose.
    pub const fn allow_managed_proposals(&self) -> bool {
        self.allow_managed_proposals
    }

    /// The deployment recorded for `id`.
    pub fn deployment(&self, id: &DeploymentId) -> Option<&DeploymentState> {
        self.deployments.get(id)
    }

    /// The status of `id`, [`DeploymentStatus::Empty`] if never proposed.
    pub fn deployment_status(&self, id: &DeploymentId) -> DeploymentStatus {
        self.deployments.get(id).map(|deployment| deployment.status).unwrap_or_default()
    }

    /// The id of the active deployment.
    pub const fn active_deployment_id(&self) -> Option<DeploymentId> {
        self.active_deployment_id
    }

    /// The part of the manager balance not owed to executors or the protocol.
    pub fn available_funds(&self, world: &WorldState) -> U256 {
        self.ledger.available_funds(world.balance(self.address))
    }

    /// Whether `account` may propose.
    pub fn is_proposer(&self, registry: &Registry, account: Address) -> bool {
        account == self.owner ||
            self.proposers.contains(&account) ||
            (self.allow_managed_proposals && registry.has_role(Role::ManagedProposer, account))
    }

    /// Records a new deployment in the proposed status.
    pub fn propose(
        &mut self,
        ctx: &mut CallContext<'_>,
        proposal: Proposal,
    ) -> Result<DeploymentId, ManagerError> {
        let proposer = ctx.caller();
        if !self.is_proposer(ctx.registry, proposer) {
            return Err(ManagerError::CallerIsNotProposer(proposer));
        }

        let id = proposal.deployment_id();
        let status = self.deployment_status(&id);
        if !status.is_proposable() {
            return Err(ManagerError::DeploymentStateIsNotProposable { id, status });
        }
        let required = proposal.num_non_proxy_contracts.saturating_add(proposal.num_targets);
        if proposal.num_actions < required {
            return Err(ManagerError::InvalidActionCounts {
                num_actions: proposal.num_actions,
                required,
            });
        }
        ctx.charge(self.gas_meter.calldata_gas(proposal.config_uri.as_bytes()))?;

        self.deployments.insert(
            id,
            DeploymentState {
                status: DeploymentStatus::Proposed,
                action_root: proposal.action_root,
                target_root: proposal.target_root,
                actions: ActionBitmap::new(proposal.num_actions),
                targets: proposal.num_targets,
                actions_executed: 0,
                num_non_proxy_contracts: proposal.num_non_proxy_contracts,
                remote_execution: proposal.remote_execution,
                time_claimed: 0,
                selected_executor: None,
                config_uri: proposal.config_uri.clone(),
            },
        );
        self.emit(
            ctx,
            ManagerEvent::DeploymentProposed {
                deployment_id: id,
                action_root: proposal.action_root,
                target_root: proposal.target_root,
                num_actions: proposal.num_actions,
                num_targets: proposal.num_targets,
                num_non_proxy_contracts: proposal.num_non_proxy_contracts,
                config_uri: proposal.config_uri,
                remote_execution: proposal.remote_execution,
                proposer,
            },
        )?;
        self.announce_event(ctx, announcements::DEPLOYMENT_PROPOSED, None)?;
        info!(
            target: "chugsplash::manager",
            manager = %self.address,
            deployment_id = %id,
            "Deployment proposed"
        );
        Ok(id)
    }

    /// Makes a proposed deployment the active one.
    pub fn approve(
        &mut self,
        ctx: &mut CallContext<'_>,
        id: DeploymentId,
    ) -> Result<(), ManagerError> {
        self.only_owner(ctx)?;
        if self.active_deployment_id.is_some() {
            return Err(ManagerError::AnotherDeploymentInProgress);
        }
        let mut deployment = self.deployments.get(&id).cloned().unwrap_or_default();
        if deployment.status != DeploymentStatus::Proposed {
            return Err(ManagerError::DeploymentIsNotProposed { id, status: deployment.status });
        }
        if deployment.remote_execution {
            let available = self.available_funds(ctx.world);
            if available < self.params.owner_bond_amount {
                return Err(ManagerError::InsufficientOwnerBond {
                    available,
                    required: self.params.owner_bond_amount,
                });
            }
        }

        deployment.status = DeploymentStatus::Approved;
        self.active_deployment_id = Some(id);
        self.emit(ctx, ManagerEvent::DeploymentApproved { deployment_id: id })?;
        self.announce_event(ctx, announcements::DEPLOYMENT_APPROVED, None)?;
        info!(
            target: "chugsplash::manager",
            manager = %self.address,
            deployment_id = %id,
            "Deployment approved"
        );

        if deployment.num_actions() == 0 && deployment.targets == 0 {
            self.complete_deployment(ctx, id, &mut deployment)?;
        }
        self.deployments.insert(id, deployment);
        Ok(())
    }

    /// Claims the active remote deployment for the caller.
    pub fn claim_deployment(&mut self, ctx: &mut CallContext<'_>) -> Result<(), ManagerError> {
        let executor = ctx.caller();
        if !ctx.registry.has_role(Role::RemoteExecutor, executor) {
            return Err(ManagerError::CallerIsNotRemoteExecutor(executor));
        }
        let (id, mut deployment) = self.active_deployment()?;
        if !deployment.remote_execution {
            return Err(ManagerError::RemoteExecutionDisabled);
        }
        if deployment.is_claim_active(ctx.now(), self.params.execution_lock_time) {
            return Err(ManagerError::DeploymentAlreadyClaimed {
                expires_at: deployment.claim_expires_at(self.params.execution_lock_time),
            });
        }

        deployment.time_claimed = ctx.now();
        deployment.selected_executor = Some(executor);
        self.deployments.insert(id, deployment);
        self.emit(ctx, ManagerEvent::DeploymentClaimed { deployment_id: id, executor })?;
        self.announce_event(ctx, announcements::DEPLOYMENT_CLAIMED, None)?;
        Ok(())
    }

    /// Cancels the active deployment.
    ///
    /// The owner bond is forfeited to the selected executor if its claim has not expired.
    /// Proxies that were already initiated stay locked on the updater.
    pub fn cancel_active_deployment(
        &mut self,
        ctx: &mut CallContext<'_>,
    ) -> Result<(), ManagerError> {
        let owner = self.only_owner(ctx)?;
        let (id, mut deployment) = self.active_deployment()?;

        if deployment.remote_execution &&
            deployment.is_claim_active(ctx.now(), self.params.execution_lock_time)
        {
            if let Some(executor) = deployment.selected_executor {
                let amount = self.params.owner_bond_amount;
                self.ledger.forfeit_bond(executor, amount);
                self.emit(
                    ctx,
                    ManagerEvent::OwnerBondForfeited { deployment_id: id, executor, amount },
                )?;
            }
        }

        deployment.status = DeploymentStatus::Cancelled;
        self.active_deployment_id = None;
        self.emit(
            ctx,
            ManagerEvent::DeploymentCancelled {
                deployment_id: id,
                owner,
                actions_executed: deployment.actions_executed,
            },
        )?;
        self.deployments.insert(id, deployment);
        self.announce_event(ctx, announcements::DEPLOYMENT_CANCELLED, None)?;
        info!(
            target: "chugsplash::manager",
            manager = %self.address,
            deployment_id = %id,
            "Deployment cancelled"
        );
        Ok(())
    }

    /// Adds the value of the transaction to the manager balance.
    pub fn deposit(&mut self, ctx: &mut CallContext<'_>) -> Result<(), ManagerError> {
        let from = ctx.caller();
        let amount = ctx.tx.value;
        ctx.world.transfer(from, self.address, amount)?;
        self.emit(ctx, ManagerEvent::ETHDeposited { from, amount })
    }

    /// Sends every available fund to the owner. Only allowed while no deployment is active.
    pub fn withdraw_owner_eth(&mut self, ctx: &mut CallContext<'_>) -> Result<U256, ManagerError> {
        self.guarded(|manager| {
            let owner = manager.only_owner(ctx)?;
            if manager.active_deployment_id.is_some() {
                return Err(ManagerError::AnotherDeploymentInProgress);
            }
            let amount = manager.available_funds(ctx.world);
            if amount.is_zero() {
                return Err(ManagerError::NothingToWithdraw);
            }
            ctx.world.transfer(manager.address, owner, amount)?;
            manager.emit(ctx, ManagerEvent::OwnerWithdrewETH { owner, amount })?;
            Ok(amount)
        })
    }

    /// Pays up to `amount` of the debt towards the caller.
    pub fn claim_executor_payment(
        &mut self,
        ctx: &mut CallContext<'_>,
        amount: U256,
    ) -> Result<U256, ManagerError> {
        self.guarded(|manager| {
            let executor = ctx.caller();
            let balance = ctx.world.balance(manager.address);
            let withdrawn = manager.ledger.executor_withdrawal(executor, amount, balance);
            if withdrawn.is_zero() {
                return Err(ManagerError::NothingToWithdraw);
            }
            let remaining = manager.ledger.debit_executor(executor, withdrawn);
            ctx.world.transfer(manager.address, executor, withdrawn)?;
            manager.emit(
                ctx,
                ManagerEvent::ExecutorPaymentClaimed { executor, withdrawn, remaining },
            )?;
            Ok(withdrawn)
        })
    }

    /// Pays up to `amount` of the debt towards the protocol to the caller.
    pub fn claim_protocol_payment(
        &mut self,
        ctx: &mut CallContext<'_>,
        amount: U256,
    ) -> Result<U256, ManagerError> {
        self.guarded(|manager| {
            let recipient = ctx.caller();
            if !ctx.registry.has_role(Role::ProtocolPaymentRecipient, recipient) {
                return Err(ManagerError::CallerIsNotProtocolPaymentRecipient(recipient));
            }
            let balance = ctx.world.balance(manager.address);
            let withdrawn = manager.ledger.protocol_withdrawal(amount, balance);
            if withdrawn.is_zero() {
                return Err(ManagerError::NothingToWithdraw);
            }
            manager.ledger.debit_protocol(withdrawn);
            ctx.world.transfer(manager.address, recipient, withdrawn)?;
            manager
                .emit(ctx, ManagerEvent::ProtocolPaymentClaimed { recipient, amount: withdrawn })?;
            Ok(withdrawn)
        })
    }

    /// Allows `proposer` to propose deployments.
    pub fn add_proposer(
        &mut self,
        ctx: &mut CallContext<'_>,
        proposer: Address,
    ) -> Result<(), ManagerError> {
        self.only_owner(ctx)?;
        if self.proposers.insert(proposer) {
            self.emit(ctx, ManagerEvent::ProposerAdded { proposer })?;
        }
        Ok(())
    }

    /// Revokes the proposal right of `proposer`.
    pub fn remove_proposer(
        &mut self,
        ctx: &mut CallContext<'_>,
        proposer: Address,
    ) -> Result<(), ManagerError> {
        self.only_owner(ctx)?;
        if self.proposers.remove(&proposer) {
            self.emit(ctx, ManagerEvent::ProposerRemoved { proposer })?;
        }
        Ok(())
    }

    /// Flips whether managed proposers may propose.
    pub fn toggle_allow_managed_proposals(
        &mut self,
        ctx: &mut CallContext<'_>,
    ) -> Result<bool, ManagerError> {
        self.only_owner(ctx)?;
        self.allow_managed_proposals = !self.allow_managed_proposals;
        let allow_managed_proposals = self.allow_managed_proposals;
        self.emit(ctx, ManagerEvent::ToggledManagedProposals { allow_managed_proposals })?;
        Ok(allow_managed_proposals)
    }

    /// Hands the ownership of the manager to `new_owner`.
    pub fn transfer_ownership(
        &mut self,
        ctx: &mut CallContext<'_>,
        new_owner: Address,
    ) -> Result<(), ManagerError> {
        let previous_owner = self.only_owner(ctx)?;
        if new_owner.is_zero() {
            return Err(ManagerError::InvalidNewOwner);
        }
        self.owner = new_owner;
        self.emit(ctx, ManagerEvent::OwnershipTransferred { previous_owner, new_owner })
    }

    /// Hands the control over `proxy` to `new_admin`. Not allowed while a deployment is active.
    pub fn export_proxy(
        &mut self,
        ctx: &mut CallContext<'_>,
        proxy: Address,
        contract_kind_hash: B256,
        new_admin: Address,
    ) -> Result<(), ManagerError> {
        self.only_owner(ctx)?;
        if self.active_deployment_id.is_some() {
            return Err(ManagerError::AnotherDeploymentInProgress);
        }
        let adapter = ctx
            .registry
            .adapters()
            .get(&contract_kind_hash)
            .cloned()
            .ok_or(ManagerError::UnsupportedContractKind(contract_kind_hash))?;
        adapter.change_proxy_admin(ctx.world, self.address, proxy, new_admin)?;
        ctx.charge(self.gas_meter.proxy_update_gas())?;
        self.emit(ctx, ManagerEvent::ProxyExported { proxy, contract_kind_hash, new_admin })
    }

    /// Publishes `event_name` on the registry announcement feed.
    pub fn announce(
        &mut self,
        ctx: &mut CallContext<'_>,
        event_name: &str,
    ) -> Result<(), ManagerError> {
        self.only_owner(ctx)?;
        self.announce_event(ctx, event_name, None)
    }

    /// Publishes `event_name` with an opaque payload on the registry announcement feed.
    pub fn announce_with_data(
        &mut self,
        ctx: &mut CallContext<'_>,
        event_name: &str,
        data: Bytes,
    ) -> Result<(), ManagerError> {
        self.only_owner(ctx)?;
        self.announce_event(ctx, event_name, Some(data))
    }

    fn only_owner(&self, ctx: &CallContext<'_>) -> Result<Address, ManagerError> {
        let caller = ctx.caller();
        if caller == self.owner {
            Ok(caller)
        } else {
            Err(ManagerError::CallerIsNotOwner(caller))
        }
    }

    fn active_deployment(&self) -> Result<(DeploymentId, DeploymentState), ManagerError> {
        let id = self.active_deployment_id.ok_or(ManagerError::NoActiveDeployment)?;
        let deployment =
            self.deployments.get(&id).cloned().ok_or(ManagerError::NoActiveDeployment)?;
        Ok((id, deployment))
    }

    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ManagerError>,
    ) -> Result<T, ManagerError> {
        self.guard.enter()?;
        let result = f(self);
        self.guard.exit();
        result
    }

    fn emit(&self, ctx: &mut CallContext<'_>, event: ManagerEvent) -> Result<(), ManagerError> {
        ctx.charge(self.gas_meter.log_gas())?;
        ctx.emit(self.address, event);
        Ok(())
    }

    fn announce_event(
        &self,
        ctx: &mut CallContext<'_>,
        event_name: &str,
        data: Option<Bytes>,
    ) -> Result<(), ManagerError> {
        ctx.charge(self.gas_meter.log_gas())?;
        ctx.announce(self.address, event_name, data)?;
        Ok(())
    }

    fn complete_deployment(
        &mut self,
        ctx: &mut CallContext<'_>,
        id: DeploymentId,
        deployment: &mut DeploymentState,
    ) -> Result<(), ManagerError> {
        deployment.status = DeploymentStatus::Completed;
        self.active_deployment_id = None;
        let executor = ctx.caller();
        self.emit(ctx, ManagerEvent::DeploymentCompleted { deployment_id: id, executor })?;
        self.announce_event(ctx, announcements::DEPLOYMENT_COMPLETED, None)?;
        info!(
            target: "chugsplash::manager",
            manager = %self.address,
            deployment_id = %id,
            "Deployment completed"
        );
        Ok(())
    }
}
