//! An in-process chain hosting the registry and the project managers.
//!
//! Every manager call runs as a transaction: on a snapshot of the manager and behind a journal
//! checkpoint of the world state. A failing call leaves nothing behind but a mined block, like a
//! reverted transaction.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use tracing::{debug, trace};

use crate::{
    constants::{defaults, slots},
    events::RegistryEvent,
    install_proxy, BlockEnv, CallContext, ChugSplashManager, ContractKind, Event, Log,
    ManagerError, ManagerParams, Registry, RegistryError, Role, TxEnv, WorldState,
    MANAGER_RUNTIME_CODE, PROXY_UPDATER_CODE,
};

/// Reasons a transaction is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// No manager lives at the address.
    #[error("no manager at {0}")]
    UnknownManager(Address),
    /// The transaction gas limit is above the block gas limit.
    #[error("gas limit {gas_limit} exceeds the block gas limit {block_gas_limit}")]
    GasLimitTooHigh {
        /// The transaction gas limit.
        gas_limit: u64,
        /// The block gas limit.
        block_gas_limit: u64,
    },
    /// The transaction reverted.
    #[error("transaction reverted: {error}")]
    Reverted {
        /// The reason.
        error: ManagerError,
        /// Gas consumed before the revert.
        gas_used: u64,
    },
    /// A registry call failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ChainError {
    /// The manager error that reverted the transaction.
    pub const fn manager_error(&self) -> Option<&ManagerError> {
        match self {
            Self::Reverted { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Outcome of a successful transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// The block the transaction was included in.
    pub block_number: u64,
    /// Gas consumed.
    pub gas_used: u64,
    /// Logs emitted.
    pub logs: Vec<Log>,
}

/// An in-process chain.
#[derive(Debug)]
pub struct LocalChain {
    world: WorldState,
    registry: Registry,
    managers: BTreeMap<Address, ChugSplashManager>,
    block: BlockEnv,
    logs: Vec<Log>,
    manager_params: ManagerParams,
    nonce: u64,
}

impl LocalChain {
    /// Creates a chain whose registry is administered by `admin`.
    pub fn new(admin: Address) -> Self {
        let mut world = WorldState::new();
        world.set_code(slots::PROXY_UPDATER_ADDRESS, PROXY_UPDATER_CODE);
        world.clear_journal();
        Self {
            world,
            registry: Registry::new(slots::REGISTRY_ADDRESS, admin),
            managers: BTreeMap::new(),
            block: BlockEnv::default(),
            logs: Vec::new(),
            manager_params: ManagerParams::default(),
            nonce: 0,
        }
    }

    /// Sets the parameters of the managers registered from now on.
    pub fn with_manager_params(mut self, params: ManagerParams) -> Self {
        self.manager_params = params;
        self
    }

    /// Sets the block gas limit.
    pub fn with_block_gas_limit(mut self, gas_limit: u64) -> Self {
        self.block.gas_limit = gas_limit;
        self
    }

    /// Sets the base fee.
    pub fn with_base_fee(mut self, base_fee: u128) -> Self {
        self.block.base_fee = base_fee;
        self
    }

    /// The world state.
    pub const fn world(&self) -> &WorldState {
        &self.world
    }

    /// The world state, for setting up accounts outside of transactions.
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    /// The registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The environment of the next block.
    pub const fn block(&self) -> &BlockEnv {
        &self.block
    }

    /// Every log emitted so far.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// The manager at `address`.
    pub fn manager(&self, address: Address) -> Option<&ChugSplashManager> {
        self.managers.get(&address)
    }

    /// Replaces the manager at `address`, keeping its state. Used to plug in custom gas meters,
    /// gas price oracles and contract creators.
    pub fn map_manager(
        &mut self,
        address: Address,
        f: impl FnOnce(ChugSplashManager) -> ChugSplashManager,
    ) -> Result<(), ChainError> {
        let manager = self.managers.remove(&address).ok_or(ChainError::UnknownManager(address))?;
        self.managers.insert(address, f(manager));
        Ok(())
    }

    /// Registers `project_name` and creates its manager, owned by `owner`.
    pub fn register_project(
        &mut self,
        caller: Address,
        project_name: &str,
        owner: Address,
    ) -> Result<Address, ChainError> {
        let manager = self.registry.register(project_name)?;
        self.world.set_code(manager, MANAGER_RUNTIME_CODE);
        self.world.clear_journal();
        self.managers.insert(
            manager,
            ChugSplashManager::new(manager, project_name, owner, self.manager_params),
        );
        let registry = self.registry.address();
        self.push_log(
            registry,
            RegistryEvent::ProjectRegistered {
                project_name: project_name.to_string(),
                creator: caller,
                owner,
                manager,
            }
            .into(),
        );
        debug!(target: "chugsplash::chain", project_name, %manager, "Project registered");
        self.mine();
        Ok(manager)
    }

    /// Grants a registry role.
    pub fn grant_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<(), ChainError> {
        if self.registry.grant_role(caller, role, account)? {
            let registry = self.registry.address();
            self.push_log(registry, RegistryEvent::RoleGranted { role, account }.into());
        }
        self.mine();
        Ok(())
    }

    /// Revokes a registry role.
    pub fn revoke_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<(), ChainError> {
        if self.registry.revoke_role(caller, role, account)? {
            let registry = self.registry.address();
            self.push_log(registry, RegistryEvent::RoleRevoked { role, account }.into());
        }
        self.mine();
        Ok(())
    }

    /// Creates a proxy of `kind` controlled by `admin` and returns its address.
    pub fn deploy_proxy(&mut self, kind: ContractKind, admin: Address) -> Address {
        self.nonce += 1;
        let proxy = self.registry.address().create(self.nonce);
        install_proxy(&mut self.world, proxy, kind, admin);
        self.world.clear_journal();
        self.mine();
        proxy
    }

    /// Sets the balance of `account`.
    pub fn fund(&mut self, account: Address, balance: U256) {
        self.world.set_balance(account, balance);
        self.world.clear_journal();
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance_time(&mut self, seconds: u64) {
        self.block.timestamp += seconds;
    }

    /// Runs `f` against the manager at `manager` as a transaction sent by `caller`.
    pub fn transact<T>(
        &mut self,
        manager: Address,
        caller: Address,
        gas_limit: u64,
        f: impl FnOnce(&mut ChugSplashManager, &mut CallContext<'_>) -> Result<T, ManagerError>,
    ) -> Result<(T, TxReceipt), ChainError> {
        self.transact_with_value(manager, caller, gas_limit, U256::ZERO, f)
    }

    /// Like [`LocalChain::transact`], sending `value` wei along with the call.
    pub fn transact_with_value<T>(
        &mut self,
        manager: Address,
        caller: Address,
        gas_limit: u64,
        value: U256,
        f: impl FnOnce(&mut ChugSplashManager, &mut CallContext<'_>) -> Result<T, ManagerError>,
    ) -> Result<(T, TxReceipt), ChainError> {
        if gas_limit > self.block.gas_limit {
            return Err(ChainError::GasLimitTooHigh {
                gas_limit,
                block_gas_limit: self.block.gas_limit,
            });
        }
        let instance =
            self.managers.get_mut(&manager).ok_or(ChainError::UnknownManager(manager))?;
        let snapshot = instance.clone();
        let checkpoint = self.world.checkpoint();

        let tx = TxEnv { caller, gas_limit, value };
        let mut ctx = CallContext::new(tx, self.block, &mut self.world, &self.registry);
        let result = match ctx.charge(instance.gas_meter().intrinsic_gas()) {
            Ok(()) => f(instance, &mut ctx),
            Err(err) => Err(err.into()),
        };
        let CallContext { logs, gas, .. } = ctx;
        let block_number = self.block.number;

        match result {
            Ok(output) => {
                self.world.commit(checkpoint);
                self.world.clear_journal();
                self.logs.extend(logs.iter().cloned());
                trace!(
                    target: "chugsplash::chain",
                    %manager,
                    %caller,
                    gas_used = gas.used(),
                    "Transaction succeeded"
                );
                self.mine();
                Ok((output, TxReceipt { block_number, gas_used: gas.used(), logs }))
            }
            Err(error) => {
                self.world.revert(checkpoint);
                *instance = snapshot;
                debug!(
                    target: "chugsplash::chain",
                    %manager,
                    %caller,
                    %error,
                    "Transaction reverted"
                );
                self.mine();
                Err(ChainError::Reverted { error, gas_used: gas.used().min(gas_limit) })
            }
        }
    }

    fn push_log(&mut self, address: Address, event: Event) {
        self.logs.push(Log { address, block_number: self.block.number, event });
    }

    fn mine(&mut self) {
        self.block.number += 1;
        self.block.timestamp += defaults::BLOCK_TIME;
    }
}
