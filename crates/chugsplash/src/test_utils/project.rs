use std::collections::BTreeMap;

use alloy_primitives::{address, bytes, Address, Bytes, B256, U256};

use crate::{
    BundleBuilder, ChainError, ChugSplashManager, ContractConfig, ContractKind, DeploymentBundles,
    DeploymentConfig, DeploymentId, DeploymentState, LocalChain, ManagerParams, Role,
    StorageEntry, TxReceipt,
};

/// Administrator of the registry.
pub const REGISTRY_ADMIN: Address = address!("0x00000000000000000000000000000000000a0001");
/// Owner of the test project.
pub const OWNER: Address = address!("0x00000000000000000000000000000000000a0002");
/// An account holding the remote executor role.
pub const EXECUTOR: Address = address!("0x00000000000000000000000000000000000a0003");
/// A second account holding the remote executor role.
pub const OTHER_EXECUTOR: Address = address!("0x00000000000000000000000000000000000a0004");
/// An account holding the protocol payment recipient role.
pub const PROTOCOL_RECIPIENT: Address = address!("0x00000000000000000000000000000000000a0005");
/// An account without any role.
pub const STRANGER: Address = address!("0x00000000000000000000000000000000000a0006");

/// Name of the test project.
pub const PROJECT_NAME: &str = "TestProject";
/// Config URI the test deployments are proposed with.
pub const CONFIG_URI: &str = "memory://test-project";
/// Gas limit of the transactions sent by the helpers.
pub const TX_GAS_LIMIT: u64 = 10_000_000;
/// Initial balance of the owner.
pub const OWNER_BALANCE: u128 = 10_000_000_000_000_000_000;
/// Amount the owner deposits into the manager.
pub const OWNER_DEPOSIT: u128 = 1_000_000_000_000_000_000;

/// Creation code of the implementation in [`sample_config`].
pub const IMPLEMENTATION_CODE: Bytes = bytes!("6080604052348015600f57600080fd5b50");

/// A config with a single proxied contract and two storage writes: three actions and one target.
pub fn sample_config(proxy: Address) -> DeploymentConfig {
    let mut contracts = BTreeMap::new();
    contracts.insert(
        "Token".to_string(),
        ContractConfig {
            kind: ContractKind::Proxy,
            creation_code: IMPLEMENTATION_CODE,
            salt: None,
            proxy: Some(proxy),
            storage: vec![
                StorageEntry { key: B256::with_last_byte(0), value: B256::with_last_byte(42) },
                StorageEntry { key: B256::with_last_byte(1), value: B256::repeat_byte(0x11) },
            ],
            deploy_gas: None,
        },
    );
    DeploymentConfig { project_name: PROJECT_NAME.to_string(), contracts }
}

/// A chain with a registered project, a funded manager and a proxy administered by the manager.
#[derive(Debug)]
pub struct TestProject {
    /// The chain.
    pub chain: LocalChain,
    /// The project's manager.
    pub manager: Address,
    /// A proxy administered by the manager.
    pub proxy: Address,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    /// Creates the project with the default manager parameters.
    pub fn new() -> Self {
        Self::with_params(ManagerParams::default())
    }

    /// Creates the project with `params`.
    pub fn with_params(params: ManagerParams) -> Self {
        let mut chain = LocalChain::new(REGISTRY_ADMIN).with_manager_params(params);
        for (role, account) in [
            (Role::RemoteExecutor, EXECUTOR),
            (Role::RemoteExecutor, OTHER_EXECUTOR),
            (Role::ProtocolPaymentRecipient, PROTOCOL_RECIPIENT),
        ] {
            chain.grant_role(REGISTRY_ADMIN, role, account).expect("grant role");
        }
        let manager =
            chain.register_project(OWNER, PROJECT_NAME, OWNER).expect("register project");
        let proxy = chain.deploy_proxy(ContractKind::Proxy, manager);
        chain.fund(OWNER, U256::from(OWNER_BALANCE));
        let mut project = Self { chain, manager, proxy };
        project.deposit(U256::from(OWNER_DEPOSIT)).expect("deposit");
        project
    }

    /// The manager.
    pub fn manager(&self) -> &ChugSplashManager {
        self.chain.manager(self.manager).expect("manager exists")
    }

    /// The recorded state of `id`.
    pub fn deployment(&self, id: &DeploymentId) -> DeploymentState {
        self.manager().deployment(id).cloned().unwrap_or_default()
    }

    /// The balance of the manager.
    pub fn manager_balance(&self) -> U256 {
        self.chain.world().balance(self.manager)
    }

    /// The bundles of [`sample_config`].
    pub fn bundles(&self) -> DeploymentBundles {
        self.build(&sample_config(self.proxy))
    }

    /// The bundles of `config`.
    pub fn build(&self, config: &DeploymentConfig) -> DeploymentBundles {
        BundleBuilder::new(self.manager).build(config).expect("valid config")
    }

    /// Deposits `amount` from the owner.
    pub fn deposit(&mut self, amount: U256) -> Result<TxReceipt, ChainError> {
        self.chain
            .transact_with_value(self.manager, OWNER, TX_GAS_LIMIT, amount, |manager, ctx| {
                manager.deposit(ctx)
            })
            .map(|(_, receipt)| receipt)
    }

    /// Proposes `bundles` as the owner.
    pub fn propose(
        &mut self,
        bundles: &DeploymentBundles,
        remote_execution: bool,
    ) -> Result<DeploymentId, ChainError> {
        let proposal = bundles.proposal(CONFIG_URI, remote_execution);
        self.chain
            .transact(self.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
                manager.propose(ctx, proposal)
            })
            .map(|(id, _)| id)
    }

    /// Approves `id` as the owner.
    pub fn approve(&mut self, id: DeploymentId) -> Result<TxReceipt, ChainError> {
        self.chain
            .transact(self.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| manager.approve(ctx, id))
            .map(|(_, receipt)| receipt)
    }

    /// Proposes and approves `bundles`.
    pub fn propose_and_approve(
        &mut self,
        bundles: &DeploymentBundles,
        remote_execution: bool,
    ) -> Result<DeploymentId, ChainError> {
        let id = self.propose(bundles, remote_execution)?;
        self.approve(id)?;
        Ok(id)
    }

    /// Claims the active deployment as `executor`.
    pub fn claim(&mut self, executor: Address) -> Result<TxReceipt, ChainError> {
        self.chain
            .transact(self.manager, executor, TX_GAS_LIMIT, |manager, ctx| {
                manager.claim_deployment(ctx)
            })
            .map(|(_, receipt)| receipt)
    }

    /// Executes the actions of `bundles` at `indexes` as `caller`.
    pub fn execute(
        &mut self,
        caller: Address,
        bundles: &DeploymentBundles,
        indexes: &[usize],
    ) -> Result<TxReceipt, ChainError> {
        let selected: Vec<_> =
            indexes.iter().map(|&index| bundles.actions.actions[index].clone()).collect();
        let actions: Vec<_> = selected.iter().map(|bundled| bundled.action.clone()).collect();
        let indexes: Vec<_> = selected.iter().map(|bundled| bundled.index).collect();
        let proofs: Vec<_> = selected.iter().map(|bundled| bundled.proof.clone()).collect();
        self.chain
            .transact(self.manager, caller, TX_GAS_LIMIT, |manager, ctx| {
                manager.execute_actions(ctx, &actions, &indexes, &proofs)
            })
            .map(|(_, receipt)| receipt)
    }

    /// Initiates the upgrade of the targets of `bundles` as `caller`.
    pub fn initiate(
        &mut self,
        caller: Address,
        bundles: &DeploymentBundles,
    ) -> Result<TxReceipt, ChainError> {
        let (targets, proofs) = bundles.targets.split();
        self.chain
            .transact(self.manager, caller, TX_GAS_LIMIT, |manager, ctx| {
                manager.initiate_upgrade(ctx, &targets, &proofs)
            })
            .map(|(_, receipt)| receipt)
    }

    /// Finalizes the upgrade of the targets of `bundles` as `caller`.
    pub fn finalize(
        &mut self,
        caller: Address,
        bundles: &DeploymentBundles,
    ) -> Result<TxReceipt, ChainError> {
        let (targets, proofs) = bundles.targets.split();
        self.chain
            .transact(self.manager, caller, TX_GAS_LIMIT, |manager, ctx| {
                manager.finalize_upgrade(ctx, &targets, &proofs)
            })
            .map(|(_, receipt)| receipt)
    }

    /// Runs every phase of `bundles` as `caller`: deployments, initiation, storage writes and
    /// finalization.
    pub fn execute_all(
        &mut self,
        caller: Address,
        bundles: &DeploymentBundles,
    ) -> Result<(), ChainError> {
        let num_deploys = (bundles.num_non_proxy_contracts + bundles.num_targets()) as usize;
        let deploys: Vec<_> = (0..num_deploys).collect();
        let writes: Vec<_> = (num_deploys..bundles.actions.len()).collect();
        if !deploys.is_empty() {
            self.execute(caller, bundles, &deploys)?;
        }
        if bundles.num_targets() > 0 {
            self.initiate(caller, bundles)?;
        }
        if !writes.is_empty() {
            self.execute(caller, bundles, &writes)?;
        }
        if bundles.num_targets() > 0 {
            self.finalize(caller, bundles)?;
        }
        Ok(())
    }
}
