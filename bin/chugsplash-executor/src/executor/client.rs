use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use chugsplash::{
    BlockEnv, BundledAction, ChainError, DeploymentId, DeploymentState, LocalChain, Log,
    ManagerParams, TargetBundle, TxReceipt,
};
use tokio::sync::Mutex;

/// The chain access an executor needs.
///
/// Every transaction is sent from [`ManagerClient::sender`].
#[async_trait]
pub trait ManagerClient: Send + Sync {
    /// The account transactions are sent from.
    fn sender(&self) -> Address;

    /// The block the next transaction lands in.
    async fn block(&self) -> BlockEnv;

    /// Every log emitted after the first `cursor` logs.
    async fn logs_since(&self, cursor: usize) -> Vec<Log>;

    /// The immutable parameters of `manager`.
    async fn manager_params(&self, manager: Address) -> Result<ManagerParams, ChainError>;

    /// The active deployment of `manager`.
    async fn active_deployment(&self, manager: Address) -> Result<Option<DeploymentId>, ChainError>;

    /// The recorded state of `id`.
    async fn deployment(
        &self,
        manager: Address,
        id: DeploymentId,
    ) -> Result<Option<DeploymentState>, ChainError>;

    /// Claims the active remote deployment of `manager`.
    async fn claim_deployment(&self, manager: Address, gas_limit: u64)
        -> Result<TxReceipt, ChainError>;

    /// Executes `actions` against the active deployment of `manager`.
    async fn execute_actions(
        &self,
        manager: Address,
        actions: &[BundledAction],
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError>;

    /// Locks every proxy of `targets` on the updater.
    async fn initiate_upgrade(
        &self,
        manager: Address,
        targets: &TargetBundle,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError>;

    /// Points every proxy of `targets` at its new implementation.
    async fn finalize_upgrade(
        &self,
        manager: Address,
        targets: &TargetBundle,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError>;

    /// Withdraws up to `amount` of the payments owed to the sender.
    async fn claim_executor_payment(
        &self,
        manager: Address,
        amount: U256,
        gas_limit: u64,
    ) -> Result<U256, ChainError>;

    /// The code at `address`.
    async fn code(&self, address: Address) -> Bytes;

    /// The implementation `proxy` points at.
    async fn implementation_of(&self, proxy: Address) -> Address;
}

/// A client of an in-process [`LocalChain`].
#[derive(Clone, Debug)]
pub struct LocalClient {
    chain: Arc<Mutex<LocalChain>>,
    sender: Address,
}

impl LocalClient {
    /// Sends from `sender` to `chain`.
    pub const fn new(chain: Arc<Mutex<LocalChain>>, sender: Address) -> Self {
        Self { chain, sender }
    }

    /// The chain.
    pub const fn chain(&self) -> &Arc<Mutex<LocalChain>> {
        &self.chain
    }
}

#[async_trait]
impl ManagerClient for LocalClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn block(&self) -> BlockEnv {
        *self.chain.lock().await.block()
    }

    async fn logs_since(&self, cursor: usize) -> Vec<Log> {
        let chain = self.chain.lock().await;
        chain.logs().get(cursor..).map(<[Log]>::to_vec).unwrap_or_default()
    }

    async fn manager_params(&self, manager: Address) -> Result<ManagerParams, ChainError> {
        let chain = self.chain.lock().await;
        let manager = chain.manager(manager).ok_or(ChainError::UnknownManager(manager))?;
        Ok(*manager.params())
    }

    async fn active_deployment(
        &self,
        manager: Address,
    ) -> Result<Option<DeploymentId>, ChainError> {
        let chain = self.chain.lock().await;
        let manager = chain.manager(manager).ok_or(ChainError::UnknownManager(manager))?;
        Ok(manager.active_deployment_id())
    }

    async fn deployment(
        &self,
        manager: Address,
        id: DeploymentId,
    ) -> Result<Option<DeploymentState>, ChainError> {
        let chain = self.chain.lock().await;
        let manager = chain.manager(manager).ok_or(ChainError::UnknownManager(manager))?;
        Ok(manager.deployment(&id).cloned())
    }

    async fn claim_deployment(
        &self,
        manager: Address,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        let mut chain = self.chain.lock().await;
        chain
            .transact(manager, self.sender, gas_limit, |manager, ctx| manager.claim_deployment(ctx))
            .map(|(_, receipt)| receipt)
    }

    async fn execute_actions(
        &self,
        manager: Address,
        actions: &[BundledAction],
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        let raw: Vec<_> = actions.iter().map(|bundled| bundled.action.clone()).collect();
        let indexes: Vec<_> = actions.iter().map(|bundled| bundled.index).collect();
        let proofs: Vec<_> = actions.iter().map(|bundled| bundled.proof.clone()).collect();
        let mut chain = self.chain.lock().await;
        chain
            .transact(manager, self.sender, gas_limit, |manager, ctx| {
                manager.execute_actions(ctx, &raw, &indexes, &proofs)
            })
            .map(|(_, receipt)| receipt)
    }

    async fn initiate_upgrade(
        &self,
        manager: Address,
        targets: &TargetBundle,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        let (targets, proofs) = targets.split();
        let mut chain = self.chain.lock().await;
        chain
            .transact(manager, self.sender, gas_limit, |manager, ctx| {
                manager.initiate_upgrade(ctx, &targets, &proofs)
            })
            .map(|(_, receipt)| receipt)
    }

    async fn finalize_upgrade(
        &self,
        manager: Address,
        targets: &TargetBundle,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        let (targets, proofs) = targets.split();
        let mut chain = self.chain.lock().await;
        chain
            .transact(manager, self.sender, gas_limit, |manager, ctx| {
                manager.finalize_upgrade(ctx, &targets, &proofs)
            })
            .map(|(_, receipt)| receipt)
    }

    async fn claim_executor_payment(
        &self,
        manager: Address,
        amount: U256,
        gas_limit: u64,
    ) -> Result<U256, ChainError> {
        let mut chain = self.chain.lock().await;
        chain
            .transact(manager, self.sender, gas_limit, |manager, ctx| {
                manager.claim_executor_payment(ctx, amount)
            })
            .map(|(withdrawn, _)| withdrawn)
    }

    async fn code(&self, address: Address) -> Bytes {
        self.chain.lock().await.world().code(address)
    }

    async fn implementation_of(&self, proxy: Address) -> Address {
        self.chain.lock().await.world().implementation_of(proxy)
    }
}
