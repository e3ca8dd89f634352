//! Tests for batch sizing and local execution through the execution driver.

use std::sync::{Arc, Mutex as StdMutex};

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use chugsplash::{
    test_utils::*, ActionCostModel, BlockEnv, BundledAction, ChainError, DeploymentId,
    DeploymentState, DeploymentStatus, LocalChain, Log, ManagerError, ManagerParams, OutOfGas,
    TargetBundle, TxReceipt,
};
use chugsplash_executor::executor::{
    execute_deployment, ExecutionSettings, ExecutorError, LocalClient, ManagerClient,
};
use rstest::rstest;
use tokio::sync::Mutex;

/// Runs out of gas for every batch above `max_actions`.
struct LimitedClient {
    inner: LocalClient,
    max_actions: usize,
    attempts: StdMutex<Vec<usize>>,
}

impl LimitedClient {
    fn new(inner: LocalClient, max_actions: usize) -> Self {
        Self { inner, max_actions, attempts: StdMutex::new(Vec::new()) }
    }

    fn attempts(&self) -> Vec<usize> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManagerClient for LimitedClient {
    fn sender(&self) -> Address {
        self.inner.sender()
    }

    async fn block(&self) -> BlockEnv {
        self.inner.block().await
    }

    async fn logs_since(&self, cursor: usize) -> Vec<Log> {
        self.inner.logs_since(cursor).await
    }

    async fn manager_params(&self, manager: Address) -> Result<ManagerParams, ChainError> {
        self.inner.manager_params(manager).await
    }

    async fn active_deployment(
        &self,
        manager: Address,
    ) -> Result<Option<DeploymentId>, ChainError> {
        self.inner.active_deployment(manager).await
    }

    async fn deployment(
        &self,
        manager: Address,
        id: DeploymentId,
    ) -> Result<Option<DeploymentState>, ChainError> {
        self.inner.deployment(manager, id).await
    }

    async fn claim_deployment(
        &self,
        manager: Address,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        self.inner.claim_deployment(manager, gas_limit).await
    }

    async fn execute_actions(
        &self,
        manager: Address,
        actions: &[BundledAction],
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        self.attempts.lock().unwrap().push(actions.len());
        if actions.len() > self.max_actions {
            return Err(ChainError::Reverted {
                error: ManagerError::OutOfGas(OutOfGas { used: gas_limit + 1, limit: gas_limit }),
                gas_used: gas_limit,
            });
        }
        self.inner.execute_actions(manager, actions, gas_limit).await
    }

    async fn initiate_upgrade(
        &self,
        manager: Address,
        targets: &TargetBundle,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        self.inner.initiate_upgrade(manager, targets, gas_limit).await
    }

    async fn finalize_upgrade(
        &self,
        manager: Address,
        targets: &TargetBundle,
        gas_limit: u64,
    ) -> Result<TxReceipt, ChainError> {
        self.inner.finalize_upgrade(manager, targets, gas_limit).await
    }

    async fn claim_executor_payment(
        &self,
        manager: Address,
        amount: U256,
        gas_limit: u64,
    ) -> Result<U256, ChainError> {
        self.inner.claim_executor_payment(manager, amount, gas_limit).await
    }

    async fn code(&self, address: Address) -> Bytes {
        self.inner.code(address).await
    }

    async fn implementation_of(&self, proxy: Address) -> Address {
        self.inner.implementation_of(proxy).await
    }
}

/// Prices every action the same.
#[derive(Debug)]
struct FlatCost(u64);

impl ActionCostModel for FlatCost {
    fn action_cost(&self, _action: &BundledAction) -> u64 {
        self.0
    }

    fn batch_overhead(&self) -> u64 {
        0
    }
}

/// A project with an approved local deployment of [`sample_config`] plus `extra` storage writes.
fn local(
    extra: usize,
) -> (Arc<Mutex<LocalChain>>, Address, DeploymentId, chugsplash::DeploymentBundles) {
    let mut project = TestProject::new();
    let mut config = sample_config(project.proxy);
    if let Some(token) = config.contracts.get_mut("Token") {
        for i in 0..extra {
            token.storage.push(chugsplash::StorageEntry {
                key: alloy_primitives::B256::with_last_byte(10 + i as u8),
                value: alloy_primitives::B256::with_last_byte(1),
            });
        }
    }
    let bundles = project.build(&config);
    let id = project.propose_and_approve(&bundles, false).unwrap();
    (Arc::new(Mutex::new(project.chain)), project.manager, id, bundles)
}

fn settings() -> ExecutionSettings {
    ExecutionSettings::for_block(chugsplash::constants::defaults::BLOCK_GAS_LIMIT, 2)
}

#[tokio::test]
async fn test_owner_executes_local_deployment() {
    let (chain, manager, id, bundles) = local(0);
    let client = LocalClient::new(chain.clone(), OWNER);
    let report = execute_deployment(&client, manager, id, &bundles, &settings()).await.unwrap();

    assert_eq!(report.batch_sizes, vec![1, 2]);
    assert_eq!(report.transactions, 4);
    assert!(report.gas_used > 0);
    let chain = chain.lock().await;
    let manager = chain.manager(manager).unwrap();
    assert_eq!(manager.deployment_status(&id), DeploymentStatus::Completed);
    assert_eq!(manager.ledger().total_debt(), U256::ZERO);
}

#[rstest]
#[case::fits(8, vec![1, 4])]
#[case::halves_once(2, vec![1, 2, 2])]
#[case::halves_twice(1, vec![1, 1, 1, 1, 1])]
#[tokio::test]
async fn test_out_of_gas_halves_the_batch(
    #[case] max_actions: usize,
    #[case] expected: Vec<usize>,
) {
    let (chain, manager, id, bundles) = local(2);
    let client = LimitedClient::new(LocalClient::new(chain.clone(), OWNER), max_actions);
    let report = execute_deployment(&client, manager, id, &bundles, &settings()).await.unwrap();

    assert_eq!(report.batch_sizes, expected);
    // every attempt above the limit ran out of gas
    let failed = client.attempts().iter().filter(|&&size| size > max_actions).count();
    assert_eq!(client.attempts().len(), expected.len() + failed);
    assert_eq!(
        chain.lock().await.manager(manager).unwrap().deployment_status(&id),
        DeploymentStatus::Completed
    );
}

#[tokio::test]
async fn test_single_action_out_of_gas_gives_up() {
    let (chain, manager, id, bundles) = local(0);
    let client = LimitedClient::new(LocalClient::new(chain.clone(), OWNER), 0);
    let err = execute_deployment(&client, manager, id, &bundles, &settings()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::UnableToFindBatchSize));
    assert_eq!(client.attempts(), vec![1]);
}

#[tokio::test]
async fn test_actions_above_the_budget_are_never_sent() {
    let (chain, manager, id, bundles) = local(0);
    let client = LimitedClient::new(LocalClient::new(chain.clone(), OWNER), usize::MAX);
    let settings = ExecutionSettings { cost_model: Arc::new(FlatCost(u64::MAX)), ..settings() };
    let err = execute_deployment(&client, manager, id, &bundles, &settings).await.unwrap_err();
    assert!(matches!(err, ExecutorError::UnableToFindBatchSize));
    assert!(client.attempts().is_empty());
}

#[tokio::test]
async fn test_max_batch_size_caps_batches() {
    let (chain, manager, id, bundles) = local(3);
    let client = LocalClient::new(chain.clone(), OWNER);
    let settings = ExecutionSettings { max_batch_size: Some(2), ..settings() };
    let report = execute_deployment(&client, manager, id, &bundles, &settings).await.unwrap();
    assert_eq!(report.batch_sizes, vec![1, 2, 2, 1]);
}

#[tokio::test]
async fn test_failed_deployment_names_the_failing_contract() {
    let mut project = TestProject::new();
    project
        .chain
        .map_manager(project.manager, |manager| {
            manager.with_contract_creator(Arc::new(RevertingCreator::new(IMPLEMENTATION_CODE)))
        })
        .unwrap();
    let bundles = project.bundles();
    let id = project.propose_and_approve(&bundles, false).unwrap();
    let chain = Arc::new(Mutex::new(project.chain));

    let client = LocalClient::new(chain, OWNER);
    let err = execute_deployment(&client, project.manager, id, &bundles, &settings())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Token"), "{err}");
    let ExecutorError::DeploymentFailed { deployment_id, reference_name, reason } = &err else {
        panic!("unexpected error {err:?}")
    };
    assert_eq!(*deployment_id, id);
    assert_eq!(reference_name, "Token");
    assert!(!reason.is_empty());
}

#[tokio::test]
async fn test_resumes_a_partial_deployment() {
    let mut project = TestProject::new();
    let bundles = project.bundles();
    let id = project.propose_and_approve(&bundles, false).unwrap();
    project.execute(OWNER, &bundles, &[0]).unwrap();
    project.initiate(OWNER, &bundles).unwrap();
    project.execute(OWNER, &bundles, &[1]).unwrap();
    let chain = Arc::new(Mutex::new(project.chain));

    let client = LocalClient::new(chain, OWNER);
    let report = execute_deployment(&client, project.manager, id, &bundles, &settings())
        .await
        .unwrap();
    // the remaining write and the finalization
    assert_eq!(report.batch_sizes, vec![1]);
    assert_eq!(report.transactions, 2);
}
