//! Tests for the remote executor against an in-process chain.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chugsplash::{
    constants::defaults, events::RegistryEvent, test_utils::*, BlockEnv, BundledAction,
    ChainError, DeploymentBundles, DeploymentConfig, DeploymentId, DeploymentState,
    DeploymentStatus, Event, LocalChain, Log, ManagerParams, TargetBundle, TxReceipt,
};
use chugsplash_executor::executor::{
    ConfigSource, Executor, ExecutorConfig, FileSource, LocalClient, ManagerClient, MemorySource,
    SourceError,
};
use tokio::sync::Mutex;

struct Remote {
    chain: Arc<Mutex<LocalChain>>,
    manager: Address,
    id: DeploymentId,
    config: DeploymentConfig,
    bundles: DeploymentBundles,
}

/// A project with an approved remote deployment of [`sample_config`].
fn remote() -> Remote {
    let mut project = TestProject::new();
    let config = sample_config(project.proxy);
    let bundles = project.build(&config);
    let id = project.propose_and_approve(&bundles, true).unwrap();
    let TestProject { chain, manager, .. } = project;
    Remote { chain: Arc::new(Mutex::new(chain)), manager, id, config, bundles }
}

fn executor<S: ConfigSource>(remote: &Remote, source: S) -> Executor<LocalClient, S> {
    let client = LocalClient::new(remote.chain.clone(), EXECUTOR);
    Executor::new(client, source, ExecutorConfig::default())
}

async fn status(remote: &Remote) -> DeploymentStatus {
    remote.chain.lock().await.manager(remote.manager).unwrap().deployment_status(&remote.id)
}

#[tokio::test]
async fn test_executes_remote_deployment() {
    let remote = remote();
    let source = MemorySource::default().with_config(CONFIG_URI, remote.config.clone());
    let mut executor = executor(&remote, source);

    let reports = executor.poll_once().await.unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.deployment_id, remote.id);
    // the implementation, then both storage writes at once
    assert_eq!(report.batch_sizes, vec![1, 2]);
    // two batches, initiation and finalization
    assert_eq!(report.transactions, 4);
    assert_eq!(status(&remote).await, DeploymentStatus::Completed);
    assert_eq!(executor.watched().collect::<Vec<_>>(), vec![remote.manager]);

    let chain = remote.chain.lock().await;
    assert!(report.withdrawn > U256::ZERO);
    assert_eq!(chain.world().balance(EXECUTOR), report.withdrawn);
    let manager = chain.manager(remote.manager).unwrap();
    assert_eq!(manager.ledger().executor_debt(EXECUTOR), U256::ZERO);
    assert_eq!(
        chain.world().implementation_of(remote.bundles.targets.targets[0].target.proxy),
        remote.bundles.targets.targets[0].target.implementation
    );
    drop(chain);

    // nothing left to do
    assert!(executor.poll_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_keeps_payment_without_auto_withdraw() {
    let remote = remote();
    let source = MemorySource::default().with_config(CONFIG_URI, remote.config.clone());
    let config = ExecutorConfig { auto_withdraw: false, ..Default::default() };
    let mut executor =
        Executor::new(LocalClient::new(remote.chain.clone(), EXECUTOR), source, config);

    let reports = executor.poll_once().await.unwrap();
    assert_eq!(reports[0].withdrawn, U256::ZERO);
    let chain = remote.chain.lock().await;
    assert!(chain.manager(remote.manager).unwrap().ledger().executor_debt(EXECUTOR) > U256::ZERO);
}

#[tokio::test]
async fn test_waits_for_a_competing_claim() {
    let remote = remote();
    remote
        .chain
        .lock()
        .await
        .transact(remote.manager, OTHER_EXECUTOR, TX_GAS_LIMIT, |manager, ctx| {
            manager.claim_deployment(ctx)
        })
        .unwrap();

    let source = MemorySource::default().with_config(CONFIG_URI, remote.config.clone());
    let mut executor = executor(&remote, source);
    assert!(executor.poll_once().await.unwrap().is_empty());
    assert!(!executor.is_abandoned(&remote.id));
    assert_eq!(status(&remote).await, DeploymentStatus::Approved);

    // the competing claim expires
    remote.chain.lock().await.advance_time(defaults::EXECUTION_LOCK_TIME + 1);
    let reports = executor.poll_once().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(status(&remote).await, DeploymentStatus::Completed);
}

#[tokio::test]
async fn test_recovers_a_claim_taken_over() {
    let remote = remote();
    {
        let mut chain = remote.chain.lock().await;
        chain
            .transact(remote.manager, EXECUTOR, TX_GAS_LIMIT, |manager, ctx| {
                manager.claim_deployment(ctx)
            })
            .unwrap();
        // another executor takes over the expired claim
        chain.advance_time(defaults::EXECUTION_LOCK_TIME + 1);
        chain
            .transact(remote.manager, OTHER_EXECUTOR, TX_GAS_LIMIT, |manager, ctx| {
                manager.claim_deployment(ctx)
            })
            .unwrap();
    }

    let source = MemorySource::default().with_config(CONFIG_URI, remote.config.clone());
    let mut executor = executor(&remote, source);
    assert!(executor.poll_once().await.unwrap().is_empty());
    assert!(!executor.is_abandoned(&remote.id));
    assert_eq!(status(&remote).await, DeploymentStatus::Approved);

    // the takeover expires as well
    remote.chain.lock().await.advance_time(defaults::EXECUTION_LOCK_TIME + 1);
    let reports = executor.poll_once().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(status(&remote).await, DeploymentStatus::Completed);
}

#[tokio::test]
async fn test_abandons_mismatching_bundle() {
    let remote = remote();
    let mut tampered = remote.config.clone();
    if let Some(token) = tampered.contracts.get_mut("Token") {
        token.storage[0].value = B256::with_last_byte(43);
    }
    let mut executor = executor(&remote, MemorySource::default().with_config(CONFIG_URI, tampered));

    assert!(executor.poll_once().await.unwrap().is_empty());
    assert!(executor.is_abandoned(&remote.id));
    assert_eq!(status(&remote).await, DeploymentStatus::Approved);

    // abandoned deployments are skipped, even with the right config in place
    executor.source_mut().insert(CONFIG_URI, remote.config.clone());
    assert!(executor.poll_once().await.unwrap().is_empty());
    assert_eq!(status(&remote).await, DeploymentStatus::Approved);
}

/// Announces an extra manager whose state cannot be read.
struct BrokenManagerClient {
    inner: LocalClient,
    broken: Address,
}

#[async_trait]
impl ManagerClient for BrokenManagerClient {
    fn sender(&self) -> Address {
        self.inner.sender()
    }

    async fn block(&self) -> BlockEnv {
        self.inner.block().await
    }

    async fn logs_since(&self, cursor: usize) -> Vec<Log> {
        let mut logs = self.inner.logs_since(cursor).await;
        if cursor == 0 {
            logs.push(Log {
                address: self.broken,
                block_number: 0,
                event: Event::Registry(RegistryEvent::EventAnnounced {
                    manager: self.broken,
                    event_name: "ChugSplashDeploymentApproved".to_string(),
                    data: None,
                }),
            });
        }
        logs
    }

    async fn manager_params(&self, manager: Address) -> Result<ManagerParams, ChainError> {
        self.inner.manager_params(manager).await
    }

    async fn active_deployment(
        &self,
        manager: Address,
    ) -> Result<Option<DeploymentId>, ChainError> {
        if manager == self.broken {
            return Err(ChainError::UnknownManager(manager));
        }
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

#[tokio::test]
async fn test_unreadable_manager_does_not_block_others() {
    let remote = remote();
    let client = BrokenManagerClient {
        inner: LocalClient::new(remote.chain.clone(), EXECUTOR),
        broken: Address::ZERO,
    };
    let source = MemorySource::default().with_config(CONFIG_URI, remote.config.clone());
    let mut executor = Executor::new(client, source, ExecutorConfig::default());

    let reports = executor.poll_once().await.unwrap();
    assert_eq!(executor.watched().collect::<Vec<_>>(), vec![Address::ZERO, remote.manager]);
    assert_eq!(reports.len(), 1);
    assert_eq!(status(&remote).await, DeploymentStatus::Completed);
}

/// Never answers in time.
#[derive(Debug)]
struct SlowSource;

#[async_trait]
impl ConfigSource for SlowSource {
    async fn fetch(&self, uri: &str) -> Result<DeploymentConfig, SourceError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(SourceError::NotFound(uri.to_string()))
    }
}

#[tokio::test]
async fn test_fetch_timeout_is_retried() {
    let remote = remote();
    let config =
        ExecutorConfig { fetch_timeout: Duration::from_millis(20), ..Default::default() };
    let mut executor =
        Executor::new(LocalClient::new(remote.chain.clone(), EXECUTOR), SlowSource, config);

    assert!(executor.poll_once().await.unwrap().is_empty());
    assert!(!executor.is_abandoned(&remote.id));
    // the claim went through before the fetch
    let chain = remote.chain.lock().await;
    let deployment = chain.manager(remote.manager).unwrap().deployment(&remote.id).unwrap();
    assert_eq!(deployment.selected_executor, Some(EXECUTOR));
}

#[tokio::test]
async fn test_ignores_local_deployments() {
    let mut project = TestProject::new();
    let config = sample_config(project.proxy);
    let bundles = project.build(&config);
    let id = project.propose_and_approve(&bundles, false).unwrap();
    let chain = Arc::new(Mutex::new(project.chain));

    let source = MemorySource::default().with_config(CONFIG_URI, config);
    let mut executor =
        Executor::new(LocalClient::new(chain.clone(), EXECUTOR), source, ExecutorConfig::default());
    assert!(executor.poll_once().await.unwrap().is_empty());
    assert!(!executor.is_abandoned(&id));
    assert_eq!(
        chain.lock().await.manager(project.manager).unwrap().deployment_status(&id),
        DeploymentStatus::Approved
    );
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let remote = remote();
    let source = MemorySource::default().with_config(CONFIG_URI, remote.config.clone());
    let config =
        ExecutorConfig { poll_interval: Duration::from_millis(10), ..Default::default() };
    let mut executor =
        Executor::new(LocalClient::new(remote.chain.clone(), EXECUTOR), source, config);

    executor.run(tokio::time::sleep(Duration::from_millis(200))).await;
    assert_eq!(status(&remote).await, DeploymentStatus::Completed);
}

#[tokio::test]
async fn test_fetches_config_from_file() {
    let mut project = TestProject::new();
    let config = sample_config(project.proxy);
    let bundles = project.build(&config);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chugsplash.json");
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
    let uri = format!("file://{}", path.display());

    let proposal = bundles.proposal(uri, true);
    let (id, _) = project
        .chain
        .transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
            manager.propose(ctx, proposal)
        })
        .unwrap();
    project.approve(id).unwrap();
    let chain = Arc::new(Mutex::new(project.chain));

    let mut executor = Executor::new(
        LocalClient::new(chain.clone(), EXECUTOR),
        FileSource::default(),
        ExecutorConfig::default(),
    );
    let reports = executor.poll_once().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].deployment_id, id);
}
