//! Tests for failed contract deployments and reverting adapter calls.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use chugsplash::{
    events::{announcements, ManagerEvent, RegistryEvent},
    test_utils::*,
    AdapterError, ContractKind, DeploymentStatus, ManagerError,
};

#[test]
fn test_constructor_failure_fails_the_deployment() {
    let mut project = TestProject::new();
    project
        .chain
        .map_manager(project.manager, |manager| {
            manager.with_contract_creator(Arc::new(RevertingCreator::new(IMPLEMENTATION_CODE)))
        })
        .unwrap();
    let bundles = project.bundles();
    let id = project.propose_and_approve(&bundles, false).unwrap();

    // the call itself succeeds
    let receipt = project.execute(OWNER, &bundles, &[0]).unwrap();
    assert!(receipt.logs.iter().any(|log| matches!(
        log.event.as_manager(),
        Some(ManagerEvent::DeploymentFailed { reference_name, .. }) if reference_name == "Token"
    )));
    assert!(receipt.logs.iter().any(|log| matches!(
        log.event.as_registry(),
        Some(RegistryEvent::EventAnnounced { event_name, .. })
            if event_name == announcements::DEPLOYMENT_FAILED
    )));
    assert_eq!(project.deployment(&id).status, DeploymentStatus::Failed);
    assert_eq!(project.manager().active_deployment_id(), None);
    assert!(!project.chain.world().has_code(bundles.actions.actions[0].action.addr));

    // nothing left to execute
    assert_eq!(
        project.execute(OWNER, &bundles, &[0]).unwrap_err().manager_error(),
        Some(&ManagerError::NoActiveDeployment)
    );

    // a failed deployment can be proposed again
    assert_eq!(project.propose(&bundles, false).unwrap(), id);
    let deployment = project.deployment(&id);
    assert_eq!(deployment.status, DeploymentStatus::Proposed);
    assert_eq!(deployment.actions_executed, 0);
}

#[test]
fn test_address_mismatch_fails_the_deployment() {
    let mut project = TestProject::new();
    let mut bundles = project.bundles();
    // commit to an action whose expected address is not the CREATE2 address
    bundles.actions.actions[0].action.addr = Address::repeat_byte(0x77);
    let actions: Vec<_> = bundles
        .actions
        .actions
        .iter()
        .map(|bundled| (bundled.action.clone(), bundled.gas_estimate))
        .collect();
    bundles.actions = chugsplash::ActionBundle::new(actions);

    let id = project.propose_and_approve(&bundles, false).unwrap();
    project.execute(OWNER, &bundles, &[0]).unwrap();
    assert_eq!(project.deployment(&id).status, DeploymentStatus::Failed);
    assert!(!project.chain.world().has_code(Address::repeat_byte(0x77)));
}

#[test]
fn test_adapter_failure_reverts_the_call() {
    let mut project = TestProject::new();
    // a proxy the manager does not administer
    let proxy = project.chain.deploy_proxy(ContractKind::Proxy, STRANGER);
    let bundles = project.build(&sample_config(proxy));
    let id = project.propose_and_approve(&bundles, false).unwrap();
    project.execute(OWNER, &bundles, &[0]).unwrap();

    let err = project.initiate(OWNER, &bundles).unwrap_err();
    assert_eq!(
        err.manager_error(),
        Some(&ManagerError::Adapter(AdapterError::ManagerIsNotAdmin { proxy }))
    );
    assert_eq!(project.deployment(&id).status, DeploymentStatus::Approved);
    assert_eq!(project.chain.world().implementation_of(proxy), Address::ZERO);
}

#[test]
fn test_tampered_action_is_rejected() {
    let mut project = TestProject::new();
    let bundles = project.bundles();
    project.propose_and_approve(&bundles, false).unwrap();
    project.execute(OWNER, &bundles, &[0]).unwrap();
    project.initiate(OWNER, &bundles).unwrap();

    let mut write = bundles.actions.actions[1].action.clone();
    write.contract_kind_hash = B256::repeat_byte(0xab);
    let proof = bundles.actions.actions[1].proof.clone();
    let result = project.chain.transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
        manager.execute_actions(ctx, &[write], &[1], &[proof])
    });
    // the leaf changed with the kind hash, so the proof no longer matches
    assert_eq!(result.unwrap_err().manager_error(), Some(&ManagerError::InvalidMerkleProof(1)));
}

#[test]
fn test_cancel_leaves_initiated_proxies_locked() {
    let mut project = TestProject::new();
    let bundles = project.bundles();
    let id = project.propose_and_approve(&bundles, false).unwrap();
    project.execute(OWNER, &bundles, &[0]).unwrap();
    project.initiate(OWNER, &bundles).unwrap();
    project
        .chain
        .transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
            manager.cancel_active_deployment(ctx)
        })
        .unwrap();

    assert_eq!(project.deployment(&id).status, DeploymentStatus::Cancelled);
    assert_eq!(
        project.chain.world().implementation_of(project.proxy),
        chugsplash::constants::slots::PROXY_UPDATER_ADDRESS
    );

    // a new deployment of the same change set finalizes the locked proxy
    let proposal = bundles.proposal("memory://retry", false);
    let (retry, _) = project
        .chain
        .transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
            manager.propose(ctx, proposal)
        })
        .unwrap();
    project.approve(retry).unwrap();
    project.execute_all(OWNER, &bundles).unwrap();
    assert_eq!(project.deployment(&retry).status, DeploymentStatus::Completed);
    assert_eq!(
        project.chain.world().implementation_of(project.proxy),
        bundles.targets.targets[0].target.implementation
    );
}

#[test]
fn test_export_proxy() {
    let mut project = TestProject::new();
    let kind_hash = ContractKind::Proxy.hash();
    let proxy = project.proxy;

    let bundles = project.bundles();
    project.propose_and_approve(&bundles, false).unwrap();
    let result = project.chain.transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
        manager.export_proxy(ctx, proxy, kind_hash, STRANGER)
    });
    assert_eq!(
        result.unwrap_err().manager_error(),
        Some(&ManagerError::AnotherDeploymentInProgress)
    );

    project.execute_all(OWNER, &bundles).unwrap();
    project
        .chain
        .transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
            manager.export_proxy(ctx, proxy, kind_hash, STRANGER)
        })
        .unwrap();
    assert_eq!(project.chain.world().admin_of(proxy), STRANGER);

    // the manager lost control over the proxy
    let result = project.chain.transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
        manager.export_proxy(ctx, proxy, kind_hash, OWNER)
    });
    assert_eq!(
        result.unwrap_err().manager_error(),
        Some(&ManagerError::Adapter(AdapterError::ManagerIsNotAdmin { proxy }))
    );
}

#[test]
fn test_ownership_transfer() {
    let mut project = TestProject::new();
    let result = project.chain.transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
        manager.transfer_ownership(ctx, Address::ZERO)
    });
    assert_eq!(result.unwrap_err().manager_error(), Some(&ManagerError::InvalidNewOwner));

    project
        .chain
        .transact(project.manager, OWNER, TX_GAS_LIMIT, |manager, ctx| {
            manager.transfer_ownership(ctx, STRANGER)
        })
        .unwrap();
    assert_eq!(project.manager().owner(), STRANGER);
    // deposits stay open to the previous owner
    project.deposit(U256::from(1)).unwrap();
    let bundles = project.bundles();
    assert_eq!(
        project.propose(&bundles, false).unwrap_err().manager_error(),
        Some(&ManagerError::CallerIsNotProposer(OWNER))
    );
}
