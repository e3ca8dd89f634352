//! Builds the action and target bundles a deployment commits to.
//!
//! A [`DeploymentConfig`] lists the contracts of a project together with the storage writes that
//! initialize them. The builder turns it into two ordered leaf lists:
//!
//! - actions: every `DEPLOY_CONTRACT` action first, sorted by reference name, then the
//!   `SET_STORAGE` actions of each proxied contract, kept together per contract;
//! - targets: one per proxied contract, pointing the proxy at its freshly deployed implementation.
//!
//! The output only depends on the config and the manager address, so the proposer and every
//! executor rebuild identical bundles.

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::defaults, deployment_id, merkle::MerkleTree, ContractKind, DeploymentId, Proposal,
    RawAction, Target,
};

/// Reasons a config cannot be bundled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    /// A proxied contract without a proxy address.
    #[error("contract {0} is proxied but has no proxy address")]
    MissingProxyAddress(String),
    /// Storage writes on a contract that is not behind a proxy.
    #[error("contract {0} sets storage but is not behind a proxy")]
    StorageOnNonProxy(String),
    /// A contract without creation code.
    #[error("contract {0} has empty creation code")]
    EmptyCreationCode(String),
}

/// A slot-encoded storage write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// The storage slot.
    pub key: B256,
    /// The value written.
    pub value: B256,
}

/// One contract of a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractConfig {
    /// How the contract is deployed.
    #[serde(default)]
    pub kind: ContractKind,
    /// Creation code of the contract, or of the implementation when proxied.
    pub creation_code: Bytes,
    /// The `CREATE2` salt, `keccak256(reference_name)` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
    /// The proxy address, required for proxied contracts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Address>,
    /// Storage writes applied through the proxy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage: Vec<StorageEntry>,
    /// Gas estimate of the deployment, derived from the code size when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_gas: Option<u64>,
}

impl ContractConfig {
    /// The `CREATE2` salt of the contract.
    pub fn salt(&self, reference_name: &str) -> B256 {
        self.salt.unwrap_or_else(|| keccak256(reference_name))
    }

    /// The gas estimate of deploying the contract.
    pub fn deploy_gas_estimate(&self) -> u64 {
        self.deploy_gas.unwrap_or_else(|| {
            defaults::ESTIMATED_DEPLOY_BASE_GAS
                + defaults::ESTIMATED_DEPLOY_GAS_PER_BYTE * self.creation_code.len() as u64
        })
    }
}

/// The change set of a project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// The project the config belongs to.
    pub project_name: String,
    /// Contracts keyed by reference name.
    pub contracts: BTreeMap<String, ContractConfig>,
}

/// An action together with the data needed to execute it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledAction {
    /// The action.
    pub action: RawAction,
    /// Position of the action in the bundle.
    pub index: u64,
    /// Merkle proof of the action.
    pub proof: Vec<B256>,
    /// Estimated gas of executing the action.
    pub gas_estimate: u64,
}

/// Ordered actions committed by a Merkle root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBundle {
    /// Root over the action leaves.
    pub root: B256,
    /// The actions, in bundle order.
    pub actions: Vec<BundledAction>,
}

impl ActionBundle {
    /// Commits to `actions` paired with their gas estimates.
    pub fn new(actions: Vec<(RawAction, u64)>) -> Self {
        let tree = MerkleTree::new(actions.iter().map(|(action, _)| action.leaf_hash()).collect());
        let actions = (0u64..)
            .zip(actions)
            .map(|(index, (action, gas_estimate))| BundledAction {
                action,
                index,
                proof: tree.proof(index as usize).unwrap_or_default(),
                gas_estimate,
            })
            .collect();
        Self { root: tree.root(), actions }
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the bundle has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// A target together with its Merkle proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledTarget {
    /// The target.
    pub target: Target,
    /// Position of the target in the bundle.
    pub index: u64,
    /// Merkle proof of the target.
    pub proof: Vec<B256>,
}

/// Ordered targets committed by a Merkle root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBundle {
    /// Root over the target leaves.
    pub root: B256,
    /// The targets, in bundle order.
    pub targets: Vec<BundledTarget>,
}

impl TargetBundle {
    /// Commits to `targets`.
    pub fn new(targets: Vec<Target>) -> Self {
        let tree = MerkleTree::new(targets.iter().map(Target::leaf_hash).collect());
        let targets = (0u64..)
            .zip(targets)
            .map(|(index, target)| BundledTarget {
                proof: tree.proof(index as usize).unwrap_or_default(),
                target,
                index,
            })
            .collect();
        Self { root: tree.root(), targets }
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the bundle has no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The targets and their proofs, as passed to the manager.
    pub fn split(&self) -> (Vec<Target>, Vec<Vec<B256>>) {
        self.targets.iter().map(|bundled| (bundled.target.clone(), bundled.proof.clone())).unzip()
    }
}

/// Both bundles of a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentBundles {
    /// The action bundle.
    pub actions: ActionBundle,
    /// The target bundle.
    pub targets: TargetBundle,
    /// Number of contracts deployed without a proxy.
    pub num_non_proxy_contracts: u64,
}

impl DeploymentBundles {
    /// Number of actions.
    pub fn num_actions(&self) -> u64 {
        self.actions.len() as u64
    }

    /// Number of targets.
    pub fn num_targets(&self) -> u64 {
        self.targets.len() as u64
    }

    /// The id a deployment of these bundles gets when proposed with `config_uri`.
    pub fn deployment_id(&self, config_uri: &str) -> DeploymentId {
        deployment_id(
            self.actions.root,
            self.targets.root,
            self.num_actions(),
            self.num_targets(),
            self.num_non_proxy_contracts,
            config_uri,
        )
    }

    /// The proposal committing to these bundles.
    pub fn proposal(&self, config_uri: impl Into<String>, remote_execution: bool) -> Proposal {
        Proposal {
            action_root: self.actions.root,
            target_root: self.targets.root,
            num_actions: self.num_actions(),
            num_targets: self.num_targets(),
            num_non_proxy_contracts: self.num_non_proxy_contracts,
            config_uri: config_uri.into(),
            remote_execution,
        }
    }
}

/// Builds the bundles of configs deployed through the manager at `manager`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleBuilder {
    manager: Address,
}

impl BundleBuilder {
    /// Creates a builder for the manager at `manager`.
    pub const fn new(manager: Address) -> Self {
        Self { manager }
    }

    /// Builds the bundles of `config`.
    pub fn build(&self, config: &DeploymentConfig) -> Result<DeploymentBundles, BundleError> {
        let mut deploys = Vec::new();
        let mut writes = Vec::new();
        let mut targets = Vec::new();
        let mut num_non_proxy_contracts = 0;

        // `contracts` is a BTreeMap, so iteration is sorted by reference name
        for (name, contract) in &config.contracts {
            if contract.creation_code.is_empty() {
                return Err(BundleError::EmptyCreationCode(name.clone()));
            }
            let deploy = RawAction::deploy_contract(
                name.as_str(),
                self.manager,
                contract.salt(name),
                contract.creation_code.clone(),
                contract.kind,
            );

            if !contract.kind.is_proxy() {
                if !contract.storage.is_empty() {
                    return Err(BundleError::StorageOnNonProxy(name.clone()));
                }
                num_non_proxy_contracts += 1;
                deploys.push((deploy, contract.deploy_gas_estimate()));
                continue;
            }

            let proxy =
                contract.proxy.ok_or_else(|| BundleError::MissingProxyAddress(name.clone()))?;
            targets.push(Target {
                reference_name: name.clone(),
                proxy,
                implementation: deploy.addr,
                contract_kind_hash: contract.kind.hash(),
            });
            deploys.push((deploy, contract.deploy_gas_estimate()));
            writes.extend(contract.storage.iter().map(|entry| {
                let action = RawAction::set_storage(
                    name.as_str(),
                    proxy,
                    contract.kind,
                    entry.key,
                    entry.value,
                );
                (action, defaults::ESTIMATED_SET_STORAGE_GAS)
            }));
        }

        deploys.extend(writes);
        let bundles = DeploymentBundles {
            actions: ActionBundle::new(deploys),
            targets: TargetBundle::new(targets),
            num_non_proxy_contracts,
        };
        debug!(
            target: "chugsplash::bundle",
            project_name = %config.project_name,
            num_actions = bundles.num_actions(),
            num_targets = bundles.num_targets(),
            action_root = %bundles.actions.root,
            target_root = %bundles.targets.root,
            "Built deployment bundles"
        );
        Ok(bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{merkle::verify_proof, ActionType};
    use alloy_primitives::{address, bytes};

    const MANAGER: Address = address!("0x3000000000000000000000000000000000000003");
    const PROXY: Address = address!("0x4000000000000000000000000000000000000004");

    fn config() -> DeploymentConfig {
        let mut contracts = BTreeMap::new();
        contracts.insert(
            "Token".to_string(),
            ContractConfig {
                kind: ContractKind::Proxy,
                creation_code: bytes!("60016002"),
                salt: None,
                proxy: Some(PROXY),
                storage: vec![
                    StorageEntry { key: B256::with_last_byte(1), value: B256::with_last_byte(9) },
                    StorageEntry { key: B256::with_last_byte(0), value: B256::with_last_byte(8) },
                ],
                deploy_gas: None,
            },
        );
        contracts.insert(
            "Library".to_string(),
            ContractConfig {
                kind: ContractKind::NoProxy,
                creation_code: bytes!("6003"),
                salt: Some(B256::repeat_byte(5)),
                proxy: None,
                storage: vec![],
                deploy_gas: Some(77),
            },
        );
        DeploymentConfig { project_name: "Project".into(), contracts }
    }

    #[test]
    fn test_deploys_come_first() {
        let bundles = BundleBuilder::new(MANAGER).build(&config()).unwrap();
        let kinds: Vec<_> =
            bundles.actions.actions.iter().map(|bundled| bundled.action.action_type).collect();
        assert_eq!(
            kinds,
            vec![
                ActionType::DeployContract,
                ActionType::DeployContract,
                ActionType::SetStorage,
                ActionType::SetStorage
            ]
        );
        assert_eq!(bundles.actions.actions[0].action.reference_name, "Library");
        assert_eq!(bundles.actions.actions[0].gas_estimate, 77);
        assert_eq!(
            bundles.actions.actions[1].gas_estimate,
            defaults::ESTIMATED_DEPLOY_BASE_GAS + 4 * defaults::ESTIMATED_DEPLOY_GAS_PER_BYTE
        );
        // storage writes keep the config order
        let keys: Vec<_> = bundles.actions.actions[2..]
            .iter()
            .map(|bundled| bundled.action.decode_set_storage().unwrap().key)
            .collect();
        assert_eq!(keys, vec![B256::with_last_byte(1), B256::with_last_byte(0)]);
        assert_eq!(bundles.num_non_proxy_contracts, 1);
    }

    #[test]
    fn test_target_points_at_implementation() {
        let bundles = BundleBuilder::new(MANAGER).build(&config()).unwrap();
        assert_eq!(bundles.num_targets(), 1);
        let target = &bundles.targets.targets[0].target;
        let implementation = bundles.actions.actions[1].action.addr;
        assert_eq!(target.proxy, PROXY);
        assert_eq!(target.implementation, implementation);
        assert_eq!(
            implementation,
            MANAGER.create2_from_code(keccak256("Token").0, bytes!("60016002"))
        );
    }

    #[test]
    fn test_proofs_verify() {
        let bundles = BundleBuilder::new(MANAGER).build(&config()).unwrap();
        for bundled in &bundles.actions.actions {
            assert!(verify_proof(
                bundles.actions.root,
                bundled.action.leaf_hash(),
                bundled.index,
                &bundled.proof,
                bundles.num_actions(),
            ));
        }
        let (targets, proofs) = bundles.targets.split();
        assert!(verify_proof(bundles.targets.root, targets[0].leaf_hash(), 0, &proofs[0], 1));
    }

    #[test]
    fn test_proposal_matches_deployment_id() {
        let bundles = BundleBuilder::new(MANAGER).build(&config()).unwrap();
        let proposal = bundles.proposal("file://project.json", true);
        assert_eq!(proposal.deployment_id(), bundles.deployment_id("file://project.json"));
        assert_eq!(proposal.num_actions, 4);
    }

    #[test]
    fn test_build_errors() {
        let builder = BundleBuilder::new(MANAGER);

        let mut missing_proxy = config();
        missing_proxy.contracts.get_mut("Token").unwrap().proxy = None;
        assert_eq!(
            builder.build(&missing_proxy),
            Err(BundleError::MissingProxyAddress("Token".into()))
        );

        let mut storage_on_library = config();
        storage_on_library.contracts.get_mut("Library").unwrap().storage =
            vec![StorageEntry { key: B256::ZERO, value: B256::ZERO }];
        assert_eq!(
            builder.build(&storage_on_library),
            Err(BundleError::StorageOnNonProxy("Library".into()))
        );

        let mut empty_code = config();
        empty_code.contracts.get_mut("Library").unwrap().creation_code = Bytes::new();
        assert_eq!(
            builder.build(&empty_code),
            Err(BundleError::EmptyCreationCode("Library".into()))
        );
    }

    #[test]
    fn test_config_json() {
        let json = r#"{
            "projectName": "Project",
            "contracts": {
                "Token": {
                    "creationCode": "0x60016002",
                    "proxy": "0x4000000000000000000000000000000000000004",
                    "storage": [{
                        "key": "0x0000000000000000000000000000000000000000000000000000000000000001",
                        "value": "0x0000000000000000000000000000000000000000000000000000000000000009"
                    }]
                }
            }
        }"#;
        let config: DeploymentConfig = serde_json::from_str(json).unwrap();
        let token = &config.contracts["Token"];
        assert_eq!(token.kind, ContractKind::Proxy);
        assert_eq!(token.proxy, Some(PROXY));
        assert_eq!(token.storage.len(), 1);
    }
}
