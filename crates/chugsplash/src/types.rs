use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};

/// Identifier of a deployment, see [`deployment_id`].
pub type DeploymentId = B256;

sol! {
    /// ABI layout of an action leaf.
    struct ActionLeaf {
        string referenceName;
        uint8 actionType;
        bytes data;
        address addr;
        bytes32 contractKindHash;
    }

    /// ABI layout of a target leaf.
    struct TargetLeaf {
        string referenceName;
        address proxy;
        address implementation;
        bytes32 contractKindHash;
    }

    /// ABI layout of a `DEPLOY_CONTRACT` action payload.
    struct DeployContractData {
        bytes32 salt;
        bytes creationCode;
    }

    /// ABI layout of a `SET_STORAGE` action payload.
    struct SetStorageData {
        bytes32 key;
        bytes32 value;
    }

    /// ABI layout hashed into a deployment id.
    struct DeploymentIdPreimage {
        bytes32 actionRoot;
        bytes32 targetRoot;
        uint256 numActions;
        uint256 numTargets;
        uint256 numNonProxyContracts;
        string configUri;
    }
}

/// The kind of an action.
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ActionType {
    /// Deploys a contract with `CREATE2`.
    #[display("DEPLOY_CONTRACT")]
    DeployContract = 0,
    /// Writes a storage slot through a proxy.
    #[display("SET_STORAGE")]
    SetStorage = 1,
}

impl ActionType {
    /// Decodes the raw action type.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DeployContract),
            1 => Some(Self::SetStorage),
            _ => None,
        }
    }
}

/// A single step of a deployment, committed as a leaf of the action tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAction {
    /// The logical contract this action belongs to.
    pub reference_name: String,
    /// What the action does.
    pub action_type: ActionType,
    /// ABI-encoded payload, see [`DeployContractData`] and [`SetStorageData`].
    pub data: Bytes,
    /// The expected deployment address, or the proxy whose storage is written.
    pub addr: Address,
    /// The kind of the contract at `addr`.
    pub contract_kind_hash: B256,
}

impl RawAction {
    /// Creates a `DEPLOY_CONTRACT` action. The deployment address is derived from `deployer`.
    pub fn deploy_contract(
        reference_name: impl Into<String>,
        deployer: Address,
        salt: B256,
        creation_code: Bytes,
        kind: ContractKind,
    ) -> Self {
        let addr = deployer.create2_from_code(salt.0, &creation_code);
        let data = DeployContractData { salt, creationCode: creation_code }.abi_encode().into();
        Self {
            reference_name: reference_name.into(),
            action_type: ActionType::DeployContract,
            data,
            addr,
            contract_kind_hash: kind.hash(),
        }
    }

    /// Creates a `SET_STORAGE` action writing `value` at `key` of `proxy`.
    pub fn set_storage(
        reference_name: impl Into<String>,
        proxy: Address,
        kind: ContractKind,
        key: B256,
        value: B256,
    ) -> Self {
        Self {
            reference_name: reference_name.into(),
            action_type: ActionType::SetStorage,
            data: SetStorageData { key, value }.abi_encode().into(),
            addr: proxy,
            contract_kind_hash: kind.hash(),
        }
    }

    /// Hash of the canonical encoding, used as the Merkle leaf.
    pub fn leaf_hash(&self) -> B256 {
        keccak256(
            ActionLeaf {
                referenceName: self.reference_name.clone(),
                actionType: self.action_type as u8,
                data: self.data.clone(),
                addr: self.addr,
                contractKindHash: self.contract_kind_hash,
            }
            .abi_encode(),
        )
    }

    /// Decodes the payload of a `DEPLOY_CONTRACT` action.
    pub fn decode_deploy_contract(&self) -> Option<DeployContractData> {
        if self.action_type != ActionType::DeployContract {
            return None;
        }
        DeployContractData::abi_decode(&self.data, true).ok()
    }

    /// Decodes the payload of a `SET_STORAGE` action.
    pub fn decode_set_storage(&self) -> Option<SetStorageData> {
        if self.action_type != ActionType::SetStorage {
            return None;
        }
        SetStorageData::abi_decode(&self.data, true).ok()
    }
}

/// A proxy flipped to a new implementation as part of a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// The logical contract behind the proxy.
    pub reference_name: String,
    /// The proxy address.
    pub proxy: Address,
    /// The implementation the proxy points at once the deployment completes.
    pub implementation: Address,
    /// Selects the adapter used to upgrade the proxy.
    pub contract_kind_hash: B256,
}

impl Target {
    /// Hash of the canonical encoding, used as the Merkle leaf.
    pub fn leaf_hash(&self) -> B256 {
        keccak256(
            TargetLeaf {
                referenceName: self.reference_name.clone(),
                proxy: self.proxy,
                implementation: self.implementation,
                contractKindHash: self.contract_kind_hash,
            }
            .abi_encode(),
        )
    }
}

/// Supported contract kinds. Every proxy kind is backed by a [`ProxyAdapter`](crate::ProxyAdapter).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ContractKind {
    /// A contract deployed without a proxy.
    #[display("no-proxy")]
    NoProxy,
    /// A proxy following EIP-1967 with the manager as admin.
    #[default]
    #[display("proxy")]
    Proxy,
    /// An OpenZeppelin transparent proxy.
    #[display("oz-transparent")]
    OzTransparent,
    /// An OpenZeppelin UUPS proxy whose implementation uses `OwnableUpgradeable`.
    #[display("oz-ownable-uups")]
    OzOwnableUups,
    /// An OpenZeppelin UUPS proxy whose implementation uses `AccessControlUpgradeable`.
    #[display("oz-access-control-uups")]
    OzAccessControlUups,
}

impl ContractKind {
    /// All proxy kinds.
    pub const PROXIES: [Self; 4] =
        [Self::Proxy, Self::OzTransparent, Self::OzOwnableUups, Self::OzAccessControlUups];

    /// The kind hash committed in actions and targets.
    pub fn hash(&self) -> B256 {
        keccak256(self.to_string())
    }

    /// Whether contracts of this kind live behind a proxy.
    pub const fn is_proxy(&self) -> bool {
        !matches!(self, Self::NoProxy)
    }
}

/// Lifecycle of a deployment.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Hash,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Never proposed.
    #[default]
    #[display("EMPTY")]
    Empty,
    /// Proposed, waiting for the owner's approval.
    #[display("PROPOSED")]
    Proposed,
    /// Approved and active.
    #[display("APPROVED")]
    Approved,
    /// Every proxy points at the updater.
    #[display("PROXIES_INITIATED")]
    ProxiesInitiated,
    /// Every action has been executed and every proxy upgraded.
    #[display("COMPLETED")]
    Completed,
    /// Cancelled by the owner.
    #[display("CANCELLED")]
    Cancelled,
    /// A contract deployment failed.
    #[display("FAILED")]
    Failed,
}

impl DeploymentStatus {
    /// Whether a deployment in this status can be proposed (again).
    pub const fn is_proposable(&self) -> bool {
        matches!(self, Self::Empty | Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether the deployment is approved and not yet in a terminal status.
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Approved | Self::ProxiesInitiated)
    }
}

/// Computes the content address of a deployment.
pub fn deployment_id(
    action_root: B256,
    target_root: B256,
    num_actions: u64,
    num_targets: u64,
    num_non_proxy_contracts: u64,
    config_uri: &str,
) -> DeploymentId {
    keccak256(
        DeploymentIdPreimage {
            actionRoot: action_root,
            targetRoot: target_root,
            numActions: U256::from(num_actions),
            numTargets: U256::from(num_targets),
            numNonProxyContracts: U256::from(num_non_proxy_contracts),
            configUri: config_uri.to_string(),
        }
        .abi_encode(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};

    #[test]
    fn test_action_payloads_decode() {
        let deployer = address!("0x1000000000000000000000000000000000000001");
        let action = RawAction::deploy_contract(
            "Token",
            deployer,
            B256::repeat_byte(7),
            bytes!("6080604052"),
            ContractKind::NoProxy,
        );
        let data = action.decode_deploy_contract().expect("deploy payload");
        assert_eq!(data.salt, B256::repeat_byte(7));
        assert_eq!(data.creationCode, bytes!("6080604052"));
        assert_eq!(
            action.addr,
            deployer.create2_from_code(B256::repeat_byte(7).0, bytes!("6080604052"))
        );
        assert!(action.decode_set_storage().is_none());

        let action = RawAction::set_storage(
            "Token",
            deployer,
            ContractKind::Proxy,
            B256::with_last_byte(1),
            B256::with_last_byte(2),
        );
        let data = action.decode_set_storage().expect("storage payload");
        assert_eq!(data.key, B256::with_last_byte(1));
        assert_eq!(data.value, B256::with_last_byte(2));
    }

    #[test]
    fn test_leaf_hash_covers_every_field() {
        let proxy = address!("0x1000000000000000000000000000000000000001");
        let base =
            RawAction::set_storage("A", proxy, ContractKind::Proxy, B256::ZERO, B256::ZERO);
        let mut renamed = base.clone();
        renamed.reference_name = "B".into();
        let mut rekinded = base.clone();
        rekinded.contract_kind_hash = ContractKind::OzTransparent.hash();
        let mut moved = base.clone();
        moved.addr = Address::ZERO;

        assert_ne!(base.leaf_hash(), renamed.leaf_hash());
        assert_ne!(base.leaf_hash(), rekinded.leaf_hash());
        assert_ne!(base.leaf_hash(), moved.leaf_hash());
    }

    #[test]
    fn test_deployment_id_depends_on_config_uri() {
        let a = deployment_id(B256::ZERO, B256::ZERO, 1, 0, 1, "file://a.json");
        let b = deployment_id(B256::ZERO, B256::ZERO, 1, 0, 1, "file://b.json");
        assert_ne!(a, b);
        assert_eq!(a, deployment_id(B256::ZERO, B256::ZERO, 1, 0, 1, "file://a.json"));
    }

    #[test]
    fn test_contract_kind_names() {
        assert_eq!(ContractKind::OzAccessControlUups.to_string(), "oz-access-control-uups");
        assert_eq!(ContractKind::NoProxy.hash(), keccak256("no-proxy"));
        assert!(!ContractKind::NoProxy.is_proxy());
        assert!(ContractKind::PROXIES.iter().all(ContractKind::is_proxy));
    }
}
