//! Events emitted by managers and the registry.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{DeploymentId, Role};

/// Event names published on the registry announcement feed.
pub mod announcements {
    /// A deployment was proposed.
    pub const DEPLOYMENT_PROPOSED: &str = "ChugSplashDeploymentProposed";
    /// A deployment was approved and became active.
    pub const DEPLOYMENT_APPROVED: &str = "ChugSplashDeploymentApproved";
    /// A remote deployment was claimed by an executor.
    pub const DEPLOYMENT_CLAIMED: &str = "ChugSplashDeploymentClaimed";
    /// A deployment completed.
    pub const DEPLOYMENT_COMPLETED: &str = "ChugSplashDeploymentCompleted";
    /// A deployment was cancelled by the owner.
    pub const DEPLOYMENT_CANCELLED: &str = "ChugSplashDeploymentCancelled";
    /// A contract deployment failed and the deployment was abandoned.
    pub const DEPLOYMENT_FAILED: &str = "ChugSplashDeploymentFailed";
}

/// Events emitted by a [`ChugSplashManager`](crate::ChugSplashManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum ManagerEvent {
    /// Carries every input of the deployment id, so observers can rebuild and verify the bundle.
    DeploymentProposed {
        deployment_id: DeploymentId,
        action_root: B256,
        target_root: B256,
        num_actions: u64,
        num_targets: u64,
        num_non_proxy_contracts: u64,
        config_uri: String,
        remote_execution: bool,
        proposer: Address,
    },
    DeploymentApproved {
        deployment_id: DeploymentId,
    },
    DeploymentClaimed {
        deployment_id: DeploymentId,
        executor: Address,
    },
    ActionExecuted {
        deployment_id: DeploymentId,
        executor: Address,
        action_index: u64,
        reference_name: String,
    },
    ContractDeployed {
        deployment_id: DeploymentId,
        reference_name: String,
        contract_address: Address,
    },
    /// The contract already existed at its address.
    ContractDeploymentSkipped {
        deployment_id: DeploymentId,
        reference_name: String,
        contract_address: Address,
    },
    DeploymentFailed {
        deployment_id: DeploymentId,
        reference_name: String,
        reason: String,
    },
    ProxiesInitiated {
        deployment_id: DeploymentId,
        executor: Address,
    },
    ProxyUpgraded {
        deployment_id: DeploymentId,
        proxy: Address,
        implementation: Address,
    },
    DeploymentCompleted {
        deployment_id: DeploymentId,
        executor: Address,
    },
    DeploymentCancelled {
        deployment_id: DeploymentId,
        owner: Address,
        actions_executed: u64,
    },
    OwnerBondForfeited {
        deployment_id: DeploymentId,
        executor: Address,
        amount: U256,
    },
    ExecutorPaid {
        executor: Address,
        executor_payment: U256,
        protocol_payment: U256,
    },
    ExecutorPaymentClaimed {
        executor: Address,
        withdrawn: U256,
        remaining: U256,
    },
    ProtocolPaymentClaimed {
        recipient: Address,
        amount: U256,
    },
    OwnerWithdrewETH {
        owner: Address,
        amount: U256,
    },
    ETHDeposited {
        from: Address,
        amount: U256,
    },
    ProposerAdded {
        proposer: Address,
    },
    ProposerRemoved {
        proposer: Address,
    },
    ToggledManagedProposals {
        allow_managed_proposals: bool,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    ProxyExported {
        proxy: Address,
        contract_kind_hash: B256,
        new_admin: Address,
    },
}

/// Events emitted by the [`Registry`](crate::Registry).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum RegistryEvent {
    ProjectRegistered {
        project_name: String,
        creator: Address,
        owner: Address,
        manager: Address,
    },
    /// A generic announcement, so indexers only need to follow a single event type.
    EventAnnounced {
        manager: Address,
        event_name: String,
        data: Option<Bytes>,
    },
    RoleGranted {
        role: Role,
        account: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
    },
    ContractKindAdded {
        contract_kind_hash: B256,
    },
}

/// Any event of the system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
#[serde(untagged)]
pub enum Event {
    /// Emitted by a manager.
    Manager(ManagerEvent),
    /// Emitted by the registry.
    Registry(RegistryEvent),
}

impl Event {
    /// The manager event, if this is one.
    pub const fn as_manager(&self) -> Option<&ManagerEvent> {
        match self {
            Self::Manager(event) => Some(event),
            Self::Registry(_) => None,
        }
    }

    /// The registry event, if this is one.
    pub const fn as_registry(&self) -> Option<&RegistryEvent> {
        match self {
            Self::Registry(event) => Some(event),
            Self::Manager(_) => None,
        }
    }
}

/// An event together with its emitter and block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// The emitting contract.
    pub address: Address,
    /// The block the log was included in.
    pub block_number: u64,
    /// The event.
    pub event: Event,
}
