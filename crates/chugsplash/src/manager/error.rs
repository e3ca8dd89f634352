use alloy_primitives::{Address, B256, U256};

use crate::{
    AdapterError, DeploymentId, DeploymentStatus, InsufficientBalance, OutOfGas, RegistryError,
};

/// Reasons a manager call is rejected.
///
/// Every variant is a stable reason. [`ManagerError::is_retryable`] tells apart the rejections
/// that may succeed later unchanged from the structurally invalid ones.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// Only the owner may make this call.
    #[error("caller {0} is not the owner")]
    CallerIsNotOwner(Address),
    /// The caller may not propose deployments.
    #[error("caller {0} is not a proposer")]
    CallerIsNotProposer(Address),
    /// The caller does not hold the remote executor role.
    #[error("caller {0} is not a remote executor")]
    CallerIsNotRemoteExecutor(Address),
    /// The caller is not the executor selected for the active deployment.
    #[error("caller {0} is not the selected executor")]
    CallerIsNotSelectedExecutor(Address),
    /// The caller does not hold the protocol payment recipient role.
    #[error("caller {0} is not the protocol payment recipient")]
    CallerIsNotProtocolPaymentRecipient(Address),
    /// The deployment exists and is not in a terminal status.
    #[error("deployment {id} is {status} and cannot be proposed")]
    DeploymentStateIsNotProposable {
        /// The deployment.
        id: DeploymentId,
        /// Its current status.
        status: DeploymentStatus,
    },
    /// The deployment has fewer actions than contract deployments.
    #[error("{num_actions} actions cannot cover {required} contract deployments")]
    InvalidActionCounts {
        /// Committed number of actions.
        num_actions: u64,
        /// Number of contract deployments implied by the counts.
        required: u64,
    },
    /// Another deployment is active.
    #[error("another deployment is in progress")]
    AnotherDeploymentInProgress,
    /// The deployment is not proposed.
    #[error("deployment {id} is {status}, not proposed")]
    DeploymentIsNotProposed {
        /// The deployment.
        id: DeploymentId,
        /// Its current status.
        status: DeploymentStatus,
    },
    /// The available funds do not cover the owner bond.
    #[error("insufficient owner bond: {available} < {required}")]
    InsufficientOwnerBond {
        /// Funds not owed to anyone.
        available: U256,
        /// The bond amount.
        required: U256,
    },
    /// No deployment is active.
    #[error("no active deployment")]
    NoActiveDeployment,
    /// The active deployment is executed by the owner.
    #[error("remote execution is disabled for the active deployment")]
    RemoteExecutionDisabled,
    /// Another executor holds an unexpired claim.
    #[error("deployment is already claimed until {expires_at}")]
    DeploymentAlreadyClaimed {
        /// Timestamp after which the claim may be taken over.
        expires_at: u64,
    },
    /// Parallel arrays have different lengths.
    #[error("array length mismatch")]
    ArrayLengthMismatch,
    /// The action index is outside of the bundle.
    #[error("invalid action index {0}")]
    InvalidActionIndex(u64),
    /// The Merkle proof does not verify against the committed root.
    #[error("invalid merkle proof at index {0}")]
    InvalidMerkleProof(u64),
    /// The action payload does not decode.
    #[error("invalid action data at index {0}")]
    InvalidActionData(u64),
    /// The call requires the proxies to be initiated.
    #[error("proxies are not initiated")]
    ProxiesNotInitiated,
    /// The active deployment is not in the approved status.
    #[error("deployment is {0}, not approved")]
    DeploymentIsNotApproved(DeploymentStatus),
    /// Some contract deployment actions are not executed yet.
    #[error("contract deployments incomplete: {executed} of {required}")]
    ContractDeploymentsIncomplete {
        /// Actions executed so far.
        executed: u64,
        /// Contract deployment actions of the bundle.
        required: u64,
    },
    /// The target set does not match the committed number of targets.
    #[error("incorrect number of targets: expected {expected}, got {actual}")]
    IncorrectNumberOfTargets {
        /// Committed number of targets.
        expected: u64,
        /// Number of targets submitted.
        actual: u64,
    },
    /// Some actions are not executed yet.
    #[error("upgrade finalized too early: {executed} of {total} actions executed")]
    FinalizedUpgradeTooEarly {
        /// Actions executed so far.
        executed: u64,
        /// Committed number of actions.
        total: u64,
    },
    /// No adapter is registered for the contract kind.
    #[error("unsupported contract kind {0}")]
    UnsupportedContractKind(B256),
    /// The withdrawable amount is zero.
    #[error("nothing to withdraw")]
    NothingToWithdraw,
    /// The new owner is the zero address.
    #[error("invalid new owner")]
    InvalidNewOwner,
    /// A guarded entry point was entered again before returning.
    #[error("reentrant call")]
    ReentrantCall,
    /// The transaction ran out of gas.
    #[error(transparent)]
    OutOfGas(#[from] OutOfGas),
    /// A proxy adapter call failed.
    #[error("adapter call failed: {0}")]
    Adapter(#[from] AdapterError),
    /// An ETH transfer failed.
    #[error(transparent)]
    InsufficientBalance(#[from] InsufficientBalance),
    /// A registry call failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ManagerError {
    /// Whether the same call may succeed later, once the chain state has moved on.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AnotherDeploymentInProgress |
                Self::InsufficientOwnerBond { .. } |
                Self::NoActiveDeployment |
                Self::DeploymentAlreadyClaimed { .. } |
                Self::ProxiesNotInitiated |
                Self::ContractDeploymentsIncomplete { .. } |
                Self::FinalizedUpgradeTooEarly { .. } |
                Self::NothingToWithdraw |
                Self::InsufficientBalance(_) |
                Self::OutOfGas(_)
        )
    }

    /// Whether the call ran out of gas.
    pub const fn is_out_of_gas(&self) -> bool {
        matches!(self, Self::OutOfGas(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ManagerError::DeploymentAlreadyClaimed { expires_at: 10 }.is_retryable());
        assert!(ManagerError::OutOfGas(OutOfGas { used: 2, limit: 1 }).is_retryable());
        assert!(!ManagerError::InvalidMerkleProof(0).is_retryable());
        assert!(!ManagerError::CallerIsNotOwner(Address::ZERO).is_retryable());
        assert!(!ManagerError::ReentrantCall.is_retryable());
    }
}
