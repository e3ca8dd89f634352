use alloy_primitives::{Address, B256};
use chugsplash::{BundleError, ChainError, DeploymentId, DeploymentStatus, ManagerError};

use super::SourceError;

/// Reasons an executor gives up on a deployment, for now or for good.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A transaction or query failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The config could not be fetched.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The fetched config is invalid.
    #[error(transparent)]
    Bundle(#[from] BundleError),
    /// The bundles rebuilt from the config do not match the proposal.
    #[error(
        "rebuilt bundles of {deployment_id} commit to {rebuilt_action_root}/{rebuilt_target_root}"
    )]
    BundleMismatch {
        /// The proposed deployment.
        deployment_id: DeploymentId,
        /// Action root of the rebuilt bundle.
        rebuilt_action_root: B256,
        /// Target root of the rebuilt bundle.
        rebuilt_target_root: B256,
    },
    /// The manager does not know the deployment.
    #[error("deployment {deployment_id} not found at {manager}")]
    UnknownDeployment {
        /// The manager.
        manager: Address,
        /// The deployment.
        deployment_id: DeploymentId,
    },
    /// The deployment left the states it can be executed in.
    #[error("deployment {deployment_id} stopped in status {status}")]
    DeploymentAborted {
        /// The deployment.
        deployment_id: DeploymentId,
        /// The status it stopped in.
        status: DeploymentStatus,
    },
    /// An action of the deployment failed on chain and the manager marked it as failed.
    #[error("deployment {deployment_id} failed at {reference_name}: {reason}")]
    DeploymentFailed {
        /// The deployment.
        deployment_id: DeploymentId,
        /// The contract whose action failed.
        reference_name: String,
        /// The revert reason of the action.
        reason: String,
    },
    /// Not even a single action fits into the gas budget.
    #[error("Unable to find a batch size that does not exceed the block gas limit")]
    UnableToFindBatchSize,
    /// The chain state does not reflect the executed deployment.
    #[error("verification of {reference_name} failed: {reason}")]
    VerificationFailed {
        /// The contract that failed verification.
        reference_name: String,
        /// What was wrong.
        reason: String,
    },
}

impl ExecutorError {
    /// Whether the deployment may be picked up again on a later poll.
    ///
    /// A claim taken over by another executor may expire again, so losing the selection is
    /// retried as well.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Chain(err) => err.manager_error().is_some_and(|err| {
                err.is_retryable() || matches!(err, ManagerError::CallerIsNotSelectedExecutor(_))
            }),
            Self::Source(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reverted(error: ManagerError) -> ExecutorError {
        ExecutorError::Chain(ChainError::Reverted { error, gas_used: 0 })
    }

    #[test]
    fn test_lost_selection_is_retryable() {
        assert!(reverted(ManagerError::CallerIsNotSelectedExecutor(Address::ZERO)).is_retryable());
        assert!(reverted(ManagerError::DeploymentAlreadyClaimed { expires_at: 1 }).is_retryable());
        assert!(!reverted(ManagerError::InvalidMerkleProof(0)).is_retryable());
        assert!(!ExecutorError::UnableToFindBatchSize.is_retryable());
    }
}
