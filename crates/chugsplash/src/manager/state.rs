use std::collections::BTreeMap;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::DeploymentStatus;

/// One executed flag per action index.
///
/// Only words holding a set flag are stored, so the committed length costs nothing up front.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBitmap {
    words: BTreeMap<u64, u64>,
    len: u64,
}

impl ActionBitmap {
    /// Creates a bitmap of `len` unset flags.
    pub const fn new(len: u64) -> Self {
        Self { words: BTreeMap::new(), len }
    }

    /// Number of flags.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the bitmap holds no flags.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the flag at `index` is set. Out-of-range indexes are unset.
    pub fn get(&self, index: u64) -> bool {
        index < self.len &&
            self.words.get(&(index / 64)).is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    /// Sets the flag at `index`. Returns whether it was previously unset.
    pub fn set(&mut self, index: u64) -> bool {
        if index >= self.len {
            return false;
        }
        let word = self.words.entry(index / 64).or_default();
        let mask = 1u64 << (index % 64);
        let was_unset = *word & mask == 0;
        *word |= mask;
        was_unset
    }

    /// Number of set flags.
    pub fn count_ones(&self) -> u64 {
        self.words.values().map(|word| word.count_ones() as u64).sum()
    }

    /// Indexes of the unset flags, in increasing order.
    pub fn unset(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).filter(|index| !self.get(*index))
    }
}

/// The record a manager keeps per deployment id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentState {
    /// Lifecycle status.
    pub status: DeploymentStatus,
    /// Root of the action bundle.
    pub action_root: B256,
    /// Root of the target bundle.
    pub target_root: B256,
    /// Executed flag per action index.
    pub actions: ActionBitmap,
    /// Committed number of targets.
    pub targets: u64,
    /// Number of actions executed.
    pub actions_executed: u64,
    /// Number of contracts deployed without a proxy.
    pub num_non_proxy_contracts: u64,
    /// Whether a third-party executor drives the deployment.
    pub remote_execution: bool,
    /// Timestamp of the last claim, zero when unclaimed.
    pub time_claimed: u64,
    /// The executor holding the latest claim.
    pub selected_executor: Option<Address>,
    /// Pointer to the config the bundle was built from.
    pub config_uri: String,
}

impl DeploymentState {
    /// Committed number of actions.
    pub const fn num_actions(&self) -> u64 {
        self.actions.len()
    }

    /// Number of `DEPLOY_CONTRACT` actions: one per non-proxy contract and one implementation
    /// per target.
    pub const fn num_deploy_actions(&self) -> u64 {
        self.num_non_proxy_contracts.saturating_add(self.targets)
    }

    /// Whether every action has been executed.
    pub const fn all_actions_executed(&self) -> bool {
        self.actions_executed == self.num_actions()
    }

    /// The last timestamp at which the latest claim is exclusive.
    pub const fn claim_expires_at(&self, execution_lock_time: u64) -> u64 {
        self.time_claimed.saturating_add(execution_lock_time)
    }

    /// Whether the latest claim is still exclusive at `now`.
    pub const fn is_claim_active(&self, now: u64, execution_lock_time: u64) -> bool {
        self.time_claimed != 0 && now <= self.claim_expires_at(execution_lock_time)
    }
}
