//! Gas-bounded batch sizing.
//!
//! Executors submit actions in batches that must fit into a gas budget. The search finds the
//! largest feasible prefix of the pending actions under a monotonic feasibility predicate: if a
//! prefix fits, every shorter prefix fits too.

use auto_impl::auto_impl;

use crate::{constants::defaults, BundledAction};

/// Returns the largest `n <= len` such that `feasible(n)` holds.
///
/// The full length is tried first, then prefix lengths are binary searched. Returns `None` when
/// not even a single item is feasible, and `Some(0)` when `len` is zero.
pub fn max_feasible_prefix(len: usize, mut feasible: impl FnMut(usize) -> bool) -> Option<usize> {
    if len == 0 {
        return Some(0);
    }
    if feasible(len) {
        return Some(len);
    }
    if !feasible(1) {
        return None;
    }

    // feasible(low) holds and feasible(high) does not
    let (mut low, mut high) = (1, len);
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if feasible(mid) {
            low = mid;
        } else {
            high = mid;
        }
    }
    Some(low)
}

/// Estimates the gas of execution transactions.
#[auto_impl(&, Box, Arc)]
pub trait ActionCostModel {
    /// Estimated gas of executing `action`.
    fn action_cost(&self, action: &BundledAction) -> u64;

    /// Estimated gas every execution transaction costs regardless of its actions.
    fn batch_overhead(&self) -> u64;

    /// Estimated gas of a transaction executing `actions`.
    fn batch_cost(&self, actions: &[BundledAction]) -> u64 {
        actions.iter().fold(self.batch_overhead(), |cost, action| {
            cost.saturating_add(self.action_cost(action))
        })
    }
}

/// Uses the per-action estimates recorded in the bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleCostModel {
    /// Gas added once per transaction.
    pub batch_overhead: u64,
}

impl Default for BundleCostModel {
    fn default() -> Self {
        Self { batch_overhead: defaults::ESTIMATED_BATCH_OVERHEAD_GAS }
    }
}

impl ActionCostModel for BundleCostModel {
    fn action_cost(&self, action: &BundledAction) -> u64 {
        action.gas_estimate
    }

    fn batch_overhead(&self) -> u64 {
        self.batch_overhead
    }
}

/// The largest number of leading `actions` whose estimated cost fits into `budget`.
pub fn find_max_batch_size<M>(actions: &[BundledAction], model: &M, budget: u64) -> Option<usize>
where
    M: ActionCostModel + ?Sized,
{
    max_feasible_prefix(actions.len(), |size| model.batch_cost(&actions[..size]) <= budget)
}
