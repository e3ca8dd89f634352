use core::fmt::Debug;

use alloy_primitives::B256;
use auto_impl::auto_impl;

use crate::{constants, BlockEnv};

/// Prices the work done by the manager.
///
/// The manager queries the meter for every operation it performs and sums the results into the
/// [`GasTracker`] of the current call, which also backs the executor payment.
#[auto_impl(&, Box, Arc)]
pub trait GasMeter: Debug + Send + Sync {
    /// Gas charged once per transaction.
    fn intrinsic_gas(&self) -> u64;

    /// Gas for submitting `data` as calldata.
    fn calldata_gas(&self, data: &[u8]) -> u64;

    /// Gas for verifying a Merkle proof with `depth` siblings.
    fn proof_gas(&self, depth: usize) -> u64;

    /// Gas for deploying `runtime_code` with `init_code`.
    fn deploy_contract_gas(&self, init_code: &[u8], runtime_code: &[u8]) -> u64;

    /// Gas for writing `value` into a slot holding `previous` through a proxy adapter.
    fn set_storage_gas(&self, previous: B256, value: B256) -> u64;

    /// Gas for pointing a proxy at a new implementation through a proxy adapter.
    fn proxy_update_gas(&self) -> u64;

    /// Gas for emitting one log.
    fn log_gas(&self) -> u64;
}

/// Meters with the EVM opcode costs of the equivalent Solidity manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmGasMeter;

impl GasMeter for EvmGasMeter {
    fn intrinsic_gas(&self) -> u64 {
        constants::gas::TX_BASE
    }

    fn calldata_gas(&self, data: &[u8]) -> u64 {
        data.iter()
            .map(|byte| {
                if *byte == 0 {
                    constants::gas::CALLDATA_ZERO_BYTE
                } else {
                    constants::gas::CALLDATA_NON_ZERO_BYTE
                }
            })
            .sum()
    }

    fn proof_gas(&self, depth: usize) -> u64 {
        constants::gas::MERKLE_LEVEL * depth as u64 + constants::gas::COLD_SLOAD
    }

    fn deploy_contract_gas(&self, init_code: &[u8], runtime_code: &[u8]) -> u64 {
        let words = init_code.len().div_ceil(32) as u64;
        constants::gas::CREATE
            + constants::gas::KECCAK256_WORD * words
            + constants::gas::CODEDEPOSIT * runtime_code.len() as u64
    }

    fn set_storage_gas(&self, previous: B256, value: B256) -> u64 {
        let sstore = if previous.is_zero() && !value.is_zero() {
            constants::gas::SSTORE_SET
        } else {
            constants::gas::SSTORE_RESET
        };
        constants::gas::ADAPTER_CALL + sstore
    }

    fn proxy_update_gas(&self) -> u64 {
        constants::gas::ADAPTER_CALL + constants::gas::SSTORE_RESET
    }

    fn log_gas(&self) -> u64 {
        constants::gas::LOG
    }
}

/// Source of the gas price used to compute executor and protocol payments.
///
/// Networks that do not expose a meaningful real-time gas price use [`FixedGasPrice`].
#[auto_impl(&, Box, Arc)]
pub trait GasPriceOracle: Debug + Send + Sync {
    /// The gas price in wei for a transaction included in `block`.
    fn gas_price(&self, block: &BlockEnv) -> u128;
}

/// A constant gas price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedGasPrice(pub u128);

impl Default for FixedGasPrice {
    fn default() -> Self {
        Self(1_000_000_000)
    }
}

impl GasPriceOracle for FixedGasPrice {
    fn gas_price(&self, _block: &BlockEnv) -> u128 {
        self.0
    }
}

/// Uses the base fee of the block plus a fixed priority fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseFeeGasPrice {
    /// Priority fee in wei added on top of the base fee.
    pub priority_fee: u128,
}

impl GasPriceOracle for BaseFeeGasPrice {
    fn gas_price(&self, block: &BlockEnv) -> u128 {
        block.base_fee.saturating_add(self.priority_fee)
    }
}

/// Error returned once a transaction consumed more gas than its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of gas: used {used} of {limit}")]
pub struct OutOfGas {
    /// Gas consumed, including the operation that ran out.
    pub used: u64,
    /// The gas limit of the transaction.
    pub limit: u64,
}

/// Gas consumed by the current transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasTracker {
    used: u64,
    limit: u64,
}

impl GasTracker {
    /// Creates a tracker for a transaction with `limit` gas.
    pub const fn new(limit: u64) -> Self {
        Self { used: 0, limit }
    }

    /// Records `gas` as consumed.
    pub fn record(&mut self, gas: u64) {
        self.used = self.used.saturating_add(gas);
    }

    /// Gas consumed so far.
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// The gas limit of the transaction.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Whether more gas has been consumed than the transaction allows.
    pub const fn exceeds_limit(&self) -> bool {
        self.used > self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_storage_gas_distinguishes_fresh_slots() {
        let meter = EvmGasMeter;
        let fresh = meter.set_storage_gas(B256::ZERO, B256::with_last_byte(1));
        let reset = meter.set_storage_gas(B256::with_last_byte(2), B256::with_last_byte(1));
        assert_eq!(fresh - reset, constants::gas::SSTORE_SET - constants::gas::SSTORE_RESET);
    }

    #[test]
    fn test_deploy_gas_grows_with_code() {
        let meter = EvmGasMeter;
        let small = meter.deploy_contract_gas(&[1; 32], &[1; 32]);
        let large = meter.deploy_contract_gas(&[1; 64], &[1; 64]);
        assert_eq!(
            large - small,
            constants::gas::KECCAK256_WORD + 32 * constants::gas::CODEDEPOSIT
        );
    }

    #[test]
    fn test_tracker_limit() {
        let mut tracker = GasTracker::new(100);
        tracker.record(100);
        assert!(!tracker.exceeds_limit());
        tracker.record(1);
        assert!(tracker.exceeds_limit());
    }

    #[test]
    fn test_base_fee_price() {
        let block = BlockEnv { base_fee: 7, ..Default::default() };
        assert_eq!(BaseFeeGasPrice { priority_fee: 3 }.gas_price(&block), 10);
        assert_eq!(FixedGasPrice(5).gas_price(&block), 5);
    }
}
