//! Constants for the `ChugSplash` manager.
//!
//! It groups the constants by concern as sub-modules.

use alloy_primitives::{address, b256, Address, B256};

/// Well-known addresses and storage slots.
pub mod slots {
    use super::*;

    /// The EIP-1967 implementation slot,
    /// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`.
    pub const EIP1967_IMPLEMENTATION_SLOT: B256 =
        b256!("0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

    /// The EIP-1967 admin slot, `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`.
    pub const EIP1967_ADMIN_SLOT: B256 =
        b256!("0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

    /// The storage slot of `OwnableUpgradeable._owner`.
    pub const OZ_OWNABLE_OWNER_SLOT: B256 =
        b256!("0x0000000000000000000000000000000000000000000000000000000000000033");

    /// The storage slot of `AccessControlUpgradeable._roles`.
    pub const OZ_ACCESS_CONTROL_ROLES_SLOT: B256 =
        b256!("0x0000000000000000000000000000000000000000000000000000000000000065");

    /// `AccessControl.DEFAULT_ADMIN_ROLE`.
    pub const OZ_DEFAULT_ADMIN_ROLE: B256 = B256::ZERO;

    /// The address of the proxy updater. A proxy pointed at this implementation is locked:
    /// only the manager may write to its storage.
    pub const PROXY_UPDATER_ADDRESS: Address =
        address!("0x5c5b5ef8f5b7e5a1c8a4c1d1f7d6a9e2b3c4d5e6");

    /// The address of the registry on a freshly created [`LocalChain`](crate::LocalChain).
    pub const REGISTRY_ADDRESS: Address = address!("0x0000000000000000000000000000000000c5c5c5");
}

/// Gas costs charged by the default [`EvmGasMeter`](crate::EvmGasMeter).
///
/// The values mirror the EVM opcode costs of the equivalent Solidity manager.
pub mod gas {
    /// Intrinsic cost of every transaction.
    pub const TX_BASE: u64 = 21_000;
    /// Cost per non-zero calldata byte.
    pub const CALLDATA_NON_ZERO_BYTE: u64 = 16;
    /// Cost per zero calldata byte.
    pub const CALLDATA_ZERO_BYTE: u64 = 4;
    /// Cost of `CREATE2`, not counting init code hashing.
    pub const CREATE: u64 = 32_000;
    /// Cost per 32-byte word of init code hashed by `CREATE2`.
    pub const KECCAK256_WORD: u64 = 6;
    /// Cost per byte of deployed runtime code.
    pub const CODEDEPOSIT: u64 = 200;
    /// Cost of setting a zero slot to a non-zero value.
    pub const SSTORE_SET: u64 = 20_000;
    /// Cost of any other storage write.
    pub const SSTORE_RESET: u64 = 5_000;
    /// Cost of a cold storage read.
    pub const COLD_SLOAD: u64 = 2_100;
    /// Cost of a delegated call into a proxy adapter.
    pub const ADAPTER_CALL: u64 = 2_600;
    /// Cost of hashing one level of a Merkle proof.
    pub const MERKLE_LEVEL: u64 = 90;
    /// Cost of an emitted log.
    pub const LOG: u64 = 1_500;
}

/// Defaults for the immutable manager parameters and executor estimates.
pub mod defaults {
    /// Time in seconds an executor keeps its claim on a remote deployment.
    pub const EXECUTION_LOCK_TIME: u64 = 15 * 60;
    /// Bond in wei the owner must make available before approving a remote deployment.
    pub const OWNER_BOND_AMOUNT: u128 = 100_000_000_000_000_000; // 0.1 ETH
    /// Percentage on top of the gas cost paid to the executor.
    pub const EXECUTOR_PAYMENT_PERCENTAGE: u64 = 20;
    /// Percentage of the gas cost paid to the protocol.
    pub const PROTOCOL_PAYMENT_PERCENTAGE: u64 = 20;

    /// Gas charged on top of the metered gas to cover the work done after the measurement point
    /// (debt bookkeeping and the final log).
    pub const PAYMENT_GAS_OVERHEAD: u64 = 42_000;

    /// Block gas limit of a freshly created [`LocalChain`](crate::LocalChain).
    pub const BLOCK_GAS_LIMIT: u64 = 30_000_000;
    /// Seconds between two blocks of a [`LocalChain`](crate::LocalChain).
    pub const BLOCK_TIME: u64 = 2;

    /// Estimated gas of a single storage write submitted by an executor.
    pub const ESTIMATED_SET_STORAGE_GAS: u64 = 150_000;
    /// Estimated fixed gas per execution transaction.
    pub const ESTIMATED_BATCH_OVERHEAD_GAS: u64 = 100_000;
    /// Base gas of a contract deployment when the config does not provide an estimate.
    pub const ESTIMATED_DEPLOY_BASE_GAS: u64 = 100_000;
    /// Estimated gas per byte of creation code when the config does not provide an estimate.
    pub const ESTIMATED_DEPLOY_GAS_PER_BYTE: u64 = 250;
}

/// Limits enforced on contract creation.
pub mod limits {
    /// EIP-170 maximum runtime code size.
    pub const MAX_CODE_SIZE: usize = 24 * 1024;
    /// EIP-3860 maximum init code size.
    pub const MAX_INITCODE_SIZE: usize = 2 * MAX_CODE_SIZE;
}
