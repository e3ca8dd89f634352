use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::{
    constants::defaults, events::RegistryEvent, Event, GasTracker, Log, OutOfGas, Registry,
    RegistryError, WorldState,
};

/// Transaction-level environment of a manager call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnv {
    /// The sender of the transaction.
    pub caller: Address,
    /// The gas limit of the transaction.
    pub gas_limit: u64,
    /// Wei sent along with the call.
    pub value: U256,
}

/// Block-level environment of a manager call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEnv {
    /// Block number.
    pub number: u64,
    /// Block timestamp in seconds.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Base fee per gas in wei.
    pub base_fee: u128,
}

impl Default for BlockEnv {
    fn default() -> Self {
        Self { number: 1, timestamp: 1, gas_limit: defaults::BLOCK_GAS_LIMIT, base_fee: 0 }
    }
}

/// Everything a manager call can observe or change.
///
/// Logs are buffered in the context and only become part of the chain history once the call
/// succeeds.
#[derive(Debug)]
pub struct CallContext<'a> {
    /// The transaction environment.
    pub tx: TxEnv,
    /// The block environment.
    pub block: BlockEnv,
    /// The world state, journaled by the caller.
    pub world: &'a mut WorldState,
    /// The registry that created the manager.
    pub registry: &'a Registry,
    /// Logs emitted so far.
    pub logs: Vec<Log>,
    /// Gas consumed so far.
    pub gas: GasTracker,
}

impl<'a> CallContext<'a> {
    /// Creates a context for a call with the given environment.
    pub fn new(
        tx: TxEnv,
        block: BlockEnv,
        world: &'a mut WorldState,
        registry: &'a Registry,
    ) -> Self {
        Self { tx, block, world, registry, logs: Vec::new(), gas: GasTracker::new(tx.gas_limit) }
    }

    /// The sender of the transaction.
    pub const fn caller(&self) -> Address {
        self.tx.caller
    }

    /// The timestamp of the current block.
    pub const fn now(&self) -> u64 {
        self.block.timestamp
    }

    /// Consumes `gas`, failing once the transaction gas limit is exceeded.
    pub fn charge(&mut self, gas: u64) -> Result<(), OutOfGas> {
        self.gas.record(gas);
        if self.gas.exceeds_limit() {
            return Err(OutOfGas { used: self.gas.used(), limit: self.gas.limit() });
        }
        Ok(())
    }

    /// Buffers a log emitted by `address`.
    pub fn emit(&mut self, address: Address, event: impl Into<Event>) {
        self.logs.push(Log { address, block_number: self.block.number, event: event.into() });
    }

    /// Publishes `event_name` on the registry announcement feed on behalf of `manager`.
    pub fn announce(
        &mut self,
        manager: Address,
        event_name: &str,
        data: Option<Bytes>,
    ) -> Result<(), RegistryError> {
        if !self.registry.is_manager(manager) {
            return Err(RegistryError::UnknownManager(manager));
        }
        let registry = self.registry.address();
        self.emit(
            registry,
            RegistryEvent::EventAnnounced { manager, event_name: event_name.to_string(), data },
        );
        Ok(())
    }
}
