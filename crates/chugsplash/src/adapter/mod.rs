//! Proxy adapters.
//!
//! A proxy adapter implements the upgrade primitives for one proxy standard. The manager never
//! touches proxy storage directly: it resolves the adapter registered for the contract kind hash
//! of an action or target and goes through it.

use core::fmt::Debug;
use std::sync::Arc;

use alloy_primitives::{map::HashMap, Address, Bytes, B256};
use auto_impl::auto_impl;

use crate::{
    constants::slots::{
        EIP1967_ADMIN_SLOT, EIP1967_IMPLEMENTATION_SLOT, OZ_DEFAULT_ADMIN_ROLE,
        OZ_OWNABLE_OWNER_SLOT, PROXY_UPDATER_ADDRESS,
    },
    ContractKind, WorldState,
};

mod eip1967;
pub use eip1967::*;

mod uups;
pub use uups::*;

/// Runtime code installed at proxies created through [`install_proxy`].
pub const PROXY_RUNTIME_CODE: Bytes = Bytes::from_static(&[0x36, 0x3d, 0x3d, 0x37, 0xf4]);

/// Runtime code of the proxy updater.
pub const PROXY_UPDATER_CODE: Bytes = Bytes::from_static(&[0x60, 0x00, 0x80, 0xfd]);

/// Reasons an adapter call fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// There is no contract at the proxy address.
    #[error("no proxy at {0}")]
    NotAProxy(Address),
    /// The manager is not allowed to upgrade the proxy.
    #[error("manager is not the admin of proxy {proxy}")]
    ManagerIsNotAdmin {
        /// The proxy.
        proxy: Address,
    },
    /// The proxy has not been pointed at the proxy updater.
    #[error("proxy {0} is not initiated")]
    ProxyNotInitiated(Address),
    /// The new implementation has no code.
    #[error("implementation {0} has no code")]
    ImplementationHasNoCode(Address),
    /// The new admin is not acceptable for this proxy standard.
    #[error("invalid admin {0}")]
    InvalidAdmin(Address),
}

/// The upgrade primitives of a proxy standard, executed with the manager as caller.
#[auto_impl(&, Box, Arc)]
pub trait ProxyAdapter: Debug + Send + Sync {
    /// Points `proxy` at the proxy updater, locking it for everyone but the manager.
    fn initiate_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError>;

    /// Points an initiated `proxy` at `implementation`.
    fn complete_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        implementation: Address,
    ) -> Result<(), AdapterError>;

    /// Writes a storage slot of an initiated `proxy`, returning its previous value.
    fn set_storage(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        key: B256,
        value: B256,
    ) -> Result<B256, AdapterError>;

    /// Hands the control over `proxy` to `new_admin`.
    fn change_proxy_admin(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        new_admin: Address,
    ) -> Result<(), AdapterError>;
}

/// Maps contract kind hashes to their adapters.
#[derive(Clone, Debug, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<B256, Arc<dyn ProxyAdapter>>,
}

impl AdapterRegistry {
    /// Creates a registry holding an adapter for every proxy kind of [`ContractKind`].
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::default();
        registry.insert(ContractKind::Proxy.hash(), Arc::new(DefaultAdapter));
        registry.insert(ContractKind::OzTransparent.hash(), Arc::new(OzTransparentAdapter));
        registry.insert(ContractKind::OzOwnableUups.hash(), Arc::new(OzUupsOwnableAdapter));
        registry
            .insert(ContractKind::OzAccessControlUups.hash(), Arc::new(OzUupsAccessControlAdapter));
        registry
    }

    /// Registers `adapter` for `kind_hash`, returning the adapter it replaces.
    pub fn insert(
        &mut self,
        kind_hash: B256,
        adapter: Arc<dyn ProxyAdapter>,
    ) -> Option<Arc<dyn ProxyAdapter>> {
        self.adapters.insert(kind_hash, adapter)
    }

    /// The adapter for `kind_hash`.
    pub fn get(&self, kind_hash: &B256) -> Option<&Arc<dyn ProxyAdapter>> {
        self.adapters.get(kind_hash)
    }

    /// Whether an adapter is registered for `kind_hash`.
    pub fn contains(&self, kind_hash: &B256) -> bool {
        self.adapters.contains_key(kind_hash)
    }
}

/// Creates a proxy of `kind` at `proxy`, controlled by `admin`.
///
/// Non-proxy kinds only get the proxy runtime code.
pub fn install_proxy(world: &mut WorldState, proxy: Address, kind: ContractKind, admin: Address) {
    world.set_code(proxy, PROXY_RUNTIME_CODE);
    match kind {
        ContractKind::NoProxy => {}
        ContractKind::Proxy | ContractKind::OzTransparent => {
            world.set_storage(proxy, EIP1967_ADMIN_SLOT, admin.into_word());
        }
        ContractKind::OzOwnableUups => {
            world.set_storage(proxy, OZ_OWNABLE_OWNER_SLOT, admin.into_word());
        }
        ContractKind::OzAccessControlUups => {
            let slot = role_member_slot(OZ_DEFAULT_ADMIN_ROLE, admin);
            world.set_storage(proxy, slot, B256::with_last_byte(1));
        }
    }
}

fn ensure_proxy(world: &WorldState, proxy: Address) -> Result<(), AdapterError> {
    if world.has_code(proxy) {
        Ok(())
    } else {
        Err(AdapterError::NotAProxy(proxy))
    }
}

fn ensure_initiated(world: &WorldState, proxy: Address) -> Result<(), AdapterError> {
    if world.implementation_of(proxy) == PROXY_UPDATER_ADDRESS {
        Ok(())
    } else {
        Err(AdapterError::ProxyNotInitiated(proxy))
    }
}

fn set_implementation(world: &mut WorldState, proxy: Address, implementation: Address) {
    world.set_storage(proxy, EIP1967_IMPLEMENTATION_SLOT, implementation.into_word());
}

fn upgrade_to(
    world: &mut WorldState,
    proxy: Address,
    implementation: Address,
) -> Result<(), AdapterError> {
    ensure_initiated(world, proxy)?;
    if !world.has_code(implementation) {
        return Err(AdapterError::ImplementationHasNoCode(implementation));
    }
    set_implementation(world, proxy, implementation);
    Ok(())
}
