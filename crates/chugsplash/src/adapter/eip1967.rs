use alloy_primitives::{Address, B256};

use super::{ensure_initiated, ensure_proxy, set_implementation, upgrade_to};
use crate::{
    constants::slots::{EIP1967_ADMIN_SLOT, PROXY_UPDATER_ADDRESS},
    AdapterError, ProxyAdapter, WorldState,
};

fn ensure_admin(world: &WorldState, manager: Address, proxy: Address) -> Result<(), AdapterError> {
    ensure_proxy(world, proxy)?;
    if world.admin_of(proxy) == manager {
        Ok(())
    } else {
        Err(AdapterError::ManagerIsNotAdmin { proxy })
    }
}

/// Adapter for EIP-1967 proxies administered through the admin slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapter;

impl ProxyAdapter for DefaultAdapter {
    fn initiate_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError> {
        ensure_admin(world, manager, proxy)?;
        set_implementation(world, proxy, PROXY_UPDATER_ADDRESS);
        Ok(())
    }

    fn complete_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        implementation: Address,
    ) -> Result<(), AdapterError> {
        ensure_admin(world, manager, proxy)?;
        upgrade_to(world, proxy, implementation)
    }

    fn set_storage(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        key: B256,
        value: B256,
    ) -> Result<B256, AdapterError> {
        ensure_admin(world, manager, proxy)?;
        ensure_initiated(world, proxy)?;
        Ok(world.set_storage(proxy, key, value))
    }

    fn change_proxy_admin(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        new_admin: Address,
    ) -> Result<(), AdapterError> {
        ensure_admin(world, manager, proxy)?;
        world.set_storage(proxy, EIP1967_ADMIN_SLOT, new_admin.into_word());
        Ok(())
    }
}

/// Adapter for OpenZeppelin transparent proxies.
///
/// Behaves like [`DefaultAdapter`], except that the admin can never be cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct OzTransparentAdapter;

impl ProxyAdapter for OzTransparentAdapter {
    fn initiate_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError> {
        DefaultAdapter.initiate_execution(world, manager, proxy)
    }

    fn complete_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        implementation: Address,
    ) -> Result<(), AdapterError> {
        DefaultAdapter.complete_execution(world, manager, proxy, implementation)
    }

    fn set_storage(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        key: B256,
        value: B256,
    ) -> Result<B256, AdapterError> {
        DefaultAdapter.set_storage(world, manager, proxy, key, value)
    }

    fn change_proxy_admin(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        new_admin: Address,
    ) -> Result<(), AdapterError> {
        if new_admin.is_zero() {
            return Err(AdapterError::InvalidAdmin(new_admin));
        }
        DefaultAdapter.change_proxy_admin(world, manager, proxy, new_admin)
    }
}
