use alloy_primitives::{keccak256, Address, B256};

use super::{ensure_initiated, ensure_proxy, set_implementation, upgrade_to};
use crate::{
    constants::slots::{
        EIP1967_ADMIN_SLOT, OZ_ACCESS_CONTROL_ROLES_SLOT, OZ_DEFAULT_ADMIN_ROLE,
        OZ_OWNABLE_OWNER_SLOT, PROXY_UPDATER_ADDRESS,
    },
    AdapterError, ProxyAdapter, WorldState,
};

/// The storage slot of `_roles[role].members[account]` of `AccessControlUpgradeable`.
pub fn role_member_slot(role: B256, account: Address) -> B256 {
    let role_data = keccak256(role.concat_const::<32, 64>(OZ_ACCESS_CONTROL_ROLES_SLOT));
    keccak256(account.into_word().concat_const::<32, 64>(role_data))
}

fn has_default_admin_role(world: &WorldState, proxy: Address, account: Address) -> bool {
    !world.storage(proxy, role_member_slot(OZ_DEFAULT_ADMIN_ROLE, account)).is_zero()
}

// While a UUPS proxy points at the updater, the implementation can no longer authorize upgrades,
// so the updater keeps the manager in the EIP-1967 admin slot until the upgrade completes.

fn lock(world: &mut WorldState, manager: Address, proxy: Address) {
    world.set_storage(proxy, EIP1967_ADMIN_SLOT, manager.into_word());
    set_implementation(world, proxy, PROXY_UPDATER_ADDRESS);
}

fn ensure_locked_by(
    world: &WorldState,
    manager: Address,
    proxy: Address,
) -> Result<(), AdapterError> {
    ensure_initiated(world, proxy)?;
    if world.admin_of(proxy) == manager {
        Ok(())
    } else {
        Err(AdapterError::ManagerIsNotAdmin { proxy })
    }
}

fn unlock(
    world: &mut WorldState,
    manager: Address,
    proxy: Address,
    implementation: Address,
) -> Result<(), AdapterError> {
    ensure_locked_by(world, manager, proxy)?;
    upgrade_to(world, proxy, implementation)?;
    world.set_storage(proxy, EIP1967_ADMIN_SLOT, B256::ZERO);
    Ok(())
}

/// Adapter for OpenZeppelin UUPS proxies whose implementation uses `OwnableUpgradeable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OzUupsOwnableAdapter;

impl OzUupsOwnableAdapter {
    fn ensure_owner(
        world: &WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError> {
        ensure_proxy(world, proxy)?;
        if Address::from_word(world.storage(proxy, OZ_OWNABLE_OWNER_SLOT)) == manager {
            Ok(())
        } else {
            Err(AdapterError::ManagerIsNotAdmin { proxy })
        }
    }
}

impl ProxyAdapter for OzUupsOwnableAdapter {
    fn initiate_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError> {
        Self::ensure_owner(world, manager, proxy)?;
        lock(world, manager, proxy);
        Ok(())
    }

    fn complete_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        implementation: Address,
    ) -> Result<(), AdapterError> {
        unlock(world, manager, proxy, implementation)
    }

    fn set_storage(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        key: B256,
        value: B256,
    ) -> Result<B256, AdapterError> {
        ensure_locked_by(world, manager, proxy)?;
        Ok(world.set_storage(proxy, key, value))
    }

    fn change_proxy_admin(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        new_admin: Address,
    ) -> Result<(), AdapterError> {
        Self::ensure_owner(world, manager, proxy)?;
        if new_admin.is_zero() {
            return Err(AdapterError::InvalidAdmin(new_admin));
        }
        world.set_storage(proxy, OZ_OWNABLE_OWNER_SLOT, new_admin.into_word());
        Ok(())
    }
}

/// Adapter for OpenZeppelin UUPS proxies whose implementation uses `AccessControlUpgradeable`.
///
/// The manager must hold `DEFAULT_ADMIN_ROLE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OzUupsAccessControlAdapter;

impl OzUupsAccessControlAdapter {
    fn ensure_admin_role(
        world: &WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError> {
        ensure_proxy(world, proxy)?;
        if has_default_admin_role(world, proxy, manager) {
            Ok(())
        } else {
            Err(AdapterError::ManagerIsNotAdmin { proxy })
        }
    }
}

impl ProxyAdapter for OzUupsAccessControlAdapter {
    fn initiate_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
    ) -> Result<(), AdapterError> {
        Self::ensure_admin_role(world, manager, proxy)?;
        lock(world, manager, proxy);
        Ok(())
    }

    fn complete_execution(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        implementation: Address,
    ) -> Result<(), AdapterError> {
        unlock(world, manager, proxy, implementation)
    }

    fn set_storage(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        key: B256,
        value: B256,
    ) -> Result<B256, AdapterError> {
        ensure_locked_by(world, manager, proxy)?;
        Ok(world.set_storage(proxy, key, value))
    }

    fn change_proxy_admin(
        &self,
        world: &mut WorldState,
        manager: Address,
        proxy: Address,
        new_admin: Address,
    ) -> Result<(), AdapterError> {
        Self::ensure_admin_role(world, manager, proxy)?;
        if new_admin.is_zero() {
            return Err(AdapterError::InvalidAdmin(new_admin));
        }
        world.set_storage(
            proxy,
            role_member_slot(OZ_DEFAULT_ADMIN_ROLE, new_admin),
            B256::with_last_byte(1),
        );
        world.set_storage(proxy, role_member_slot(OZ_DEFAULT_ADMIN_ROLE, manager), B256::ZERO);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{install_proxy, ContractKind};
    use alloy_primitives::{address, bytes};
    use rstest::rstest;

    const MANAGER: Address = address!("0x3000000000000000000000000000000000000001");
    const PROXY: Address = address!("0x3000000000000000000000000000000000000002");
    const IMPL: Address = address!("0x3000000000000000000000000000000000000003");
    const NEW_ADMIN: Address = address!("0x3000000000000000000000000000000000000004");

    fn adapter(kind: ContractKind) -> Box<dyn ProxyAdapter> {
        match kind {
            ContractKind::OzOwnableUups => Box::new(OzUupsOwnableAdapter),
            _ => Box::new(OzUupsAccessControlAdapter),
        }
    }

    #[rstest]
    #[case::ownable(ContractKind::OzOwnableUups)]
    #[case::access_control(ContractKind::OzAccessControlUups)]
    fn test_uups_upgrade_cycle(#[case] kind: ContractKind) {
        let mut world = WorldState::new();
        install_proxy(&mut world, PROXY, kind, MANAGER);
        world.set_code(IMPL, bytes!("6000"));
        let adapter = adapter(kind);

        adapter.initiate_execution(&mut world, MANAGER, PROXY).unwrap();
        assert_eq!(world.implementation_of(PROXY), PROXY_UPDATER_ADDRESS);
        assert_eq!(world.admin_of(PROXY), MANAGER);

        // overwriting the owner while locked does not lose the upgrade right
        adapter
            .set_storage(&mut world, MANAGER, PROXY, OZ_OWNABLE_OWNER_SLOT, NEW_ADMIN.into_word())
            .unwrap();
        adapter.complete_execution(&mut world, MANAGER, PROXY, IMPL).unwrap();
        assert_eq!(world.implementation_of(PROXY), IMPL);
        assert_eq!(world.admin_of(PROXY), Address::ZERO);
    }

    #[rstest]
    #[case::ownable(ContractKind::OzOwnableUups)]
    #[case::access_control(ContractKind::OzAccessControlUups)]
    fn test_uups_rejects_foreign_owner(#[case] kind: ContractKind) {
        let mut world = WorldState::new();
        install_proxy(&mut world, PROXY, kind, NEW_ADMIN);
        assert_eq!(
            adapter(kind).initiate_execution(&mut world, MANAGER, PROXY),
            Err(AdapterError::ManagerIsNotAdmin { proxy: PROXY })
        );
    }

    #[test]
    fn test_access_control_transfers_admin_role() {
        let mut world = WorldState::new();
        install_proxy(&mut world, PROXY, ContractKind::OzAccessControlUups, MANAGER);
        OzUupsAccessControlAdapter
            .change_proxy_admin(&mut world, MANAGER, PROXY, NEW_ADMIN)
            .unwrap();
        assert!(has_default_admin_role(&world, PROXY, NEW_ADMIN));
        assert!(!has_default_admin_role(&world, PROXY, MANAGER));
    }
}
