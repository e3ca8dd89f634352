//! The registry of projects.
//!
//! The registry derives the address of every project manager, holds the roles shared by all
//! managers and the adapters available for each contract kind, and publishes the announcement
//! feed followed by executors.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{
    keccak256,
    map::{HashMap, HashSet},
    Address, Bytes, B256,
};
use serde::{Deserialize, Serialize};

use crate::{AdapterRegistry, ProxyAdapter};

/// Runtime code installed at every manager address.
pub const MANAGER_RUNTIME_CODE: Bytes = Bytes::from_static(b"ChugSplashManager");

/// Roles granted by the registry admin.
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// May claim and execute remote deployments.
    #[display("REMOTE_EXECUTOR")]
    RemoteExecutor,
    /// May propose deployments to managers that allow managed proposals.
    #[display("MANAGED_PROPOSER")]
    ManagedProposer,
    /// May withdraw the protocol payments of every manager.
    #[display("PROTOCOL_PAYMENT_RECIPIENT")]
    ProtocolPaymentRecipient,
}

/// Reasons a registry call fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The caller is not the registry admin.
    #[error("caller {0} is not the registry admin")]
    CallerIsNotAdmin(Address),
    /// A project with this name already exists.
    #[error("project {0:?} is already registered")]
    ProjectAlreadyRegistered(String),
    /// The project name is empty.
    #[error("empty project name")]
    EmptyProjectName,
    /// The address is not a manager created by the registry.
    #[error("{0} is not a registered manager")]
    UnknownManager(Address),
    /// An adapter is already registered for the kind hash.
    #[error("contract kind {0} already has an adapter")]
    ContractKindAlreadyAdded(B256),
}

/// The registry of projects, roles and adapters.
#[derive(Clone, Debug)]
pub struct Registry {
    address: Address,
    admin: Address,
    projects: BTreeMap<String, Address>,
    managers: HashSet<Address>,
    roles: HashMap<Role, HashSet<Address>>,
    adapters: AdapterRegistry,
}

impl Registry {
    /// Creates a registry at `address` administered by `admin`, with the default adapters.
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            admin,
            projects: BTreeMap::new(),
            managers: HashSet::default(),
            roles: HashMap::default(),
            adapters: AdapterRegistry::with_default_adapters(),
        }
    }

    /// The registry address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The registry admin.
    pub const fn admin(&self) -> Address {
        self.admin
    }

    /// The `CREATE2` salt of the manager of `project_name`.
    pub fn manager_salt(project_name: &str) -> B256 {
        keccak256(project_name)
    }

    /// The address the manager of `project_name` is deployed at.
    pub fn manager_address(&self, project_name: &str) -> Address {
        let init_code_hash = keccak256(MANAGER_RUNTIME_CODE);
        self.address.create2(Self::manager_salt(project_name).0, init_code_hash.0)
    }

    /// Records a new project and returns the address of its manager.
    pub fn register(&mut self, project_name: &str) -> Result<Address, RegistryError> {
        if project_name.is_empty() {
            return Err(RegistryError::EmptyProjectName);
        }
        if self.projects.contains_key(project_name) {
            return Err(RegistryError::ProjectAlreadyRegistered(project_name.to_string()));
        }
        let manager = self.manager_address(project_name);
        self.projects.insert(project_name.to_string(), manager);
        self.managers.insert(manager);
        Ok(manager)
    }

    /// The manager of `project_name`, if registered.
    pub fn project(&self, project_name: &str) -> Option<Address> {
        self.projects.get(project_name).copied()
    }

    /// Iterates over the registered projects and their managers.
    pub fn projects(&self) -> impl Iterator<Item = (&str, Address)> + '_ {
        self.projects.iter().map(|(name, manager)| (name.as_str(), *manager))
    }

    /// Whether `address` is a manager created by the registry.
    pub fn is_manager(&self, address: Address) -> bool {
        self.managers.contains(&address)
    }

    /// Whether `account` holds `role`.
    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.roles.get(&role).is_some_and(|members| members.contains(&account))
    }

    /// Grants `role` to `account`. Returns whether the role was newly granted.
    pub fn grant_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, RegistryError> {
        self.ensure_admin(caller)?;
        Ok(self.roles.entry(role).or_default().insert(account))
    }

    /// Revokes `role` from `account`. Returns whether the account held the role.
    pub fn revoke_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, RegistryError> {
        self.ensure_admin(caller)?;
        Ok(self.roles.get_mut(&role).is_some_and(|members| members.remove(&account)))
    }

    /// The adapters available to managers.
    pub const fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Makes a new contract kind available, backed by `adapter`.
    pub fn add_contract_kind(
        &mut self,
        caller: Address,
        kind_hash: B256,
        adapter: Arc<dyn ProxyAdapter>,
    ) -> Result<(), RegistryError> {
        self.ensure_admin(caller)?;
        if self.adapters.contains(&kind_hash) {
            return Err(RegistryError::ContractKindAlreadyAdded(kind_hash));
        }
        self.adapters.insert(kind_hash, adapter);
        Ok(())
    }

    fn ensure_admin(&self, caller: Address) -> Result<(), RegistryError> {
        if caller == self.admin {
            Ok(())
        } else {
            Err(RegistryError::CallerIsNotAdmin(caller))
        }
    }
}
