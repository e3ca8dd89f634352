//! A journaled account store standing in for the chain state the manager executes against.

use std::collections::hash_map::Entry;

use alloy_primitives::{map::HashMap, Address, Bytes, B256, U256};

use crate::constants::slots::{EIP1967_ADMIN_SLOT, EIP1967_IMPLEMENTATION_SLOT};

/// An account of the world state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Balance in wei.
    pub balance: U256,
    /// Runtime code. Empty for externally owned accounts.
    pub code: Bytes,
    /// Non-zero storage slots.
    pub storage: HashMap<B256, B256>,
}

/// A reversible change to the world state.
#[derive(Clone, Debug, PartialEq, Eq)]
enum JournalEntry {
    AccountCreated { address: Address },
    CodeChanged { address: Address, previous: Bytes },
    StorageChanged { address: Address, key: B256, previous: B256 },
    BalanceChanged { address: Address, previous: U256 },
}

/// A position in the journal that the world state can be reverted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(usize);

/// Error returned by balance transfers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient balance of {address}: {balance} < {required}")]
pub struct InsufficientBalance {
    /// The account being debited.
    pub address: Address,
    /// Its balance.
    pub balance: U256,
    /// The amount requested.
    pub required: U256,
}

/// The world state: accounts plus a journal of every change since the oldest open checkpoint.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    accounts: HashMap<Address, Account>,
    journal: Vec<JournalEntry>,
}

impl WorldState {
    /// Creates an empty world state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Keeps every change made since `checkpoint`.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        if checkpoint.0 == 0 {
            self.journal.clear();
        }
    }

    /// Drops the journal. Only valid while no checkpoint is open.
    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Undoes every change made since `checkpoint`.
    pub fn revert(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.0 {
            let Some(entry) = self.journal.pop() else { break };
            match entry {
                JournalEntry::AccountCreated { address } => {
                    self.accounts.remove(&address);
                }
                JournalEntry::CodeChanged { address, previous } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.code = previous;
                    }
                }
                JournalEntry::StorageChanged { address, key, previous } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        if previous.is_zero() {
                            account.storage.remove(&key);
                        } else {
                            account.storage.insert(key, previous);
                        }
                    }
                }
                JournalEntry::BalanceChanged { address, previous } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.balance = previous;
                    }
                }
            }
        }
    }

    /// Returns the account at `address`, if it was ever touched.
    pub fn account(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&address)
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        match self.accounts.entry(address) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.journal.push(JournalEntry::AccountCreated { address });
                entry.insert(Account::default())
            }
        }
    }

    /// The runtime code at `address`.
    pub fn code(&self, address: Address) -> Bytes {
        self.accounts.get(&address).map(|account| account.code.clone()).unwrap_or_default()
    }

    /// Whether `address` holds code.
    pub fn has_code(&self, address: Address) -> bool {
        self.accounts.get(&address).is_some_and(|account| !account.code.is_empty())
    }

    /// Sets the runtime code at `address`.
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let account = self.account_mut(address);
        let previous = std::mem::replace(&mut account.code, code);
        self.journal.push(JournalEntry::CodeChanged { address, previous });
    }

    /// Reads a storage slot.
    pub fn storage(&self, address: Address, key: B256) -> B256 {
        self.accounts
            .get(&address)
            .and_then(|account| account.storage.get(&key).copied())
            .unwrap_or_default()
    }

    /// Writes a storage slot and returns its previous value.
    pub fn set_storage(&mut self, address: Address, key: B256, value: B256) -> B256 {
        let account = self.account_mut(address);
        let previous = if value.is_zero() {
            account.storage.remove(&key)
        } else {
            account.storage.insert(key, value)
        }
        .unwrap_or_default();
        self.journal.push(JournalEntry::StorageChanged { address, key, previous });
        previous
    }

    /// The balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.accounts.get(&address).map(|account| account.balance).unwrap_or_default()
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        let account = self.account_mut(address);
        let previous = std::mem::replace(&mut account.balance, balance);
        self.journal.push(JournalEntry::BalanceChanged { address, previous });
    }

    /// Moves `amount` from `from` to `to`.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), InsufficientBalance> {
        let balance = self.balance(from);
        if balance < amount {
            return Err(InsufficientBalance { address: from, balance, required: amount });
        }
        self.set_balance(from, balance - amount);
        let to_balance = self.balance(to);
        self.set_balance(to, to_balance + amount);
        Ok(())
    }

    /// The EIP-1967 implementation of `proxy`.
    pub fn implementation_of(&self, proxy: Address) -> Address {
        Address::from_word(self.storage(proxy, EIP1967_IMPLEMENTATION_SLOT))
    }

    /// The EIP-1967 admin of `proxy`.
    pub fn admin_of(&self, proxy: Address) -> Address {
        Address::from_word(self.storage(proxy, EIP1967_ADMIN_SLOT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};

    const ALICE: Address = address!("0x1000000000000000000000000000000000000001");
    const BOB: Address = address!("0x1000000000000000000000000000000000000002");

    #[test]
    fn test_revert_restores_every_change() {
        let mut world = WorldState::new();
        world.set_storage(ALICE, B256::with_last_byte(1), B256::with_last_byte(9));
        world.set_balance(ALICE, U256::from(100));
        let checkpoint = world.checkpoint();

        world.set_code(BOB, bytes!("60006000"));
        world.set_storage(ALICE, B256::with_last_byte(1), B256::with_last_byte(3));
        world.set_storage(ALICE, B256::with_last_byte(2), B256::with_last_byte(4));
        world.transfer(ALICE, BOB, U256::from(40)).unwrap();
        world.revert(checkpoint);

        assert!(world.account(BOB).is_none());
        assert_eq!(world.storage(ALICE, B256::with_last_byte(1)), B256::with_last_byte(9));
        assert_eq!(world.storage(ALICE, B256::with_last_byte(2)), B256::ZERO);
        assert_eq!(world.balance(ALICE), U256::from(100));
    }

    #[test]
    fn test_commit_keeps_changes() {
        let mut world = WorldState::new();
        let checkpoint = world.checkpoint();
        world.set_code(BOB, bytes!("60006000"));
        world.commit(checkpoint);
        assert!(world.has_code(BOB));
        world.revert(world.checkpoint());
        assert!(world.has_code(BOB));
    }

    #[test]
    fn test_transfer_rejects_overdraft() {
        let mut world = WorldState::new();
        world.set_balance(ALICE, U256::from(5));
        let err = world.transfer(ALICE, BOB, U256::from(6)).unwrap_err();
        assert_eq!(err.balance, U256::from(5));
        assert_eq!(world.balance(BOB), U256::ZERO);
    }
}
