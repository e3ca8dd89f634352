//! Contract creation.
//!
//! The manager hands the creation code of every `DEPLOY_CONTRACT` action to a
//! [`ContractCreator`], which runs the constructor and returns the runtime code.

use core::fmt::Debug;

use alloy_primitives::{Address, Bytes};
use auto_impl::auto_impl;

use crate::constants::limits::{MAX_CODE_SIZE, MAX_INITCODE_SIZE};

/// Reasons a contract creation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreationError {
    /// The creation code is empty.
    #[error("empty creation code")]
    EmptyCode,
    /// The creation code exceeds [`MAX_INITCODE_SIZE`].
    #[error("creation code of {size} bytes exceeds the limit of {MAX_INITCODE_SIZE} bytes")]
    InitCodeTooLarge {
        /// Size of the creation code.
        size: usize,
    },
    /// The runtime code exceeds [`MAX_CODE_SIZE`].
    #[error("runtime code of {size} bytes exceeds the limit of {MAX_CODE_SIZE} bytes")]
    CodeTooLarge {
        /// Size of the runtime code.
        size: usize,
    },
    /// The constructor reverted.
    #[error("constructor reverted: {0}")]
    Reverted(String),
}

/// Runs constructors.
#[auto_impl(&, Box, Arc)]
pub trait ContractCreator: Debug + Send + Sync {
    /// Runs `init_code` as the constructor of the contract at `address`, returning its runtime
    /// code.
    fn create(&self, address: Address, init_code: &Bytes) -> Result<Bytes, CreationError>;
}

/// Treats the creation code as the runtime code, enforcing the EIP-170 and EIP-3860 size limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCreator;

impl ContractCreator for DirectCreator {
    fn create(&self, _address: Address, init_code: &Bytes) -> Result<Bytes, CreationError> {
        check_init_code(init_code)?;
        if init_code.len() > MAX_CODE_SIZE {
            return Err(CreationError::CodeTooLarge { size: init_code.len() });
        }
        Ok(init_code.clone())
    }
}

/// Checks the limits every creation code must satisfy before its constructor runs.
pub fn check_init_code(init_code: &Bytes) -> Result<(), CreationError> {
    if init_code.is_empty() {
        return Err(CreationError::EmptyCode);
    }
    if init_code.len() > MAX_INITCODE_SIZE {
        return Err(CreationError::InitCodeTooLarge { size: init_code.len() });
    }
    Ok(())
}
