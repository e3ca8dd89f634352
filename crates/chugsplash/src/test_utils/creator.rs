use alloy_primitives::{Address, Bytes};

use crate::{ContractCreator, CreationError, DirectCreator};

/// A creator whose constructors revert for the given creation code.
#[derive(Debug, Clone, Default)]
pub struct RevertingCreator {
    /// Creation code whose constructor reverts. Every other creation code deploys directly.
    pub reverting: Vec<Bytes>,
}

impl RevertingCreator {
    /// Reverts the constructor of `code`.
    pub fn new(code: Bytes) -> Self {
        Self { reverting: vec![code] }
    }
}

impl ContractCreator for RevertingCreator {
    fn create(&self, address: Address, init_code: &Bytes) -> Result<Bytes, CreationError> {
        if self.reverting.contains(init_code) {
            return Err(CreationError::Reverted("constructor reverted".to_string()));
        }
        DirectCreator.create(address, init_code)
    }
}
