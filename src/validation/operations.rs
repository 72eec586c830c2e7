//! Operation-layer contract
//!
//! The register-model interpreter lives outside this crate. The chain core
//! only asks it to verify a contract, apply or revert its effects, and report
//! fees and stake data.

use thiserror::Error;

use crate::consensus::BlockState;
use crate::storage::Ledger;

use super::{Contract, TrustInfo};

#[derive(Debug, Error)]
#[error("operation failed: {0}")]
pub struct OperationError(pub String);

pub trait OperationLayer: Send + Sync {
    fn verify(&self, contract: &Contract) -> bool;

    fn connect(&self, contract: &Contract, block: &BlockState, ledger: &Ledger<'_>) -> Result<(), OperationError>;

    fn disconnect(&self, contract: &Contract, ledger: &Ledger<'_>) -> Result<(), OperationError>;

    fn fees(&self, contract: &Contract) -> u64 {
        contract.fee
    }

    fn trust_info(&self, contract: &Contract) -> Option<TrustInfo> {
        contract.trust_info()
    }
}

/// Accepts every contract and leaves register state untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughOperations;

impl OperationLayer for PassthroughOperations {
    fn verify(&self, _contract: &Contract) -> bool {
        true
    }

    fn connect(&self, _contract: &Contract, _block: &BlockState, _ledger: &Ledger<'_>) -> Result<(), OperationError> {
        Ok(())
    }

    fn disconnect(&self, _contract: &Contract, _ledger: &Ledger<'_>) -> Result<(), OperationError> {
        Ok(())
    }
}
