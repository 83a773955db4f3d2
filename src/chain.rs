//! Host collaborator traits.
//!
//! The engine never touches the database or the EVM directly. The block-chain
//! host hands it these narrow seams, mirroring how governance reads sit behind
//! a storage trait rather than a concrete provider. Tests implement them with
//! in-memory maps.

use crate::config::ChaophrayaConfig;
use crate::errors::EngineError;
use alloy_consensus::Header;
use alloy_primitives::{Address, B256, U256};

/// Read access to chain headers and the chain configuration.
pub trait HeaderReader: Send + Sync {
    /// The consensus configuration of the chain being followed.
    fn chain_config(&self) -> &ChaophrayaConfig;

    /// The current chain head, if the chain is non-empty.
    fn current_header(&self) -> Option<Header>;

    /// Header with the given hash at the given height.
    fn header(&self, hash: B256, number: u64) -> Option<Header>;

    /// Canonical header at the given height.
    fn header_by_number(&self, number: u64) -> Option<Header>;

    /// Header with the given hash, at any height.
    fn header_by_hash(&self, hash: B256) -> Option<Header>;
}

/// Mutable access to account state during finalize.
///
/// Only the pieces finalize needs: reading and draining the system-reward
/// balance, and account nonces for system-transaction construction.
pub trait StateHost {
    /// Current balance of `address`.
    fn balance(&self, address: Address) -> U256;

    /// Current nonce of `address`.
    fn nonce(&self, address: Address) -> u64;

    /// Move `amount` from `from` to `to`.
    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), EngineError>;
}
