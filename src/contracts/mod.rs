//! Typed access to the validator, stake and slash contracts.
//!
//! The engine never runs the EVM itself. Read queries and the execution of
//! consensus-mandated calls go through [`ContractClient`], implemented by the
//! host against its state provider. What stays in the engine is everything
//! consensus-critical about those calls: the calldata layout and the exact
//! shape of the synthetic system transactions that carry them.

pub mod calldata;

use crate::chain::StateHost;
use crate::constants::SYSTEM_TX_GAS_LIMIT;
use crate::errors::EngineError;
use crate::header::{SystemContracts, ValidatorInfo};
use alloy_consensus::{Header, TxLegacy};
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};

/// Host-side access to the consensus contracts.
pub trait ContractClient: Send + Sync {
    /// The span the validator contract considers current, evaluated at the
    /// state of `header`.
    fn current_span(&self, header: &Header) -> Result<u64, EngineError>;

    /// Validator sequence and system-contract addresses committed for the
    /// span covering `number`, evaluated at `block_hash`.
    fn current_validators(
        &self,
        block_hash: B256,
        number: u64,
    ) -> Result<(Vec<ValidatorInfo>, SystemContracts), EngineError>;

    /// Validators registered and above threshold in the stake contract,
    /// evaluated at `block_hash`.
    fn eligible_validators(
        &self,
        block_hash: B256,
        number: u64,
    ) -> Result<Vec<ValidatorInfo>, EngineError>;

    /// Whether `signer` has already been slashed within `span`.
    fn is_slashed(
        &self,
        slash_manager: Address,
        signer: Address,
        span: u64,
        block_hash: B256,
    ) -> Result<bool, EngineError>;

    /// Execute a system transaction against the host EVM. The transaction's
    /// calldata was built by the engine; `sender` is the block coinbase.
    fn execute_system_tx(
        &self,
        state: &mut dyn StateHost,
        header: &Header,
        sender: Address,
        tx: &TxLegacy,
    ) -> Result<(), EngineError>;
}

/// Build a synthetic system transaction: gas price zero, half-max gas limit,
/// EIP-155 signed with the engine's chain id.
pub fn system_tx(chain_id: u64, nonce: u64, to: Address, value: U256, input: Bytes) -> TxLegacy {
    TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price: 0,
        gas_limit: SYSTEM_TX_GAS_LIMIT,
        to: TxKind::Call(to),
        value,
        input,
    }
}
