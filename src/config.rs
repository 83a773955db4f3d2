//! Engine Configuration
//!
//! Chain-level knobs recognized by the engine: block cadence, epoch and span
//! geometry, the two activation heights (Erawan moves votes into the mix
//! digest, Chaophraya switches signer selection to the on-chain contracts),
//! and the validator contract addresses.

use crate::constants::DEFAULT_EPOCH;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Consensus configuration for a chain running this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaophrayaConfig {
    /// Minimum seconds between consecutive blocks
    pub period: u64,
    /// Blocks between vote resets / checkpoint signer lists
    pub epoch: u64,
    /// Blocks per validator span once Chaophraya is active
    pub span: u64,
    /// Height at which votes move from the coinbase into the mix digest
    pub erawan_block: Option<u64>,
    /// Height at which validator-set selection is delegated to the contracts
    pub chaophraya_block: Option<u64>,
    /// Validator-set contract
    pub validator_contract: Address,
    /// Second-generation validator-set contract
    pub validator_contract_v2: Address,
    /// Height at which the v2 validator contract replaces the original
    pub validator_contract_v2_block: Option<u64>,
    /// EIP-155 signing chain id
    pub chain_id: u64,
}

impl ChaophrayaConfig {
    /// A minimal PoA-only configuration: 1-second blocks, default epoch, no
    /// activations. Tests and dev chains start from this and override fields.
    pub fn poa_only(chain_id: u64) -> Self {
        Self {
            period: 1,
            epoch: DEFAULT_EPOCH,
            span: 0,
            erawan_block: None,
            chaophraya_block: None,
            validator_contract: Address::ZERO,
            validator_contract_v2: Address::ZERO,
            validator_contract_v2_block: None,
            chain_id,
        }
    }

    /// Whether the Erawan vote-in-mix-digest rule is active at `number`.
    pub fn is_erawan(&self, number: u64) -> bool {
        self.erawan_block.is_some_and(|at| number >= at)
    }

    /// Whether PoSA span selection is active at `number`.
    pub fn is_chaophraya(&self, number: u64) -> bool {
        self.chaophraya_block.is_some_and(|at| number >= at)
    }

    /// Whether `number` is the exact Chaophraya activation height.
    pub fn is_on_chaophraya(&self, number: u64) -> bool {
        self.chaophraya_block == Some(number)
    }

    /// Whether `number` starts an epoch (votes reset, PoA checkpoint).
    pub fn is_epoch_start(&self, number: u64) -> bool {
        self.epoch > 0 && number % self.epoch == 0
    }

    /// Whether `number` is the first block of a span.
    pub fn is_span_first(&self, number: u64) -> bool {
        self.span > 0 && self.is_chaophraya(number) && number % self.span == 0
    }

    /// Whether the block at `number` must embed the validator payload for the
    /// span starting at `number + 1`.
    pub fn is_span_update(&self, number: u64) -> bool {
        self.span > 0
            && self.is_chaophraya(number + 1)
            && (number + 1) % self.span == 0
    }

    /// Whether the finalizer commits the next span's validator list at `number`.
    pub fn is_span_commitment(&self, number: u64) -> bool {
        self.span > 0
            && self.is_chaophraya(number)
            && number % self.span == self.span / 2 + 1
    }

    /// The validator contract in force at `number` (v2 after its fork height).
    pub fn validator_contract_at(&self, number: u64) -> Address {
        match self.validator_contract_v2_block {
            Some(at) if number >= at => self.validator_contract_v2,
            _ => self.validator_contract,
        }
    }
}
