//! Header extra-data codec and seal hashing.
//!
//! Sealed headers carry `[vanity (32)][payload][signature (65)]` in
//! `extra_data`. The payload is empty on ordinary blocks, the concatenated
//! signer addresses on PoA checkpoint blocks, and the next span's validator
//! records plus the three system-contract addresses on span-transition
//! blocks.

use crate::constants::{
    ADDRESS_LENGTH, EXTRA_SEAL_LENGTH, EXTRA_VANITY_LENGTH, NONCE_AUTH, NONCE_DROP,
    SYSTEM_CONTRACTS_BYTES_LENGTH, VALIDATOR_BYTES_LENGTH,
};
use crate::errors::EngineError;
use alloy_consensus::Header;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};

/// One entry of a span's producer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// Producer address
    pub address: Address,
    /// Sampling weight committed by the stake contract
    pub power: u64,
}

impl ValidatorInfo {
    /// Create a validator record.
    pub fn new(address: Address, power: u64) -> Self {
        Self { address, power }
    }
}

/// The three system-contract addresses active for a span, embedded in the
/// span-transition payload so syncing nodes can reconstruct reward and slash
/// targets without contract access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemContracts {
    /// Receives reward distributions
    pub stake_manager: Address,
    /// Records slashes of absent in-turn signers
    pub slash_manager: Address,
    /// Reserved fallback block producer
    pub official_node: Address,
}

/// Payload section of a header's extra data (between vanity and seal).
pub fn extra_payload(header: &Header) -> Result<&[u8], EngineError> {
    let extra = &header.extra_data;
    if extra.len() < EXTRA_VANITY_LENGTH {
        return Err(EngineError::MissingVanity);
    }
    if extra.len() < EXTRA_VANITY_LENGTH + EXTRA_SEAL_LENGTH {
        return Err(EngineError::MissingSignature);
    }
    Ok(&extra[EXTRA_VANITY_LENGTH..extra.len() - EXTRA_SEAL_LENGTH])
}

/// The 65-byte seal signature at the end of a header's extra data.
pub fn seal_signature(header: &Header) -> Result<&[u8], EngineError> {
    let extra = &header.extra_data;
    if extra.len() < EXTRA_VANITY_LENGTH + EXTRA_SEAL_LENGTH {
        return Err(EngineError::MissingSignature);
    }
    Ok(&extra[extra.len() - EXTRA_SEAL_LENGTH..])
}

/// Decode the checkpoint signer list from a PoA checkpoint payload.
pub fn decode_checkpoint_signers(payload: &[u8]) -> Result<Vec<Address>, EngineError> {
    if payload.len() % ADDRESS_LENGTH != 0 {
        return Err(EngineError::InvalidCheckpointSigners);
    }
    Ok(payload
        .chunks_exact(ADDRESS_LENGTH)
        .map(Address::from_slice)
        .collect())
}

/// Encode a checkpoint signer list (addresses must already be sorted).
pub fn encode_checkpoint_signers(signers: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(signers.len() * ADDRESS_LENGTH);
    for signer in signers {
        out.extend_from_slice(signer.as_slice());
    }
    out
}

/// Decode a span-transition payload: validator records followed by the three
/// system-contract addresses.
pub fn decode_span_payload(
    payload: &[u8],
) -> Result<(Vec<ValidatorInfo>, SystemContracts), EngineError> {
    if payload.len() < SYSTEM_CONTRACTS_BYTES_LENGTH
        || (payload.len() - SYSTEM_CONTRACTS_BYTES_LENGTH) % VALIDATOR_BYTES_LENGTH != 0
    {
        return Err(EngineError::MismatchingSpanValidators);
    }
    let (records, tail) = payload.split_at(payload.len() - SYSTEM_CONTRACTS_BYTES_LENGTH);

    let mut validators = Vec::with_capacity(records.len() / VALIDATOR_BYTES_LENGTH);
    for record in records.chunks_exact(VALIDATOR_BYTES_LENGTH) {
        let address = Address::from_slice(&record[..ADDRESS_LENGTH]);
        let power_bytes = &record[ADDRESS_LENGTH..];
        // Powers are u64 left-padded big-endian into 20 bytes.
        if power_bytes[..12].iter().any(|b| *b != 0) {
            return Err(EngineError::MismatchingSpanValidators);
        }
        let power = u64::from_be_bytes(power_bytes[12..].try_into().expect("8 bytes"));
        validators.push(ValidatorInfo::new(address, power));
    }

    let contracts = SystemContracts {
        stake_manager: Address::from_slice(&tail[..ADDRESS_LENGTH]),
        slash_manager: Address::from_slice(&tail[ADDRESS_LENGTH..2 * ADDRESS_LENGTH]),
        official_node: Address::from_slice(&tail[2 * ADDRESS_LENGTH..]),
    };
    Ok((validators, contracts))
}

/// Encode validator records as consecutive 40-byte entries.
pub fn encode_validators(validators: &[ValidatorInfo]) -> Vec<u8> {
    let mut out = Vec::with_capacity(validators.len() * VALIDATOR_BYTES_LENGTH);
    for validator in validators {
        out.extend_from_slice(validator.address.as_slice());
        let mut power = [0u8; ADDRESS_LENGTH];
        power[12..].copy_from_slice(&validator.power.to_be_bytes());
        out.extend_from_slice(&power);
    }
    out
}

/// Encode a span-transition payload.
pub fn encode_span_payload(validators: &[ValidatorInfo], contracts: &SystemContracts) -> Vec<u8> {
    let mut out = encode_validators(validators);
    out.reserve(SYSTEM_CONTRACTS_BYTES_LENGTH);
    out.extend_from_slice(contracts.stake_manager.as_slice());
    out.extend_from_slice(contracts.slash_manager.as_slice());
    out.extend_from_slice(contracts.official_node.as_slice());
    out
}

/// The voted address carried by a header: in the mix digest once Erawan is
/// active, in the coinbase before it.
pub fn vote_target(header: &Header, erawan_active: bool) -> Address {
    if erawan_active {
        Address::from_slice(&header.mix_hash[12..])
    } else {
        header.beneficiary
    }
}

/// Write a vote into a candidate header per the Erawan rule.
pub fn set_vote(header: &mut Header, target: Address, authorize: bool, erawan_active: bool) {
    if erawan_active {
        let mut digest = [0u8; 32];
        digest[12..].copy_from_slice(target.as_slice());
        header.mix_hash = B256::from(digest);
    } else {
        header.beneficiary = target;
    }
    header.nonce = if authorize { NONCE_AUTH } else { NONCE_DROP };
}

/// Hash signed by the sealer: keccak256 of the RLP list of every consensus
/// header field with the 65-byte seal stripped from the extra data. The
/// base-fee element is appended only when the header carries one.
pub fn seal_hash(header: &Header) -> B256 {
    let extra = &header.extra_data;
    let cut = extra.len().saturating_sub(EXTRA_SEAL_LENGTH);

    let mut fields = Vec::new();
    header.parent_hash.encode(&mut fields);
    header.ommers_hash.encode(&mut fields);
    header.beneficiary.encode(&mut fields);
    header.state_root.encode(&mut fields);
    header.transactions_root.encode(&mut fields);
    header.receipts_root.encode(&mut fields);
    header.logs_bloom.encode(&mut fields);
    header.difficulty.encode(&mut fields);
    U256::from(header.number).encode(&mut fields);
    header.gas_limit.encode(&mut fields);
    header.gas_used.encode(&mut fields);
    header.timestamp.encode(&mut fields);
    extra[..cut].encode(&mut fields);
    header.mix_hash.encode(&mut fields);
    header.nonce.encode(&mut fields);
    if let Some(base_fee) = header.base_fee_per_gas {
        base_fee.encode(&mut fields);
    }

    let mut out = Vec::with_capacity(fields.len() + 9);
    alloy_rlp::Header { list: true, payload_length: fields.len() }.encode(&mut out);
    out.extend_from_slice(&fields);
    keccak256(&out)
}

/// Whether the header's nonce is one of the two vote magic values.
pub fn valid_vote_nonce(header: &Header) -> bool {
    header.nonce == NONCE_AUTH || header.nonce == NONCE_DROP
}

/// Whether the header's nonce casts an "authorize" vote.
pub fn is_auth_vote(header: &Header) -> bool {
    header.nonce == NONCE_AUTH
}
