//! ABI calldata for the consensus contract calls.
//!
//! The contract ABIs are inputs to the engine; the byte layout of these calls
//! is consensus-critical because system-transaction hashes are compared
//! against the received stream during verification.

use alloy_primitives::{keccak256, Address, Bytes, U256};

/// First four bytes of the keccak256 of a Solidity function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    keccak256(signature.as_bytes())[..4]
        .try_into()
        .expect("4 bytes")
}

/// Left-pad an address into a 32-byte ABI word.
pub fn encode_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    word
}

/// Encode a u64 into a 32-byte ABI word.
pub fn encode_u64(value: u64) -> [u8; 32] {
    encode_u256(U256::from(value))
}

/// Encode a U256 into a 32-byte ABI word.
pub fn encode_u256(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

/// Function selectors for the consensus contract surface.
pub mod selectors {
    use super::function_selector;

    /// `commitSpan(uint256,bytes)` on the validator contract
    pub fn commit_span() -> [u8; 4] {
        function_selector("commitSpan(uint256,bytes)")
    }

    /// `slash(address,uint256)` on the slash manager
    pub fn slash() -> [u8; 4] {
        function_selector("slash(address,uint256)")
    }

    /// `distributeReward(address)` on the stake manager
    pub fn distribute_reward() -> [u8; 4] {
        function_selector("distributeReward(address)")
    }
}

/// Calldata committing `validator_bytes` as the producer list of `span`.
pub fn commit_span_call(span: u64, validator_bytes: &[u8]) -> Bytes {
    let mut data = Vec::with_capacity(4 + 96 + validator_bytes.len().next_multiple_of(32));
    data.extend_from_slice(&selectors::commit_span());
    data.extend_from_slice(&encode_u64(span));
    // Dynamic `bytes`: offset from the start of the argument block, length,
    // then the payload padded to a word boundary.
    data.extend_from_slice(&encode_u64(64));
    data.extend_from_slice(&encode_u64(validator_bytes.len() as u64));
    data.extend_from_slice(validator_bytes);
    let padding = validator_bytes.len().next_multiple_of(32) - validator_bytes.len();
    data.extend_from_slice(&vec![0u8; padding]);
    Bytes::from(data)
}

/// Calldata slashing `signer` within `span`.
pub fn slash_call(signer: Address, span: u64) -> Bytes {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&selectors::slash());
    data.extend_from_slice(&encode_address(signer));
    data.extend_from_slice(&encode_u64(span));
    Bytes::from(data)
}

/// Calldata distributing the attached value to `validator`'s stake.
pub fn distribute_reward_call(validator: Address) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&selectors::distribute_reward());
    data.extend_from_slice(&encode_address(validator));
    Bytes::from(data)
}
