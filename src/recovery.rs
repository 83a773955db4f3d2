//! Seal-signature recovery.
//!
//! Recovering the sealer of a block is an ECDSA public-key recovery over the
//! seal hash; it runs for every header the node verifies, so results are
//! cached by block hash.

use crate::cache::LruCache;
use crate::errors::EngineError;
use crate::header::{seal_hash, seal_signature};
use alloy_consensus::Header;
use alloy_primitives::{Address, Signature, B256};
use std::sync::Mutex;

/// Thread-safe recovered-signer cache keyed by block hash.
pub type SignatureCache = Mutex<LruCache<B256, Address>>;

/// Recover the address that sealed `header`, consulting and populating the
/// cache.
pub fn recover_signer(header: &Header, cache: &SignatureCache) -> Result<Address, EngineError> {
    let block_hash = header.hash_slow();
    {
        let mut cache = cache.lock().expect("signature cache lock poisoned");
        if let Some(signer) = cache.get(&block_hash) {
            return Ok(*signer);
        }
    }

    let signer = recover_uncached(header)?;

    cache
        .lock()
        .expect("signature cache lock poisoned")
        .insert(block_hash, signer);
    Ok(signer)
}

/// Recover the sealer without touching any cache.
pub fn recover_uncached(header: &Header) -> Result<Address, EngineError> {
    let sig_bytes = seal_signature(header)?;
    let signature =
        Signature::try_from(sig_bytes).map_err(|_| EngineError::InvalidSignature)?;

    signature
        .recover_address_from_prehash(&seal_hash(header))
        .map_err(|_| EngineError::InvalidSignature)
}

/// Encode a signature as the 65-byte `r ‖ s ‖ v` seal suffix.
pub fn signature_to_seal_bytes(signature: &Signature) -> [u8; 65] {
    let mut bytes = [0u8; 65];
    bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    bytes[64] = signature.v() as u8;
    bytes
}
