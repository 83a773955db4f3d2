//! Wire-format and scheduling constants shared across the engine.

use alloy_primitives::{address, Address, B64, U256};
use std::time::Duration;

/// Extra data structure for sealed blocks
/// Format: [vanity (32 bytes)][checkpoint / span payload][signature (65 bytes)]
pub const EXTRA_VANITY_LENGTH: usize = 32;
/// Signature length in extra data (65 bytes: r=32, s=32, v=1)
pub const EXTRA_SEAL_LENGTH: usize = 65;
/// Ethereum address length (20 bytes)
pub const ADDRESS_LENGTH: usize = 20;
/// One validator record in a span payload: 20-byte address + 20-byte big-endian power
pub const VALIDATOR_BYTES_LENGTH: usize = 40;
/// Three trailing system-contract addresses on span-transition payloads
pub const SYSTEM_CONTRACTS_BYTES_LENGTH: usize = 3 * ADDRESS_LENGTH;

/// Nonce value of an "authorize" (add signer) vote
pub const NONCE_AUTH: B64 = B64::new([0xff; 8]);
/// Nonce value of a "drop" (remove signer) vote; also required on checkpoints
pub const NONCE_DROP: B64 = B64::ZERO;

/// Difficulty of a block sealed by the in-turn signer
pub const DIFF_IN_TURN: U256 = U256::from_limbs([2, 0, 0, 0]);
/// Difficulty of a block sealed out of turn
pub const DIFF_NO_TURN: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Default epoch length (blocks between vote resets / checkpoint signer lists)
pub const DEFAULT_EPOCH: u64 = 30_000;
/// Blocks between durable snapshot persists
pub const CHECKPOINT_INTERVAL: u64 = 1024;
/// In-memory snapshots retained by the snapshot store
pub const SNAPSHOT_CACHE_SIZE: usize = 128;
/// Recovered seal signers retained by the signature cache
pub const SIGNATURE_CACHE_SIZE: usize = 4096;

/// Per-signer slice of the out-of-turn sealing wiggle
pub const WIGGLE_TIME: Duration = Duration::from_millis(500);
/// Extra wait before the official node seals a fallback block for a live
/// (unslashed) absent signer
pub const FALLBACK_DELAY: Duration = Duration::from_secs(2);

/// Account where block fees accrue before finalize drains them to the coinbase
pub const SYSTEM_REWARD_ADDRESS: Address = address!("ffffFFFfFFffffffffffffffFfFFFfffFFFfFFfE");
/// Gas limit carried by synthetic system transactions
pub const SYSTEM_TX_GAS_LIMIT: u64 = u64::MAX / 2;

/// Key prefix for snapshots in the host key-value store
pub const SNAPSHOT_DB_PREFIX: &[u8] = b"chaophraya-";
