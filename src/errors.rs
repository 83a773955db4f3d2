//! Engine error kinds.
//!
//! Each variant has a stable identity that verification tests match against;
//! callers receive them unchanged (no internal retry).

use alloy_primitives::Address;
use thiserror::Error;

/// Errors surfaced by header verification, snapshot derivation, sealing and
/// finalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The referenced block (or its parent) is not known to the chain
    #[error("unknown block")]
    UnknownBlock,

    /// Block timestamp is ahead of the local wall clock
    #[error("block in the future")]
    FutureBlock,

    /// Extra data is shorter than the 32-byte vanity prefix
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    /// Extra data is missing the 65-byte seal suffix
    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    /// Non-checkpoint block carries a signer/validator payload
    #[error("non-checkpoint block contains extra signer list")]
    ExtraSigners,

    /// Checkpoint signer payload is not a multiple of the address length
    #[error("invalid signer list on checkpoint block")]
    InvalidCheckpointSigners,

    /// Checkpoint signer payload differs from the locally computed signer set
    #[error("checkpoint signers mismatch")]
    MismatchingCheckpointSigners,

    /// Span-transition validator payload is malformed or differs from the
    /// contract-reported next span
    #[error("span validators mismatch")]
    MismatchingSpanValidators,

    /// Checkpoint block carries a beneficiary vote
    #[error("beneficiary in checkpoint block non-zero")]
    InvalidCheckpointBeneficiary,

    /// Vote nonce is neither the authorize nor the drop magic value
    #[error("vote nonce not 0x00..0 or 0xff..f")]
    InvalidVote,

    /// Checkpoint block carries a non-drop vote nonce or a voted address
    #[error("vote nonce on checkpoint block non-zero")]
    InvalidCheckpointVote,

    /// Mix digest is non-zero where the format forbids it
    #[error("non-zero mix digest")]
    InvalidMixDigest,

    /// Block carries a non-empty uncle hash
    #[error("non empty uncle hash")]
    InvalidUncleHash,

    /// Difficulty is outside {1, 2}, or a difficulty-1 block was sealed by a
    /// non-official node after the Chaophraya activation
    #[error("invalid difficulty")]
    InvalidDifficulty,

    /// Declared difficulty does not match the signer's turn
    #[error("wrong difficulty")]
    WrongDifficulty,

    /// Block timestamp is below parent time plus the configured period
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// Gas limit is out of bounds or drifts too far from the parent's
    #[error("invalid gas limit: have {have}, parent {parent}")]
    InvalidGasLimit {
        /// Gas limit declared by the header
        have: u64,
        /// Parent block gas limit
        parent: u64,
    },

    /// Gas limit exceeds the protocol cap of `2^63 - 1`
    #[error("gas limit above protocol cap: {0}")]
    GasLimitOverflow(u64),

    /// Headers handed to a batch apply are not a contiguous ascending chain
    #[error("invalid voting chain")]
    InvalidVotingChain,

    /// The seal was produced by an address outside the authorized set
    #[error("unauthorized signer {0}")]
    UnauthorizedSigner(Address),

    /// The signer sealed a block inside its recent-signer exclusion window
    #[error("recently signed")]
    RecentlySigned,

    /// A snapshot could not be located or derived for the requested height
    #[error("failed to retrieve snapshot: {0}")]
    GetSnapshotFailed(String),

    /// Span bookkeeping is inconsistent (empty eligible set, overflowing
    /// weights, zero-length span)
    #[error("invalid span: {0}")]
    InvalidSpan(String),

    /// A mandatory system transaction is absent from or disagrees with the
    /// block's received transaction stream
    #[error("system transaction mismatch: {0}")]
    SystemTxMismatch(String),

    /// The seal signature cannot be parsed or recovered
    #[error("invalid seal signature")]
    InvalidSignature,

    /// The engine holds no signing key (seal requested before authorize)
    #[error("no signing credentials configured")]
    NoSigner,

    /// The local signer refused or failed to produce a signature
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// A read-only contract call required by prepare/finalize failed
    #[error("contract call failed: {0}")]
    ContractCallFailed(String),

    /// Sealing was aborted by the caller's stop signal
    #[error("sealing aborted")]
    SealingAborted,

    /// Sealing height 0, or an empty block while `period == 0`
    #[error("refusing to seal: {0}")]
    UnsealableBlock(String),
}
