//! # Chaophraya: Hybrid PoA / PoSA Consensus Engine
//!
//! Consensus engine for a permissioned Ethereum-compatible chain. Blocks are
//! sealed Clique-style (ECDSA seal in the header extra data, signer-set
//! governance by in-band votes) until the Chaophraya activation height, after
//! which validator selection is delegated to on-chain contracts: eligible
//! validators are sampled by stake weight into fixed-length spans, absent
//! in-turn producers are slashed, and block rewards are distributed, all via
//! synthetic system transactions injected at finalize time.
//!
//! The host node supplies headers, account state, the snapshot database and
//! contract execution through the traits in [`chain`], [`contracts`] and
//! [`snapshot::store`]; the engine owns header verification, snapshot
//! derivation, block preparation, finalization and sealing.

pub mod cache;
pub mod chain;
pub mod config;
pub mod constants;
pub mod contracts;
pub mod dev;
pub mod engine;
pub mod errors;
pub mod header;
pub mod recovery;
pub mod selection;
pub mod snapshot;

pub use chain::{HeaderReader, StateHost};
pub use config::ChaophrayaConfig;
pub use contracts::ContractClient;
pub use engine::{Chaophraya, PendingBlock};
pub use errors::EngineError;
pub use header::{SystemContracts, ValidatorInfo};
pub use snapshot::store::SnapshotDb;
pub use snapshot::Snapshot;
