//! The consensus engine.
//!
//! [`Chaophraya`] owns the shared caches (snapshots, recovered signers), the
//! sealing identity, and the operator's proposal set, and exposes the surface
//! the host consumes: author recovery, header verification, block
//! preparation, finalization with system transactions, and sealing.
//!
//! Identity and proposals sit behind one read/write lock; every operation
//! takes a brief read lock and copies the fields out before doing work, so
//! nothing blocks while signatures are produced or snapshots derived.

mod finalize;
mod prepare;
mod seal;
mod verify;

#[cfg(test)]
pub(crate) mod testutil;

pub use seal::PendingBlock;

use crate::cache::LruCache;
use crate::chain::HeaderReader;
use crate::config::ChaophrayaConfig;
use crate::constants::{
    CHECKPOINT_INTERVAL, DIFF_IN_TURN, DIFF_NO_TURN, SIGNATURE_CACHE_SIZE,
};
use crate::contracts::ContractClient;
use crate::errors::EngineError;
use crate::header::{decode_checkpoint_signers, extra_payload};
use crate::recovery::{recover_signer, SignatureCache};
use crate::snapshot::store::{SnapshotDb, SnapshotStore};
use crate::snapshot::Snapshot;
use alloy_consensus::Header;
use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Sealing identity and operator proposals, guarded by one lock.
#[derive(Debug, Default)]
struct Inner {
    /// Address the engine seals as
    val: Address,
    /// Key used for seal and system-transaction signatures
    signer: Option<PrivateKeySigner>,
    /// Operator-submitted signer-set proposals: target → authorize
    proposals: HashMap<Address, bool>,
}

/// Hybrid PoA → PoSA consensus engine.
pub struct Chaophraya {
    config: ChaophrayaConfig,
    store: SnapshotStore,
    signatures: SignatureCache,
    client: Arc<dyn ContractClient>,
    inner: RwLock<Inner>,
}

impl Chaophraya {
    /// Create an engine over the host snapshot database and contract client.
    pub fn new(
        config: ChaophrayaConfig,
        db: Arc<dyn SnapshotDb>,
        client: Arc<dyn ContractClient>,
    ) -> Self {
        Self {
            config,
            store: SnapshotStore::new(db),
            signatures: Mutex::new(LruCache::new(SIGNATURE_CACHE_SIZE)),
            client,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// The engine's consensus configuration.
    pub fn config(&self) -> &ChaophrayaConfig {
        &self.config
    }

    /// Inject the sealing credentials. The engine seals and signs system
    /// transactions as `signer.address()` from this point on.
    pub fn authorize(&self, signer: PrivateKeySigner) {
        let mut inner = self.inner.write().expect("engine lock poisoned");
        inner.val = signer.address();
        info!(target: "chaophraya::engine", val = %inner.val, "sealing identity configured");
        inner.signer = Some(signer);
    }

    /// Queue a signer-set proposal the preparer may inject into future blocks.
    pub fn propose(&self, address: Address, authorize: bool) {
        let mut inner = self.inner.write().expect("engine lock poisoned");
        inner.proposals.insert(address, authorize);
    }

    /// Drop a queued proposal.
    pub fn discard(&self, address: Address) {
        let mut inner = self.inner.write().expect("engine lock poisoned");
        inner.proposals.remove(&address);
    }

    /// The currently queued proposals.
    pub fn proposals(&self) -> HashMap<Address, bool> {
        self.inner.read().expect("engine lock poisoned").proposals.clone()
    }

    /// Copy the identity out from under the lock.
    pub(crate) fn identity(&self) -> (Address, Option<PrivateKeySigner>) {
        let inner = self.inner.read().expect("engine lock poisoned");
        (inner.val, inner.signer.clone())
    }

    /// Recover the address that sealed `header`.
    pub fn author(&self, header: &Header) -> Result<Address, EngineError> {
        recover_signer(header, &self.signatures)
    }

    /// Hash the sealer signs: the header with its seal stripped.
    pub fn seal_hash(&self, header: &Header) -> B256 {
        crate::header::seal_hash(header)
    }

    /// Difficulty the local identity would declare for the child of `parent`.
    pub fn calc_difficulty(
        &self,
        chain: &dyn HeaderReader,
        parent: &Header,
    ) -> Result<U256, EngineError> {
        let snap = self.snapshot(chain, parent.number, parent.hash_slow(), &[])?;
        let (val, _) = self.identity();
        Ok(if snap.inturn(&self.config, parent.number + 1, val) {
            DIFF_IN_TURN
        } else {
            DIFF_NO_TURN
        })
    }

    /// Uncle blocks are forbidden outright.
    pub fn verify_uncles(&self, uncles: &[Header]) -> Result<(), EngineError> {
        if uncles.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidUncleHash)
        }
    }

    /// Release engine resources. Nothing is held open today; the method keeps
    /// the host's shutdown path uniform across engines.
    pub fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Snapshot at an explicit height, or at the current head. Backs the
    /// operator status surface.
    pub fn snapshot_at(
        &self,
        chain: &dyn HeaderReader,
        number: Option<u64>,
    ) -> Result<Snapshot, EngineError> {
        let header = match number {
            Some(number) => chain.header_by_number(number),
            None => chain.current_header(),
        }
        .ok_or(EngineError::UnknownBlock)?;
        self.snapshot(chain, header.number, header.hash_slow(), &[])
    }

    /// Authorized signers at an explicit height, or at the current head.
    pub fn signers_at(
        &self,
        chain: &dyn HeaderReader,
        number: Option<u64>,
    ) -> Result<Vec<Address>, EngineError> {
        Ok(self.snapshot_at(chain, number)?.signers_sorted())
    }

    /// Resolve the snapshot at `(number, hash)`.
    ///
    /// Walks backwards collecting headers until it finds a snapshot in the
    /// LRU, a persisted checkpoint on disk, or the genesis; then replays the
    /// collected headers forward. `parents` supplies not-yet-imported
    /// ancestors during batch verification.
    pub fn snapshot(
        &self,
        chain: &dyn HeaderReader,
        number: u64,
        hash: B256,
        parents: &[Header],
    ) -> Result<Snapshot, EngineError> {
        let mut number = number;
        let mut hash = hash;
        let mut parents = parents;
        let mut headers: Vec<Header> = Vec::new();

        let snap = loop {
            if let Some(snap) = self.store.cached(hash) {
                break snap;
            }
            if number % CHECKPOINT_INTERVAL == 0 || self.config.is_on_chaophraya(number) {
                if let Some(snap) = self.store.load(hash) {
                    break snap;
                }
            }
            if number == 0 {
                let genesis = chain.header_by_number(0).ok_or(EngineError::UnknownBlock)?;
                let signers = decode_checkpoint_signers(extra_payload(&genesis)?)?;
                let snap = Snapshot::genesis(0, genesis.hash_slow(), signers);
                self.store.save(&snap)?;
                info!(target: "chaophraya::engine", signers = snap.signers.len(), "created genesis snapshot");
                break snap;
            }

            // Prefer the caller's unimported ancestors, fall back to the chain.
            let header = match parents.split_last() {
                Some((last, rest)) if last.number == number && last.hash_slow() == hash => {
                    parents = rest;
                    last.clone()
                }
                _ => chain.header(hash, number).ok_or(EngineError::UnknownBlock)?,
            };
            hash = header.parent_hash;
            number -= 1;
            headers.push(header);
        };

        headers.reverse();
        let applied = headers.len();
        let snap = snap.apply(&self.config, &headers, &self.signatures)?;
        self.store.remember(snap.clone());

        if applied > 0
            && (snap.number % CHECKPOINT_INTERVAL == 0 || self.config.is_on_chaophraya(snap.number))
        {
            self.store.save(&snap)?;
        }
        Ok(snap)
    }

    /// The span in force for block `number`, preferring the contract's value.
    /// On the first block of a span the contract (evaluated at the parent)
    /// still reports the previous span, so it is bumped by one there.
    pub(crate) fn span_for(&self, parent: &Header, number: u64) -> Result<u64, EngineError> {
        let span = self.client.current_span(parent)?;
        Ok(if self.config.is_span_first(number) { span + 1 } else { span })
    }

    pub(crate) fn contract_client(&self) -> &dyn ContractClient {
        self.client.as_ref()
    }

    pub(crate) fn signature_cache(&self) -> &SignatureCache {
        &self.signatures
    }
}

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs()
}
