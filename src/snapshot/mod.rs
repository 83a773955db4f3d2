//! Authoritative voting state at a block height.
//!
//! A snapshot records who may seal, who sealed recently, the open signer-set
//! votes with their tallies, and (once Chaophraya is active) the committed
//! span validators and system-contract addresses. Snapshots are values:
//! `apply` clones the receiver and folds headers forward, so callers holding
//! a cached snapshot never observe mutation.

pub mod store;

use crate::config::ChaophrayaConfig;
use crate::errors::EngineError;
use crate::header::{
    decode_span_payload, extra_payload, is_auth_vote, valid_vote_nonce, vote_target,
    SystemContracts, ValidatorInfo,
};
use crate::recovery::{recover_signer, SignatureCache};
use alloy_consensus::Header;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A single open vote to mutate the signer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Signer that cast the vote
    pub signer: Address,
    /// Height the vote was cast at
    pub block: u64,
    /// Account the vote is about
    pub address: Address,
    /// Add (`true`) or drop (`false`) the account
    pub authorize: bool,
}

/// Running count of open votes for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Direction every counted vote agrees on
    pub authorize: bool,
    /// Number of outstanding votes for this target
    pub votes: u64,
}

/// Voting state of the chain at a given block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Height this snapshot describes
    pub number: u64,
    /// Hash of the block at that height
    pub hash: B256,
    /// Authorized signers at this moment
    pub signers: BTreeSet<Address>,
    /// Recent sealers, height → signer, bounded to `|signers|/2 + 1` entries
    pub recents: BTreeMap<u64, Address>,
    /// Open votes, in casting order
    pub votes: Vec<Vote>,
    /// Vote counts per target, kept in sync with `votes`
    pub tally: BTreeMap<Address, Tally>,
    /// Committed producer sequence for the current span
    #[serde(default)]
    pub validators: Vec<ValidatorInfo>,
    /// System contracts active for the current span
    #[serde(default)]
    pub system_contracts: SystemContracts,
    /// Validator payload staged by the last span-update block, promoted on
    /// the first block of the next span
    #[serde(default)]
    pub pending_validators: Vec<ValidatorInfo>,
    /// System contracts staged alongside `pending_validators`
    #[serde(default)]
    pub pending_contracts: SystemContracts,
}

impl Snapshot {
    /// Bootstrap snapshot from a set of initial signers (genesis extra data).
    pub fn genesis(number: u64, hash: B256, initial_signers: Vec<Address>) -> Self {
        Self {
            number,
            hash,
            signers: initial_signers.into_iter().collect(),
            recents: BTreeMap::new(),
            votes: Vec::new(),
            tally: BTreeMap::new(),
            validators: Vec::new(),
            system_contracts: SystemContracts::default(),
            pending_validators: Vec::new(),
            pending_contracts: SystemContracts::default(),
        }
    }

    /// Authorized signers in ascending order.
    pub fn signers_sorted(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    /// The signer whose turn it is at `number`, per the effective signer set
    /// for that height.
    pub fn inturn_signer(&self, config: &ChaophrayaConfig, number: u64) -> Option<Address> {
        let signers = self.effective_signers(config, number);
        if signers.is_empty() {
            return None;
        }
        Some(signers[(number as usize) % signers.len()])
    }

    /// Whether `signer` is in turn at `number`.
    pub fn inturn(&self, config: &ChaophrayaConfig, number: u64, signer: Address) -> bool {
        self.inturn_signer(config, number) == Some(signer)
    }

    /// The signer set authorized to seal block `number`, in ascending order.
    ///
    /// When `number` starts a new span and a validator payload is staged, the
    /// staged set is already in force for that block.
    pub fn effective_signers(&self, config: &ChaophrayaConfig, number: u64) -> Vec<Address> {
        if config.is_span_first(number) && !self.pending_validators.is_empty() {
            let set: BTreeSet<Address> =
                self.pending_validators.iter().map(|v| v.address).collect();
            set.into_iter().collect()
        } else {
            self.signers_sorted()
        }
    }

    /// The system contracts in force when sealing block `number`.
    pub fn system_contracts_for(
        &self,
        config: &ChaophrayaConfig,
        number: u64,
    ) -> SystemContracts {
        if config.is_span_first(number) && !self.pending_validators.is_empty() {
            self.pending_contracts
        } else {
            self.system_contracts
        }
    }

    /// The official fallback producer in force when sealing block `number`.
    pub fn official_node(&self, config: &ChaophrayaConfig, number: u64) -> Address {
        self.system_contracts_for(config, number).official_node
    }

    /// Whether `signer` may seal block `number`: a member of the effective
    /// signer set, or the official node once Chaophraya is active.
    pub fn is_authorized(
        &self,
        config: &ChaophrayaConfig,
        number: u64,
        signer: Address,
    ) -> bool {
        if self.effective_signers(config, number).contains(&signer) {
            return true;
        }
        let official = self.official_node(config, number);
        config.is_chaophraya(number) && official != Address::ZERO && signer == official
    }

    /// Whether `signer` sealed inside its exclusion window relative to block
    /// `number`.
    pub fn signed_recently(&self, config: &ChaophrayaConfig, number: u64, signer: Address) -> bool {
        let limit = self.effective_signers(config, number).len() as u64 / 2 + 1;
        self.recents
            .iter()
            .any(|(seen, who)| *who == signer && seen + limit > number)
    }

    /// Whether casting `(address, authorize)` would be a meaningful vote.
    pub fn valid_vote(&self, address: Address, authorize: bool) -> bool {
        self.signers.contains(&address) != authorize
    }

    /// Fold `headers` (contiguous, ascending, starting right after this
    /// snapshot) into a new snapshot.
    pub fn apply(
        &self,
        config: &ChaophrayaConfig,
        headers: &[Header],
        sigcache: &SignatureCache,
    ) -> Result<Snapshot, EngineError> {
        if headers.is_empty() {
            return Ok(self.clone());
        }
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(EngineError::InvalidVotingChain);
            }
        }
        if headers[0].number != self.number + 1 {
            return Err(EngineError::InvalidVotingChain);
        }

        let mut snap = self.clone();
        for header in headers {
            snap.apply_header(config, header, sigcache)?;
        }
        let last = headers.last().expect("non-empty");
        snap.number = last.number;
        snap.hash = last.hash_slow();
        Ok(snap)
    }

    fn apply_header(
        &mut self,
        config: &ChaophrayaConfig,
        header: &Header,
        sigcache: &SignatureCache,
    ) -> Result<(), EngineError> {
        let number = header.number;

        // A staged validator payload takes effect on the first block of its
        // span, before any authorization check: the new committee seals it.
        if config.is_span_first(number) && !self.pending_validators.is_empty() {
            self.rotate_span(number);
        }

        // Votes expire wholesale at every epoch start.
        if config.is_epoch_start(number) {
            self.votes.clear();
            self.tally.clear();
        }

        // Shift the recent-sealer window forward.
        let limit = self.signers.len() as u64 / 2 + 1;
        self.recents.retain(|seen, _| seen + limit > number);

        let signer = recover_signer(header, sigcache)?;
        if !self.is_authorized_now(config, number, signer) {
            return Err(EngineError::UnauthorizedSigner(signer));
        }
        if self.recents.values().any(|recent| *recent == signer) {
            return Err(EngineError::RecentlySigned);
        }
        self.recents.insert(number, signer);

        // Span-update blocks stage the next committee from their own payload.
        if config.is_span_update(number) {
            let payload = extra_payload(header)?;
            let (validators, contracts) = decode_span_payload(payload)?;
            debug!(
                target: "chaophraya::snapshot",
                block = number,
                validators = validators.len(),
                "staged span validator payload"
            );
            self.pending_validators = validators;
            self.pending_contracts = contracts;
        }

        // Checkpoints carry no vote.
        if config.is_epoch_start(number) {
            return Ok(());
        }

        let voted = vote_target(header, config.is_erawan(number));
        if voted == Address::ZERO {
            return Ok(());
        }
        if !valid_vote_nonce(header) {
            return Err(EngineError::InvalidVote);
        }
        let authorize = is_auth_vote(header);

        // A signer's newer vote for the same target replaces the older one.
        self.uncast(signer, voted);
        if self.valid_vote(voted, authorize) {
            self.votes.push(Vote { signer, block: number, address: voted, authorize });
            self.tally
                .entry(voted)
                .and_modify(|tally| tally.votes += 1)
                .or_insert(Tally { authorize, votes: 1 });
        }

        self.settle(voted, number);
        Ok(())
    }

    /// Authorization check against the *current* (already rotated) state.
    fn is_authorized_now(&self, config: &ChaophrayaConfig, number: u64, signer: Address) -> bool {
        if self.signers.contains(&signer) {
            return true;
        }
        let official = self.system_contracts.official_node;
        config.is_chaophraya(number) && official != Address::ZERO && signer == official
    }

    /// Apply the signer-set transition for `voted` if its tally passed the
    /// majority threshold.
    fn settle(&mut self, voted: Address, number: u64) {
        let Some(tally) = self.tally.get(&voted).copied() else { return };
        if tally.votes as usize <= self.signers.len() / 2 {
            return;
        }

        if tally.authorize {
            self.signers.insert(voted);
            debug!(target: "chaophraya::snapshot", signer = %voted, block = number, "signer authorized");
        } else {
            self.signers.remove(&voted);
            debug!(target: "chaophraya::snapshot", signer = %voted, block = number, "signer deauthorized");

            // The exclusion window just shrank; let blocked signers through.
            let limit = self.signers.len() as u64 / 2 + 1;
            self.recents.retain(|seen, _| seen + limit > number);

            // Every vote the removed signer cast dies with its authority.
            let orphaned: Vec<Vote> = self
                .votes
                .iter()
                .filter(|vote| vote.signer == voted)
                .copied()
                .collect();
            for vote in orphaned {
                self.uncast(vote.signer, vote.address);
            }
        }

        // All votes about the settled target are spent.
        self.votes.retain(|vote| vote.address != voted);
        self.tally.remove(&voted);
    }

    /// Remove a previous vote by `signer` for `address`, adjusting the tally.
    fn uncast(&mut self, signer: Address, address: Address) {
        let Some(position) = self
            .votes
            .iter()
            .position(|vote| vote.signer == signer && vote.address == address)
        else {
            return;
        };
        self.votes.remove(position);

        if let Some(tally) = self.tally.get_mut(&address) {
            if tally.votes > 1 {
                tally.votes -= 1;
            } else {
                self.tally.remove(&address);
            }
        }
    }

    /// Promote the staged committee into the active span.
    fn rotate_span(&mut self, number: u64) {
        let committee: BTreeSet<Address> =
            self.pending_validators.iter().map(|v| v.address).collect();
        if !committee.is_empty() {
            self.signers = committee;
        }
        self.validators = std::mem::take(&mut self.pending_validators);
        self.system_contracts = self.pending_contracts;
        debug!(
            target: "chaophraya::snapshot",
            block = number,
            validators = self.validators.len(),
            official = %self.system_contracts.official_node,
            "span committee rotated in"
        );
    }
}
