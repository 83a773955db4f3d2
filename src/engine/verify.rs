//! Header verification.
//!
//! Standalone checks need nothing beyond the header (and the batch's earlier
//! headers); cascading checks reach for the parent and the snapshot, then
//! validate the seal under the PoA or PoSA rule for that height.

use crate::chain::HeaderReader;
use crate::constants::{DIFF_IN_TURN, DIFF_NO_TURN, NONCE_DROP, SYSTEM_CONTRACTS_BYTES_LENGTH, VALIDATOR_BYTES_LENGTH};
use crate::engine::{unix_now, Chaophraya};
use crate::errors::EngineError;
use crate::header::{
    decode_span_payload, encode_checkpoint_signers, extra_payload, valid_vote_nonce, vote_target,
};
use crate::recovery::recover_signer;
use crate::snapshot::Snapshot;
use alloy_consensus::constants::EMPTY_OMMER_ROOT_HASH;
use alloy_consensus::Header;
use alloy_primitives::{Address, B256};
use tokio::sync::mpsc;

impl Chaophraya {
    /// Verify a single header. With `seal` unset the snapshot-backed seal
    /// checks are skipped (used for the node's own pending blocks).
    pub fn verify_header(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), EngineError> {
        self.verify_header_with_parents(chain, header, &[], seal)
    }

    /// Verify a batch of headers assumed to be contiguous and ascending.
    /// Results arrive on the returned channel in input order; earlier headers
    /// in the batch serve as parents for later ones.
    pub fn verify_headers(
        &self,
        chain: &dyn HeaderReader,
        headers: &[Header],
    ) -> mpsc::UnboundedReceiver<Result<(), EngineError>> {
        let (results, receiver) = mpsc::unbounded_channel();
        for (index, header) in headers.iter().enumerate() {
            let outcome = self.verify_header_with_parents(chain, header, &headers[..index], true);
            if results.send(outcome).is_err() {
                break;
            }
        }
        receiver
    }

    fn verify_header_with_parents(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        parents: &[Header],
        seal: bool,
    ) -> Result<(), EngineError> {
        let number = header.number;

        // Advisory wall-clock bound.
        if header.timestamp > unix_now() {
            return Err(EngineError::FutureBlock);
        }

        let checkpoint = self.config.is_epoch_start(number);
        let span_update = self.config.is_span_update(number);
        let erawan = self.config.is_erawan(number);
        let posa = self.config.is_chaophraya(number);

        if !valid_vote_nonce(header) {
            return Err(EngineError::InvalidVote);
        }
        if (checkpoint || span_update) && header.nonce != NONCE_DROP {
            return Err(EngineError::InvalidCheckpointVote);
        }
        if (checkpoint || span_update) && vote_target(header, erawan) != Address::ZERO {
            return Err(if erawan {
                EngineError::InvalidCheckpointVote
            } else {
                EngineError::InvalidCheckpointBeneficiary
            });
        }

        // Pre-Erawan the mix digest carries nothing.
        if !erawan && header.mix_hash != B256::ZERO {
            return Err(EngineError::InvalidMixDigest);
        }

        let payload = extra_payload(header)?;
        if span_update {
            if payload.len() < SYSTEM_CONTRACTS_BYTES_LENGTH
                || (payload.len() - SYSTEM_CONTRACTS_BYTES_LENGTH) % VALIDATOR_BYTES_LENGTH != 0
            {
                return Err(EngineError::MismatchingSpanValidators);
            }
        } else if checkpoint && !posa {
            if payload.is_empty() || payload.len() % 20 != 0 {
                return Err(EngineError::InvalidCheckpointSigners);
            }
        } else if !payload.is_empty() && number > 0 {
            return Err(EngineError::ExtraSigners);
        }

        if header.ommers_hash != EMPTY_OMMER_ROOT_HASH {
            return Err(EngineError::InvalidUncleHash);
        }

        if number > 0
            && header.difficulty != DIFF_IN_TURN
            && header.difficulty != DIFF_NO_TURN
        {
            return Err(EngineError::InvalidDifficulty);
        }

        if header.gas_limit > i64::MAX as u64 {
            return Err(EngineError::GasLimitOverflow(header.gas_limit));
        }

        if number == 0 {
            return Ok(());
        }
        self.verify_cascading_fields(chain, header, parents, seal)
    }

    fn verify_cascading_fields(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        parents: &[Header],
        seal: bool,
    ) -> Result<(), EngineError> {
        let number = header.number;

        let parent = match parents.last() {
            Some(last) if last.number == number - 1 && last.hash_slow() == header.parent_hash => {
                last.clone()
            }
            _ => chain
                .header(header.parent_hash, number - 1)
                .ok_or(EngineError::UnknownBlock)?,
        };

        if parent.timestamp + self.config.period > header.timestamp {
            return Err(EngineError::InvalidTimestamp);
        }

        // Gas limit may drift at most 1/1024 of the parent's per block.
        let max_drift = parent.gas_limit / 1024;
        if header.gas_limit > parent.gas_limit + max_drift
            || header.gas_limit < parent.gas_limit.saturating_sub(max_drift)
        {
            return Err(EngineError::InvalidGasLimit {
                have: header.gas_limit,
                parent: parent.gas_limit,
            });
        }

        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents)?;

        // Checkpoint blocks republish the signer set; it must match ours.
        let checkpoint = self.config.is_epoch_start(number);
        let posa = self.config.is_chaophraya(number);
        if checkpoint && !posa {
            let payload = extra_payload(header)?;
            if payload != encode_checkpoint_signers(&snap.signers_sorted()) {
                return Err(EngineError::MismatchingCheckpointSigners);
            }
        }

        // Span-update blocks republish the committed next committee; it must
        // match what the contracts report.
        if self.config.is_span_update(number) {
            let payload = extra_payload(header)?;
            let (validators, contracts) = decode_span_payload(payload)?;
            let (expected_validators, expected_contracts) = self
                .contract_client()
                .current_validators(header.parent_hash, number + 1)?;
            if validators != expected_validators || contracts != expected_contracts {
                return Err(EngineError::MismatchingSpanValidators);
            }
        }

        if seal {
            self.verify_seal(&snap, header)?;
        }
        Ok(())
    }

    /// Check the seal signature against the snapshot's authorization rules
    /// and the declared difficulty against the signer's turn.
    pub(crate) fn verify_seal(&self, snap: &Snapshot, header: &Header) -> Result<(), EngineError> {
        let number = header.number;
        if number == 0 {
            return Err(EngineError::UnknownBlock);
        }

        let signer = recover_signer(header, self.signature_cache())?;
        if !snap.is_authorized(&self.config, number, signer) {
            return Err(EngineError::UnauthorizedSigner(signer));
        }
        if snap.signed_recently(&self.config, number, signer) {
            return Err(EngineError::RecentlySigned);
        }

        let inturn = snap.inturn(&self.config, number, signer);
        if inturn {
            if header.difficulty != DIFF_IN_TURN {
                return Err(EngineError::WrongDifficulty);
            }
            return Ok(());
        }

        // Out of turn.
        if self.config.is_chaophraya(number) {
            // Only the official node may produce the difficulty-1 fallback.
            if signer != snap.official_node(&self.config, number) {
                return Err(if header.difficulty == DIFF_NO_TURN {
                    EngineError::InvalidDifficulty
                } else {
                    EngineError::WrongDifficulty
                });
            }
        }
        if header.difficulty != DIFF_NO_TURN {
            return Err(EngineError::WrongDifficulty);
        }
        Ok(())
    }
}
