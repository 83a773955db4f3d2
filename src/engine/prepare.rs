//! Candidate header population.

use crate::chain::HeaderReader;
use crate::constants::{DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL_LENGTH, EXTRA_VANITY_LENGTH, NONCE_DROP};
use crate::engine::{unix_now, Chaophraya};
use crate::errors::EngineError;
use crate::header::{encode_checkpoint_signers, encode_span_payload, set_vote};
use alloy_consensus::Header;
use alloy_primitives::{Address, B256};
use rand::Rng;
use tracing::debug;

impl Chaophraya {
    /// Fill in the consensus fields of a candidate header whose `number` and
    /// `parent_hash` are already set.
    pub fn prepare(&self, chain: &dyn HeaderReader, header: &mut Header) -> Result<(), EngineError> {
        let number = header.number;
        if number == 0 {
            return Err(EngineError::UnknownBlock);
        }
        let parent = chain
            .header(header.parent_hash, number - 1)
            .ok_or(EngineError::UnknownBlock)?;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        let (val, _) = self.identity();
        let posa = self.config.is_chaophraya(number);

        // PoSA blocks are paid to their producer; PoA blocks keep the
        // coinbase free for the vote target.
        header.beneficiary = if posa { val } else { Address::ZERO };
        header.nonce = NONCE_DROP;
        header.mix_hash = B256::ZERO;

        // Ordinary PoA blocks may carry one operator proposal that the
        // current snapshot still considers meaningful, picked at random.
        // Signer-set votes end with the PoA phase: once Chaophraya is active
        // the contracts own the committee, and a pre-Erawan vote would land
        // in the coinbase the producer is paid through.
        if !posa && !self.config.is_epoch_start(number) && !self.config.is_span_update(number) {
            let candidates: Vec<(Address, bool)> = self
                .proposals()
                .into_iter()
                .filter(|(address, authorize)| snap.valid_vote(*address, *authorize))
                .collect();
            if !candidates.is_empty() {
                let (address, authorize) =
                    candidates[rand::thread_rng().gen_range(0..candidates.len())];
                set_vote(header, address, authorize, self.config.is_erawan(number));
                debug!(
                    target: "chaophraya::prepare",
                    block = number,
                    %address,
                    authorize,
                    "injected signer-set vote"
                );
            }
        }

        header.difficulty = if snap.inturn(&self.config, number, val) {
            DIFF_IN_TURN
        } else {
            DIFF_NO_TURN
        };

        let mut extra = header.extra_data.to_vec();
        if extra.len() < EXTRA_VANITY_LENGTH {
            extra.resize(EXTRA_VANITY_LENGTH, 0);
        } else {
            extra.truncate(EXTRA_VANITY_LENGTH);
        }
        if self.config.is_span_update(number) {
            let (validators, contracts) = self
                .contract_client()
                .current_validators(header.parent_hash, number + 1)?;
            extra.extend_from_slice(&encode_span_payload(&validators, &contracts));
        } else if self.config.is_epoch_start(number) && !posa {
            extra.extend_from_slice(&encode_checkpoint_signers(&snap.signers_sorted()));
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL_LENGTH]);
        header.extra_data = extra.into();

        header.timestamp = std::cmp::max(parent.timestamp + self.config.period, unix_now());
        Ok(())
    }
}
