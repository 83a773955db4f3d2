//! Block finalization: consensus-mandated system transactions.
//!
//! In PoSA mode every finalized block may carry up to three synthetic
//! transactions, in this order: the mid-span committee commitment, the slash
//! of an absent in-turn signer, and the reward distribution that drains the
//! system-reward account. While mining they are signed locally; while
//! verifying, each expected transaction's signing hash is matched against the
//! block's received system-transaction stream, in order, and any disagreement
//! rejects the block.

use crate::chain::{HeaderReader, StateHost};
use crate::constants::{DIFF_NO_TURN, SYSTEM_REWARD_ADDRESS};
use crate::contracts::{calldata, system_tx};
use crate::engine::Chaophraya;
use crate::errors::EngineError;
use crate::header::encode_validators;
use crate::selection::{derive_seed, select_span_validators, SEED_LOOKBACK};
use alloy_consensus::transaction::SignableTransaction;
use alloy_consensus::{Header, Signed, TxLegacy};
use alloy_primitives::{Address, Bytes, U256};
use alloy_signer::SignerSync;
use std::collections::VecDeque;
use tracing::{debug, info};

impl Chaophraya {
    /// Run the finalize-time state transitions for `header`.
    ///
    /// `txs` receives the applied system transactions in order. During
    /// verification (`mining == false`), `received` must hold the block's
    /// system transactions as they appeared on the wire.
    pub fn finalize(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        state: &mut dyn StateHost,
        txs: &mut Vec<Signed<TxLegacy>>,
        received: &mut VecDeque<Signed<TxLegacy>>,
        mining: bool,
    ) -> Result<(), EngineError> {
        let number = header.number;
        if !self.config.is_chaophraya(number) {
            return Ok(());
        }

        let parent = chain
            .header(header.parent_hash, number - 1)
            .ok_or(EngineError::UnknownBlock)?;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        let contracts = snap.system_contracts_for(&self.config, number);
        let span = self.span_for(&parent, number)?;

        // 1. Mid-span: commit the next span's committee.
        if self.config.is_span_commitment(number) {
            let seed_number = parent.number.saturating_sub(SEED_LOOKBACK);
            let seed_header = chain
                .header_by_number(seed_number)
                .ok_or(EngineError::UnknownBlock)?;
            let seed = derive_seed(seed_header.hash_slow());
            let eligible = self
                .contract_client()
                .eligible_validators(header.parent_hash, number)?;
            let committee = select_span_validators(seed, &eligible, self.config.span)?;
            info!(
                target: "chaophraya::finalize",
                block = number,
                next_span = span + 1,
                committee = committee.len(),
                "committing next span"
            );
            let input = calldata::commit_span_call(span + 1, &encode_validators(&committee));
            self.apply_system_tx(
                state,
                header,
                txs,
                received,
                mining,
                self.config.validator_contract_at(number),
                U256::ZERO,
                input,
            )?;
        }

        // 2. Fallback blocks slash the signer that failed to show up.
        if header.difficulty == DIFF_NO_TURN {
            if header.beneficiary != contracts.official_node {
                return Err(EngineError::InvalidDifficulty);
            }
            let spoiled = snap
                .inturn_signer(&self.config, number)
                .ok_or_else(|| EngineError::InvalidSpan("empty signer set".into()))?;
            if !self.contract_client().is_slashed(
                contracts.slash_manager,
                spoiled,
                span,
                header.parent_hash,
            )? {
                info!(
                    target: "chaophraya::finalize",
                    block = number,
                    signer = %spoiled,
                    span,
                    "slashing absent in-turn signer"
                );
                let input = calldata::slash_call(spoiled, span);
                self.apply_system_tx(
                    state,
                    header,
                    txs,
                    received,
                    mining,
                    contracts.slash_manager,
                    U256::ZERO,
                    input,
                )?;
            }
        }

        // 3. Drain the accumulated fees into the producer's stake.
        let reward = state.balance(SYSTEM_REWARD_ADDRESS);
        if reward > U256::ZERO {
            state.transfer(SYSTEM_REWARD_ADDRESS, header.beneficiary, reward)?;
            debug!(
                target: "chaophraya::finalize",
                block = number,
                %reward,
                validator = %header.beneficiary,
                "distributing block reward"
            );
            let input = calldata::distribute_reward_call(header.beneficiary);
            self.apply_system_tx(
                state,
                header,
                txs,
                received,
                mining,
                contracts.stake_manager,
                reward,
                input,
            )?;
        }
        Ok(())
    }

    /// Mining-side wrapper: finalize and hand back the produced system
    /// transactions for block assembly.
    pub fn finalize_and_assemble(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        state: &mut dyn StateHost,
    ) -> Result<Vec<Signed<TxLegacy>>, EngineError> {
        let mut txs = Vec::new();
        let mut received = VecDeque::new();
        self.finalize(chain, header, state, &mut txs, &mut received, true)?;
        Ok(txs)
    }

    /// Sign (mining) or match-against-received (verifying) one system
    /// transaction, then execute it through the contract client.
    #[allow(clippy::too_many_arguments)]
    fn apply_system_tx(
        &self,
        state: &mut dyn StateHost,
        header: &Header,
        txs: &mut Vec<Signed<TxLegacy>>,
        received: &mut VecDeque<Signed<TxLegacy>>,
        mining: bool,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> Result<(), EngineError> {
        let sender = header.beneficiary;
        let expected = system_tx(self.config.chain_id, state.nonce(sender), to, value, input);

        let signed = if mining {
            let (_, signer) = self.identity();
            let signer = signer.ok_or(EngineError::NoSigner)?;
            let signature = signer
                .sign_hash_sync(&expected.signature_hash())
                .map_err(|err| EngineError::SigningFailed(err.to_string()))?;
            expected.into_signed(signature)
        } else {
            let actual = received.pop_front().ok_or_else(|| {
                EngineError::SystemTxMismatch(
                    "expected system transaction missing from block".into(),
                )
            })?;
            if actual.tx().signature_hash() != expected.signature_hash() {
                return Err(EngineError::SystemTxMismatch(format!(
                    "system transaction at index {} does not match the expected call",
                    txs.len()
                )));
            }
            actual
        };

        self.contract_client()
            .execute_system_tx(state, header, sender, signed.tx())?;
        txs.push(signed);
        Ok(())
    }
}
