//! Seal scheduling and signing.
//!
//! Sealing waits out the header's timestamp, adds a randomized wiggle when
//! out of turn so rival sealers do not race, and in PoSA mode holds the
//! fallback slot for the official node. Every wait races the caller's stop
//! signal; signing itself is never cancelled.

use crate::chain::HeaderReader;
use crate::constants::{EXTRA_SEAL_LENGTH, FALLBACK_DELAY, WIGGLE_TIME};
use crate::engine::{unix_now, Chaophraya};
use crate::errors::EngineError;
use crate::header::seal_hash;
use crate::recovery::signature_to_seal_bytes;
use alloy_consensus::Header;
use alloy_signer::SignerSync;
use rand::Rng;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// A block the miner asks the engine to seal.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    /// Fully prepared and finalized header, seal placeholder included
    pub header: Header,
    /// Whether the block carries any transactions
    pub has_transactions: bool,
}

impl Chaophraya {
    /// Seal `block` and emit the sealed header on `results`.
    ///
    /// Returns after the sealed header is handed off, or with
    /// [`EngineError::SealingAborted`] when `stop` fires first.
    pub async fn seal(
        &self,
        chain: &dyn HeaderReader,
        block: PendingBlock,
        results: mpsc::Sender<Header>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let header = block.header;
        let number = header.number;
        if number == 0 {
            return Err(EngineError::UnknownBlock);
        }
        if self.config.period == 0 && !block.has_transactions {
            return Err(EngineError::UnsealableBlock(
                "no transactions while period is zero".into(),
            ));
        }

        let (val, signer) = self.identity();
        let signer = signer.ok_or(EngineError::NoSigner)?;

        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        let posa = self.config.is_chaophraya(number);
        if !snap.is_authorized(&self.config, number, val) {
            return Err(EngineError::UnauthorizedSigner(val));
        }
        // PoSA committees may repeat a validator; the spacing rule only
        // gates sealing while the chain is in its PoA phase.
        if !posa && snap.signed_recently(&self.config, number, val) {
            return Err(EngineError::RecentlySigned);
        }

        let mut delay = Duration::from_secs(header.timestamp.saturating_sub(unix_now()));

        let inturn = snap.inturn(&self.config, number, val);
        if !inturn {
            let wiggle = if posa {
                WIGGLE_TIME
            } else {
                let peers = snap.effective_signers(&self.config, number).len() as u32 / 2 + 1;
                WIGGLE_TIME * peers
            };
            delay += Duration::from_millis(
                rand::thread_rng().gen_range(0..wiggle.as_millis() as u64),
            );
            debug!(
                target: "chaophraya::seal",
                block = number,
                wiggle_ms = wiggle.as_millis() as u64,
                "sealing out of turn"
            );
        }

        // Signatures are cheap: sign before waiting so a late stop still
        // costs nothing.
        let signature = signer
            .sign_hash_sync(&seal_hash(&header))
            .map_err(|err| EngineError::SigningFailed(err.to_string()))?;
        let mut extra = header.extra_data.to_vec();
        if extra.len() >= EXTRA_SEAL_LENGTH {
            extra.truncate(extra.len() - EXTRA_SEAL_LENGTH);
        }
        extra.extend_from_slice(&signature_to_seal_bytes(&signature));
        let mut sealed = header;
        sealed.extra_data = extra.into();

        if posa {
            let inturn_signer = snap.inturn_signer(&self.config, number);
            let slashed = match inturn_signer {
                Some(spoiled) => {
                    let parent = chain
                        .header(sealed.parent_hash, number - 1)
                        .ok_or(EngineError::UnknownBlock)?;
                    let span = self.span_for(&parent, number)?;
                    let contracts = snap.system_contracts_for(&self.config, number);
                    self.contract_client().is_slashed(
                        contracts.slash_manager,
                        spoiled,
                        span,
                        sealed.parent_hash,
                    )?
                }
                None => false,
            };

            if !inturn || slashed {
                if !slashed {
                    delay += FALLBACK_DELAY;
                }
                let official = snap.official_node(&self.config, number);
                if val != official {
                    // Only the official node may produce the fallback block;
                    // everyone else parks here until told to stop.
                    warn!(
                        target: "chaophraya::seal",
                        block = number,
                        "in-turn producer absent; deferring to the official node"
                    );
                    let _ = stop.wait_for(|stopped| *stopped).await;
                    return Err(EngineError::SealingAborted);
                }
            }
        }

        if wait_or_stop(&mut stop, delay).await {
            return Err(EngineError::SealingAborted);
        }

        info!(target: "chaophraya::seal", block = number, sealer = %val, "block sealed");
        results
            .send(sealed)
            .await
            .map_err(|_| EngineError::SealingAborted)
    }
}

/// Sleep for `delay` unless the stop signal fires (or its sender vanishes)
/// first; returns whether sealing should abort.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = stop.wait_for(|stopped| *stopped) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChaophrayaConfig;
    use crate::constants::{DIFF_NO_TURN, EXTRA_VANITY_LENGTH};
    use crate::dev;
    use crate::engine::testutil::{
        dev_key_for, engine_with, engine_with_signers, MockChain, MockClient,
    };
    use crate::header::{SystemContracts, ValidatorInfo};
    use alloy_primitives::Address;
    use std::sync::Arc;

    fn channels() -> (mpsc::Sender<Header>, mpsc::Receiver<Header>, watch::Sender<bool>, watch::Receiver<bool>) {
        let (results, sink) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        (results, sink, stop_tx, stop_rx)
    }

    fn pending(header: Header) -> PendingBlock {
        PendingBlock { header, has_transactions: true }
    }

    /// Prepared child of the chain head for the given sealer.
    fn prepared_child(engine: &Chaophraya, chain: &MockChain, val: Address) -> Header {
        engine.authorize(dev_key_for(val));
        let parent = chain.current_header().unwrap();
        let mut header = Header {
            number: parent.number + 1,
            parent_hash: parent.hash_slow(),
            gas_limit: parent.gas_limit,
            ..Default::default()
        };
        engine.prepare(chain, &mut header).unwrap();
        // Keep the block due immediately so tests do not sleep.
        header.timestamp = parent.timestamp + 1;
        header
    }

    #[tokio::test]
    async fn test_seal_refuses_genesis() {
        let (engine, chain) = engine_with_signers(1);
        let (results, _sink, _stop_tx, stop_rx) = channels();
        let outcome = engine
            .seal(&chain, pending(Header::default()), results, stop_rx)
            .await;
        assert_eq!(outcome, Err(EngineError::UnknownBlock));
    }

    #[tokio::test]
    async fn test_seal_refuses_empty_block_with_zero_period() {
        let config = ChaophrayaConfig { period: 0, ..ChaophrayaConfig::poa_only(96) };
        let signers = vec![dev::signer(0).address()];
        let (engine, chain) = engine_with(config, Arc::new(MockClient::default()), &signers);
        engine.authorize(dev::signer(0));

        let header = Header { number: 1, ..Default::default() };
        let (results, _sink, _stop_tx, stop_rx) = channels();
        let outcome = engine
            .seal(
                &chain,
                PendingBlock { header, has_transactions: false },
                results,
                stop_rx,
            )
            .await;
        assert!(matches!(outcome, Err(EngineError::UnsealableBlock(_))));
    }

    #[tokio::test]
    async fn test_seal_requires_credentials() {
        let (engine, chain) = engine_with_signers(1);
        let header = Header {
            number: 1,
            parent_hash: chain.current_header().unwrap().hash_slow(),
            extra_data: vec![0u8; EXTRA_VANITY_LENGTH + EXTRA_SEAL_LENGTH].into(),
            ..Default::default()
        };
        let (results, _sink, _stop_tx, stop_rx) = channels();
        let outcome = engine.seal(&chain, pending(header), results, stop_rx).await;
        assert_eq!(outcome, Err(EngineError::NoSigner));
    }

    #[tokio::test]
    async fn test_seal_requires_authorization() {
        let (engine, chain) = engine_with_signers(1);
        engine.authorize(dev::signer(4)); // not a genesis signer
        let header = Header {
            number: 1,
            parent_hash: chain.current_header().unwrap().hash_slow(),
            extra_data: vec![0u8; EXTRA_VANITY_LENGTH + EXTRA_SEAL_LENGTH].into(),
            ..Default::default()
        };
        let (results, _sink, _stop_tx, stop_rx) = channels();
        let outcome = engine.seal(&chain, pending(header), results, stop_rx).await;
        assert_eq!(
            outcome,
            Err(EngineError::UnauthorizedSigner(dev::signer(4).address()))
        );
    }

    #[tokio::test]
    async fn test_seal_in_turn_emits_recoverable_header() {
        let (engine, chain) = engine_with_signers(3);
        let snap = engine.snapshot_at(&chain, Some(0)).unwrap();
        let val = snap.inturn_signer(engine.config(), 1).unwrap();
        let header = prepared_child(&engine, &chain, val);

        let (results, mut sink, _stop_tx, stop_rx) = channels();
        engine
            .seal(&chain, pending(header), results, stop_rx)
            .await
            .unwrap();

        let sealed = sink.recv().await.expect("sealed header emitted");
        assert_eq!(engine.author(&sealed).unwrap(), val);
    }

    #[tokio::test]
    async fn test_seal_out_of_turn_completes_after_wiggle() {
        let (engine, chain) = engine_with_signers(3);
        let snap = engine.snapshot_at(&chain, Some(0)).unwrap();
        let inturn = snap.inturn_signer(engine.config(), 1).unwrap();
        let val = dev::addresses()
            .into_iter()
            .take(3)
            .find(|a| *a != inturn)
            .unwrap();
        let header = prepared_child(&engine, &chain, val);

        let (results, mut sink, _stop_tx, stop_rx) = channels();
        engine
            .seal(&chain, pending(header), results, stop_rx)
            .await
            .unwrap();
        let sealed = sink.recv().await.unwrap();
        assert_eq!(engine.author(&sealed).unwrap(), val);
        assert_eq!(sealed.difficulty, DIFF_NO_TURN);
    }

    #[tokio::test]
    async fn test_seal_recently_signed_refused_in_poa() {
        let (engine, mut chain) = engine_with_signers(3);
        let sealed = chain.extend_with_inturn_block(&engine);
        let recent = engine.author(&sealed).unwrap();

        let header = prepared_child(&engine, &chain, recent);
        let (results, _sink, _stop_tx, stop_rx) = channels();
        let outcome = engine.seal(&chain, pending(header), results, stop_rx).await;
        assert_eq!(outcome, Err(EngineError::RecentlySigned));
    }

    #[tokio::test]
    async fn test_stop_signal_aborts_wait() {
        let (engine, chain) = engine_with_signers(1);
        let val = dev::signer(0).address();
        let mut header = prepared_child(&engine, &chain, val);
        // Far-future timestamp forces a long wait.
        header.timestamp = unix_now() + 3600;

        let (results, mut sink, stop_tx, stop_rx) = channels();
        let sealing = engine.seal(&chain, pending(header), results, stop_rx);
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop_tx.send(true).unwrap();
        };
        let (outcome, ()) = tokio::join!(sealing, stopper);
        assert_eq!(outcome, Err(EngineError::SealingAborted));
        assert!(sink.try_recv().is_err(), "no block may be emitted after abort");
    }

    // ── PoSA fallback ─────────────────────────────────────────────────────

    fn posa_fixture() -> (Chaophraya, MockChain, Arc<MockClient>, SystemContracts) {
        let contracts = SystemContracts {
            stake_manager: Address::from([0xAA; 20]),
            slash_manager: Address::from([0xBB; 20]),
            official_node: dev::signer(5).address(),
        };
        let committee = vec![
            ValidatorInfo::new(dev::signer(2).address(), 10),
            ValidatorInfo::new(dev::signer(3).address(), 10),
            ValidatorInfo::new(dev::signer(4).address(), 10),
        ];
        let client = Arc::new(MockClient {
            span: 1,
            validators: committee.clone(),
            contracts,
            eligible: committee,
            ..Default::default()
        });
        let config = ChaophrayaConfig {
            span: 4,
            chaophraya_block: Some(4),
            erawan_block: Some(0),
            ..ChaophrayaConfig::poa_only(96)
        };
        let signers: Vec<Address> = dev::addresses().into_iter().take(2).collect();
        let (engine, mut chain) = engine_with(config, client.clone(), &signers);
        for _ in 1..=4 {
            chain.extend_with_inturn_block(&engine);
        }
        (engine, chain, client, contracts)
    }

    #[tokio::test]
    async fn test_non_official_fallback_blocks_until_stop() {
        let (engine, chain, client, _contracts) = posa_fixture();
        let parent = chain.current_header().unwrap();
        let snap = engine.snapshot_at(&chain, Some(parent.number)).unwrap();
        let spoiled = snap
            .inturn_signer(engine.config(), parent.number + 1)
            .unwrap();
        client.slashed.lock().unwrap().insert((spoiled, client.span));

        // An out-of-turn committee member tries to take the fallback slot.
        let val = [dev::signer(2), dev::signer(3), dev::signer(4)]
            .into_iter()
            .map(|k| k.address())
            .find(|a| *a != spoiled)
            .unwrap();
        let mut header = prepared_child(&engine, &chain, val);
        header.difficulty = DIFF_NO_TURN;

        let (results, mut sink, stop_tx, stop_rx) = channels();
        let sealing = engine.seal(&chain, pending(header), results, stop_rx);
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop_tx.send(true).unwrap();
        };
        let (outcome, ()) = tokio::join!(sealing, stopper);
        assert_eq!(outcome, Err(EngineError::SealingAborted));
        assert!(sink.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_official_node_seals_fallback_for_slashed_signer() {
        let (engine, chain, client, contracts) = posa_fixture();
        let parent = chain.current_header().unwrap();
        let snap = engine.snapshot_at(&chain, Some(parent.number)).unwrap();
        let spoiled = snap
            .inturn_signer(engine.config(), parent.number + 1)
            .unwrap();
        // Already slashed → the official node owes no extra grace period.
        client.slashed.lock().unwrap().insert((spoiled, client.span));

        let mut header = prepared_child(&engine, &chain, contracts.official_node);
        header.difficulty = DIFF_NO_TURN;

        let (results, mut sink, _stop_tx, stop_rx) = channels();
        engine
            .seal(&chain, pending(header), results, stop_rx)
            .await
            .unwrap();
        let sealed = sink.recv().await.unwrap();
        assert_eq!(engine.author(&sealed).unwrap(), contracts.official_node);
    }
}
