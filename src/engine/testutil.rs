//! In-memory collaborators for engine tests.

use crate::chain::{HeaderReader, StateHost};
use crate::config::ChaophrayaConfig;
use crate::constants::{EXTRA_SEAL_LENGTH, EXTRA_VANITY_LENGTH};
use crate::contracts::ContractClient;
use crate::dev;
use crate::engine::{unix_now, Chaophraya};
use crate::errors::EngineError;
use crate::header::{encode_checkpoint_signers, SystemContracts, ValidatorInfo};
use crate::snapshot::store::MemoryDb;
use alloy_consensus::{Header, TxLegacy};
use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Canonical chain of headers backed by plain maps.
pub struct MockChain {
    config: ChaophrayaConfig,
    by_number: Vec<Header>,
    by_hash: HashMap<B256, Header>,
}

impl MockChain {
    /// Chain with a genesis embedding `initial_signers` (sorted) in its extra
    /// data. The genesis timestamp sits far enough in the past that densely
    /// stacked test blocks never trip the future-block check.
    pub fn new(config: ChaophrayaConfig, initial_signers: &[Address]) -> Self {
        let mut sorted = initial_signers.to_vec();
        sorted.sort();
        let mut extra = vec![0u8; EXTRA_VANITY_LENGTH];
        extra.extend_from_slice(&encode_checkpoint_signers(&sorted));
        extra.extend_from_slice(&[0u8; EXTRA_SEAL_LENGTH]);

        let genesis = Header {
            number: 0,
            timestamp: unix_now().saturating_sub(10_000),
            extra_data: extra.into(),
            ..Default::default()
        };
        let mut chain = Self { config, by_number: Vec::new(), by_hash: HashMap::new() };
        chain.push(genesis);
        chain
    }

    /// Append a header to the canonical chain.
    pub fn push(&mut self, header: Header) {
        self.by_hash.insert(header.hash_slow(), header.clone());
        self.by_number.push(header);
    }

    /// Prepare, seal and append the next block with `key`.
    pub fn extend_with_block(&mut self, engine: &Chaophraya, key: &PrivateKeySigner) -> Header {
        engine.authorize(key.clone());
        let parent = self.current_header().expect("chain has a head");
        let mut header = Header {
            number: parent.number + 1,
            parent_hash: parent.hash_slow(),
            gas_limit: parent.gas_limit,
            ..Default::default()
        };
        engine.prepare(self, &mut header).expect("prepare succeeds");
        // Stack test blocks densely in the past.
        header.timestamp = parent.timestamp + self.config.period.max(1);
        let sealed = dev::seal(header, key);
        self.push(sealed.clone());
        sealed
    }

    /// Prepare, seal and append the next block with the in-turn dev signer.
    pub fn extend_with_inturn_block(&mut self, engine: &Chaophraya) -> Header {
        let parent = self.current_header().expect("chain has a head");
        let snap = engine
            .snapshot(self, parent.number, parent.hash_slow(), &[])
            .expect("snapshot resolves");
        let inturn = snap
            .inturn_signer(engine.config(), parent.number + 1)
            .expect("non-empty signer set");
        let key = dev_key_for(inturn);
        self.extend_with_block(engine, &key)
    }
}

impl HeaderReader for MockChain {
    fn chain_config(&self) -> &ChaophrayaConfig {
        &self.config
    }

    fn current_header(&self) -> Option<Header> {
        self.by_number.last().cloned()
    }

    fn header(&self, hash: B256, number: u64) -> Option<Header> {
        self.by_hash.get(&hash).filter(|h| h.number == number).cloned()
    }

    fn header_by_number(&self, number: u64) -> Option<Header> {
        self.by_number.get(number as usize).cloned()
    }

    fn header_by_hash(&self, hash: B256) -> Option<Header> {
        self.by_hash.get(&hash).cloned()
    }
}

/// Dev key whose address is `address`.
pub fn dev_key_for(address: Address) -> PrivateKeySigner {
    (0..dev::DEV_PRIVATE_KEYS.len())
        .map(dev::signer)
        .find(|k| k.address() == address)
        .expect("address belongs to a dev key")
}

/// Scripted contract client.
#[derive(Default)]
pub struct MockClient {
    /// Span reported by `current_span`
    pub span: u64,
    /// Committee reported by `current_validators`
    pub validators: Vec<ValidatorInfo>,
    /// System contracts reported by `current_validators`
    pub contracts: SystemContracts,
    /// Pool reported by `eligible_validators`
    pub eligible: Vec<ValidatorInfo>,
    /// `(signer, span)` pairs considered already slashed
    pub slashed: Mutex<HashSet<(Address, u64)>>,
    /// Every system transaction executed, with its sender
    pub executed: Mutex<Vec<(Address, TxLegacy)>>,
}

impl ContractClient for MockClient {
    fn current_span(&self, _header: &Header) -> Result<u64, EngineError> {
        Ok(self.span)
    }

    fn current_validators(
        &self,
        _block_hash: B256,
        _number: u64,
    ) -> Result<(Vec<ValidatorInfo>, SystemContracts), EngineError> {
        Ok((self.validators.clone(), self.contracts))
    }

    fn eligible_validators(
        &self,
        _block_hash: B256,
        _number: u64,
    ) -> Result<Vec<ValidatorInfo>, EngineError> {
        Ok(self.eligible.clone())
    }

    fn is_slashed(
        &self,
        _slash_manager: Address,
        signer: Address,
        span: u64,
        _block_hash: B256,
    ) -> Result<bool, EngineError> {
        Ok(self.slashed.lock().unwrap().contains(&(signer, span)))
    }

    fn execute_system_tx(
        &self,
        _state: &mut dyn StateHost,
        _header: &Header,
        sender: Address,
        tx: &TxLegacy,
    ) -> Result<(), EngineError> {
        self.executed.lock().unwrap().push((sender, tx.clone()));
        Ok(())
    }
}

/// Account balances and nonces backed by maps.
#[derive(Debug, Default)]
pub struct MockState {
    pub balances: HashMap<Address, U256>,
    pub nonces: HashMap<Address, u64>,
}

impl StateHost for MockState {
    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), EngineError> {
        let have = self.balance(from);
        if have < amount {
            return Err(EngineError::ContractCallFailed(format!(
                "insufficient balance: {from} has {have}, needs {amount}"
            )));
        }
        self.balances.insert(from, have - amount);
        let dest = self.balance(to);
        self.balances.insert(to, dest + amount);
        Ok(())
    }
}

/// Engine + chain over `signers` initial dev signers with a scripted client.
pub fn engine_with(
    config: ChaophrayaConfig,
    client: Arc<MockClient>,
    initial_signers: &[Address],
) -> (Chaophraya, MockChain) {
    let chain = MockChain::new(config.clone(), initial_signers);
    let engine = Chaophraya::new(config, Arc::new(MemoryDb::new()), client);
    (engine, chain)
}

/// PoA-only engine + chain whose genesis authorizes the first `count` dev keys.
pub fn engine_with_signers(count: usize) -> (Chaophraya, MockChain) {
    let signers: Vec<Address> = dev::addresses().into_iter().take(count).collect();
    engine_with(
        ChaophrayaConfig::poa_only(96),
        Arc::new(MockClient::default()),
        &signers,
    )
}
