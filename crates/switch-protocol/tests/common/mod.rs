//! In-memory ledger, oracle, wallet and clock for integration tests.
//!
//! The ledger executes instructions through the program's own state
//! transitions, so account bytes and error codes match what the chain
//! would produce.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::{AccountDeserialize, AccountSerialize, AnchorDeserialize, Discriminator};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};

use dead_mans_switch::state::MAX_DATA_SIZE;
use dead_mans_switch::{instruction, DeadManSwitch, ErrorCode};
use switch_protocol::{
    address, AuthProof, Clock, Ledger, MemoryAuthCache, Oracle, OracleCiphertext, PortError,
    Predicate, ProtocolConfig, Receipt, Signer, SwitchProtocol, TxId,
};

pub const START: i64 = 1_700_000_000;

// =============================================================================
// Clock
// =============================================================================

pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Ledger
// =============================================================================

pub struct MemoryLedger {
    program_id: Pubkey,
    clock: Arc<ManualClock>,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    unavailable: AtomicBool,
    slot: AtomicU64,
}

fn rejected(message: &str) -> PortError {
    PortError::Rejected {
        code: None,
        message: message.to_string(),
    }
}

impl MemoryLedger {
    pub fn new(program_id: Pubkey, clock: Arc<ManualClock>) -> Self {
        Self {
            program_id,
            clock,
            accounts: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            slot: AtomicU64::new(1),
        }
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn io_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    /// Account bytes without counting a read; this is what the oracle sees.
    pub fn peek(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.accounts.lock().unwrap().get(address).cloned()
    }

    /// Overwrites raw account bytes, bypassing the program.
    pub fn poke(&self, address: Pubkey, raw: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, raw);
    }

    fn load(&self, address: &Pubkey) -> Result<DeadManSwitch, PortError> {
        let raw = self.peek(address).ok_or_else(|| rejected("account not initialized"))?;
        DeadManSwitch::try_deserialize(&mut raw.as_slice()).map_err(|e| rejected(&e.to_string()))
    }

    fn store(&self, address: Pubkey, switch: &DeadManSwitch) -> Result<(), PortError> {
        let mut raw = Vec::new();
        switch.try_serialize(&mut raw).map_err(|e| rejected(&e.to_string()))?;
        self.poke(address, raw);
        Ok(())
    }

    fn owner_signed(ix: &Instruction, signer: Option<Pubkey>) -> Result<Pubkey, PortError> {
        let owner = ix.accounts.get(1).ok_or_else(|| rejected("missing owner account"))?.pubkey;
        if signer != Some(owner) {
            return Err(rejected("missing required signature"));
        }
        Ok(owner)
    }

    /// Runs `ix` the way the program would, signed by `signer` if present.
    pub fn execute(&self, ix: Instruction, signer: Option<Pubkey>) -> Result<Receipt, PortError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Transient("ledger unavailable".into()));
        }
        if ix.program_id != self.program_id {
            return Err(rejected("unknown program"));
        }
        let switch_key = ix.accounts.first().ok_or_else(|| rejected("no accounts"))?.pubkey;
        let now = self.clock.now();
        let (tag, args) = ix.data.split_at(8.min(ix.data.len()));

        if tag == &instruction::CreateSwitch::DISCRIMINATOR[..] {
            let owner = Self::owner_signed(&ix, signer)?;
            let args = instruction::CreateSwitch::try_from_slice(args)
                .map_err(|e| rejected(&e.to_string()))?;
            let derived = address::derive(&self.program_id, &owner, args.id)
                .map_err(|_| PortError::program(ErrorCode::InvalidSwitchId))?;
            if derived.address != switch_key {
                return Err(rejected("seeds constraint violated"));
            }
            if self.peek(&switch_key).is_some() {
                return Err(rejected("account already in use"));
            }
            let mut switch = DeadManSwitch {
                owner: Pubkey::default(),
                last_ping: 0,
                ping_interval: 0,
                encrypted_data: [0u8; MAX_DATA_SIZE],
                data_length: 0,
                created_at: 0,
                bump: 0,
                expired: false,
            };
            switch
                .initialize(owner, args.id, args.ping_interval, &args.encrypted_data, derived.bump, now)
                .map_err(PortError::program)?;
            self.store(switch_key, &switch)?;
        } else if tag == &instruction::Ping::DISCRIMINATOR[..] {
            let owner = Self::owner_signed(&ix, signer)?;
            let mut switch = self.load(&switch_key)?;
            if switch.owner != owner {
                return Err(PortError::program(ErrorCode::Unauthorized));
            }
            switch.renew(now).map_err(PortError::program)?;
            self.store(switch_key, &switch)?;
        } else if tag == &instruction::MarkExpired::DISCRIMINATOR[..] {
            let mut switch = self.load(&switch_key)?;
            if switch.mark_expired(now).map_err(PortError::program)? {
                self.store(switch_key, &switch)?;
            }
        } else if tag == &instruction::CloseSwitch::DISCRIMINATOR[..] {
            let owner = Self::owner_signed(&ix, signer)?;
            let switch = self.load(&switch_key)?;
            if switch.owner != owner {
                return Err(PortError::program(ErrorCode::Unauthorized));
            }
            if !switch.expired {
                return Err(PortError::program(ErrorCode::NotExpired));
            }
            self.accounts.lock().unwrap().remove(&switch_key);
        } else {
            return Err(rejected("unknown instruction"));
        }

        let slot = self.slot.fetch_add(1, Ordering::SeqCst);
        Ok(Receipt {
            tx: TxId(format!("tx-{slot}")),
            slot,
        })
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, PortError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Transient("ledger unavailable".into()));
        }
        Ok(self.peek(address))
    }

    async fn submit(&self, instruction: Instruction) -> Result<Receipt, PortError> {
        self.execute(instruction, None)
    }

    async fn accounts_by_owner(
        &self,
        program_id: &Pubkey,
        offset: usize,
        owner: &Pubkey,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, PortError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if *program_id != self.program_id {
            return Ok(Vec::new());
        }
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .filter(|(_, raw)| raw.get(offset..offset + 32) == Some(owner.as_ref()))
            .map(|(k, raw)| (*k, raw.clone()))
            .collect())
    }
}

// =============================================================================
// Wallet
// =============================================================================

pub struct KeypairSigner {
    key: SigningKey,
    ledger: Arc<MemoryLedger>,
    pub signatures: AtomicUsize,
    declines: AtomicBool,
}

impl KeypairSigner {
    pub fn from_seed(seed: u8, ledger: Arc<MemoryLedger>) -> Self {
        Self {
            key: SigningKey::from_bytes(&[seed; 32]),
            ledger,
            signatures: AtomicUsize::new(0),
            declines: AtomicBool::new(false),
        }
    }

    /// Wallet refuses every signature request, as when the user declines.
    pub fn set_declining(&self, declines: bool) {
        self.declines.store(declines, Ordering::SeqCst);
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.key.verifying_key().to_bytes())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, PortError> {
        if self.declines.load(Ordering::SeqCst) {
            return Err(rejected("user declined to sign"));
        }
        self.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(self.key.sign(message).to_bytes().to_vec())
    }

    async fn send_transaction(&self, instruction: Instruction) -> Result<Receipt, PortError> {
        self.ledger.execute(instruction, Some(self.pubkey()))
    }
}

// =============================================================================
// Oracle
// =============================================================================

/// Key-release stand-in: checks the sign-in proof, binds ciphertext to its
/// predicate by hash and evaluates the predicate against current ledger bytes.
pub struct SimOracle {
    ledger: Arc<MemoryLedger>,
    clock: Arc<ManualClock>,
    pub encrypts: AtomicUsize,
    pub decrypts: AtomicUsize,
}

impl SimOracle {
    pub fn new(ledger: Arc<MemoryLedger>, clock: Arc<ManualClock>) -> Self {
        Self {
            ledger,
            clock,
            encrypts: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
        }
    }

    fn keystream(predicate: &Predicate) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(b"sim-oracle-key");
        h.update(predicate.canonical_bytes());
        h.finalize().into()
    }

    fn xor(data: &[u8], predicate: &Predicate) -> Vec<u8> {
        let key = Self::keystream(predicate);
        data.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect()
    }

    fn binding_hash(predicate: &Predicate, ciphertext: &[u8]) -> String {
        let mut h = Sha256::new();
        h.update(predicate.canonical_bytes());
        h.update(ciphertext);
        hex::encode(h.finalize())
    }

    /// Seals without an auth check; used to fabricate legacy envelopes.
    pub fn seal(plaintext: &[u8], predicate: &Predicate) -> OracleCiphertext {
        let raw = Self::xor(plaintext, predicate);
        OracleCiphertext {
            hash: Self::binding_hash(predicate, &raw),
            ciphertext: STANDARD.encode(&raw),
        }
    }

    fn verify(&self, auth: &AuthProof) -> Result<(), PortError> {
        if !auth.is_valid_at(self.clock.now()) {
            return Err(rejected("auth proof expired"));
        }
        let key = VerifyingKey::from_bytes(&auth.address.to_bytes())
            .map_err(|_| rejected("bad auth address"))?;
        let sig = STANDARD
            .decode(&auth.signature)
            .ok()
            .and_then(|b| Signature::from_slice(&b).ok())
            .ok_or_else(|| rejected("bad auth signature"))?;
        key.verify(auth.message.as_bytes(), &sig).map_err(|_| rejected("auth signature mismatch"))
    }
}

#[async_trait]
impl Oracle for SimOracle {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        predicate: &Predicate,
        auth: &AuthProof,
    ) -> Result<OracleCiphertext, PortError> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        self.verify(auth)?;
        Ok(Self::seal(plaintext, predicate))
    }

    async fn decrypt(
        &self,
        ciphertext: &str,
        hash: &str,
        predicate: &Predicate,
        auth: &AuthProof,
    ) -> Result<Vec<u8>, PortError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.verify(auth)?;
        let raw = STANDARD.decode(ciphertext).map_err(|_| rejected("bad ciphertext"))?;
        if Self::binding_hash(predicate, &raw) != hash {
            return Err(rejected("predicate does not match ciphertext"));
        }
        let account = self.ledger.peek(predicate.address());
        if !predicate.evaluate_raw(account.as_deref(), self.clock.now()) {
            return Err(rejected("access condition not met"));
        }
        Ok(Self::xor(&raw, predicate))
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<MemoryLedger>,
    pub oracle: Arc<SimOracle>,
    pub protocol: SwitchProtocol,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = Arc::new(MemoryLedger::new(config.program_id, clock.clone()));
        let oracle = Arc::new(SimOracle::new(ledger.clone(), clock.clone()));
        let cache = Arc::new(MemoryAuthCache::new(clock.clone()));
        let protocol =
            SwitchProtocol::new(config, ledger.clone(), oracle.clone(), clock.clone(), cache)
                .expect("valid config");
        Self {
            clock,
            ledger,
            oracle,
            protocol,
        }
    }

    pub fn signer(&self, seed: u8) -> KeypairSigner {
        KeypairSigner::from_seed(seed, self.ledger.clone())
    }
}
