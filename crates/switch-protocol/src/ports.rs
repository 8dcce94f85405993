//! Capabilities consumed from the outside world.
//!
//! The core only builds requests; signing, transport, fee payment and key
//! custody live behind these traits. Implementations must not require the
//! caller to hold a lock across an `.await`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::AuthProof;
use crate::error::PortError;
use crate::predicate::Predicate;

/// Transaction identifier returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation of a submitted instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx: TxId,
    pub slot: u64,
}

/// Oracle output: base64 ciphertext plus the hex hash binding it to the predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleCiphertext {
    pub ciphertext: String,
    pub hash: String,
}

/// Wallet capability. Signs on behalf of `pubkey()`.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Identity this signer controls.
    fn pubkey(&self) -> Pubkey;

    /// Signs arbitrary bytes (used for sign-in messages).
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, PortError>;

    /// Signs, pays for and sends a transaction carrying `instruction`.
    async fn send_transaction(&self, instruction: Instruction) -> Result<Receipt, PortError>;
}

/// Ledger capability.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Raw account data, `None` when the account does not exist.
    async fn get_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, PortError>;

    /// Submits an instruction that needs no signature beyond the fee payer.
    async fn submit(&self, instruction: Instruction) -> Result<Receipt, PortError>;

    /// Accounts owned by `program_id` whose bytes at `offset` equal `owner`.
    async fn accounts_by_owner(
        &self,
        program_id: &Pubkey,
        offset: usize,
        owner: &Pubkey,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, PortError>;
}

/// Key-release oracle capability.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Encrypts under a key the oracle releases only while `predicate` holds.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        predicate: &Predicate,
        auth: &AuthProof,
    ) -> Result<OracleCiphertext, PortError>;

    /// Evaluates `predicate` and decrypts when it holds.
    async fn decrypt(
        &self,
        ciphertext: &str,
        hash: &str,
        predicate: &Predicate,
        auth: &AuthProof,
    ) -> Result<Vec<u8>, PortError>;
}

/// Source of the current unix time, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}
