//! Sign-in proofs presented to the oracle, and their cache.
//!
//! The message text is an external contract: the oracle re-renders it from
//! the same fields and verifies the signature, so every byte matters.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anchor_lang::prelude::Pubkey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::SwitchError;
use crate::ports::Clock;

/// Nonce length in characters.
pub const NONCE_LEN: usize = 16;

/// Fields of a sign-in-with-Solana style message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMessage {
    pub domain: String,
    pub address: Pubkey,
    pub statement: String,
    pub uri: String,
    pub chain_id: String,
    pub nonce: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl SignInMessage {
    /// Message for `address` issued at `now` with a fresh random nonce.
    #[must_use]
    pub fn new(config: &AuthConfig, address: Pubkey, now: i64) -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        Self::with_nonce(config, address, now, nonce)
    }

    #[must_use]
    pub fn with_nonce(config: &AuthConfig, address: Pubkey, now: i64, nonce: String) -> Self {
        Self {
            domain: config.domain.clone(),
            address,
            statement: config.statement.clone(),
            uri: config.uri.clone(),
            chain_id: config.chain_id.clone(),
            nonce,
            issued_at: now,
            expires_at: now.saturating_add(config.ttl_secs),
        }
    }

    /// Renders the exact text that gets signed.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a timestamp is outside the representable range.
    pub fn render(&self) -> Result<String, SwitchError> {
        Ok(format!(
            "{domain} wants you to sign in with your Solana account:\n\
             {address}\n\
             \n\
             {statement}\n\
             \n\
             URI: {uri}\n\
             Version: 1\n\
             Chain ID: {chain_id}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}\n\
             Expiration Time: {expires_at}",
            domain = self.domain,
            address = self.address,
            statement = self.statement,
            uri = self.uri,
            chain_id = self.chain_id,
            nonce = self.nonce,
            issued_at = rfc3339(self.issued_at)?,
            expires_at = rfc3339(self.expires_at)?,
        ))
    }
}

fn rfc3339(secs: i64) -> Result<String, SwitchError> {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| SwitchError::Config(format!("timestamp {secs} out of range")))
}

/// Signed sign-in statement proving control of `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProof {
    /// Rendered message text.
    pub message: String,
    /// Base64 signature over `message`.
    pub signature: String,
    #[serde(with = "crate::config::pubkey_str")]
    pub address: Pubkey,
    pub expires_at: i64,
}

impl AuthProof {
    /// Wraps a signature produced over `message.render()`.
    #[must_use]
    pub fn new(message: &SignInMessage, rendered: String, signature: &[u8]) -> Self {
        Self {
            message: rendered,
            signature: STANDARD.encode(signature),
            address: message.address,
            expires_at: message.expires_at,
        }
    }

    /// Still acceptable at `now`.
    #[must_use]
    pub const fn is_valid_at(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// Cache of sign-in proofs keyed by owner.
pub trait AuthCache: Send + Sync {
    /// A live proof for `owner`, if one is cached.
    fn get(&self, owner: &Pubkey) -> Option<AuthProof>;

    /// Stores `proof` for `ttl_secs` seconds.
    fn put(&self, owner: Pubkey, proof: AuthProof, ttl_secs: i64);
}

/// In-process cache. Never holds its lock across an await; stale entries
/// are pruned on every `put`.
pub struct MemoryAuthCache {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<Pubkey, (AuthProof, i64)>>,
}

impl MemoryAuthCache {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl AuthCache for MemoryAuthCache {
    fn get(&self, owner: &Pubkey) -> Option<AuthProof> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(owner)
            .filter(|(proof, deadline)| now < *deadline && proof.is_valid_at(now))
            .map(|(proof, _)| proof.clone())
    }

    fn put(&self, owner: Pubkey, proof: AuthProof, ttl_secs: i64) {
        let now = self.clock.now();
        let deadline = now.saturating_add(ttl_secs);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, (cached, until)| now < *until && cached.is_valid_at(now));
        entries.insert(owner, (proof, deadline));
    }
}

impl MemoryAuthCache {
    /// Number of stored entries, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
