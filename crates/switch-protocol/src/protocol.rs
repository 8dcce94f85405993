//! Switch protocol orchestrator.
//!
//! Composes address derivation, the wire codec, the account parser, the
//! expiration policy and the predicate builder over the injected ledger,
//! oracle, clock and auth cache.
//!
//! # Lifecycle
//!
//! ```text
//! Active --ping--> Active
//! Active --deadline passes--> TimeExpired --mark_expired--> FlagExpired (terminal)
//! ```
//!
//! Every operation is single-shot: no retries, no rollback on cancellation.
//! The ledger orders concurrent submissions; nothing here is shared mutably
//! between calls.

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use serde::Serialize;
use tracing::{debug, info, warn};

use dead_mans_switch::state::{MAX_PING_INTERVAL, MIN_PING_INTERVAL, OWNER_OFFSET};

use crate::account::{self, SwitchState, SwitchSummary};
use crate::address::{self, SwitchAddress};
use crate::auth::{AuthCache, AuthProof, SignInMessage};
use crate::config::ProtocolConfig;
use crate::envelope::{EncryptedEnvelope, EnvelopeShape, PredicateRef, WireCodec};
use crate::error::{from_ledger, from_ledger_create, from_oracle, from_oracle_encrypt, SwitchError};
use crate::instructions;
use crate::policy::{self, Expiration, SwitchStatus};
use crate::ports::{Clock, Ledger, Oracle, Receipt, Signer};
use crate::predicate::{AccessPredicateBuilder, Predicate};

/// Caller's expectation of which switch an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchHint {
    pub owner: Pubkey,
    pub switch_id: u64,
}

/// Result of a successful `create`.
#[derive(Debug, Clone)]
pub struct Created {
    pub address: SwitchAddress,
    /// Envelope bytes written to the account slot.
    pub envelope: Vec<u8>,
    pub receipt: Receipt,
}

/// Outcome of `mark_expired`; both variants are success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This call set the flag.
    Marked(Receipt),
    /// The flag was already set; nothing was submitted.
    AlreadyExpired,
}

/// Read-only view of a switch, mirroring the program's `get_switch_info`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchReport {
    pub address: String,
    #[serde(flatten)]
    pub state: SwitchSummary,
    pub status: SwitchStatus,
    pub expiration: Expiration,
    pub current_time: i64,
}

/// Orchestrates the switch lifecycle against external collaborators.
pub struct SwitchProtocol {
    config: ProtocolConfig,
    codec: WireCodec,
    predicates: AccessPredicateBuilder,
    ledger: Arc<dyn Ledger>,
    oracle: Arc<dyn Oracle>,
    clock: Arc<dyn Clock>,
    auth_cache: Arc<dyn AuthCache>,
}

impl SwitchProtocol {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate.
    pub fn new(
        config: ProtocolConfig,
        ledger: Arc<dyn Ledger>,
        oracle: Arc<dyn Oracle>,
        clock: Arc<dyn Clock>,
        auth_cache: Arc<dyn AuthCache>,
    ) -> Result<Self, SwitchError> {
        config.validate()?;
        Ok(Self {
            codec: WireCodec::new(config.max_envelope_bytes),
            predicates: AccessPredicateBuilder::new(config.chain.clone()),
            config,
            ledger,
            oracle,
            clock,
            auth_cache,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Address of `(owner, switch_id)` under the configured program.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` for a zero switch id.
    pub fn address_of(&self, owner: &Pubkey, switch_id: u64) -> Result<SwitchAddress, SwitchError> {
        address::derive(&self.config.program_id, owner, switch_id)
    }

    // =========================================================================
    // Validation (no I/O)
    // =========================================================================

    fn validate_plaintext(&self, plaintext: &[u8]) -> Result<(), SwitchError> {
        if plaintext.is_empty() {
            return Err(SwitchError::EmptyPlaintext);
        }
        let limit = self.config.max_plaintext_bytes();
        if plaintext.len() > limit {
            return Err(SwitchError::PayloadTooLarge {
                actual: plaintext.len(),
                limit,
            });
        }
        Ok(())
    }

    fn validate_interval(ping_interval: i64) -> Result<(), SwitchError> {
        if (MIN_PING_INTERVAL..=MAX_PING_INTERVAL).contains(&ping_interval) {
            Ok(())
        } else {
            Err(SwitchError::InvalidInterval(ping_interval))
        }
    }

    // =========================================================================
    // Ledger helpers
    // =========================================================================

    async fn fetch_state(&self, address: &Pubkey) -> Result<Option<SwitchState>, SwitchError> {
        let raw = self.ledger.get_account_bytes(address).await.map_err(from_ledger)?;
        raw.as_deref().map(account::parse).transpose()
    }

    async fn require_state(&self, address: &Pubkey) -> Result<SwitchState, SwitchError> {
        self.fetch_state(address)
            .await?
            .ok_or_else(|| SwitchError::InvalidIdentifier(format!("no switch at {address}")))
    }

    /// Cached sign-in proof for `signer`, signing a fresh one when needed.
    async fn auth_proof(&self, signer: &dyn Signer) -> Result<AuthProof, SwitchError> {
        let owner = signer.pubkey();
        if let Some(proof) = self.auth_cache.get(&owner) {
            return Ok(proof);
        }
        let message = SignInMessage::new(&self.config.auth, owner, self.clock.now());
        let rendered = message.render()?;
        let signature = signer.sign_message(rendered.as_bytes()).await.map_err(from_ledger)?;
        let proof = AuthProof::new(&message, rendered, &signature);
        self.auth_cache.put(owner, proof.clone(), self.config.auth.ttl_secs);
        debug!(%owner, "signed new auth proof");
        Ok(proof)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Encrypts `plaintext` for the switch `(owner, switch_id)` and returns the
    /// encoded envelope. Nothing is written to the ledger.
    ///
    /// # Errors
    ///
    /// Validation errors before any I/O; `TransientFailure` from the oracle;
    /// `PayloadTooLarge` if the oracle output does not fit the slot.
    pub async fn encrypt_secret(
        &self,
        owner: &dyn Signer,
        switch_id: u64,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SwitchError> {
        self.validate_plaintext(plaintext)?;
        let address = self.address_of(&owner.pubkey(), switch_id)?;
        self.encrypt_for(owner, &address.address, plaintext).await
    }

    async fn encrypt_for(
        &self,
        owner: &dyn Signer,
        address: &Pubkey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SwitchError> {
        let predicate = self.predicates.build(address);
        let auth = self.auth_proof(owner).await?;
        let sealed = self
            .oracle
            .encrypt(plaintext, &predicate, &auth)
            .await
            .map_err(from_oracle_encrypt)?;
        self.codec.encode(sealed.ciphertext.as_bytes(), sealed.hash.as_bytes(), address)
    }

    /// Creates a switch holding an encrypted `plaintext`.
    ///
    /// Not idempotent: a retry after an ambiguous failure needs a fresh
    /// `switch_id`, since the first attempt may still land.
    ///
    /// # Errors
    ///
    /// `InvalidInterval`, `EmptyPlaintext`, `PayloadTooLarge` and
    /// `InvalidIdentifier` before any I/O; mapped ledger errors afterwards.
    pub async fn create(
        &self,
        owner: &dyn Signer,
        switch_id: u64,
        ping_interval: i64,
        plaintext: &[u8],
    ) -> Result<Created, SwitchError> {
        Self::validate_interval(ping_interval)?;
        self.validate_plaintext(plaintext)?;
        let owner_key = owner.pubkey();
        let address = self.address_of(&owner_key, switch_id)?;

        let envelope = self.encrypt_for(owner, &address.address, plaintext).await?;
        let ix = instructions::create_switch(
            &self.config.program_id,
            &owner_key,
            &address.address,
            switch_id,
            ping_interval,
            envelope.clone(),
        );
        let receipt = owner
            .send_transaction(ix)
            .await
            .map_err(|e| from_ledger_create(e, ping_interval, envelope.len()))?;
        info!(
            switch = %address.address,
            owner = %owner_key,
            switch_id,
            ping_interval,
            tx = %receipt.tx,
            "switch created"
        );
        Ok(Created {
            address,
            envelope,
            receipt,
        })
    }

    /// Renews the deadline of `address`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when `owner` is not the recorded owner, `AlreadyExpired`
    /// once the deadline has passed or the flag is set.
    pub async fn ping(&self, address: &Pubkey, owner: &dyn Signer) -> Result<Receipt, SwitchError> {
        let state = self.require_state(address).await?;
        if state.owner != owner.pubkey() {
            warn!(switch = %address, "ping by non-owner rejected");
            return Err(SwitchError::Unauthorized);
        }
        if policy::classify(&state, self.clock.now()) != SwitchStatus::Active {
            warn!(switch = %address, "late ping rejected");
            return Err(SwitchError::AlreadyExpired);
        }
        let ix = instructions::ping(&self.config.program_id, &state.owner, address);
        let receipt = owner.send_transaction(ix).await.map_err(from_ledger)?;
        info!(switch = %address, tx = %receipt.tx, "switch pinged");
        Ok(receipt)
    }

    /// Sets the sticky expired flag. Idempotent.
    ///
    /// # Errors
    ///
    /// `NotYetExpired` before the deadline.
    pub async fn mark_expired(&self, address: &Pubkey) -> Result<MarkOutcome, SwitchError> {
        let state = self.require_state(address).await?;
        let expiration = policy::evaluate(&state, self.clock.now());
        if expiration.flag_expired {
            debug!(switch = %address, "already flag-expired");
            return Ok(MarkOutcome::AlreadyExpired);
        }
        if !expiration.is_expired {
            return Err(SwitchError::NotYetExpired);
        }
        let ix = instructions::mark_expired(&self.config.program_id, address);
        let receipt = self.ledger.submit(ix).await.map_err(from_ledger)?;
        info!(switch = %address, tx = %receipt.tx, "switch marked expired");
        Ok(MarkOutcome::Marked(receipt))
    }

    /// Closes a flag-expired switch owned by `owner`, refunding rent.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for a non-owner, `NotYetExpired` while the flag is clear.
    pub async fn close(&self, address: &Pubkey, owner: &dyn Signer) -> Result<Receipt, SwitchError> {
        let state = self.require_state(address).await?;
        if state.owner != owner.pubkey() {
            return Err(SwitchError::Unauthorized);
        }
        if !state.expired_flag {
            return Err(SwitchError::NotYetExpired);
        }
        let ix = instructions::close_switch(&self.config.program_id, &state.owner, address);
        owner.send_transaction(ix).await.map_err(from_ledger)
    }

    /// Decrypts an envelope once its switch is eligible. Read-only.
    ///
    /// # Errors
    ///
    /// `UnrecognizedEnvelopeFormat` and `AddressMismatch` before any decrypt
    /// attempt; `NotYetExpired` when the switch is not eligible or the oracle
    /// refuses.
    pub async fn decrypt_secret(
        &self,
        envelope: &[u8],
        hint: Option<&SwitchHint>,
        requester: &dyn Signer,
    ) -> Result<Vec<u8>, SwitchError> {
        let env = self.codec.decode(envelope)?;
        let address = env
            .predicate_ref
            .resolve(&self.config.program_id, hint.map(|h| &h.owner))?;
        self.check_hint(&address, hint)?;
        let state = self.fetch_state(&address).await?;
        self.open(env, address, state, requester).await
    }

    /// Reads the envelope stored on `address` and decrypts it.
    ///
    /// # Errors
    ///
    /// As [`Self::decrypt_secret`]; `AddressMismatch` if the stored envelope is
    /// bound to another switch.
    pub async fn decrypt_switch(
        &self,
        address: &Pubkey,
        hint: Option<&SwitchHint>,
        requester: &dyn Signer,
    ) -> Result<Vec<u8>, SwitchError> {
        let Some(state) = self.fetch_state(address).await? else {
            return Err(SwitchError::NotYetExpired);
        };
        let env = self.codec.decode(state.payload())?;
        let owner = hint.map_or(state.owner, |h| h.owner);
        let bound = env.predicate_ref.resolve(&self.config.program_id, Some(&owner))?;
        if bound != *address {
            return Err(SwitchError::AddressMismatch {
                bound: bound.to_string(),
                expected: address.to_string(),
            });
        }
        self.check_hint(address, hint)?;
        self.open(env, bound, Some(state), requester).await
    }

    fn check_hint(&self, bound: &Pubkey, hint: Option<&SwitchHint>) -> Result<(), SwitchError> {
        let Some(hint) = hint else {
            return Ok(());
        };
        let expected = self.address_of(&hint.owner, hint.switch_id)?.address;
        if expected != *bound {
            warn!(%bound, %expected, "envelope bound to a different switch");
            return Err(SwitchError::AddressMismatch {
                bound: bound.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    async fn open(
        &self,
        env: EncryptedEnvelope,
        address: Pubkey,
        state: Option<SwitchState>,
        requester: &dyn Signer,
    ) -> Result<Vec<u8>, SwitchError> {
        let predicate = match env.predicate_ref {
            PredicateRef::Descriptor(predicate) => predicate,
            PredicateRef::Address(_) | PredicateRef::SwitchId { .. } => {
                self.predicates.build(&address)
            },
        };
        // An absent account reads the same as "not yet": no extra signal.
        let Some(state) = state else {
            return Err(SwitchError::NotYetExpired);
        };
        if !self.eligible(&predicate, env.shape, &state) {
            return Err(SwitchError::NotYetExpired);
        }

        let auth = self.auth_proof(requester).await?;
        let plaintext = self
            .oracle
            .decrypt(&env.ciphertext, &env.ciphertext_hash, &predicate, &auth)
            .await
            .map_err(from_oracle)?;
        info!(switch = %address, shape = ?env.shape, "secret decrypted");
        Ok(plaintext)
    }

    /// Local pre-check before asking the oracle. The configured rule governs
    /// canonical envelopes; legacy descriptors use the check their family implies.
    fn eligible(&self, predicate: &Predicate, shape: EnvelopeShape, state: &SwitchState) -> bool {
        let expiration = policy::evaluate(state, self.clock.now());
        let rule = if predicate.is_canonical() && shape != EnvelopeShape::Qualified {
            self.config.eligibility
        } else {
            predicate.runtime_check()
        };
        rule.permits(&expiration)
    }

    /// Status of one switch.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier` if no switch exists at `address`.
    pub async fn status(&self, address: &Pubkey) -> Result<SwitchReport, SwitchError> {
        let state = self.require_state(address).await?;
        Ok(self.report(address, &state))
    }

    /// All switches owned by `owner`. Accounts that fail to parse are skipped.
    ///
    /// # Errors
    ///
    /// `TransientFailure` if the ledger query fails.
    pub async fn list_owned(&self, owner: &Pubkey) -> Result<Vec<SwitchReport>, SwitchError> {
        let accounts = self
            .ledger
            .accounts_by_owner(&self.config.program_id, OWNER_OFFSET, owner)
            .await
            .map_err(from_ledger)?;
        let mut reports = Vec::with_capacity(accounts.len());
        for (address, raw) in accounts {
            match account::parse(&raw) {
                Ok(state) if state.owner == *owner => reports.push(self.report(&address, &state)),
                Ok(_) => {},
                Err(e) => warn!(%address, error = %e, "skipping unparsable account"),
            }
        }
        Ok(reports)
    }

    fn report(&self, address: &Pubkey, state: &SwitchState) -> SwitchReport {
        let now = self.clock.now();
        SwitchReport {
            address: address.to_string(),
            state: SwitchSummary::from(state),
            status: policy::classify(state, now),
            expiration: policy::evaluate(state, now),
            current_time: now,
        }
    }
}
