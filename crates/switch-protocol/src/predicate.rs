//! Access predicates handed to the key-release oracle.
//!
//! Three families exist in stored data. Only `FlagCheck` is built for new
//! envelopes; `MethodCall` and `HostedCode` are decoded from legacy envelopes
//! and adapted into an equivalent local check through [`Predicate::runtime_check`].

use anchor_lang::prelude::Pubkey;
use anchor_lang::Discriminator;
use serde::{Deserialize, Serialize};

use dead_mans_switch::state::{DISC_SIZE, EXPIRED_OFFSET};
use dead_mans_switch::DeadManSwitch;

use crate::account;
use crate::address::parse_pubkey;
use crate::error::SwitchError;
use crate::policy::{self, Eligibility};

/// Read-only program method the method-call family invoked.
pub const LEGACY_METHOD: &str = "check_expiration";

/// Condition over ledger state evaluated by the oracle before key release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Predicate {
    /// Raw account bytes at `address`: succeed iff the flag byte equals `expected`.
    FlagCheck(FlagCheck),
    /// Invoke a read-only program method and compare its boolean result.
    MethodCall(MethodCall),
    /// Hosted code fetched by content id, parameterised with the address.
    HostedCode(HostedCode),
}

/// Raw byte inspection of the switch account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagCheck {
    pub chain: String,
    #[serde(with = "crate::config::pubkey_str")]
    pub address: Pubkey,
    /// Hex account discriminator the bytes must start with; absent in legacy data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    pub byte_offset: usize,
    pub expected: u8,
}

/// Program method call condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCall {
    pub chain: String,
    #[serde(with = "crate::config::pubkey_str")]
    pub program_id: Pubkey,
    #[serde(with = "crate::config::pubkey_str")]
    pub address: Pubkey,
    pub method: String,
    pub expected: bool,
}

/// Hosted-code condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedCode {
    pub ipfs_cid: String,
    #[serde(with = "crate::config::pubkey_str")]
    pub address: Pubkey,
}

impl Predicate {
    /// Address of the switch the predicate is bound to.
    #[must_use]
    pub const fn address(&self) -> &Pubkey {
        match self {
            Self::FlagCheck(p) => &p.address,
            Self::MethodCall(p) => &p.address,
            Self::HostedCode(p) => &p.address,
        }
    }

    /// True for the family new envelopes use.
    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        matches!(self, Self::FlagCheck(_))
    }

    /// Local check equivalent to what the oracle evaluates for this family.
    ///
    /// `check_expiration` only ever compared the deadline, so method calls
    /// reduce to time expiry; hosted code accepted either signal.
    #[must_use]
    pub const fn runtime_check(&self) -> Eligibility {
        match self {
            Self::FlagCheck(_) => Eligibility::Flag,
            Self::MethodCall(_) => Eligibility::Time,
            Self::HostedCode(_) => Eligibility::Either,
        }
    }

    /// Evaluates the predicate against raw account bytes the way the oracle
    /// would. An absent or foreign account never satisfies it.
    #[must_use]
    pub fn evaluate_raw(&self, account_bytes: Option<&[u8]>, now: i64) -> bool {
        let Some(raw) = account_bytes else {
            return false;
        };
        match self {
            Self::FlagCheck(p) => {
                if let Some(disc) = &p.discriminator {
                    let matches = raw.len() >= DISC_SIZE && hex::encode(&raw[..DISC_SIZE]) == *disc;
                    if !matches {
                        return false;
                    }
                }
                raw.get(p.byte_offset) == Some(&p.expected)
            },
            Self::MethodCall(p) => account::parse(raw)
                .map(|state| policy::evaluate(&state, now).is_expired == p.expected)
                .unwrap_or(false),
            Self::HostedCode(_) => account::parse(raw)
                .map(|state| Eligibility::Either.permits(&policy::evaluate(&state, now)))
                .unwrap_or(false),
        }
    }

    /// Deterministic byte form, used to bind a ciphertext hash to its predicate.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let text = match self {
            Self::FlagCheck(p) => format!(
                "flag-check|{}|{}|{}|{}|{}",
                p.chain,
                p.address,
                p.discriminator.as_deref().unwrap_or(""),
                p.byte_offset,
                p.expected
            ),
            Self::MethodCall(p) => format!(
                "method-call|{}|{}|{}|{}|{}",
                p.chain, p.program_id, p.address, p.method, p.expected
            ),
            Self::HostedCode(p) => format!("hosted-code|{}|{}", p.ipfs_cid, p.address),
        };
        text.into_bytes()
    }
}

/// Builds the canonical flag-check predicate for a switch address.
#[derive(Debug, Clone)]
pub struct AccessPredicateBuilder {
    chain: String,
}

impl AccessPredicateBuilder {
    /// Builder targeting `chain`.
    #[must_use]
    pub fn new(chain: impl Into<String>) -> Self {
        Self { chain: chain.into() }
    }

    /// "Release only if the expired flag byte at `address` is 1."
    ///
    /// Valid before the account exists: the predicate references state, not
    /// existence.
    #[must_use]
    pub fn build(&self, address: &Pubkey) -> Predicate {
        Predicate::FlagCheck(FlagCheck {
            chain: self.chain.clone(),
            address: *address,
            discriminator: Some(hex::encode(&DeadManSwitch::DISCRIMINATOR[..])),
            byte_offset: EXPIRED_OFFSET,
            expected: 1,
        })
    }
}

// =============================================================================
// Legacy descriptors
// =============================================================================

/// RPC condition descriptor found in fully-qualified legacy envelopes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LegacyCondition {
    pub method: String,
    pub params: Vec<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub pda_interface: Option<LegacyPdaInterface>,
    pub return_value_test: LegacyReturnValueTest,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyPdaInterface {
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LegacyReturnValueTest {
    #[serde(default)]
    pub comparator: Option<String>,
    pub value: serde_json::Value,
}

/// Hosted-code descriptor found in legacy envelopes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LegacyHostedCode {
    pub ipfs_cid: String,
    pub params: LegacyHostedParams,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyHostedParams {
    pub pda: String,
}

impl LegacyCondition {
    /// Translates the descriptor into a predicate family.
    pub(crate) fn into_predicate(
        self,
        default_chain: &str,
        default_program: &Pubkey,
    ) -> Result<Predicate, SwitchError> {
        let address = self
            .params
            .first()
            .ok_or_else(|| SwitchError::UnrecognizedEnvelopeFormat("condition has no params".into()))
            .and_then(|p| parse_pubkey("condition address", p))?;
        if let Some(cmp) = self.return_value_test.comparator.as_deref() {
            if cmp != "=" && cmp != "==" {
                return Err(SwitchError::UnrecognizedEnvelopeFormat(format!(
                    "unsupported comparator {cmp:?}"
                )));
            }
        }
        let expected = truthy(&self.return_value_test.value);
        let chain = self.chain.unwrap_or_else(|| default_chain.to_string());

        if self.method == "getAccountInfo" {
            return Ok(Predicate::FlagCheck(FlagCheck {
                chain,
                address,
                discriminator: None,
                byte_offset: self.pda_interface.map_or(EXPIRED_OFFSET, |i| i.offset),
                expected: u8::from(expected),
            }));
        }
        let program_id = match self.program_id {
            Some(p) => parse_pubkey("condition program", &p)?,
            None => *default_program,
        };
        Ok(Predicate::MethodCall(MethodCall {
            chain,
            program_id,
            address,
            method: self.method,
            expected,
        }))
    }
}

impl LegacyHostedCode {
    pub(crate) fn into_predicate(self) -> Result<Predicate, SwitchError> {
        Ok(Predicate::HostedCode(HostedCode {
            address: parse_pubkey("hosted code pda", &self.params.pda)?,
            ipfs_cid: self.ipfs_cid,
        }))
    }
}

fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_u64() == Some(1),
        serde_json::Value::String(s) => s == "true" || s == "1",
        _ => false,
    }
}
