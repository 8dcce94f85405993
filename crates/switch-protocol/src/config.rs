//! Protocol configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid devnet configuration.

use std::path::Path;

use anchor_lang::prelude::Pubkey;
use serde::{Deserialize, Serialize};

use crate::envelope::ENVELOPE_OVERHEAD;
use crate::error::SwitchError;
use crate::policy::Eligibility;

/// Storage slot size on the switch account.
pub const SLOT_BYTES: usize = dead_mans_switch::state::MAX_DATA_SIZE;

/// Ciphertext growth added by the oracle over the plaintext, in bytes.
pub const DEFAULT_ORACLE_EXPANSION: usize = 145;

/// Top-level protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Program that owns switch accounts.
    #[serde(with = "pubkey_str")]
    pub program_id: Pubkey,

    /// Chain name the oracle uses to reach the ledger.
    pub chain: String,

    /// Which expiry signal gates decryption.
    pub eligibility: Eligibility,

    /// Ceiling for an encoded envelope; never above the 512-byte slot.
    pub max_envelope_bytes: usize,

    /// Bytes the oracle adds to the plaintext when encrypting.
    pub oracle_expansion_bytes: usize,

    /// Sign-in message parameters.
    pub auth: AuthConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            program_id: dead_mans_switch::ID,
            chain: "solanaDevnet".to_string(),
            eligibility: Eligibility::default(),
            max_envelope_bytes: SLOT_BYTES,
            oracle_expansion_bytes: DEFAULT_ORACLE_EXPANSION,
            auth: AuthConfig::default(),
        }
    }
}

/// Parameters of the sign-in message presented to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Domain requesting the sign-in.
    pub domain: String,
    /// URI of the requesting application.
    pub uri: String,
    /// Human-readable statement line.
    pub statement: String,
    /// Chain id line.
    pub chain_id: String,
    /// Lifetime of a signed proof, in seconds.
    pub ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            uri: "https://localhost/".to_string(),
            statement: "Sign in to manage your dead man's switch.".to_string(),
            chain_id: "devnet".to_string(),
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, SwitchError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SwitchError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, SwitchError> {
        let config: Self =
            toml::from_str(content).map_err(|e| SwitchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `SwitchError::Config` describing the first violation.
    pub fn validate(&self) -> Result<(), SwitchError> {
        if self.max_envelope_bytes > SLOT_BYTES {
            return Err(SwitchError::Config(format!(
                "max_envelope_bytes {} exceeds the {SLOT_BYTES}-byte slot",
                self.max_envelope_bytes
            )));
        }
        if self.max_plaintext_bytes() == 0 {
            return Err(SwitchError::Config(
                "max_envelope_bytes leaves no room for plaintext".to_string(),
            ));
        }
        if self.auth.ttl_secs <= 0 {
            return Err(SwitchError::Config("auth.ttl_secs must be positive".to_string()));
        }
        if self.auth.domain.is_empty() || self.chain.is_empty() {
            return Err(SwitchError::Config("domain and chain must be set".to_string()));
        }
        Ok(())
    }

    /// Plaintext budget back-computed from the envelope ceiling:
    /// base64 capacity left after the fixed JSON overhead, minus oracle growth.
    #[must_use]
    pub fn max_plaintext_bytes(&self) -> usize {
        let b64_room = self.max_envelope_bytes.saturating_sub(ENVELOPE_OVERHEAD);
        (b64_room / 4 * 3).saturating_sub(self.oracle_expansion_bytes)
    }
}

/// Serde adapter for base58 pubkeys.
pub(crate) mod pubkey_str {
    use std::str::FromStr;

    use anchor_lang::prelude::Pubkey;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(d)?;
        Pubkey::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_reference_plaintext_budget() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_plaintext_bytes(), 140);
    }

    #[test]
    fn parses_partial_toml() {
        let config = ProtocolConfig::from_toml(
            r#"
            eligibility = "either"
            max_envelope_bytes = 400

            [auth]
            domain = "switch.example"
            "#,
        )
        .unwrap();
        assert_eq!(config.eligibility, Eligibility::Either);
        assert_eq!(config.max_envelope_bytes, 400);
        assert_eq!(config.auth.domain, "switch.example");
        assert_eq!(config.auth.ttl_secs, 86_400);
        assert_eq!(config.program_id, dead_mans_switch::ID);
    }

    #[test]
    fn rejects_ceiling_above_slot() {
        let err = ProtocolConfig::from_toml("max_envelope_bytes = 513").unwrap_err();
        assert!(matches!(err, SwitchError::Config(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(ProtocolConfig::from_toml("retries = 3").is_err());
    }
}
