//! Wire codec for stored ciphertext envelopes.
//!
//! Encode always emits the compact `{"c","h","pda"}` object. Decode walks an
//! ordered table of shapes, most canonical first, each gated by a static key
//! predicate; nothing matching is `UnrecognizedEnvelopeFormat`.
//!
//! ```text
//! 1. Compact          {"c": b64, "h": hex, "pda": base58}
//! 2. CompactSwitchId  {"c": b64, "h": hex, "switchId": "7", "owner"?: base58}
//! 3. Qualified        {"ciphertext", "dataToEncryptHash", <conditions> | "hostedCode"}
//! ```

use anchor_lang::prelude::Pubkey;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::address::{self, parse_pubkey, parse_switch_id};
use crate::config::SLOT_BYTES;
use crate::error::SwitchError;
use crate::predicate::{LegacyCondition, LegacyHostedCode, Predicate};

/// Hex length of a 32-byte digest.
pub const HASH_HEX_LEN: usize = 64;

/// Longest base58 rendering of a 32-byte address.
pub const MAX_ADDRESS_LEN: usize = 44;

/// Compact envelope bytes excluding the base64 ciphertext.
pub const ENVELOPE_OVERHEAD: usize =
    r#"{"c":"","h":"","pda":""}"#.len() + HASH_HEX_LEN + MAX_ADDRESS_LEN; // = 132

/// Chain assumed for legacy conditions that omit one.
const LEGACY_DEFAULT_CHAIN: &str = "solanaDevnet";

/// Wire shape an envelope was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeShape {
    Compact,
    CompactSwitchId,
    Qualified,
}

/// How an envelope names the switch it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateRef {
    /// Bare address; the current format.
    Address(Pubkey),
    /// Switch id to re-derive from; the owner may come from the envelope or the caller.
    SwitchId {
        owner: Option<Pubkey>,
        switch_id: u64,
    },
    /// Explicit legacy predicate descriptor.
    Descriptor(Predicate),
}

impl PredicateRef {
    /// Resolves the bound address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` when a switch-id reference has no owner to
    /// derive from.
    pub fn resolve(
        &self,
        program_id: &Pubkey,
        owner_hint: Option<&Pubkey>,
    ) -> Result<Pubkey, SwitchError> {
        match self {
            Self::Address(address) => Ok(*address),
            Self::Descriptor(predicate) => Ok(*predicate.address()),
            Self::SwitchId { owner, switch_id } => {
                let owner = owner.as_ref().or(owner_hint).ok_or_else(|| {
                    SwitchError::InvalidIdentifier(
                        "owner required to re-derive switch address".to_string(),
                    )
                })?;
                Ok(address::derive(program_id, owner, *switch_id)?.address)
            },
        }
    }
}

/// Decoded envelope. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Canonical base64 ciphertext.
    pub ciphertext: String,
    /// Lowercase hex digest binding the ciphertext to its predicate.
    pub ciphertext_hash: String,
    pub predicate_ref: PredicateRef,
    pub shape: EnvelopeShape,
}

impl EncryptedEnvelope {
    /// Raw ciphertext bytes.
    ///
    /// # Errors
    ///
    /// Returns `UnrecognizedEnvelopeFormat` if the stored base64 is invalid.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, SwitchError> {
        STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| SwitchError::UnrecognizedEnvelopeFormat(format!("ciphertext: {e}")))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompactWire {
    c: String,
    h: String,
    pda: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SwitchIdWire {
    c: String,
    h: String,
    switch_id: Value,
    #[serde(default)]
    owner: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QualifiedWire {
    ciphertext: String,
    data_to_encrypt_hash: String,
    #[serde(default)]
    sol_rpc_conditions: Option<Vec<LegacyCondition>>,
    #[serde(default)]
    access_control_conditions: Option<Vec<LegacyCondition>>,
    #[serde(default)]
    unified_access_control_conditions: Option<Vec<LegacyCondition>>,
    #[serde(default)]
    hosted_code: Option<LegacyHostedCode>,
}

/// One row of the decode table.
struct ShapeDecoder {
    shape: EnvelopeShape,
    matches: fn(&Map<String, Value>) -> bool,
    decode: fn(Value) -> Result<EncryptedEnvelope, SwitchError>,
}

const DECODERS: [ShapeDecoder; 3] = [
    ShapeDecoder {
        shape: EnvelopeShape::Compact,
        matches: is_compact,
        decode: decode_compact,
    },
    ShapeDecoder {
        shape: EnvelopeShape::CompactSwitchId,
        matches: is_compact_switch_id,
        decode: decode_compact_switch_id,
    },
    ShapeDecoder {
        shape: EnvelopeShape::Qualified,
        matches: is_qualified,
        decode: decode_qualified,
    },
];

const CONDITION_KEYS: [&str; 3] = [
    "solRpcConditions",
    "accessControlConditions",
    "unifiedAccessControlConditions",
];

fn has_exactly(obj: &Map<String, Value>, required: &[&str], optional: &[&str]) -> bool {
    required.iter().all(|k| obj.contains_key(*k))
        && obj.keys().all(|k| required.contains(&k.as_str()) || optional.contains(&k.as_str()))
}

fn is_compact(obj: &Map<String, Value>) -> bool {
    has_exactly(obj, &["c", "h", "pda"], &[])
}

fn is_compact_switch_id(obj: &Map<String, Value>) -> bool {
    has_exactly(obj, &["c", "h", "switchId"], &["owner"])
}

fn is_qualified(obj: &Map<String, Value>) -> bool {
    obj.contains_key("ciphertext")
        && obj.contains_key("dataToEncryptHash")
        && (obj.contains_key("hostedCode") || CONDITION_KEYS.iter().any(|k| obj.contains_key(*k)))
}

fn decode_compact(value: Value) -> Result<EncryptedEnvelope, SwitchError> {
    let wire: CompactWire = from_value(value)?;
    Ok(EncryptedEnvelope {
        ciphertext: canonical_ciphertext(&wire.c)?,
        ciphertext_hash: canonical_hash(&wire.h)?,
        predicate_ref: PredicateRef::Address(parse_pubkey("pda", &wire.pda)?),
        shape: EnvelopeShape::Compact,
    })
}

fn decode_compact_switch_id(value: Value) -> Result<EncryptedEnvelope, SwitchError> {
    let wire: SwitchIdWire = from_value(value)?;
    let switch_id = match &wire.switch_id {
        Value::String(s) => parse_switch_id(s)?,
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            SwitchError::InvalidIdentifier(format!("switch id {n} is not a u64"))
        })?,
        other => {
            return Err(SwitchError::UnrecognizedEnvelopeFormat(format!(
                "switchId must be a string or number, got {other}"
            )));
        },
    };
    let owner = wire.owner.as_deref().map(|o| parse_pubkey("owner", o)).transpose()?;
    Ok(EncryptedEnvelope {
        ciphertext: canonical_ciphertext(&wire.c)?,
        ciphertext_hash: canonical_hash(&wire.h)?,
        predicate_ref: PredicateRef::SwitchId { owner, switch_id },
        shape: EnvelopeShape::CompactSwitchId,
    })
}

fn decode_qualified(value: Value) -> Result<EncryptedEnvelope, SwitchError> {
    let wire: QualifiedWire = from_value(value)?;
    let conditions = wire
        .sol_rpc_conditions
        .or(wire.access_control_conditions)
        .or(wire.unified_access_control_conditions);

    let predicate = match (conditions, wire.hosted_code) {
        (Some(mut conditions), _) if conditions.len() == 1 => conditions
            .remove(0)
            .into_predicate(LEGACY_DEFAULT_CHAIN, &dead_mans_switch::ID)?,
        (Some(conditions), _) => {
            return Err(SwitchError::UnrecognizedEnvelopeFormat(format!(
                "expected exactly one condition, got {}",
                conditions.len()
            )));
        },
        (None, Some(hosted)) => hosted.into_predicate()?,
        (None, None) => {
            return Err(SwitchError::UnrecognizedEnvelopeFormat(
                "no predicate descriptor".to_string(),
            ));
        },
    };
    Ok(EncryptedEnvelope {
        ciphertext: canonical_ciphertext(&wire.ciphertext)?,
        ciphertext_hash: canonical_hash(&wire.data_to_encrypt_hash)?,
        predicate_ref: PredicateRef::Descriptor(predicate),
        shape: EnvelopeShape::Qualified,
    })
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, SwitchError> {
    serde_json::from_value(value).map_err(|e| SwitchError::UnrecognizedEnvelopeFormat(e.to_string()))
}

fn canonical_ciphertext(c: &str) -> Result<String, SwitchError> {
    if is_canonical_base64(c) {
        Ok(c.to_string())
    } else {
        Err(SwitchError::UnrecognizedEnvelopeFormat("ciphertext is not canonical base64".into()))
    }
}

fn canonical_hash(h: &str) -> Result<String, SwitchError> {
    normalize_hex(h.as_bytes())
}

/// True when `s` decodes as base64 and re-encodes to exactly `s`.
#[must_use]
pub fn is_canonical_base64(s: &str) -> bool {
    !s.is_empty()
        && STANDARD
            .decode(s)
            .map(|decoded| STANDARD.encode(decoded) == s)
            .unwrap_or(false)
}

/// Base64 form of `input`, skipping the wrap when it already is canonical base64.
#[must_use]
pub fn normalize_base64(input: &[u8]) -> String {
    match std::str::from_utf8(input) {
        Ok(s) if is_canonical_base64(s) => s.to_string(),
        _ => STANDARD.encode(input),
    }
}

/// Lowercase hex of a 32-byte digest, accepting either 64 hex chars or the raw digest.
///
/// # Errors
///
/// Returns `UnrecognizedEnvelopeFormat` for any other input.
pub fn normalize_hex(input: &[u8]) -> Result<String, SwitchError> {
    if input.len() == HASH_HEX_LEN && input.iter().all(u8::is_ascii_hexdigit) {
        return Ok(input.to_ascii_lowercase().into_iter().map(char::from).collect());
    }
    if input.len() == HASH_HEX_LEN / 2 {
        return Ok(hex::encode(input));
    }
    Err(SwitchError::UnrecognizedEnvelopeFormat(format!(
        "hash must be 32 bytes or {HASH_HEX_LEN} hex chars, got {} bytes",
        input.len()
    )))
}

/// Encoder/decoder bound to a size ceiling.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    max_bytes: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self { max_bytes: SLOT_BYTES }
    }
}

impl WireCodec {
    /// Codec with a ceiling, clamped to the storage slot.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes: max_bytes.min(SLOT_BYTES) }
    }

    /// Effective ceiling.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Emits the compact envelope.
    ///
    /// `ciphertext` may be the oracle's base64 text or raw bytes. Input that
    /// already spells canonical base64 is stored as-is and is never wrapped a
    /// second time, so raw bytes such as `b"abcd"` are indistinguishable from
    /// base64 text and [`EncryptedEnvelope::ciphertext_bytes`] returns their
    /// decoding. Pass oracle output as the base64 text it was returned in.
    ///
    /// # Errors
    ///
    /// `EmptyPlaintext` for an empty ciphertext, `UnrecognizedEnvelopeFormat`
    /// for a malformed hash, and `PayloadTooLarge` when the encoded envelope
    /// exceeds the ceiling.
    pub fn encode(
        &self,
        ciphertext: impl AsRef<[u8]>,
        hash: impl AsRef<[u8]>,
        address: &Pubkey,
    ) -> Result<Vec<u8>, SwitchError> {
        let ciphertext = ciphertext.as_ref();
        if ciphertext.is_empty() {
            return Err(SwitchError::EmptyPlaintext);
        }
        let wire = CompactWire {
            c: normalize_base64(ciphertext),
            h: normalize_hex(hash.as_ref())?,
            pda: address.to_string(),
        };
        let bytes = serde_json::to_vec(&wire)
            .map_err(|e| SwitchError::UnrecognizedEnvelopeFormat(e.to_string()))?;
        if bytes.len() > self.max_bytes {
            return Err(SwitchError::PayloadTooLarge {
                actual: bytes.len(),
                limit: self.max_bytes,
            });
        }
        Ok(bytes)
    }

    /// Decodes any known shape. Trailing slot padding is ignored.
    ///
    /// # Errors
    ///
    /// `UnrecognizedEnvelopeFormat` when the bytes are not a JSON object or no
    /// shape matches; the matched shape's own error otherwise.
    pub fn decode(&self, bytes: &[u8]) -> Result<EncryptedEnvelope, SwitchError> {
        let end = bytes
            .iter()
            .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        let value: Value = serde_json::from_slice(&bytes[..end])
            .map_err(|e| SwitchError::UnrecognizedEnvelopeFormat(format!("not JSON: {e}")))?;
        let Value::Object(obj) = &value else {
            return Err(SwitchError::UnrecognizedEnvelopeFormat("not a JSON object".into()));
        };

        let decoder = DECODERS.iter().find(|d| (d.matches)(obj)).ok_or_else(|| {
            let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            keys.sort_unstable();
            SwitchError::UnrecognizedEnvelopeFormat(format!("keys {keys:?}"))
        })?;
        debug!(shape = ?decoder.shape, "decoding envelope");
        (decoder.decode)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Eligibility;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn overhead_matches_reference_sizing() {
        assert_eq!(ENVELOPE_OVERHEAD, 132);
    }

    #[test]
    fn encode_emits_compact_shape() {
        let address = Pubkey::new_unique();
        let bytes = WireCodec::default().encode(b"\x00\x01raw", HASH, &address).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(r#"{"c":""#));
        let env = WireCodec::default().decode(&bytes).unwrap();
        assert_eq!(env.shape, EnvelopeShape::Compact);
        assert_eq!(env.predicate_ref, PredicateRef::Address(address));
        assert_eq!(env.ciphertext_bytes().unwrap(), b"\x00\x01raw");
    }

    #[test]
    fn already_encoded_ciphertext_is_not_wrapped_twice() {
        let address = Pubkey::new_unique();
        let b64 = STANDARD.encode(b"oracle ciphertext bytes");
        let codec = WireCodec::default();

        let env = codec.decode(&codec.encode(b64.as_bytes(), HASH, &address).unwrap()).unwrap();
        assert_eq!(env.ciphertext, b64);

        let again = codec.encode(env.ciphertext.as_bytes(), &env.ciphertext_hash, &address).unwrap();
        assert_eq!(codec.decode(&again).unwrap().ciphertext, b64);
        assert_eq!(normalize_base64(normalize_base64(b"x y z").as_bytes()), normalize_base64(b"x y z"));
    }

    #[test]
    fn ciphertext_spelling_base64_is_stored_verbatim() {
        let address = Pubkey::new_unique();
        let codec = WireCodec::default();
        let env = codec.decode(&codec.encode(b"abcd", HASH, &address).unwrap()).unwrap();
        assert_eq!(env.ciphertext, "abcd");
        assert_eq!(env.ciphertext_bytes().unwrap(), STANDARD.decode("abcd").unwrap());

        let env = codec.decode(&codec.encode(b"abc", HASH, &address).unwrap()).unwrap();
        assert_eq!(env.ciphertext_bytes().unwrap(), b"abc");
    }

    #[test]
    fn hash_normalization_is_idempotent() {
        let raw = [0xabu8; 32];
        let hex_once = normalize_hex(&raw).unwrap();
        assert_eq!(normalize_hex(hex_once.as_bytes()).unwrap(), hex_once);
        assert_eq!(normalize_hex(HASH.to_uppercase().as_bytes()).unwrap(), HASH);
        assert!(normalize_hex(b"abc").is_err());
    }

    #[test]
    fn rejects_oversize_before_storage() {
        let ciphertext = vec![7u8; 300];
        let err = WireCodec::default().encode(&ciphertext, HASH, &Pubkey::new_unique()).unwrap_err();
        assert!(matches!(err, SwitchError::PayloadTooLarge { limit: 512, .. }));
        assert!(WireCodec::new(4096).max_bytes() == 512);
    }

    #[test]
    fn decodes_slot_with_zero_padding() {
        let address = Pubkey::new_unique();
        let mut slot = WireCodec::default().encode(b"abc", HASH, &address).unwrap();
        slot.resize(512, 0);
        assert_eq!(WireCodec::default().decode(&slot).unwrap().predicate_ref, PredicateRef::Address(address));
    }

    #[test]
    fn switch_id_shape_resolves_with_owner() {
        let owner = Pubkey::new_unique();
        let json = format!(r#"{{"c":"YWJj","h":"{HASH}","switchId":"17"}}"#);
        let env = WireCodec::default().decode(json.as_bytes()).unwrap();
        assert_eq!(env.shape, EnvelopeShape::CompactSwitchId);
        assert!(env.predicate_ref.resolve(&dead_mans_switch::ID, None).is_err());
        let resolved = env.predicate_ref.resolve(&dead_mans_switch::ID, Some(&owner)).unwrap();
        assert_eq!(resolved, address::derive(&dead_mans_switch::ID, &owner, 17).unwrap().address);

        let numeric = format!(r#"{{"c":"YWJj","h":"{HASH}","switchId":17,"owner":"{owner}"}}"#);
        let env = WireCodec::default().decode(numeric.as_bytes()).unwrap();
        assert_eq!(env.predicate_ref.resolve(&dead_mans_switch::ID, None).unwrap(), resolved);
    }

    #[test]
    fn qualified_shapes_carry_their_predicate_family() {
        let pda = Pubkey::new_unique();
        let method_call = serde_json::json!({
            "ciphertext": "YWJj",
            "dataToEncryptHash": HASH,
            "solRpcConditions": [{
                "method": "check_expiration",
                "params": [pda.to_string()],
                "chain": "solanaDevnet",
                "returnValueTest": { "key": "", "comparator": "=", "value": "true" }
            }]
        });
        let env = WireCodec::default().decode(method_call.to_string().as_bytes()).unwrap();
        let PredicateRef::Descriptor(p) = &env.predicate_ref else { panic!("descriptor expected") };
        assert_eq!(p.runtime_check(), Eligibility::Time);
        assert_eq!(p.address(), &pda);

        let hosted = serde_json::json!({
            "ciphertext": "YWJj",
            "dataToEncryptHash": HASH,
            "hostedCode": { "ipfsCid": "QmSwitchCheck", "params": { "pda": pda.to_string() } }
        });
        let env = WireCodec::default().decode(hosted.to_string().as_bytes()).unwrap();
        assert!(matches!(env.predicate_ref, PredicateRef::Descriptor(Predicate::HostedCode(_))));
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        let codec = WireCodec::default();
        for input in [
            r#"{"c":"YWJj","h":"00"}"#,
            r#"{"c":"YWJj","pda":"x","extra":1}"#,
            r#"["c","h","pda"]"#,
            "not json",
        ] {
            assert!(
                matches!(codec.decode(input.as_bytes()), Err(SwitchError::UnrecognizedEnvelopeFormat(_))),
                "{input}"
            );
        }
    }
}
