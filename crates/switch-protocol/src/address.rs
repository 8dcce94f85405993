//! Deterministic switch address derivation.
//!
//! Address = PDA of `["switch", owner, switch_id.to_le_bytes()]` under the
//! program id. The same tuple always yields the same address.

use std::str::FromStr;

use anchor_lang::prelude::Pubkey;
use serde::{Deserialize, Serialize};

use dead_mans_switch::state::SWITCH_SEED;

use crate::error::SwitchError;

/// A derived switch address together with its bump seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchAddress {
    /// Program-derived account address.
    #[serde(with = "crate::config::pubkey_str")]
    pub address: Pubkey,
    /// Bump that moved the address off the curve.
    pub bump: u8,
}

/// Derives the switch address for `(program_id, owner, switch_id)`.
///
/// # Errors
///
/// Returns `InvalidIdentifier` for `switch_id == 0`; the program never
/// allocates such a switch.
pub fn derive(
    program_id: &Pubkey,
    owner: &Pubkey,
    switch_id: u64,
) -> Result<SwitchAddress, SwitchError> {
    if switch_id == 0 {
        return Err(SwitchError::InvalidIdentifier("switch id must be non-zero".to_string()));
    }
    let (address, bump) = Pubkey::find_program_address(
        &[SWITCH_SEED, owner.as_ref(), &switch_id.to_le_bytes()],
        program_id,
    );
    Ok(SwitchAddress { address, bump })
}

/// Byte-level entry point; ids must be exactly 32 bytes.
///
/// # Errors
///
/// Returns `InvalidIdentifier` on a wrong byte length.
pub fn derive_from_bytes(
    program_id: &[u8],
    owner: &[u8],
    switch_id: u64,
) -> Result<SwitchAddress, SwitchError> {
    let program_id = pubkey_from_bytes("program id", program_id)?;
    let owner = pubkey_from_bytes("owner", owner)?;
    derive(&program_id, &owner, switch_id)
}

/// String entry point; ids are base58, the switch id is decimal.
///
/// # Errors
///
/// Returns `InvalidIdentifier` when any part does not parse.
pub fn derive_from_str(
    program_id: &str,
    owner: &str,
    switch_id: &str,
) -> Result<SwitchAddress, SwitchError> {
    let program_id = parse_pubkey("program id", program_id)?;
    let owner = parse_pubkey("owner", owner)?;
    derive(&program_id, &owner, parse_switch_id(switch_id)?)
}

pub(crate) fn parse_pubkey(what: &str, s: &str) -> Result<Pubkey, SwitchError> {
    Pubkey::from_str(s.trim())
        .map_err(|e| SwitchError::InvalidIdentifier(format!("{what} {s:?}: {e}")))
}

pub(crate) fn parse_switch_id(s: &str) -> Result<u64, SwitchError> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| SwitchError::InvalidIdentifier(format!("switch id {s:?}: {e}")))
}

fn pubkey_from_bytes(what: &str, bytes: &[u8]) -> Result<Pubkey, SwitchError> {
    Pubkey::try_from(bytes).map_err(|_| {
        SwitchError::InvalidIdentifier(format!("{what} must be 32 bytes, got {}", bytes.len()))
    })
}
