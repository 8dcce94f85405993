//! Fixed-offset parser for raw switch accounts.
//!
//! Mirrors `dead_mans_switch::state`; no versioning, the layout is the
//! on-chain schema.

use anchor_lang::prelude::Pubkey;
use anchor_lang::Discriminator;
use serde::Serialize;

use dead_mans_switch::state::{
    BUMP_OFFSET, CREATED_AT_OFFSET, DATA_LENGTH_OFFSET, DATA_OFFSET, DISC_SIZE, EXPIRED_OFFSET,
    LAST_PING_OFFSET, MAX_DATA_SIZE, OWNER_OFFSET, PING_INTERVAL_OFFSET, SWITCH_ACCOUNT_SPACE,
};
use dead_mans_switch::DeadManSwitch;

use crate::error::SwitchError;

/// Decoded switch account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchState {
    /// Identity allowed to ping.
    pub owner: Pubkey,
    /// Last renewal, unix seconds.
    pub last_ping: i64,
    /// Renewal cadence, seconds.
    pub ping_interval: i64,
    /// Raw slot, zero padded.
    pub encrypted_payload: [u8; MAX_DATA_SIZE],
    /// Used bytes within the slot.
    pub payload_length: u16,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// PDA bump.
    pub bump: u8,
    /// Sticky on-chain expired marker.
    pub expired_flag: bool,
}

impl SwitchState {
    /// The used part of the envelope slot.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.encrypted_payload[..usize::from(self.payload_length)]
    }
}

/// Serializable summary for diagnostics output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSummary {
    pub owner: String,
    pub last_ping: i64,
    pub ping_interval: i64,
    pub payload_length: u16,
    pub created_at: i64,
    pub bump: u8,
    pub expired_flag: bool,
}

impl From<&SwitchState> for SwitchSummary {
    fn from(state: &SwitchState) -> Self {
        Self {
            owner: state.owner.to_string(),
            last_ping: state.last_ping,
            ping_interval: state.ping_interval,
            payload_length: state.payload_length,
            created_at: state.created_at,
            bump: state.bump,
            expired_flag: state.expired_flag,
        }
    }
}

/// Parses a raw account buffer.
///
/// # Errors
///
/// Returns `MalformedAccount` if the buffer is shorter than the layout, the
/// discriminator does not match, `payload_length > 512`, or the flag byte is
/// neither 0 nor 1.
pub fn parse(raw: &[u8]) -> Result<SwitchState, SwitchError> {
    if raw.len() < SWITCH_ACCOUNT_SPACE {
        return Err(SwitchError::MalformedAccount(format!(
            "{} bytes, expected at least {SWITCH_ACCOUNT_SPACE}",
            raw.len()
        )));
    }
    if raw[..DISC_SIZE] != DeadManSwitch::DISCRIMINATOR[..] {
        return Err(SwitchError::MalformedAccount("discriminator mismatch".to_string()));
    }

    let payload_length = u16::from_le_bytes(array(raw, DATA_LENGTH_OFFSET));
    if usize::from(payload_length) > MAX_DATA_SIZE {
        return Err(SwitchError::MalformedAccount(format!(
            "payload length {payload_length} exceeds {MAX_DATA_SIZE}"
        )));
    }
    let expired_flag = match raw[EXPIRED_OFFSET] {
        0 => false,
        1 => true,
        other => {
            return Err(SwitchError::MalformedAccount(format!("invalid flag byte {other}")));
        },
    };

    Ok(SwitchState {
        owner: Pubkey::new_from_array(array(raw, OWNER_OFFSET)),
        last_ping: i64::from_le_bytes(array(raw, LAST_PING_OFFSET)),
        ping_interval: i64::from_le_bytes(array(raw, PING_INTERVAL_OFFSET)),
        encrypted_payload: array(raw, DATA_OFFSET),
        payload_length,
        created_at: i64::from_le_bytes(array(raw, CREATED_AT_OFFSET)),
        bump: raw[BUMP_OFFSET],
        expired_flag,
    })
}

/// Copies `N` bytes at `offset`; callers have already checked the length.
fn array<const N: usize>(raw: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[offset..offset + N]);
    out
}
