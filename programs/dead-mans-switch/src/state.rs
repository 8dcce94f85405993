//! On-chain state layout, transitions and error codes.
//!
//! DeadManSwitch: fixed 580-byte record (discriminator + fields), no Vec so the
//! byte offsets stay constant and the client can read the expired flag directly.
//! Transitions are plain methods taking `now` so they can run off-chain too.

use anchor_lang::prelude::*;

// Size constants
pub const DISC_SIZE: usize = 8;
pub const MAX_DATA_SIZE: usize = 512; // Envelope slot, zero padded
pub const MIN_PING_INTERVAL: i64 = 60; // 1 minute
pub const MAX_PING_INTERVAL: i64 = 365 * 24 * 60 * 60; // 1 year
pub const SWITCH_SEED: &[u8] = b"switch";

// Field offsets within the raw account (discriminator included)
pub const OWNER_OFFSET: usize = DISC_SIZE; // = 8
pub const LAST_PING_OFFSET: usize = OWNER_OFFSET + 32; // = 40
pub const PING_INTERVAL_OFFSET: usize = LAST_PING_OFFSET + 8; // = 48
pub const DATA_OFFSET: usize = PING_INTERVAL_OFFSET + 8; // = 56
pub const DATA_LENGTH_OFFSET: usize = DATA_OFFSET + MAX_DATA_SIZE; // = 568
pub const CREATED_AT_OFFSET: usize = DATA_LENGTH_OFFSET + 2; // = 570
pub const BUMP_OFFSET: usize = CREATED_AT_OFFSET + 8; // = 578
pub const EXPIRED_OFFSET: usize = BUMP_OFFSET + 1; // = 579
pub const SWITCH_ACCOUNT_SPACE: usize = EXPIRED_OFFSET + 1; // = 580

/// Switch storage account.
#[account]
pub struct DeadManSwitch {
    pub owner        : Pubkey,
    pub last_ping    : i64,
    pub ping_interval: i64,
    pub encrypted_data: [u8; MAX_DATA_SIZE],
    pub data_length  : u16,
    pub created_at   : i64,
    pub bump         : u8,
    pub expired      : bool, // Sticky, set only by mark_expired
}

impl DeadManSwitch {
    /// Used part of the envelope slot.
    pub fn encrypted_data(&self) -> &[u8] {
        let len = (self.data_length as usize).min(MAX_DATA_SIZE);
        &self.encrypted_data[..len]
    }

    /// `last_ping + ping_interval`, `None` on overflow.
    pub fn expiration_time(&self) -> Option<i64> {
        self.last_ping.checked_add(self.ping_interval)
    }

    /// Deadline reached (inclusive). Overflow counts as expired.
    pub fn is_time_expired(&self, now: i64) -> bool {
        self.expiration_time().map_or(true, |deadline| now >= deadline)
    }

    /// Fills a freshly allocated account.
    pub fn initialize(
        &mut self,
        owner: Pubkey,
        id: u64,
        ping_interval: i64,
        encrypted_data: &[u8],
        bump: u8,
        now: i64,
    ) -> std::result::Result<i64, ErrorCode> {
        if id == 0 {
            return Err(ErrorCode::InvalidSwitchId);
        }
        if !(MIN_PING_INTERVAL..=MAX_PING_INTERVAL).contains(&ping_interval) {
            return Err(ErrorCode::InvalidInterval);
        }
        if encrypted_data.is_empty() {
            return Err(ErrorCode::EmptyData);
        }
        if encrypted_data.len() > MAX_DATA_SIZE {
            return Err(ErrorCode::DataTooLarge);
        }
        let expiration_time = now
            .checked_add(ping_interval)
            .ok_or(ErrorCode::TimeOverflow)?;

        self.owner = owner;
        self.last_ping = now;
        self.ping_interval = ping_interval;
        self.encrypted_data = [0u8; MAX_DATA_SIZE];
        self.encrypted_data[..encrypted_data.len()].copy_from_slice(encrypted_data);
        self.data_length = encrypted_data.len() as u16;
        self.created_at = now;
        self.bump = bump;
        self.expired = false;
        Ok(expiration_time)
    }

    /// Renews the deadline. Late pings never revive a switch.
    pub fn renew(&mut self, now: i64) -> std::result::Result<i64, ErrorCode> {
        if self.expired || self.is_time_expired(now) {
            return Err(ErrorCode::SwitchExpired);
        }
        if now <= self.last_ping {
            return Err(ErrorCode::InvalidTimestamp);
        }
        let next = now
            .checked_add(self.ping_interval)
            .ok_or(ErrorCode::TimeOverflow)?;
        self.last_ping = now;
        Ok(next)
    }

    /// Sets the sticky flag. Returns `false` when it was already set.
    pub fn mark_expired(&mut self, now: i64) -> std::result::Result<bool, ErrorCode> {
        if self.expired {
            return Ok(false);
        }
        if !self.is_time_expired(now) {
            return Err(ErrorCode::NotExpired);
        }
        self.expired = true;
        Ok(true)
    }

    pub fn info(&self, now: i64) -> SwitchInfo {
        SwitchInfo {
            owner          : self.owner,
            expired        : self.expired,
            time_expired   : self.is_time_expired(now),
            last_ping      : self.last_ping,
            ping_interval  : self.ping_interval,
            created_at     : self.created_at,
            expiration_time: self.expiration_time().unwrap_or(i64::MAX),
            current_time   : now,
        }
    }
}

/// Return value of `get_switch_info`.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SwitchInfo {
    pub owner          : Pubkey,
    pub expired        : bool,
    pub time_expired   : bool,
    pub last_ping      : i64,
    pub ping_interval  : i64,
    pub created_at     : i64,
    pub expiration_time: i64,
    pub current_time   : i64,
}

#[event]
pub struct SwitchCreated {
    pub switch         : Pubkey,
    pub owner          : Pubkey,
    pub switch_id      : u64,
    pub ping_interval  : i64,
    pub expiration_time: i64,
    pub timestamp      : i64,
}

#[event]
pub struct SwitchPinged {
    pub owner             : Pubkey,
    pub switch            : Pubkey,
    pub next_required_ping: i64,
    pub timestamp         : i64,
}

#[event]
pub struct SwitchExpired {
    pub switch   : Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct SwitchClosed {
    pub switch            : Pubkey,
    pub owner             : Pubkey,
    pub recovered_lamports: u64,
    pub timestamp         : i64,
}

#[error_code]
pub enum ErrorCode {
    #[msg("ping interval must be between 60 seconds and 1 year")] InvalidInterval,
    #[msg("encrypted data is too large (max 512 bytes)")]          DataTooLarge,
    #[msg("encrypted data cannot be empty")]                       EmptyData,
    #[msg("time overflow during calculation")]                     TimeOverflow,
    #[msg("invalid switch id")]                                    InvalidSwitchId,
    #[msg("unauthorized operation")]                               Unauthorized,
    #[msg("switch deadline has passed")]                           SwitchExpired,
    #[msg("switch has not expired yet")]                           NotExpired,
    #[msg("invalid timestamp detected")]                           InvalidTimestamp,
}

impl ErrorCode {
    /// Custom program error number as seen by clients.
    pub fn program_code(self) -> u32 {
        anchor_lang::error::ERROR_CODE_OFFSET + self as u32
    }
}
