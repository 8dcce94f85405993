//! # Module overview
//! On-chain half of the dead man's switch: an owner commits an encrypted
//! envelope plus a ping deadline to a PDA, and anyone may flip the sticky
//! `expired` flag once the deadline passes without a ping. The key-release
//! network only releases the decryption key while that flag byte reads 1.
//!
//! # Instruction set
//! create_switch: allocate the (owner, id) PDA and store the envelope.
//! ping: owner renews the deadline; rejected once it has passed.
//! mark_expired: permissionless transition to the terminal expired state.
//! check_expiration / get_switch_info: read-only views.
//! close_switch: owner reclaims rent after expiry.

#![allow(unexpected_cfgs)] // Keep until Anchor's cfg layout is simplified
#![allow(deprecated)] // Remove once Anchor moves to AccountInfo::resize()

use anchor_lang::prelude::*;

pub mod state;
mod create;
mod renew;
mod expire;

// Program ID
declare_id!("21Tkms6a8wJg5KoFTsogCqxTpP8EK2AJH8gYbA4GtFyB");

// Re-exports (glob so the generated client account modules resolve at the crate root)
pub use create::*;
pub use renew::*;
pub use expire::*;
pub use state::{DeadManSwitch, ErrorCode, SwitchInfo};

#[program]
pub mod dead_mans_switch {
    use super::*;

    /// Creates a switch holding `encrypted_data` with the given ping cadence.
    pub fn create_switch(
        ctx: Context<CreateSwitch>,
        id: u64,
        ping_interval: i64,
        encrypted_data: Vec<u8>,
    ) -> Result<()> {
        create::handle_create_switch(ctx, id, ping_interval, encrypted_data)
    }

    /// Resets the switch's expiration timer.
    pub fn ping(ctx: Context<Ping>) -> Result<()> {
        renew::handle_ping(ctx)
    }

    /// Sets the sticky expired flag once the deadline has passed.
    pub fn mark_expired(ctx: Context<MarkExpired>) -> Result<()> {
        expire::handle_mark_expired(ctx)
    }

    /// Returns whether the deadline has passed (ignores the flag).
    pub fn check_expiration(ctx: Context<ReadSwitch>) -> Result<bool> {
        expire::handle_check_expiration(ctx)
    }

    /// Returns the switch with its computed expiration status.
    pub fn get_switch_info(ctx: Context<ReadSwitch>) -> Result<SwitchInfo> {
        expire::handle_get_switch_info(ctx)
    }

    /// Closes an expired switch and refunds rent to the owner.
    pub fn close_switch(ctx: Context<CloseSwitch>) -> Result<()> {
        expire::handle_close_switch(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::*;

    fn fresh() -> DeadManSwitch {
        DeadManSwitch {
            owner: Pubkey::default(),
            last_ping: 0,
            ping_interval: 0,
            encrypted_data: [0u8; MAX_DATA_SIZE],
            data_length: 0,
            created_at: 0,
            bump: 0,
            expired: false,
        }
    }

    #[test]
    fn serialized_layout_matches_offsets() {
        let owner = Pubkey::new_unique();
        let mut sw = fresh();
        sw.initialize(owner, 7, 3600, b"envelope", 254, 1_000).unwrap();
        sw.expired = true;

        let mut raw = Vec::new();
        sw.try_serialize(&mut raw).unwrap();
        assert_eq!(raw.len(), SWITCH_ACCOUNT_SPACE);
        assert_eq!(&raw[..DISC_SIZE], &DeadManSwitch::DISCRIMINATOR[..]);
        assert_eq!(&raw[OWNER_OFFSET..OWNER_OFFSET + 32], owner.as_ref());
        assert_eq!(&raw[DATA_OFFSET..DATA_OFFSET + 8], b"envelope");
        assert_eq!(raw[BUMP_OFFSET], 254);
        assert_eq!(raw[EXPIRED_OFFSET], 1);
    }

    #[test]
    fn initialize_rejects_bad_inputs() {
        let owner = Pubkey::new_unique();
        let mut sw = fresh();
        assert_eq!(sw.initialize(owner, 0, 3600, b"x", 1, 0).unwrap_err() as u32, ErrorCode::InvalidSwitchId as u32);
        assert_eq!(sw.initialize(owner, 1, 59, b"x", 1, 0).unwrap_err() as u32, ErrorCode::InvalidInterval as u32);
        assert_eq!(sw.initialize(owner, 1, 60, b"", 1, 0).unwrap_err() as u32, ErrorCode::EmptyData as u32);
        let big = vec![1u8; MAX_DATA_SIZE + 1];
        assert_eq!(sw.initialize(owner, 1, 60, &big, 1, 0).unwrap_err() as u32, ErrorCode::DataTooLarge as u32);
    }

    #[test]
    fn late_ping_is_rejected_and_flag_is_sticky() {
        let mut sw = fresh();
        sw.initialize(Pubkey::new_unique(), 1, 60, b"x", 1, 100).unwrap();
        assert_eq!(sw.renew(150).unwrap(), 210);
        assert!(sw.mark_expired(209).is_err());
        assert!(sw.renew(210).is_err());
        assert!(sw.mark_expired(210).unwrap());
        assert!(!sw.mark_expired(500).unwrap());
        assert!(sw.expired);
    }
}
