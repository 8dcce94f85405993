//! Switch creation.
//!
//! CreateSwitch / handle_create_switch: allocates the switch PDA keyed by
//! (owner, id) and stores the encoded envelope in the fixed slot.

use anchor_lang::prelude::*;
use crate::state::{DeadManSwitch, SwitchCreated, SWITCH_ACCOUNT_SPACE, SWITCH_SEED};

/// Accounts for creating a switch PDA.
#[derive(Accounts)]
#[instruction(id: u64, ping_interval: i64, encrypted_data: Vec<u8>)]
pub struct CreateSwitch<'info> {
    #[account(
        init, payer=owner, space=SWITCH_ACCOUNT_SPACE, // Always 580 bytes
        seeds=[SWITCH_SEED, owner.key().as_ref(), &id.to_le_bytes()], bump
    )]
    pub switch: Account<'info, DeadManSwitch>,

    #[account(mut)]
    pub owner: Signer<'info>,
    pub system_program: Program<'info, System>,
}

/// Validates inputs and initializes the switch with `last_ping = created_at = now`.
pub fn handle_create_switch(
    ctx: Context<CreateSwitch>,
    id: u64,
    ping_interval: i64,
    encrypted_data: Vec<u8>,
) -> Result<()> {
    let now   = Clock::get()?.unix_timestamp;
    let owner = ctx.accounts.owner.key();
    let bump  = ctx.bumps.switch;

    let switch = &mut ctx.accounts.switch;
    let expiration_time = switch.initialize(owner, id, ping_interval, &encrypted_data, bump, now)?;
    msg!("switch created: id={} interval={} data_len={}", id, ping_interval, encrypted_data.len());

    emit!(SwitchCreated {
        switch: switch.key(),
        owner,
        switch_id: id,
        ping_interval,
        expiration_time,
        timestamp: now,
    });
    Ok(())
}
