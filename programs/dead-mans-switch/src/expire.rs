//! Expiration handling.
//!
//! mark_expired: permissionless; sets the sticky flag once the deadline passed,
//! no-op when already set.
//! check_expiration / get_switch_info: read-only views.
//! close_switch: owner reclaims rent after the flag is set.

use anchor_lang::prelude::*;
use crate::state::{DeadManSwitch, ErrorCode, SwitchClosed, SwitchExpired, SwitchInfo};

/// Accounts for marking a switch expired. Any fee payer may crank it.
#[derive(Accounts)]
pub struct MarkExpired<'info> {
    #[account(mut)]
    pub switch: Account<'info, DeadManSwitch>,
}

pub fn handle_mark_expired(ctx: Context<MarkExpired>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let switch = &mut ctx.accounts.switch;
    if !switch.mark_expired(now)? {
        msg!("switch already expired");
        return Ok(());
    }
    emit!(SwitchExpired { switch: switch.key(), timestamp: now });
    Ok(())
}

/// Accounts for the read-only views.
#[derive(Accounts)]
pub struct ReadSwitch<'info> {
    pub switch: Account<'info, DeadManSwitch>,
}

pub fn handle_check_expiration(ctx: Context<ReadSwitch>) -> Result<bool> {
    let now = Clock::get()?.unix_timestamp;
    Ok(ctx.accounts.switch.is_time_expired(now))
}

pub fn handle_get_switch_info(ctx: Context<ReadSwitch>) -> Result<SwitchInfo> {
    let now = Clock::get()?.unix_timestamp;
    Ok(ctx.accounts.switch.info(now))
}

/// Accounts for closing a switch and refunding rent to the owner.
#[derive(Accounts)]
pub struct CloseSwitch<'info> {
    #[account(mut, has_one = owner @ ErrorCode::Unauthorized, close = owner)]
    pub switch: Account<'info, DeadManSwitch>,

    #[account(mut)]
    pub owner: Signer<'info>,
}

pub fn handle_close_switch(ctx: Context<CloseSwitch>) -> Result<()> {
    let switch = &ctx.accounts.switch;
    require!(switch.expired, ErrorCode::NotExpired);

    emit!(SwitchClosed {
        switch: switch.key(),
        owner: ctx.accounts.owner.key(),
        recovered_lamports: switch.to_account_info().lamports(),
        timestamp: Clock::get()?.unix_timestamp,
    });
    Ok(())
}
