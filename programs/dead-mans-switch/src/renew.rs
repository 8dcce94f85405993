//! Owner renewal (ping).

use anchor_lang::prelude::*;
use crate::state::{DeadManSwitch, ErrorCode, SwitchPinged};

/// Accounts for pinging a switch. Only the recorded owner may sign.
#[derive(Accounts)]
pub struct Ping<'info> {
    #[account(mut, has_one = owner @ ErrorCode::Unauthorized)]
    pub switch: Account<'info, DeadManSwitch>,
    pub owner: Signer<'info>,
}

/// Moves `last_ping` to now. Rejected once the deadline has passed.
pub fn handle_ping(ctx: Context<Ping>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let switch = &mut ctx.accounts.switch;
    let next_required_ping = switch.renew(now)?;

    emit!(SwitchPinged {
        owner: switch.owner,
        switch: switch.key(),
        next_required_ping,
        timestamp: now,
    });
    Ok(())
}
