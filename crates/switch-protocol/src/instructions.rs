//! Anchor instruction builders for the switch program.
//!
//! Account lists and data come from the program crate's generated client
//! modules, so discriminators and Borsh layouts cannot drift.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::{system_program, InstructionData, ToAccountMetas};

use dead_mans_switch::{accounts, instruction};

/// `create_switch(id, ping_interval, encrypted_data)` signed by `owner`.
#[must_use]
pub fn create_switch(
    program_id: &Pubkey,
    owner: &Pubkey,
    switch: &Pubkey,
    id: u64,
    ping_interval: i64,
    envelope: Vec<u8>,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: accounts::CreateSwitch {
            switch: *switch,
            owner: *owner,
            system_program: system_program::ID,
        }
        .to_account_metas(None),
        data: instruction::CreateSwitch {
            id,
            ping_interval,
            encrypted_data: envelope,
        }
        .data(),
    }
}

/// `ping` signed by `owner`.
#[must_use]
pub fn ping(program_id: &Pubkey, owner: &Pubkey, switch: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: accounts::Ping {
            switch: *switch,
            owner: *owner,
        }
        .to_account_metas(None),
        data: instruction::Ping {}.data(),
    }
}

/// Permissionless `mark_expired`.
#[must_use]
pub fn mark_expired(program_id: &Pubkey, switch: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: accounts::MarkExpired { switch: *switch }.to_account_metas(None),
        data: instruction::MarkExpired {}.data(),
    }
}

/// `close_switch` signed by `owner`; rent goes back to the owner.
#[must_use]
pub fn close_switch(program_id: &Pubkey, owner: &Pubkey, switch: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: accounts::CloseSwitch {
            switch: *switch,
            owner: *owner,
        }
        .to_account_metas(None),
        data: instruction::CloseSwitch {}.data(),
    }
}
