//! Offline diagnostics for dead man's switch accounts and envelopes.
//! Prints one JSON object to stdout per command; logs go to stderr.
//! Nothing here touches the network.

use std::path::PathBuf;
use std::str::FromStr;

use anchor_lang::prelude::Pubkey;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use switch_protocol::{
    account, address, policy, AccessPredicateBuilder, Clock, EnvelopeShape, Expiration, Predicate,
    PredicateRef, ProtocolConfig, SwitchStatus, SwitchSummary, SystemClock, WireCodec,
};

/// Defines the CLI and the selected subcommand.
#[derive(Parser, Debug)]
#[command(name = "switch-inspect")]
#[command(about = "Inspect dead man's switch addresses, accounts and envelopes", long_about = None)]
struct Cli {
    /// Protocol configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Lists available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Derives the switch address for an owner and switch id.
    Derive {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        id: String,
    },
    /// Prints the release predicate for a switch address.
    Predicate {
        #[arg(long)]
        address: String,
    },
    /// Decodes an envelope given as JSON text or base64 bytes.
    Decode {
        #[arg(long)]
        envelope: String,
        /// Owner used to re-derive switch-id envelopes.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Parses raw account data (hex or base64) and evaluates its expiry.
    Account {
        #[arg(long)]
        data: String,
        /// Evaluation time in unix seconds; wall clock when omitted.
        #[arg(long)]
        now: Option<i64>,
    },
}

/// Holds JSON output of derive.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutDerive {
    program_id: String,
    owner: String,
    switch_id: String,
    address: String,
    bump: u8,
}

/// Holds JSON output of decode.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutDecode {
    shape: EnvelopeShape,
    ciphertext_len: usize,
    ciphertext_hash: String,
    bound_address: Option<String>,
    predicate: Option<Predicate>,
}

/// Holds JSON output of account.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutAccount {
    #[serde(flatten)]
    state: SwitchSummary,
    status: SwitchStatus,
    expiration: Expiration,
    current_time: i64,
    envelope_shape: Option<EnvelopeShape>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // Parses flags and dispatches.
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ProtocolConfig::from_file(path)?,
        None => ProtocolConfig::default(),
    };
    debug!(program_id = %config.program_id, chain = %config.chain, "configuration loaded");

    let json = match cli.command {
        Commands::Derive { owner, id } => serde_json::to_string(&run_derive(&config, owner, id)?)?,
        Commands::Predicate { address } => serde_json::to_string(&run_predicate(&config, &address)?)?,
        Commands::Decode { envelope, owner } => {
            serde_json::to_string(&run_decode(&config, &envelope, owner.as_deref())?)?
        }
        Commands::Account { data, now } => {
            let now = now.unwrap_or_else(|| SystemClock.now());
            serde_json::to_string(&run_account(&data, now)?)?
        }
    };
    println!("{json}");
    Ok(())
}

fn run_derive(config: &ProtocolConfig, owner: String, id: String) -> Result<OutDerive> {
    let derived = address::derive_from_str(&config.program_id.to_string(), &owner, &id)?;
    Ok(OutDerive {
        program_id: config.program_id.to_string(),
        owner,
        switch_id: id,
        address: derived.address.to_string(),
        bump: derived.bump,
    })
}

fn run_predicate(config: &ProtocolConfig, address: &str) -> Result<Predicate> {
    let address = Pubkey::from_str(address).map_err(|e| anyhow!("invalid address: {e}"))?;
    Ok(AccessPredicateBuilder::new(config.chain.clone()).build(&address))
}

fn run_decode(config: &ProtocolConfig, envelope: &str, owner: Option<&str>) -> Result<OutDecode> {
    let bytes = envelope_bytes(envelope);
    let env = WireCodec::new(config.max_envelope_bytes).decode(&bytes)?;
    let owner = owner
        .map(|o| Pubkey::from_str(o).map_err(|e| anyhow!("invalid owner: {e}")))
        .transpose()?;
    let bound = env.predicate_ref.resolve(&config.program_id, owner.as_ref()).ok();
    let predicate = match env.predicate_ref {
        PredicateRef::Descriptor(p) => Some(p),
        PredicateRef::Address(_) | PredicateRef::SwitchId { .. } => bound
            .as_ref()
            .map(|a| AccessPredicateBuilder::new(config.chain.clone()).build(a)),
    };
    Ok(OutDecode {
        shape: env.shape,
        ciphertext_len: STANDARD.decode(&env.ciphertext).map_or(0, |c| c.len()),
        ciphertext_hash: env.ciphertext_hash,
        bound_address: bound.map(|a| a.to_string()),
        predicate,
    })
}

fn run_account(data: &str, now: i64) -> Result<OutAccount> {
    let raw = decode_blob(data).context("account data must be hex or base64")?;
    let state = account::parse(&raw)?;
    let envelope_shape = WireCodec::default().decode(state.payload()).ok().map(|e| e.shape);
    Ok(OutAccount {
        state: SwitchSummary::from(&state),
        status: policy::classify(&state, now),
        expiration: policy::evaluate(&state, now),
        current_time: now,
        envelope_shape,
    })
}

/// JSON text is taken verbatim; anything else is tried as base64.
fn envelope_bytes(input: &str) -> Vec<u8> {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        return trimmed.as_bytes().to_vec();
    }
    STANDARD.decode(trimmed).unwrap_or_else(|_| trimmed.as_bytes().to_vec())
}

fn decode_blob(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim().trim_start_matches("0x");
    if let Ok(bytes) = hex::decode(trimmed) {
        return Ok(bytes);
    }
    Ok(STANDARD.decode(trimmed)?)
}
