//! Client core for the dead man's switch program.
//!
//! A switch is an on-chain account holding an encrypted secret that becomes
//! decryptable once its owner stops pinging. This crate derives switch
//! addresses, parses account bytes, encodes the envelope stored in the
//! account, builds the release predicate handed to the key-release oracle and
//! orchestrates the lifecycle through [`SwitchProtocol`].
//!
//! Ledger, wallet, oracle and clock are injected through the traits in
//! [`ports`]; nothing here opens a network connection.

pub mod account;
pub mod address;
pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod instructions;
pub mod policy;
pub mod ports;
pub mod predicate;
pub mod protocol;

pub use account::{SwitchState, SwitchSummary};
pub use address::SwitchAddress;
pub use auth::{AuthCache, AuthProof, MemoryAuthCache, SignInMessage};
pub use config::{AuthConfig, ProtocolConfig};
pub use envelope::{EncryptedEnvelope, EnvelopeShape, PredicateRef, WireCodec};
pub use error::{ErrorClass, PortError, SwitchError};
pub use policy::{Eligibility, Expiration, SwitchStatus};
pub use ports::{Clock, Ledger, Oracle, OracleCiphertext, Receipt, Signer, SystemClock, TxId};
pub use predicate::{AccessPredicateBuilder, Predicate};
pub use protocol::{Created, MarkOutcome, SwitchHint, SwitchProtocol, SwitchReport};
