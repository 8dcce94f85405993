//! Error taxonomy for the switch protocol.
//!
//! Validation errors are raised before any I/O. Decode errors are raised
//! before any decrypt attempt. `TransientFailure` is the only retryable class.

use thiserror::Error;

use dead_mans_switch::state::MAX_DATA_SIZE;
use dead_mans_switch::ErrorCode as ProgramError;

/// Errors surfaced by every protocol operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    /// Program id, owner or switch id is malformed or cannot be resolved.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Ping interval outside `[60, 31_536_000]` seconds.
    #[error("ping interval {0}s is outside [60, 31536000]")]
    InvalidInterval(i64),

    /// Plaintext or encoded envelope exceeds its budget.
    #[error("payload too large: {actual} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Size that was attempted.
        actual: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// Empty plaintext.
    #[error("plaintext must not be empty")]
    EmptyPlaintext,

    /// No known envelope shape matched.
    #[error("unrecognized envelope format: {0}")]
    UnrecognizedEnvelopeFormat(String),

    /// Account bytes do not match the fixed switch layout.
    #[error("malformed switch account: {0}")]
    MalformedAccount(String),

    /// Envelope is bound to a different switch than the caller expected.
    #[error("envelope bound to {bound} but hint implies {expected}")]
    AddressMismatch {
        /// Address carried by the envelope.
        bound: String,
        /// Address derived from the caller's hint.
        expected: String,
    },

    /// Signer is not the recorded owner.
    #[error("unauthorized: signer is not the switch owner")]
    Unauthorized,

    /// Deadline has not passed, or the release condition is not met.
    #[error("switch has not expired yet")]
    NotYetExpired,

    /// Switch is already past its deadline or flagged.
    #[error("switch already expired")]
    AlreadyExpired,

    /// A collaborator evaluated the request and refused it. Retrying the same
    /// request gets the same answer.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Ledger or oracle unavailable; the whole operation may be retried.
    #[error("transient failure: {0}")]
    TransientFailure(String),

    /// Configuration could not be loaded or is out of range.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classes callers use to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, caught before any I/O.
    Validation,
    /// Stored bytes could not be interpreted.
    Decode,
    /// Expected, user-facing outcome (not a bug).
    Expected,
    /// Retryable.
    Transient,
}

impl SwitchError {
    /// Returns the class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidIdentifier(_)
            | Self::InvalidInterval(_)
            | Self::PayloadTooLarge { .. }
            | Self::EmptyPlaintext
            | Self::Config(_) => ErrorClass::Validation,
            Self::UnrecognizedEnvelopeFormat(_)
            | Self::MalformedAccount(_)
            | Self::AddressMismatch { .. } => ErrorClass::Decode,
            Self::Unauthorized
            | Self::NotYetExpired
            | Self::AlreadyExpired
            | Self::Rejected(_) => ErrorClass::Expected,
            Self::TransientFailure(_) => ErrorClass::Transient,
        }
    }

    /// Only transient failures may be retried unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }
}

/// Errors reported by the external ledger, signer and oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// Network, timeout or availability problem.
    #[error("transport: {0}")]
    Transient(String),

    /// The collaborator evaluated the request and refused it.
    #[error("rejected (code {code:?}): {message}")]
    Rejected {
        /// Custom program error number, when the rejection came from the program.
        code: Option<u32>,
        /// Collaborator-provided detail.
        message: String,
    },
}

impl PortError {
    /// Rejection carrying a program error code.
    #[must_use]
    pub fn program(code: ProgramError) -> Self {
        Self::Rejected {
            message: code.to_string(),
            code: Some(code.program_code()),
        }
    }
}

/// Maps a ledger or signer failure onto the protocol taxonomy. Only
/// transport problems stay retryable.
pub(crate) fn from_ledger(err: PortError) -> SwitchError {
    match err {
        PortError::Transient(msg) => SwitchError::TransientFailure(msg),
        PortError::Rejected { code: Some(code), message } => program_error(code, message),
        PortError::Rejected { code: None, message } => SwitchError::Rejected(message),
    }
}

/// As [`from_ledger`] for `create_switch`, where the rejected interval and
/// envelope size are known.
pub(crate) fn from_ledger_create(
    err: PortError,
    ping_interval: i64,
    envelope_len: usize,
) -> SwitchError {
    match err {
        PortError::Rejected { code: Some(code), .. } if is_code(code, ProgramError::InvalidInterval) => {
            SwitchError::InvalidInterval(ping_interval)
        },
        PortError::Rejected { code: Some(code), .. } if is_code(code, ProgramError::DataTooLarge) => {
            SwitchError::PayloadTooLarge { actual: envelope_len, limit: MAX_DATA_SIZE }
        },
        PortError::Rejected { code: Some(code), .. } if is_code(code, ProgramError::EmptyData) => {
            SwitchError::EmptyPlaintext
        },
        other => from_ledger(other),
    }
}

/// Oracle refusals all collapse to `NotYetExpired` so the core adds no detail
/// distinguishing a wrong predicate from an early attempt.
pub(crate) fn from_oracle(err: PortError) -> SwitchError {
    match err {
        PortError::Transient(msg) => SwitchError::TransientFailure(msg),
        PortError::Rejected { .. } => SwitchError::NotYetExpired,
    }
}

/// Encryption refusals carry no expiry meaning and pass through as rejections.
pub(crate) fn from_oracle_encrypt(err: PortError) -> SwitchError {
    match err {
        PortError::Transient(msg) => SwitchError::TransientFailure(msg),
        PortError::Rejected { message, .. } => SwitchError::Rejected(message),
    }
}

fn is_code(code: u32, expected: ProgramError) -> bool {
    expected.program_code() == code
}

/// Codes with a taxonomy counterpart map onto it; everything else keeps the
/// program's own message.
fn program_error(code: u32, message: String) -> SwitchError {
    if is_code(code, ProgramError::Unauthorized) {
        SwitchError::Unauthorized
    } else if is_code(code, ProgramError::NotExpired) {
        SwitchError::NotYetExpired
    } else if is_code(code, ProgramError::SwitchExpired) {
        SwitchError::AlreadyExpired
    } else if is_code(code, ProgramError::InvalidSwitchId) {
        SwitchError::InvalidIdentifier(message)
    } else {
        SwitchError::Rejected(format!("program error {code}: {message}"))
    }
}
