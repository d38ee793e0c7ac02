//! Error types for the flag system

use thiserror::Error;

use freehold_core::{IdentityError, TrustParseError};

use crate::value::FlagKind;

/// Errors from flag lookup and assignment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    #[error("Type mismatch for flag {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: FlagKind,
        found: FlagKind,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors from decoding flag value strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid flag key {0:?}")]
    InvalidFlagKey(String),

    #[error("Invalid state {0:?} (expected allow or deny)")]
    InvalidState(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid trust group {group:?}: {reason}")]
    InvalidTrustGroup { group: String, reason: String },

    #[error(transparent)]
    TrustLevel(#[from] TrustParseError),

    #[error("Invalid player name: {0}")]
    PlayerName(#[from] IdentityError),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unknown {kind} choice: {value:?}")]
    UnknownChoice { kind: &'static str, value: String },
}
