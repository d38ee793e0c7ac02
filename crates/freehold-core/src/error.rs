//! Error types for Freehold core vocabulary

use thiserror::Error;

/// Errors related to player and world identities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid name length: {actual} (expected 1..={max})")]
    InvalidLength { actual: usize, max: usize },

    #[error("Invalid character {found:?} in name {name:?}")]
    InvalidCharacter { name: String, found: char },

    #[error("Name {0:?} is reserved")]
    Reserved(String),

    #[error("World name must not be empty")]
    EmptyWorldName,
}

/// Errors related to trust level parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustParseError {
    #[error("Unknown trust level: {0:?}")]
    UnknownLevel(String),
}
