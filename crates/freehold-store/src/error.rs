//! Error types for the region store
//!
//! Every mutating operation validates fully before applying anything:
//! a returned error always means the store is unchanged.

use thiserror::Error;

use freehold_core::TrustLevel;
use freehold_flags::FlagError;

use crate::region::RegionId;

/// Top-level error type for store operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Insufficient claim blocks: need {required}, have {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] PermissionError),

    #[error("Flag error: {0}")]
    Flag(#[from] FlagError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// A mutation was rejected before anything was applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Bounds are inverted or out of range")]
    InvalidBounds,

    #[error("Footprint {area} is below the minimum of {minimum} blocks")]
    BelowMinimumArea { area: u64, minimum: u64 },

    #[error("Height {height} is below the minimum of {minimum} blocks")]
    BelowMinimumHeight { height: u64, minimum: u64 },

    #[error("Bounds overlap region {0}")]
    Overlaps(RegionId),

    #[error("Bounds extend outside parent region {0}")]
    OutsideParent(RegionId),

    #[error("Child region {0} would fall outside the new bounds")]
    ChildOutsideBounds(RegionId),

    #[error("Region has {0} child region(s); delete them first or cascade")]
    HasChildren(usize),

    #[error("Nesting depth limit of {0} reached")]
    TooDeep(usize),

    #[error("World {0:?} does not accept claims")]
    WorldNotClaimable(String),

    #[error("Name {0:?} is already used by one of the owner's regions in this world")]
    NameTaken(String),

    #[error("Region has not expired")]
    NotExpired,

    #[error("Region changed hands too recently")]
    RecentlyTransferred,

    #[error("Stealing expired regions is not enabled")]
    StealDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("No region with id {0}")]
    Region(RegionId),

    #[error("No world named {0:?}")]
    World(String),

    #[error("No region named {0:?} for that owner")]
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("Only the owner may do this")]
    NotOwner,

    #[error("Co-owners may not resize, delete, transfer, or edit trust")]
    CoOwnerRestricted,

    #[error("Requires {0} trust on the region")]
    TrustRequired(TrustLevel),

    #[error("Requires administrative rights")]
    AdminRequired,

    #[error("This flag is not player-toggleable")]
    FlagNotToggleable,
}

/// An applied mutation would have broken a structural invariant
///
/// Surfacing one of these at runtime means a calling-sequence bug; the
/// store refuses the operation and logs it as an internal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Parent chain of region {0} exceeds the depth bound")]
    ParentChainTooDeep(RegionId),

    #[error("Parent chain of region {0} contains a cycle")]
    ParentCycle(RegionId),

    #[error("Region {child} is linked to missing parent {parent}")]
    MissingParent { child: RegionId, parent: RegionId },
}

/// Persistence envelope and file failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(String),

    #[error("Snapshot encoding failed: {0}")]
    Encode(String),

    #[error("Snapshot decoding failed: {0}")]
    Decode(String),

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::InsufficientBalance {
            required: 400,
            available: 120,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("400"));
        assert!(msg.contains("120"));

        let err: StoreError = ValidationError::BelowMinimumArea {
            area: 9,
            minimum: 100,
        }
        .into();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(format!("{}", err).contains("minimum"));
    }

    #[test]
    fn test_error_conversions() {
        let err: StoreError = NotFoundError::Region(RegionId(7)).into();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err: StoreError = PermissionError::TrustRequired(TrustLevel::Build).into();
        assert!(format!("{}", err).contains("build"));

        let err: StoreError = InvariantViolation::ParentCycle(RegionId(3)).into();
        assert!(format!("{}", err).contains("cycle"));

        let err: StoreError = FlagError::UnknownFlag("x".to_string()).into();
        assert!(matches!(err, StoreError::Flag(_)));
    }
}
