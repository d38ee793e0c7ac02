//! The region record
//!
//! A region is one claim or subdivision: a box of blocks in one world
//! with an owner, a priority, relational links to its parent and
//! children, and a flag container (which carries the trust table under
//! the `trust` key). Regions are plain records; the store owns all
//! structural invariants between them.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freehold_core::{BlockPos, Cuboid, Owner, PlayerId, TrustLevel, WorldId};
use freehold_flags::{FlagContainer, FlagValue, TrustTable};

/// Stable region identifier
///
/// Ids are issued from a store-wide counter and never reused, so a
/// higher id always means a more recently created region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RegionId(pub u64);

impl Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One claim or subdivision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub world: WorldId,
    pub bounds: Cuboid,
    /// Higher priority wins among overlapping regions at the same depth
    pub priority: i32,
    pub owner: Owner,
    /// Near-owner rights, minus resize/delete/transfer/trust edits
    pub co_owners: Vec<PlayerId>,
    /// `None` for a top-level claim
    pub parent: Option<RegionId>,
    /// Derived from the children's parent links; not persisted
    #[serde(skip)]
    pub children: Vec<RegionId>,
    /// Unique among one owner's regions per world
    pub name: Option<String>,
    pub flags: FlagContainer,
    pub created_at: DateTime<Utc>,
    /// Most recent login of the owner, a co-owner, or a >= container trustee
    pub last_activity: DateTime<Utc>,
    /// Transient marker suppressing expiry/steal right after a transfer
    #[serde(skip)]
    pub transferred_at: Option<DateTime<Utc>>,
}

impl Region {
    /// Whether the point is inside this region
    pub fn contains(&self, pos: BlockPos) -> bool {
        self.bounds.contains(pos)
    }

    /// Whether the point is inside this region's footprint at any height
    pub fn contains_column(&self, pos: BlockPos) -> bool {
        self.bounds.contains_column(pos)
    }

    /// Whether the player owns this region directly
    pub fn is_owner(&self, player: &PlayerId) -> bool {
        self.owner.is_player(player)
    }

    pub fn is_co_owner(&self, player: &PlayerId) -> bool {
        self.co_owners.contains(player)
    }

    /// Owner or co-owner
    pub fn is_held_by(&self, player: &PlayerId) -> bool {
        self.is_owner(player) || self.is_co_owner(player)
    }

    pub fn is_subdivision(&self) -> bool {
        self.parent.is_some()
    }

    /// The region's trust table, if one is set
    pub fn trust_table(&self) -> Option<&TrustTable> {
        self.flags.get("trust").and_then(FlagValue::as_trust)
    }

    /// The explicit per-player trust entry on this region
    pub fn trust_entry(&self, player: &PlayerId) -> Option<TrustLevel> {
        self.trust_table().and_then(|table| table.level_for(player))
    }

    /// The explicitly set public trust level on this region
    ///
    /// `None` means unset, which defers to the parent chain; an explicit
    /// `TrustLevel::None` is a real setting that stops inheritance.
    pub fn public_trust(&self) -> Option<TrustLevel> {
        self.trust_table().and_then(|table| table.public())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freehold_flags::FlagRegistry;

    fn make_region(owner: &str) -> Region {
        let now = Utc::now();
        Region {
            id: RegionId(1),
            world: WorldId::new("world").unwrap(),
            bounds: Cuboid::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(31, 255, 31)),
            priority: 0,
            owner: Owner::Player(PlayerId::new(owner).unwrap()),
            co_owners: Vec::new(),
            parent: None,
            children: Vec::new(),
            name: None,
            flags: FlagContainer::new(),
            created_at: now,
            last_activity: now,
            transferred_at: None,
        }
    }

    #[test]
    fn test_holder_checks() {
        let mut region = make_region("Alice");
        let alice = PlayerId::new("Alice").unwrap();
        let bob = PlayerId::new("Bob").unwrap();

        assert!(region.is_owner(&alice));
        assert!(region.is_held_by(&alice));
        assert!(!region.is_held_by(&bob));

        region.co_owners.push(bob.clone());
        assert!(region.is_held_by(&bob));
        assert!(!region.is_owner(&bob));
    }

    #[test]
    fn test_trust_views_read_the_flag() {
        let registry = FlagRegistry::builtin();
        let mut region = make_region("Alice");
        assert!(region.trust_table().is_none());
        assert_eq!(region.public_trust(), None);

        region
            .flags
            .set_parsed(&registry, "trust", "build:Bob none:public")
            .unwrap();
        let bob = PlayerId::new("Bob").unwrap();
        assert_eq!(region.trust_entry(&bob), Some(TrustLevel::Build));
        assert_eq!(region.public_trust(), Some(TrustLevel::None));
    }

    #[test]
    fn test_region_id_display() {
        assert_eq!(format!("{}", RegionId(42)), "#42");
    }
}
