//! The region store
//!
//! The store is the spatial index and the single authority over every
//! structural invariant between regions: sibling non-overlap, child
//! containment, nesting depth, name uniqueness, and the claim-block
//! charge of every footprint. All security-relevant reads and all
//! mutations run under one store-wide lock; mutations validate
//! everything first and only then apply, so a returned error always
//! means nothing changed.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use freehold_core::{
    BlockPos, Cuboid, Direction, Owner, PlayerId, TrustLevel, WorldId, walk_segment,
};
use freehold_flags::{FlagContainer, FlagError, FlagRegistry, FlagValue, flag_allows, resolve_flag};

use crate::config::{ExpiredRegionPolicy, StoreConfig};
use crate::economy::BlockLedger;
use crate::error::{
    InvariantViolation, NotFoundError, PermissionError, StoreResult, ValidationError,
};
use crate::region::{Region, RegionId};
use crate::session::SessionRegistry;

/// The key the trust table lives under in a region's flag container
const TRUST_FLAG: &str = "trust";
/// The state flag that lets two regions share blocks
const OVERLAP_FLAG: &str = "allow-overlap";

/// Parameters of one region creation
///
/// Built with [`CreateRequest::claim`] for ordinary player claims or
/// [`CreateRequest::server`] for administrative regions, then refined
/// with the chained setters.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Acting player; `None` is the system itself
    pub initiator: Option<PlayerId>,
    pub world: WorldId,
    pub bounds: Cuboid,
    pub owner: Owner,
    /// Parent region for a subdivision
    pub parent: Option<RegionId>,
    pub priority: i32,
    pub name: Option<String>,
    /// Opt into overlapping regions that themselves allow it
    pub allow_overlap: bool,
    /// Skip the claim-block debit (administrative grants)
    pub uncharged: bool,
}

impl CreateRequest {
    /// An ordinary claim: the initiator pays for and owns the region
    pub fn claim(initiator: PlayerId, world: WorldId, bounds: Cuboid) -> Self {
        Self {
            owner: Owner::Player(initiator.clone()),
            initiator: Some(initiator),
            world,
            bounds,
            parent: None,
            priority: 0,
            name: None,
            allow_overlap: false,
            uncharged: false,
        }
    }

    /// A server-owned administrative region: never charged, never expires
    pub fn server(world: WorldId, bounds: Cuboid) -> Self {
        Self {
            initiator: None,
            world,
            bounds,
            owner: Owner::Server,
            parent: None,
            priority: 0,
            name: None,
            allow_overlap: false,
            uncharged: true,
        }
    }

    pub fn subdivision_of(mut self, parent: RegionId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allow the new region to overlap regions that themselves have
    /// `allow-overlap` set
    pub fn overlapping(mut self) -> Self {
        self.allow_overlap = true;
        self
    }

    /// Waive the claim-block charge (administrative grants)
    pub fn uncharged(mut self) -> Self {
        self.uncharged = true;
        self
    }
}

/// Addressee of a trust edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSubject {
    Player(PlayerId),
    /// Everyone without an explicit per-player entry
    Public,
}

/// Point-in-time flag resolution at one position
///
/// Holds copies of the winning region's container chain (nearest first)
/// with the world default at the end, so resolution needs no store
/// lock. There is never "no policy": with no region at the point the
/// chain is just the world default, and a key missing everywhere falls
/// back to the registry default.
#[derive(Debug, Clone)]
pub struct EffectiveFlags<'a> {
    registry: &'a FlagRegistry,
    chain: Vec<FlagContainer>,
    region: Option<RegionId>,
}

impl EffectiveFlags<'_> {
    /// The region whose container heads the chain, if any
    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Resolve a flag value through the chain
    pub fn resolve(&self, key: &str) -> Result<&FlagValue, FlagError> {
        resolve_flag(self.chain.iter(), self.registry, key)
    }

    /// Resolve a state flag to its allow/deny answer
    pub fn allows(&self, key: &str) -> Result<bool, FlagError> {
        flag_allows(self.chain.iter(), self.registry, key)
    }
}

/// What one expiration sweep did
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Regions removed, children before parents
    pub deleted: Vec<RegionId>,
    /// Claim blocks refunded to owners of deleted regions
    pub refunded: u64,
    /// Expired regions left standing as eligible for stealing
    pub stealable: Vec<RegionId>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.stealable.is_empty()
    }
}

/// One world's slice of the index
#[derive(Debug, Default)]
struct WorldRegions {
    regions: BTreeMap<RegionId, Region>,
    /// World-wide explicit defaults, the terminal fallback of every chain
    defaults: FlagContainer,
}

impl WorldRegions {
    /// The region and its ancestors, nearest first
    ///
    /// Iterative, with a cycle guard and the configured depth bound.
    fn chain(&self, id: RegionId, limit: usize) -> StoreResult<Vec<&Region>> {
        let mut chain: Vec<&Region> = Vec::new();
        let mut current = id;
        loop {
            let region = match self.regions.get(&current) {
                Some(region) => region,
                None => match chain.last() {
                    None => return Err(NotFoundError::Region(current).into()),
                    Some(child) => {
                        return Err(InvariantViolation::MissingParent {
                            child: child.id,
                            parent: current,
                        }
                        .into());
                    }
                },
            };
            chain.push(region);
            match region.parent {
                None => return Ok(chain),
                Some(parent_id) => {
                    if chain.iter().any(|r| r.id == parent_id) {
                        return Err(InvariantViolation::ParentCycle(id).into());
                    }
                    if chain.len() >= limit {
                        return Err(InvariantViolation::ParentChainTooDeep(id).into());
                    }
                    current = parent_id;
                }
            }
        }
    }

    /// Parent-chain length including the region itself (1 = top level)
    ///
    /// Tolerant of broken links: the walk stops at a missing parent or
    /// once it has taken more steps than there are regions.
    fn depth(&self, region: &Region) -> usize {
        let mut depth = 1;
        let mut current = region.parent;
        while let Some(parent_id) = current {
            if depth > self.regions.len() {
                break;
            }
            match self.regions.get(&parent_id) {
                Some(parent) => {
                    depth += 1;
                    current = parent.parent;
                }
                None => break,
            }
        }
        depth
    }

    /// Ordering key at a point: deeper nesting beats priority beats recency
    fn rank(&self, region: &Region) -> (usize, i32, u64) {
        (self.depth(region), region.priority, region.id.0)
    }

    /// The single deciding region at a point, if any
    fn winner_at(&self, pos: BlockPos, column: bool) -> Option<&Region> {
        let mut best: Option<((usize, i32, u64), &Region)> = None;
        for region in self.regions.values() {
            let hit = if column {
                region.contains_column(pos)
            } else {
                region.contains(pos)
            };
            if !hit {
                continue;
            }
            let key = self.rank(region);
            if best.as_ref().is_none_or(|(top, _)| key > *top) {
                best = Some((key, region));
            }
        }
        best.map(|(_, region)| region)
    }

    /// Regions sharing a parent link, one id optionally excluded
    fn siblings(
        &self,
        parent: Option<RegionId>,
        exclude: Option<RegionId>,
    ) -> impl Iterator<Item = &Region> {
        self.regions
            .values()
            .filter(move |r| r.parent == parent && Some(r.id) != exclude)
    }

    /// Whether the region resolves `allow-overlap` to allow
    fn overlap_allowed(&self, region: &Region, registry: &FlagRegistry, limit: usize) -> bool {
        let chain = match self.chain(region.id, limit) {
            Ok(chain) => chain,
            Err(_) => return false,
        };
        let containers = chain
            .iter()
            .map(|r| &r.flags)
            .chain(std::iter::once(&self.defaults));
        flag_allows(containers, registry, OVERLAP_FLAG).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    worlds: BTreeMap<WorldId, WorldRegions>,
    /// Highest id issued so far; ids are never reused
    last_id: u64,
}

impl StoreState {
    fn issue_id(&mut self) -> RegionId {
        self.last_id += 1;
        RegionId(self.last_id)
    }

    fn world_containing(&self, id: RegionId) -> StoreResult<&WorldRegions> {
        self.worlds
            .values()
            .find(|wr| wr.regions.contains_key(&id))
            .ok_or_else(|| NotFoundError::Region(id).into())
    }

    fn world_containing_mut(&mut self, id: RegionId) -> StoreResult<&mut WorldRegions> {
        let world = self
            .worlds
            .iter()
            .find_map(|(world, wr)| wr.regions.contains_key(&id).then(|| world.clone()))
            .ok_or(NotFoundError::Region(id))?;
        match self.worlds.get_mut(&world) {
            Some(wr) => Ok(wr),
            None => Err(NotFoundError::Region(id).into()),
        }
    }
}

/// The region store
///
/// Owns every region of every world, the per-world flag defaults, the
/// claim-block ledger, and the session registry. One instance lives for
/// the whole process; the periodic tasks and the snapshot layer borrow
/// it.
pub struct RegionStore {
    state: RwLock<StoreState>,
    registry: FlagRegistry,
    ledger: BlockLedger,
    sessions: SessionRegistry,
    config: StoreConfig,
}

impl RegionStore {
    /// A store over the built-in flag catalog
    pub fn new(config: StoreConfig) -> Self {
        Self::with_registry(FlagRegistry::builtin(), config)
    }

    /// A store over a caller-assembled flag catalog
    pub fn with_registry(registry: FlagRegistry, config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            registry,
            ledger: BlockLedger::new(config.accrual.clone()),
            sessions: SessionRegistry::new(),
            config,
        }
    }

    pub fn registry(&self) -> &FlagRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &BlockLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // Poisoning is recovered: mutations are validate-then-apply, so the
    // state behind a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- queries ----

    /// Every region containing the point, the winner first
    pub fn regions_at(&self, world: &WorldId, pos: BlockPos) -> Vec<Region> {
        let state = self.read();
        let Some(wr) = state.worlds.get(world) else {
            return Vec::new();
        };
        let mut hits: Vec<_> = wr
            .regions
            .values()
            .filter(|r| r.contains(pos))
            .map(|r| (wr.rank(r), r))
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().map(|(_, r)| r.clone()).collect()
    }

    /// The region that decides policy at the point
    pub fn winning_region_at(&self, world: &WorldId, pos: BlockPos) -> Option<Region> {
        let state = self.read();
        state
            .worlds
            .get(world)
            .and_then(|wr| wr.winner_at(pos, false))
            .cloned()
    }

    /// The deciding region for the claim footprint, any height
    pub fn winning_region_at_column(&self, world: &WorldId, pos: BlockPos) -> Option<Region> {
        let state = self.read();
        state
            .worlds
            .get(world)
            .and_then(|wr| wr.winner_at(pos, true))
            .cloned()
    }

    /// The flag policy in force at a point
    ///
    /// The chain is the winning region and its ancestors nearest-first,
    /// then the world default. Broken ancestry degrades to the region's
    /// own container rather than failing a security read.
    pub fn effective_flags(&self, world: &WorldId, pos: BlockPos) -> EffectiveFlags<'_> {
        let state = self.read();
        let mut chain = Vec::new();
        let mut region = None;
        if let Some(wr) = state.worlds.get(world) {
            if let Some(winner) = wr.winner_at(pos, false) {
                region = Some(winner.id);
                match wr.chain(winner.id, self.config.max_nesting_depth) {
                    Ok(regions) => chain.extend(regions.iter().map(|r| r.flags.clone())),
                    Err(error) => {
                        warn!(region = %winner.id, %error, "broken ancestry during flag resolution");
                        chain.push(winner.flags.clone());
                    }
                }
            }
            chain.push(wr.defaults.clone());
        }
        EffectiveFlags {
            registry: &self.registry,
            chain,
            region,
        }
    }

    /// Whether the deciding region changes anywhere along the segment
    pub fn crosses_regions(&self, world: &WorldId, a: BlockPos, b: BlockPos) -> bool {
        let state = self.read();
        let Some(wr) = state.worlds.get(world) else {
            return false;
        };
        let mut winners = walk_segment(a, b)
            .into_iter()
            .map(|cell| wr.winner_at(cell, false).map(|r| r.id));
        match winners.next() {
            Some(first) => winners.any(|w| w != first),
            None => false,
        }
    }

    pub fn region(&self, id: RegionId) -> Option<Region> {
        let state = self.read();
        state
            .worlds
            .values()
            .find_map(|wr| wr.regions.get(&id))
            .cloned()
    }

    /// Every region of one world, id order
    pub fn regions_in_world(&self, world: &WorldId) -> Vec<Region> {
        let state = self.read();
        state
            .worlds
            .get(world)
            .map(|wr| wr.regions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every region the player owns, across worlds
    pub fn regions_by_owner(&self, player: &PlayerId) -> Vec<Region> {
        let state = self.read();
        state
            .worlds
            .values()
            .flat_map(|wr| wr.regions.values())
            .filter(|r| r.is_owner(player))
            .cloned()
            .collect()
    }

    /// Look up one of a player's regions by its name
    pub fn region_by_name(
        &self,
        world: &WorldId,
        owner: &PlayerId,
        name: &str,
    ) -> StoreResult<Region> {
        let state = self.read();
        let wr = state
            .worlds
            .get(world)
            .ok_or_else(|| NotFoundError::World(world.to_string()))?;
        wr.regions
            .values()
            .find(|r| r.is_owner(owner) && r.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| NotFoundError::Name(name.to_string()).into())
    }

    /// Worlds that hold at least one region or world default
    pub fn worlds(&self) -> Vec<WorldId> {
        self.read().worlds.keys().cloned().collect()
    }

    pub fn region_count(&self) -> usize {
        self.read().worlds.values().map(|wr| wr.regions.len()).sum()
    }

    pub fn region_count_in(&self, world: &WorldId) -> usize {
        self.read()
            .worlds
            .get(world)
            .map(|wr| wr.regions.len())
            .unwrap_or(0)
    }

    /// Copy of a world's default flag container
    pub fn world_defaults(&self, world: &WorldId) -> FlagContainer {
        self.read()
            .worlds
            .get(world)
            .map(|wr| wr.defaults.clone())
            .unwrap_or_default()
    }

    // ---- trust ----

    /// Whether the player may act at the given level on the region
    ///
    /// `None` is the system itself and always passes, as do active
    /// ignore-trust sessions and holders of the region or any ancestor.
    pub fn has_trust(
        &self,
        player: Option<&PlayerId>,
        required: TrustLevel,
        region: RegionId,
    ) -> StoreResult<bool> {
        let state = self.read();
        let wr = state.world_containing(region)?;
        Ok(self
            .resolved_trust(wr, player, region)?
            .is_at_least(required))
    }

    /// The effective trust level; the nearest explicit setting wins
    fn resolved_trust(
        &self,
        wr: &WorldRegions,
        player: Option<&PlayerId>,
        region: RegionId,
    ) -> StoreResult<TrustLevel> {
        let chain = wr.chain(region, self.config.max_nesting_depth)?;
        let Some(player) = player else {
            return Ok(TrustLevel::Management);
        };
        if self.sessions.ignores_trust(player) || chain.iter().any(|r| r.is_held_by(player)) {
            return Ok(TrustLevel::Management);
        }
        if let Some(level) = chain.iter().find_map(|r| r.trust_entry(player)) {
            return Ok(level);
        }
        if let Some(level) = chain.iter().find_map(|r| r.public_trust()) {
            return Ok(level);
        }
        Ok(TrustLevel::None)
    }

    // ---- sessions and activity ----

    /// Record a player login: session freshness plus region activity
    ///
    /// Refreshes `last_activity` on every region where the player is a
    /// holder or resolves to at least container trust. Returns how many
    /// regions were refreshed.
    pub fn record_login(&self, player: &PlayerId) -> usize {
        let now = Utc::now();
        self.sessions.login(player, now);
        let mut state = self.write();
        let mut refreshed = 0;
        for wr in state.worlds.values_mut() {
            let mut qualifying: Vec<RegionId> = Vec::new();
            for region in wr.regions.values() {
                let qualifies = region.is_held_by(player)
                    || matches!(
                        self.resolved_trust(wr, Some(player), region.id),
                        Ok(level) if level.is_at_least(TrustLevel::Container)
                    );
                if qualifies {
                    qualifying.push(region.id);
                }
            }
            for id in qualifying {
                if let Some(region) = wr.regions.get_mut(&id) {
                    region.last_activity = now;
                    refreshed += 1;
                }
            }
        }
        debug!(player = %player, refreshed, "login recorded");
        refreshed
    }

    /// Record a player logout, dropping session overrides
    pub fn record_logout(&self, player: &PlayerId) {
        self.sessions.logout(player, Utc::now());
    }

    // ---- mutations ----

    /// Create a region after validating everything
    ///
    /// Validation order: world claimability, size minimums, parent
    /// containment/depth/permission, name uniqueness, sibling overlap,
    /// and the claim-block debit last.
    #[instrument(skip(self, request), fields(world = %request.world, owner = %request.owner))]
    pub fn try_create(&self, request: CreateRequest) -> StoreResult<Region> {
        let mut state = self.write();

        // World claimability binds player claims; system callers pass
        if request.initiator.is_some() && self.config.unclaimable_worlds.contains(&request.world) {
            return Err(ValidationError::WorldNotClaimable(request.world.to_string()).into());
        }

        let area = request.bounds.footprint_area();
        if area < self.config.min_claim_area {
            return Err(ValidationError::BelowMinimumArea {
                area,
                minimum: self.config.min_claim_area,
            }
            .into());
        }

        let existing = state.worlds.get(&request.world);

        if let Some(parent_id) = request.parent {
            let wr = existing.ok_or(NotFoundError::Region(parent_id))?;
            let parent = wr
                .regions
                .get(&parent_id)
                .ok_or(NotFoundError::Region(parent_id))?;
            let depth = wr.chain(parent_id, self.config.max_nesting_depth)?.len();
            if depth >= self.config.max_nesting_depth {
                return Err(ValidationError::TooDeep(self.config.max_nesting_depth).into());
            }
            if !parent.bounds.encloses(&request.bounds) {
                return Err(ValidationError::OutsideParent(parent_id).into());
            }
            let height = request.bounds.height();
            if height < self.config.min_subdivision_height {
                return Err(ValidationError::BelowMinimumHeight {
                    height,
                    minimum: self.config.min_subdivision_height,
                }
                .into());
            }
            // Subdividing needs holder rights or management trust on the parent
            if let Some(initiator) = &request.initiator {
                if !self.sessions.is_admin(initiator)
                    && !self
                        .resolved_trust(wr, Some(initiator), parent_id)?
                        .is_at_least(TrustLevel::Management)
                {
                    return Err(PermissionError::TrustRequired(TrustLevel::Management).into());
                }
            }
        }

        if let (Some(name), Some(wr)) = (&request.name, existing) {
            let clash = wr
                .regions
                .values()
                .any(|r| r.owner == request.owner && r.name.as_deref() == Some(name.as_str()));
            if clash {
                return Err(ValidationError::NameTaken(name.clone()).into());
            }
        }

        if let Some(wr) = existing {
            for sibling in wr.siblings(request.parent, None) {
                if !sibling.bounds.intersects(&request.bounds) {
                    continue;
                }
                let escape = request.allow_overlap
                    && wr.overlap_allowed(sibling, &self.registry, self.config.max_nesting_depth);
                if !escape {
                    return Err(ValidationError::Overlaps(sibling.id).into());
                }
            }
        }

        // All checks passed; the debit is the last fallible step
        if let Owner::Player(owner) = &request.owner {
            if !request.uncharged {
                self.ledger.try_debit(owner, area)?;
            }
        }

        let id = state.issue_id();
        let now = Utc::now();
        let mut flags = FlagContainer::new();
        if request.allow_overlap
            && flags
                .set(&self.registry, OVERLAP_FLAG, FlagValue::State(true))
                .is_err()
        {
            warn!(region = %id, "allow-overlap is not in the flag catalog");
        }

        let region = Region {
            id,
            world: request.world.clone(),
            bounds: request.bounds,
            priority: request.priority,
            owner: request.owner,
            co_owners: Vec::new(),
            parent: request.parent,
            children: Vec::new(),
            name: request.name,
            flags,
            created_at: now,
            last_activity: now,
            transferred_at: None,
        };

        let wr = state.worlds.entry(request.world).or_default();
        if let Some(parent_id) = request.parent {
            if let Some(parent) = wr.regions.get_mut(&parent_id) {
                parent.children.push(id);
            }
        }
        wr.regions.insert(id, region.clone());

        info!(
            region = %id,
            area,
            parent = ?request.parent,
            "region created"
        );
        Ok(region)
    }

    /// Grow one face outward by `amount` blocks
    pub fn try_expand(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        direction: Direction,
        amount: u32,
    ) -> StoreResult<Region> {
        self.resize(initiator, id, direction, i64::from(amount))
    }

    /// Pull one face inward by `amount` blocks
    pub fn try_retract(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        direction: Direction,
        amount: u32,
    ) -> StoreResult<Region> {
        self.resize(initiator, id, direction, -i64::from(amount))
    }

    /// One-face resize; failure leaves the region untouched
    #[instrument(skip(self, initiator))]
    fn resize(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        direction: Direction,
        amount: i64,
    ) -> StoreResult<Region> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        self.require_owner(region, initiator)?;

        let amount = i32::try_from(amount).map_err(|_| ValidationError::InvalidBounds)?;
        let new_bounds = region
            .bounds
            .grown(direction, amount)
            .ok_or(ValidationError::InvalidBounds)?;

        let area = new_bounds.footprint_area();
        if area < self.config.min_claim_area {
            return Err(ValidationError::BelowMinimumArea {
                area,
                minimum: self.config.min_claim_area,
            }
            .into());
        }
        if region.is_subdivision() {
            let height = new_bounds.height();
            if height < self.config.min_subdivision_height {
                return Err(ValidationError::BelowMinimumHeight {
                    height,
                    minimum: self.config.min_subdivision_height,
                }
                .into());
            }
        }

        // Containment in both directions
        if let Some(parent_id) = region.parent {
            let parent = wr
                .regions
                .get(&parent_id)
                .ok_or(InvariantViolation::MissingParent {
                    child: id,
                    parent: parent_id,
                })?;
            if !parent.bounds.encloses(&new_bounds) {
                return Err(ValidationError::OutsideParent(parent_id).into());
            }
        }
        for child_id in &region.children {
            if let Some(child) = wr.regions.get(child_id) {
                if !new_bounds.encloses(&child.bounds) {
                    return Err(ValidationError::ChildOutsideBounds(*child_id).into());
                }
            }
        }

        // Sibling overlap with the mutual escape hatch
        let this_allows = wr.overlap_allowed(region, &self.registry, self.config.max_nesting_depth);
        for sibling in wr.siblings(region.parent, Some(id)) {
            if !sibling.bounds.intersects(&new_bounds) {
                continue;
            }
            if !(this_allows
                && wr.overlap_allowed(sibling, &self.registry, self.config.max_nesting_depth))
            {
                return Err(ValidationError::Overlaps(sibling.id).into());
            }
        }

        // Ledger delta, the last fallible step
        let old_area = region.bounds.footprint_area();
        if let Owner::Player(owner) = region.owner.clone() {
            if area > old_area {
                self.ledger.try_debit(&owner, area - old_area)?;
            } else if area < old_area {
                self.ledger.deposit(&owner, old_area - area);
            }
        }

        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        region.bounds = new_bounds;
        let updated = region.clone();
        info!(region = %id, %direction, amount, area, "region resized");
        Ok(updated)
    }

    /// Hand a region to a new holder
    ///
    /// Clears co-owners, optionally keeps the trust table, marks the
    /// transfer instant, and never touches the ledger.
    pub fn try_transfer(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        new_owner: Owner,
        keep_trust: bool,
    ) -> StoreResult<Region> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        self.require_owner(region, initiator)?;

        // Name uniqueness must hold under the new owner too
        if let Some(name) = &region.name {
            let clash = wr.regions.values().any(|r| {
                r.id != id && r.owner == new_owner && r.name.as_deref() == Some(name.as_str())
            });
            if clash {
                return Err(ValidationError::NameTaken(name.clone()).into());
            }
        }

        let now = Utc::now();
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        let previous = region.owner.clone();
        region.owner = new_owner;
        region.co_owners.clear();
        if !keep_trust {
            region.flags.remove(TRUST_FLAG);
        }
        region.transferred_at = Some(now);
        region.last_activity = now;
        let updated = region.clone();
        info!(region = %id, from = %previous, to = %updated.owner, keep_trust, "region transferred");
        Ok(updated)
    }

    /// Delete a region, cascading through its subtree when asked
    ///
    /// Returns the removed regions, children before parents. With
    /// `refund`, each player-owned removal credits its footprint back
    /// to its owner.
    pub fn try_delete(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        cascade: bool,
        refund: bool,
    ) -> StoreResult<Vec<Region>> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        self.require_owner(region, initiator)?;
        if !cascade && !region.children.is_empty() {
            return Err(ValidationError::HasChildren(region.children.len()).into());
        }

        let removed = Self::remove_subtree(wr, id);
        let refunded = if refund { self.refund_removed(&removed) } else { 0 };
        info!(region = %id, removed = removed.len(), refunded, "region deleted");
        Ok(removed)
    }

    /// Administrative bulk delete: every region matching the predicate,
    /// each with its whole subtree
    pub fn delete_where<P>(&self, predicate: P, refund: bool) -> Vec<Region>
    where
        P: Fn(&Region) -> bool,
    {
        let mut state = self.write();
        let mut removed = Vec::new();
        for wr in state.worlds.values_mut() {
            let matched: Vec<RegionId> = wr
                .regions
                .values()
                .filter(|r| predicate(r))
                .map(|r| r.id)
                .collect();
            for id in matched {
                // A match may already be gone as part of an earlier subtree
                if wr.regions.contains_key(&id) {
                    removed.extend(Self::remove_subtree(wr, id));
                }
            }
        }
        let refunded = if refund { self.refund_removed(&removed) } else { 0 };
        if !removed.is_empty() {
            info!(removed = removed.len(), refunded, "bulk delete");
        }
        removed
    }

    /// Take over an expired region under the steal policy
    #[instrument(skip(self, initiator), fields(initiator = %initiator))]
    pub fn try_steal(&self, initiator: &PlayerId, id: RegionId) -> StoreResult<Region> {
        if self.config.expiration.policy != ExpiredRegionPolicy::MarkStealable {
            return Err(ValidationError::StealDisabled.into());
        }
        let now = Utc::now();
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        if self.in_transfer_grace(region, now) {
            return Err(ValidationError::RecentlyTransferred.into());
        }
        if !self.is_expired(region, now) {
            return Err(ValidationError::NotExpired.into());
        }
        let new_owner = Owner::Player(initiator.clone());
        // Name uniqueness must hold under the thief too
        if let Some(name) = &region.name {
            let clash = wr.regions.values().any(|r| {
                r.id != id && r.owner == new_owner && r.name.as_deref() == Some(name.as_str())
            });
            if clash {
                return Err(ValidationError::NameTaken(name.clone()).into());
            }
        }
        let area = region.bounds.footprint_area();
        self.ledger.try_debit(initiator, area)?;

        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        let previous = region.owner.clone();
        region.owner = new_owner;
        region.co_owners.clear();
        region.flags.remove(TRUST_FLAG);
        region.transferred_at = Some(now);
        region.last_activity = now;
        let updated = region.clone();
        info!(region = %id, from = %previous, area, "region stolen");
        Ok(updated)
    }

    // ---- expiration ----

    /// Whether the region has expired: player-owned, inactive past the
    /// threshold, and outside the post-transfer grace window
    pub fn is_expired(&self, region: &Region, now: DateTime<Utc>) -> bool {
        if !matches!(region.owner, Owner::Player(_)) {
            return false;
        }
        if self.in_transfer_grace(region, now) {
            return false;
        }
        match chrono::Duration::from_std(self.config.expiration.inactivity_threshold) {
            Ok(threshold) => now.signed_duration_since(region.last_activity) > threshold,
            Err(_) => false,
        }
    }

    fn in_transfer_grace(&self, region: &Region, now: DateTime<Utc>) -> bool {
        let Some(transferred_at) = region.transferred_at else {
            return false;
        };
        match chrono::Duration::from_std(self.config.expiration.transfer_grace) {
            Ok(grace) => now.signed_duration_since(transferred_at) <= grace,
            Err(_) => true,
        }
    }

    /// One expiration pass over every world, honoring the configured policy
    pub fn sweep_expired(&self) -> SweepOutcome {
        let now = Utc::now();
        let policy = self.config.expiration.policy;
        let mut state = self.write();
        let mut outcome = SweepOutcome::default();
        for wr in state.worlds.values_mut() {
            let expired: Vec<RegionId> = wr
                .regions
                .values()
                .filter(|r| self.is_expired(r, now))
                .map(|r| r.id)
                .collect();
            for id in expired {
                match policy {
                    ExpiredRegionPolicy::MarkStealable => outcome.stealable.push(id),
                    ExpiredRegionPolicy::Delete | ExpiredRegionPolicy::DeleteAndRefund => {
                        // May already be gone as part of an expired ancestor
                        if !wr.regions.contains_key(&id) {
                            continue;
                        }
                        let removed = Self::remove_subtree(wr, id);
                        if policy == ExpiredRegionPolicy::DeleteAndRefund {
                            outcome.refunded += self.refund_removed(&removed);
                        }
                        outcome.deleted.extend(removed.iter().map(|r| r.id));
                    }
                }
            }
        }
        if !outcome.is_empty() {
            info!(
                deleted = outcome.deleted.len(),
                stealable = outcome.stealable.len(),
                refunded = outcome.refunded,
                "expiration sweep"
            );
        }
        outcome
    }

    // ---- flags ----

    /// Set a flag on a region
    ///
    /// Player-toggleable flags need management trust; the rest are
    /// administrative.
    pub fn set_flag(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        key: &str,
        value: FlagValue,
    ) -> StoreResult<()> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        self.require_flag_edit(wr, initiator, id, key)?;
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        region.flags.set(&self.registry, key, value)?;
        debug!(region = %id, flag = key, "flag set");
        Ok(())
    }

    /// Parse the canonical string form, then set
    pub fn set_flag_parsed(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        key: &str,
        input: &str,
    ) -> StoreResult<()> {
        let value = self.registry.parse_value(key, input)?;
        self.set_flag(initiator, id, key, value)
    }

    /// Remove a region's explicit flag entry
    pub fn clear_flag(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        key: &str,
    ) -> StoreResult<Option<FlagValue>> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        self.require_flag_edit(wr, initiator, id, key)?;
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        let removed = region.flags.remove(key);
        debug!(region = %id, flag = key, removed = removed.is_some(), "flag cleared");
        Ok(removed)
    }

    /// Set a world-default flag (administrative)
    pub fn set_world_flag(
        &self,
        initiator: Option<&PlayerId>,
        world: &WorldId,
        key: &str,
        value: FlagValue,
    ) -> StoreResult<()> {
        self.require_admin(initiator)?;
        self.registry.check_type(key, &value)?;
        let mut state = self.write();
        let wr = state.worlds.entry(world.clone()).or_default();
        wr.defaults.set(&self.registry, key, value)?;
        debug!(%world, flag = key, "world default set");
        Ok(())
    }

    /// Remove a world-default flag entry (administrative)
    pub fn clear_world_flag(
        &self,
        initiator: Option<&PlayerId>,
        world: &WorldId,
        key: &str,
    ) -> StoreResult<Option<FlagValue>> {
        self.require_admin(initiator)?;
        let mut state = self.write();
        let Some(wr) = state.worlds.get_mut(world) else {
            return Err(NotFoundError::World(world.to_string()).into());
        };
        let removed = wr.defaults.remove(key);
        debug!(%world, flag = key, removed = removed.is_some(), "world default cleared");
        Ok(removed)
    }

    // ---- trust edits ----

    /// Grant or change a trust entry
    ///
    /// Owners, administrators, and management trustees may edit trust;
    /// co-owners may not.
    pub fn set_trust(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        subject: TrustSubject,
        level: TrustLevel,
    ) -> StoreResult<()> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        self.require_trust_edit(wr, initiator, id)?;
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        let mut table = region.trust_table().cloned().unwrap_or_default();
        match subject {
            TrustSubject::Player(player) => table.set_player(player, level),
            TrustSubject::Public => table.set_public(Some(level)),
        }
        region
            .flags
            .set(&self.registry, TRUST_FLAG, FlagValue::Trust(table))?;
        debug!(region = %id, %level, "trust set");
        Ok(())
    }

    /// Drop a trust entry; clearing `Public` returns it to inheriting
    pub fn clear_trust(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        subject: TrustSubject,
    ) -> StoreResult<()> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        self.require_trust_edit(wr, initiator, id)?;
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        let mut table = region.trust_table().cloned().unwrap_or_default();
        match subject {
            TrustSubject::Player(player) => {
                table.remove_player(&player);
            }
            TrustSubject::Public => table.set_public(None),
        }
        if table.is_empty() {
            region.flags.remove(TRUST_FLAG);
        } else {
            region
                .flags
                .set(&self.registry, TRUST_FLAG, FlagValue::Trust(table))?;
        }
        debug!(region = %id, "trust cleared");
        Ok(())
    }

    // ---- co-owners and naming ----

    /// Add a co-owner; the owner cannot be one, duplicates are ignored
    pub fn add_co_owner(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        player: PlayerId,
    ) -> StoreResult<bool> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        self.require_owner(region, initiator)?;
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        if region.is_owner(&player) || region.is_co_owner(&player) {
            return Ok(false);
        }
        region.co_owners.push(player);
        debug!(region = %id, "co-owner added");
        Ok(true)
    }

    /// Remove a co-owner; `false` when there was no such entry
    pub fn remove_co_owner(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        player: &PlayerId,
    ) -> StoreResult<bool> {
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        self.require_owner(region, initiator)?;
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        let before = region.co_owners.len();
        region.co_owners.retain(|p| p != player);
        Ok(region.co_owners.len() != before)
    }

    /// Name or rename a region; `None` or an empty string clears
    pub fn set_name(
        &self,
        initiator: Option<&PlayerId>,
        id: RegionId,
        name: Option<String>,
    ) -> StoreResult<()> {
        let name = name.filter(|n| !n.is_empty());
        let mut state = self.write();
        let wr = state.world_containing_mut(id)?;
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        self.require_owner(region, initiator)?;
        if let Some(name) = &name {
            let owner = region.owner.clone();
            let clash = wr.regions.values().any(|r| {
                r.id != id && r.owner == owner && r.name.as_deref() == Some(name.as_str())
            });
            if clash {
                return Err(ValidationError::NameTaken(name.clone()).into());
            }
        }
        let region = match wr.regions.get_mut(&id) {
            Some(region) => region,
            None => return Err(NotFoundError::Region(id).into()),
        };
        region.name = name;
        Ok(())
    }

    // ---- permission buckets ----

    /// Owner-bucket permission: the owner, an administrator, or the system
    ///
    /// Co-owners are not in this bucket: resize, delete, transfer,
    /// trust edits, and renames stay with the owner.
    fn require_owner(&self, region: &Region, initiator: Option<&PlayerId>) -> StoreResult<()> {
        match initiator {
            None => Ok(()),
            Some(player) if self.sessions.is_admin(player) => Ok(()),
            Some(player) if region.is_owner(player) => Ok(()),
            Some(player) if region.is_co_owner(player) => {
                Err(PermissionError::CoOwnerRestricted.into())
            }
            Some(_) => Err(PermissionError::NotOwner.into()),
        }
    }

    fn require_admin(&self, initiator: Option<&PlayerId>) -> StoreResult<()> {
        match initiator {
            None => Ok(()),
            Some(player) if self.sessions.is_admin(player) => Ok(()),
            Some(_) => Err(PermissionError::AdminRequired.into()),
        }
    }

    fn require_flag_edit(
        &self,
        wr: &WorldRegions,
        initiator: Option<&PlayerId>,
        id: RegionId,
        key: &str,
    ) -> StoreResult<()> {
        let toggleable = self.registry.descriptor(key)?.player_toggleable();
        match initiator {
            None => Ok(()),
            Some(player) if self.sessions.is_admin(player) => Ok(()),
            Some(_) if !toggleable => Err(PermissionError::FlagNotToggleable.into()),
            Some(player) => {
                if self
                    .resolved_trust(wr, Some(player), id)?
                    .is_at_least(TrustLevel::Management)
                {
                    Ok(())
                } else {
                    Err(PermissionError::TrustRequired(TrustLevel::Management).into())
                }
            }
        }
    }

    fn require_trust_edit(
        &self,
        wr: &WorldRegions,
        initiator: Option<&PlayerId>,
        id: RegionId,
    ) -> StoreResult<()> {
        let region = wr.regions.get(&id).ok_or(NotFoundError::Region(id))?;
        match initiator {
            None => Ok(()),
            Some(player) if self.sessions.is_admin(player) => Ok(()),
            Some(player) if region.is_owner(player) => Ok(()),
            Some(player) if region.is_co_owner(player) => {
                Err(PermissionError::CoOwnerRestricted.into())
            }
            Some(player) => {
                if self
                    .resolved_trust(wr, Some(player), id)?
                    .is_at_least(TrustLevel::Management)
                {
                    Ok(())
                } else {
                    Err(PermissionError::TrustRequired(TrustLevel::Management).into())
                }
            }
        }
    }

    // ---- shared removal plumbing ----

    /// Remove a region and its descendants, children before parents
    fn remove_subtree(wr: &mut WorldRegions, root: RegionId) -> Vec<Region> {
        // Collect the subtree breadth-first
        let mut order = vec![root];
        let mut index = 0;
        while let Some(&id) = order.get(index) {
            if let Some(region) = wr.regions.get(&id) {
                order.extend(region.children.iter().copied());
            }
            index += 1;
        }

        // Unlink the root from its parent
        if let Some(parent_id) = wr.regions.get(&root).and_then(|r| r.parent) {
            if let Some(parent) = wr.regions.get_mut(&parent_id) {
                parent.children.retain(|child| *child != root);
            }
        }

        let mut removed = Vec::with_capacity(order.len());
        for id in order.into_iter().rev() {
            if let Some(region) = wr.regions.remove(&id) {
                removed.push(region);
            }
        }
        removed
    }

    fn refund_removed(&self, removed: &[Region]) -> u64 {
        let mut total = 0;
        for region in removed {
            if let Owner::Player(owner) = &region.owner {
                let area = region.bounds.footprint_area();
                self.ledger.deposit(owner, area);
                total += area;
            }
        }
        total
    }

    // ---- snapshot plumbing ----

    /// Point-in-time copy of one world for the snapshot layer
    pub(crate) fn export_world(&self, world: &WorldId) -> Option<(Vec<Region>, FlagContainer, u64)> {
        let state = self.read();
        state.worlds.get(world).map(|wr| {
            (
                wr.regions.values().cloned().collect(),
                wr.defaults.clone(),
                state.last_id,
            )
        })
    }

    /// Replace one world's slice from a loaded snapshot
    ///
    /// Regions arrive with validated parent links; children lists are
    /// derived here. The id counter only ever moves forward.
    pub(crate) fn import_world(
        &self,
        world: WorldId,
        regions: Vec<Region>,
        defaults: FlagContainer,
        last_id: u64,
    ) {
        let mut state = self.write();
        let mut wr = WorldRegions {
            defaults,
            ..WorldRegions::default()
        };
        let mut links = Vec::new();
        let mut max_id = 0;
        for mut region in regions {
            region.children = Vec::new();
            region.transferred_at = None;
            max_id = max_id.max(region.id.0);
            if let Some(parent) = region.parent {
                links.push((parent, region.id));
            }
            wr.regions.insert(region.id, region);
        }
        for (parent, child) in links {
            if let Some(parent) = wr.regions.get_mut(&parent) {
                parent.children.push(child);
            }
        }
        state.last_id = state.last_id.max(last_id).max(max_id);
        state.worlds.insert(world, wr);
    }
}
