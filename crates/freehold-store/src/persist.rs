//! Snapshot persistence
//!
//! One postcard-encoded snapshot file per world plus one for the claim
//! ledger. A snapshot is a point-in-time copy taken under the store's
//! read lock; encoding and file writes happen off-lock, and every file
//! lands via a temp-file rename so a crash never leaves a half-written
//! snapshot in place.
//!
//! Loads are defensive: a record referencing a missing parent or
//! participating in an ancestry cycle is quarantined rather than
//! inserted, and the rest of the world still loads.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use freehold_core::{Cuboid, Owner, PlayerId, WorldId};
use freehold_flags::{FlagContainer, FlagRegistry};

use crate::error::{InvariantViolation, NotFoundError, SnapshotError, StoreResult};
use crate::region::{Region, RegionId};
use crate::store::RegionStore;

/// Envelope format version; the first field of every snapshot file
const SNAPSHOT_VERSION: u32 = 1;

/// Extension of per-world snapshot files
const WORLD_EXTENSION: &str = "world";

/// File name of the claim-block ledger snapshot
const LEDGER_FILE: &str = "ledger.dat";

/// One region as laid out on disk
///
/// Parent references travel by id; children lists and the transient
/// transfer marker are derived or reset on load. Flags are stored in
/// their canonical string form so snapshots survive catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegionRecord {
    id: RegionId,
    bounds: Cuboid,
    priority: i32,
    owner: Owner,
    co_owners: Vec<PlayerId>,
    parent: Option<RegionId>,
    name: Option<String>,
    flags: BTreeMap<String, String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_activity: DateTime<Utc>,
}

impl RegionRecord {
    fn from_region(region: &Region) -> Self {
        Self {
            id: region.id,
            bounds: region.bounds,
            priority: region.priority,
            owner: region.owner.clone(),
            co_owners: region.co_owners.clone(),
            parent: region.parent,
            name: region.name.clone(),
            flags: region.flags.encode_map(),
            created_at: region.created_at,
            last_activity: region.last_activity,
        }
    }
}

/// On-disk envelope of one world
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorldSnapshot {
    version: u32,
    /// The world this snapshot belongs to; the file name is advisory
    world: WorldId,
    last_id: u64,
    defaults: BTreeMap<String, String>,
    regions: Vec<RegionRecord>,
}

/// On-disk envelope of the claim-block ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerSnapshot {
    version: u32,
    balances: BTreeMap<PlayerId, u64>,
}

/// A persisted region that could not be trusted on load
#[derive(Debug, Clone)]
pub struct QuarantinedRegion {
    pub world: WorldId,
    pub id: RegionId,
    pub reason: InvariantViolation,
}

/// What a full snapshot load brought back
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Worlds restored
    pub worlds: usize,
    /// Regions inserted into the store
    pub regions: usize,
    /// Records refused over broken ancestry
    pub quarantined: Vec<QuarantinedRegion>,
    /// Flag entries dropped because they no longer parse
    pub flag_issues: usize,
    /// Snapshot files skipped as unreadable
    pub failed_files: usize,
}

struct WorldLoad {
    world: WorldId,
    regions: usize,
    quarantined: Vec<QuarantinedRegion>,
    flag_issues: usize,
}

/// File-based snapshot storage for a region store
#[derive(Debug)]
pub struct SnapshotStore {
    /// Directory holding one file per world plus the ledger
    storage_path: PathBuf,
}

impl SnapshotStore {
    /// Open a snapshot directory, creating it if needed
    pub async fn new(storage_path: impl AsRef<Path>) -> StoreResult<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&storage_path)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        Ok(Self { storage_path })
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    fn world_path(&self, world: &WorldId) -> PathBuf {
        // Distinct world ids must never share a file: bytes outside the
        // safe set escape to %XX, and '%' leads an escape so it is
        // escaped as well, keeping the stem mapping one-to-one.
        let mut stem = String::with_capacity(world.as_str().len());
        for byte in world.as_str().bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => stem.push(byte as char),
                _ => stem.push_str(&format!("%{byte:02x}")),
            }
        }
        self.storage_path
            .join(format!("{}.{}", stem, WORLD_EXTENSION))
    }

    fn ledger_path(&self) -> PathBuf {
        self.storage_path.join(LEDGER_FILE)
    }

    /// Write one world's snapshot
    pub async fn save_world(&self, store: &RegionStore, world: &WorldId) -> StoreResult<()> {
        let (regions, defaults, last_id) = store
            .export_world(world)
            .ok_or_else(|| NotFoundError::World(world.to_string()))?;
        let snapshot = WorldSnapshot {
            version: SNAPSHOT_VERSION,
            world: world.clone(),
            last_id,
            defaults: defaults.encode_map(),
            regions: regions.iter().map(RegionRecord::from_region).collect(),
        };
        let bytes = postcard::to_allocvec(&snapshot)
            .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        write_atomic(&self.world_path(world), &bytes).await?;
        debug!(%world, regions = snapshot.regions.len(), "world snapshot written");
        Ok(())
    }

    /// Write the claim-block ledger snapshot
    pub async fn save_ledger(&self, store: &RegionStore) -> StoreResult<()> {
        let snapshot = LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            balances: store.ledger().snapshot(),
        };
        let bytes = postcard::to_allocvec(&snapshot)
            .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        write_atomic(&self.ledger_path(), &bytes).await?;
        debug!(accounts = snapshot.balances.len(), "ledger snapshot written");
        Ok(())
    }

    /// Write every world plus the ledger; returns the world count
    pub async fn save_all(&self, store: &RegionStore) -> StoreResult<usize> {
        let worlds = store.worlds();
        for world in &worlds {
            self.save_world(store, world).await?;
        }
        self.save_ledger(store).await?;
        Ok(worlds.len())
    }

    /// Load every snapshot in the directory into the store
    ///
    /// Unreadable files are skipped with a warning so one corrupt world
    /// cannot take the rest down.
    pub async fn load_all(&self, store: &RegionStore) -> StoreResult<LoadReport> {
        let mut report = LoadReport::default();
        let mut dir = tokio::fs::read_dir(&self.storage_path)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(WORLD_EXTENSION) {
                continue;
            }
            match self.load_world_file(store, &path).await {
                Ok(loaded) => {
                    debug!(world = %loaded.world, regions = loaded.regions, "world snapshot loaded");
                    report.worlds += 1;
                    report.regions += loaded.regions;
                    report.quarantined.extend(loaded.quarantined);
                    report.flag_issues += loaded.flag_issues;
                }
                Err(error) => {
                    report.failed_files += 1;
                    warn!(path = %path.display(), %error, "skipping unreadable world snapshot");
                }
            }
        }

        match self.load_ledger(store).await {
            Ok(restored) => {
                if restored {
                    debug!("ledger snapshot loaded");
                }
            }
            Err(error) => {
                report.failed_files += 1;
                warn!(%error, "skipping unreadable ledger snapshot");
            }
        }

        info!(
            worlds = report.worlds,
            regions = report.regions,
            quarantined = report.quarantined.len(),
            flag_issues = report.flag_issues,
            failed_files = report.failed_files,
            "snapshot load complete"
        );
        Ok(report)
    }

    async fn load_world_file(&self, store: &RegionStore, path: &Path) -> StoreResult<WorldLoad> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        let (version, _) = postcard::take_from_bytes::<u32>(&bytes)
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version).into());
        }
        let snapshot: WorldSnapshot =
            postcard::from_bytes(&bytes).map_err(|e| SnapshotError::Decode(e.to_string()))?;

        // The embedded world id is the truth; the file name is advisory
        let world = snapshot.world;
        let (defaults, default_issues) =
            FlagContainer::decode_map(store.registry(), &snapshot.defaults);
        for issue in &default_issues {
            warn!(%world, flag = %issue.key, error = %issue.error, "dropping undecodable world default");
        }

        let (regions, quarantined, mut flag_issues) =
            revive_regions(&world, snapshot.regions, store.registry());
        flag_issues += default_issues.len();
        let loaded = regions.len();
        store.import_world(world.clone(), regions, defaults, snapshot.last_id);

        Ok(WorldLoad {
            world,
            regions: loaded,
            quarantined,
            flag_issues,
        })
    }

    async fn load_ledger(&self, store: &RegionStore) -> StoreResult<bool> {
        let bytes = match tokio::fs::read(self.ledger_path()).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(SnapshotError::Io(error.to_string()).into()),
        };
        let (version, _) = postcard::take_from_bytes::<u32>(&bytes)
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version).into());
        }
        let snapshot: LedgerSnapshot =
            postcard::from_bytes(&bytes).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        store.ledger().restore(snapshot.balances);
        Ok(true)
    }
}

/// Write via a temp file so the target is always complete
async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut temp_os = path.as_os_str().to_owned();
    temp_os.push(".tmp");
    let temp_path = PathBuf::from(temp_os);
    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|e| SnapshotError::Io(e.to_string()))?;
    // Atomic rename
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| SnapshotError::Io(e.to_string()))?;
    Ok(())
}

/// Rebuild regions from their records, quarantining broken ancestry
fn revive_regions(
    world: &WorldId,
    records: Vec<RegionRecord>,
    registry: &FlagRegistry,
) -> (Vec<Region>, Vec<QuarantinedRegion>, usize) {
    let parents: BTreeMap<RegionId, Option<RegionId>> =
        records.iter().map(|r| (r.id, r.parent)).collect();
    let mut regions = Vec::with_capacity(records.len());
    let mut quarantined = Vec::new();
    let mut flag_issues = 0;

    for record in records {
        if let Some(reason) = ancestry_issue(&parents, record.id) {
            warn!(%world, region = %record.id, %reason, "quarantining persisted region");
            quarantined.push(QuarantinedRegion {
                world: world.clone(),
                id: record.id,
                reason,
            });
            continue;
        }
        let (flags, issues) = FlagContainer::decode_map(registry, &record.flags);
        for issue in &issues {
            warn!(%world, region = %record.id, flag = %issue.key, error = %issue.error, "dropping undecodable flag");
        }
        flag_issues += issues.len();
        regions.push(Region {
            id: record.id,
            world: world.clone(),
            bounds: record.bounds,
            priority: record.priority,
            owner: record.owner,
            co_owners: record.co_owners,
            parent: record.parent,
            children: Vec::new(),
            name: record.name,
            flags,
            created_at: record.created_at,
            last_activity: record.last_activity,
            transferred_at: None,
        });
    }
    (regions, quarantined, flag_issues)
}

/// Walk a record's ancestry within the snapshot's own id set
///
/// Covers records hanging off a cycle as well as the cycle members
/// themselves, since the walk revisits a member either way.
fn ancestry_issue(
    parents: &BTreeMap<RegionId, Option<RegionId>>,
    start: RegionId,
) -> Option<InvariantViolation> {
    let mut visited = BTreeSet::from([start]);
    let mut child = start;
    let mut link = parents.get(&start).copied().flatten();
    while let Some(parent) = link {
        if !visited.insert(parent) {
            return Some(InvariantViolation::ParentCycle(start));
        }
        match parents.get(&parent) {
            None => return Some(InvariantViolation::MissingParent { child, parent }),
            Some(next) => {
                child = parent;
                link = *next;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::{CreateRequest, TrustSubject};
    use freehold_core::{BlockPos, PlayerId, TrustLevel};
    use tempfile::TempDir;

    fn player(name: &str) -> PlayerId {
        PlayerId::new(name).unwrap()
    }

    fn bounds(ax: i32, az: i32, bx: i32, bz: i32) -> Cuboid {
        Cuboid::from_corners(BlockPos::new(ax, 0, az), BlockPos::new(bx, 127, bz))
    }

    fn store() -> RegionStore {
        RegionStore::new(StoreConfig {
            min_claim_area: 25,
            ..StoreConfig::default()
        })
    }

    async fn snapshot_dir() -> (SnapshotStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let snapshots = SnapshotStore::new(temp_dir.path()).await.unwrap();
        (snapshots, temp_dir)
    }

    fn record(id: u64, parent: Option<u64>) -> RegionRecord {
        let now = Utc::now();
        RegionRecord {
            id: RegionId(id),
            bounds: bounds(0, 0, 9, 9),
            priority: 0,
            owner: Owner::Player(player("Alice")),
            co_owners: Vec::new(),
            parent: parent.map(RegionId),
            name: None,
            flags: BTreeMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    async fn write_snapshot(snapshots: &SnapshotStore, snapshot: &WorldSnapshot) {
        let bytes = postcard::to_allocvec(snapshot).unwrap();
        let path = snapshots.world_path(&snapshot.world);
        tokio::fs::write(path, bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_world_round_trip() {
        let (snapshots, _temp) = snapshot_dir().await;
        let alice = player("Alice");
        let world = WorldId::default();

        let source = store();
        source.ledger().deposit(&alice, 10_000);
        let base = source
            .try_create(CreateRequest::claim(alice.clone(), world.clone(), bounds(0, 0, 19, 19)))
            .unwrap();
        let sub = source
            .try_create(
                CreateRequest::claim(alice.clone(), world.clone(), bounds(2, 2, 12, 12))
                    .subdivision_of(base.id)
                    .named("workshop"),
            )
            .unwrap();
        source
            .set_trust(
                Some(&alice),
                base.id,
                TrustSubject::Player(player("Bob")),
                TrustLevel::Build,
            )
            .unwrap();
        source
            .set_flag_parsed(None, base.id, "pvp", "deny")
            .unwrap();
        source
            .set_world_flag(
                None,
                &world,
                "tnt",
                source.registry().parse_value("tnt", "allow").unwrap(),
            )
            .unwrap();
        snapshots.save_all(&source).await.unwrap();

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.worlds, 1);
        assert_eq!(report.regions, 2);
        assert!(report.quarantined.is_empty());
        assert_eq!(report.failed_files, 0);

        let base_back = restored.region(base.id).unwrap();
        assert_eq!(base_back.owner, base.owner);
        assert_eq!(base_back.bounds, base.bounds);
        assert_eq!(base_back.children, vec![sub.id]);
        assert_eq!(
            base_back.trust_entry(&player("Bob")),
            Some(TrustLevel::Build)
        );
        let sub_back = restored.region(sub.id).unwrap();
        assert_eq!(sub_back.parent, Some(base.id));
        assert_eq!(sub_back.name.as_deref(), Some("workshop"));

        // The ledger traveled too
        assert_eq!(
            restored.ledger().balance(&alice),
            source.ledger().balance(&alice)
        );

        // New ids continue past the loaded counter
        let next = restored
            .try_create(CreateRequest::server(world, bounds(40, 40, 49, 49)))
            .unwrap();
        assert!(next.id > sub.id);
    }

    #[tokio::test]
    async fn test_missing_parent_is_quarantined() {
        let (snapshots, _temp) = snapshot_dir().await;
        let world = WorldId::default();
        write_snapshot(
            &snapshots,
            &WorldSnapshot {
                version: SNAPSHOT_VERSION,
                world: world.clone(),
                last_id: 9,
                defaults: BTreeMap::new(),
                regions: vec![record(1, None), record(2, Some(7))],
            },
        )
        .await;

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.regions, 1);
        assert_eq!(report.quarantined.len(), 1);
        assert_eq!(report.quarantined[0].id, RegionId(2));
        assert!(matches!(
            report.quarantined[0].reason,
            InvariantViolation::MissingParent { .. }
        ));
        assert!(restored.region(RegionId(1)).is_some());
        assert!(restored.region(RegionId(2)).is_none());
    }

    #[tokio::test]
    async fn test_cycle_and_its_descendants_are_quarantined() {
        let (snapshots, _temp) = snapshot_dir().await;
        let world = WorldId::default();
        write_snapshot(
            &snapshots,
            &WorldSnapshot {
                version: SNAPSHOT_VERSION,
                world: world.clone(),
                last_id: 9,
                defaults: BTreeMap::new(),
                regions: vec![
                    record(1, Some(2)),
                    record(2, Some(1)),
                    // Healthy on its own, but hangs off the cycle
                    record(3, Some(1)),
                    record(4, None),
                ],
            },
        )
        .await;

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.regions, 1);
        assert_eq!(report.quarantined.len(), 3);
        assert!(restored.region(RegionId(4)).is_some());
        assert!(restored.region(RegionId(3)).is_none());
    }

    #[tokio::test]
    async fn test_unsupported_version_skips_the_file() {
        let (snapshots, _temp) = snapshot_dir().await;
        write_snapshot(
            &snapshots,
            &WorldSnapshot {
                version: 99,
                world: WorldId::default(),
                last_id: 0,
                defaults: BTreeMap::new(),
                regions: vec![record(1, None)],
            },
        )
        .await;

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.worlds, 0);
        assert_eq!(report.failed_files, 1);
        assert_eq!(restored.region_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_flag_is_dropped_not_fatal() {
        let (snapshots, _temp) = snapshot_dir().await;
        let world = WorldId::default();
        let mut rec = record(1, None);
        rec.flags.insert("pvp".to_string(), "deny".to_string());
        rec.flags
            .insert("retired-flag".to_string(), "allow".to_string());
        write_snapshot(
            &snapshots,
            &WorldSnapshot {
                version: SNAPSHOT_VERSION,
                world,
                last_id: 1,
                defaults: BTreeMap::new(),
                regions: vec![rec],
            },
        )
        .await;

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.regions, 1);
        assert_eq!(report.flag_issues, 1);
        let region = restored.region(RegionId(1)).unwrap();
        assert!(region.flags.contains("pvp"));
        assert!(!region.flags.contains("retired-flag"));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let (snapshots, temp) = snapshot_dir().await;
        let source = store();
        source
            .try_create(CreateRequest::server(WorldId::default(), bounds(0, 0, 9, 9)))
            .unwrap();
        snapshots.save_all(&source).await.unwrap();

        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(temp.path()).await.unwrap();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names, vec!["ledger.dat", "world.world"]);
    }

    #[tokio::test]
    async fn test_hostile_world_name_is_sanitized() {
        let (snapshots, _temp) = snapshot_dir().await;
        let world = WorldId::new("lobby/2024 *final*").unwrap();
        let source = store();
        source
            .try_create(CreateRequest::server(world.clone(), bounds(0, 0, 9, 9)))
            .unwrap();
        snapshots.save_all(&source).await.unwrap();

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.worlds, 1);
        assert_eq!(restored.region_count_in(&world), 1);
    }

    #[tokio::test]
    async fn test_lookalike_world_names_keep_distinct_snapshots() {
        let (snapshots, _temp) = snapshot_dir().await;
        // One escapes to "lobby%2fa", the other stays "lobby_a"
        let slashed = WorldId::new("lobby/a").unwrap();
        let flat = WorldId::new("lobby_a").unwrap();
        let source = store();
        source
            .try_create(CreateRequest::server(slashed.clone(), bounds(0, 0, 9, 9)))
            .unwrap();
        source
            .try_create(CreateRequest::server(flat.clone(), bounds(20, 20, 29, 29)))
            .unwrap();
        assert_eq!(snapshots.save_all(&source).await.unwrap(), 2);

        let restored = store();
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.worlds, 2);
        assert_eq!(restored.region_count_in(&slashed), 1);
        assert_eq!(restored.region_count_in(&flat), 1);
    }
}
