//! Region store performance benchmarks
//!
//! Benchmarks for the hot paths an embedding server hits every tick:
//! - Point and column winner queries
//! - Effective flag resolution
//! - Trust checks across deep parent chains
//! - Movement boundary detection
//! - Create/delete churn and the expiration sweep
//!
//! Run with: cargo bench -p freehold-store

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use freehold_core::{BlockPos, Cuboid, PlayerId, TrustLevel, WorldId};
use freehold_store::{CreateRequest, RegionId, RegionStore, StoreConfig, TrustSubject};

// ============================================================================
// Store Setup
// ============================================================================

fn player(name: &str) -> PlayerId {
    PlayerId::new(name).unwrap()
}

fn world() -> WorldId {
    WorldId::default()
}

fn bounds(ax: i32, az: i32, bx: i32, bz: i32) -> Cuboid {
    Cuboid::from_corners(BlockPos::new(ax, 0, az), BlockPos::new(bx, 127, bz))
}

/// A 20x20 grid of 10x10 claims covering x,z in 0..200
fn grid_store() -> RegionStore {
    let store = RegionStore::new(StoreConfig::default());
    for i in 0..20 {
        for j in 0..20 {
            let owner = player(&format!("Player{}", (i * 20 + j) % 10));
            let (x, z) = (i * 10, j * 10);
            store
                .try_create(
                    CreateRequest::claim(owner, world(), bounds(x, z, x + 9, z + 9)).uncharged(),
                )
                .unwrap();
        }
    }
    store
}

/// One claim subdivided eight levels deep, flags and trust on the root
fn nested_store() -> (RegionStore, RegionId) {
    let store = RegionStore::new(StoreConfig::default());
    let alice = player("Alice");
    let root = store
        .try_create(
            CreateRequest::claim(alice.clone(), world(), bounds(0, 0, 99, 99)).uncharged(),
        )
        .unwrap();
    store
        .set_trust(
            Some(&alice),
            root.id,
            TrustSubject::Player(player("Bob")),
            TrustLevel::Build,
        )
        .unwrap();
    store
        .set_flag_parsed(Some(&alice), root.id, "tnt", "allow")
        .unwrap();

    let mut parent = root.id;
    for depth in 1..=8 {
        let inset = depth as i32;
        let region = store
            .try_create(
                CreateRequest::claim(
                    alice.clone(),
                    world(),
                    bounds(inset, inset, 99 - inset, 99 - inset),
                )
                .subdivision_of(parent)
                .uncharged(),
            )
            .unwrap();
        parent = region.id;
    }
    (store, parent)
}

/// Random block positions inside the grid footprint
fn grid_positions(count: usize) -> Vec<BlockPos> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|_| {
            BlockPos::new(
                rng.random_range(0..200),
                rng.random_range(0..128),
                rng.random_range(0..200),
            )
        })
        .collect()
}

// ============================================================================
// Point Queries
// ============================================================================

fn bench_point_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_queries");

    let store = grid_store();
    let positions = grid_positions(256);

    group.bench_function("winning_region_400_claims", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % positions.len();
            store.winning_region_at(&world(), black_box(positions[i]))
        })
    });

    group.bench_function("winning_region_miss", |b| {
        let wilderness = BlockPos::new(5000, 64, 5000);
        b.iter(|| store.winning_region_at(&world(), black_box(wilderness)))
    });

    group.bench_function("column_query_400_claims", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % positions.len();
            store.winning_region_at_column(&world(), black_box(positions[i]))
        })
    });

    let (nested, _) = nested_store();
    group.bench_function("region_stack_depth_9", |b| {
        let deep = BlockPos::new(50, 64, 50);
        b.iter(|| nested.regions_at(&world(), black_box(deep)))
    });

    group.finish();
}

// ============================================================================
// Flag Resolution
// ============================================================================

fn bench_flag_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("flag_resolution");

    let (nested, _) = nested_store();
    let deep = BlockPos::new(50, 64, 50);

    // The winner is nine levels down; tnt is set on the root
    group.bench_function("effective_flags_depth_9", |b| {
        b.iter(|| nested.effective_flags(&world(), black_box(deep)))
    });

    group.bench_function("resolve_through_chain", |b| {
        let flags = nested.effective_flags(&world(), deep);
        b.iter(|| flags.allows(black_box("tnt")))
    });

    group.bench_function("effective_flags_wilderness", |b| {
        let wilderness = BlockPos::new(5000, 64, 5000);
        b.iter(|| nested.effective_flags(&world(), black_box(wilderness)))
    });

    group.finish();
}

// ============================================================================
// Trust Checks
// ============================================================================

fn bench_trust_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("trust_checks");

    let (nested, leaf) = nested_store();
    let bob = player("Bob");
    let mallory = player("Mallory");

    // Bob's grant sits on the root, nine levels up from the leaf
    group.bench_function("trusted_at_depth_9", |b| {
        b.iter(|| nested.has_trust(Some(&bob), TrustLevel::Build, black_box(leaf)))
    });

    group.bench_function("untrusted_at_depth_9", |b| {
        b.iter(|| nested.has_trust(Some(&mallory), TrustLevel::Access, black_box(leaf)))
    });

    let grid = grid_store();
    group.bench_function("login_refresh_400_claims", |b| {
        let owner = player("Player0");
        b.iter(|| grid.record_login(black_box(&owner)))
    });

    group.finish();
}

// ============================================================================
// Movement
// ============================================================================

fn bench_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement");

    let store = grid_store();

    // A diagonal dash across several claim borders
    group.bench_function("crosses_regions_64_blocks", |b| {
        let from = BlockPos::new(5, 64, 5);
        let to = BlockPos::new(69, 64, 41);
        b.iter(|| store.crosses_regions(&world(), black_box(from), black_box(to)))
    });

    group.bench_function("crosses_regions_within_claim", |b| {
        let from = BlockPos::new(1, 64, 1);
        let to = BlockPos::new(8, 64, 8);
        b.iter(|| store.crosses_regions(&world(), black_box(from), black_box(to)))
    });

    group.finish();
}

// ============================================================================
// Mutations and the Sweep
// ============================================================================

fn bench_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutations");

    let store = grid_store();
    let alice = player("Alice");

    group.bench_function("create_then_delete", |b| {
        b.iter(|| {
            let region = store
                .try_create(
                    CreateRequest::claim(alice.clone(), world(), bounds(500, 500, 509, 509))
                        .uncharged(),
                )
                .unwrap();
            store.try_delete(Some(&alice), region.id, false, false).unwrap()
        })
    });

    // Nothing has expired; this measures the scan itself
    group.bench_function("sweep_400_claims", |b| {
        b.iter(|| store.sweep_expired())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_point_queries,
    bench_flag_resolution,
    bench_trust_checks,
    bench_movement,
    bench_mutations,
);

criterion_main!(benches);
