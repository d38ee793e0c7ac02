//! # Freehold Store
//!
//! The region store for the Freehold land-claim engine: a hierarchical
//! spatial index over player claims with priority-ordered point
//! queries, trust and flag resolution through the parent chain, a
//! claim-block economy, an expiration sweep, and per-world snapshot
//! persistence.
//!
//! ## Key Types
//!
//! - [`RegionStore`]: The spatial index and single authority over every mutation
//! - [`Region`] / [`RegionId`]: One claim or subdivision and its stable id
//! - [`CreateRequest`]: Parameters of one region creation
//! - [`EffectiveFlags`]: Point-in-time flag policy at one position
//! - [`BlockLedger`]: Per-player claim-block balances
//! - [`SnapshotStore`]: Postcard snapshots, one file per world
//! - [`StoreTasks`]: Accrual, sweep, and autosave background loops

pub mod config;
pub mod economy;
pub mod error;
pub mod persist;
pub mod region;
pub mod session;
pub mod store;
pub mod tasks;

// Re-export main types
pub use config::*;
pub use economy::*;
pub use error::*;
pub use persist::*;
pub use region::*;
pub use session::*;
pub use store::*;
pub use tasks::*;
