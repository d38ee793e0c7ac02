//! # Freehold Core
//!
//! Core types and errors for the Freehold land-claim engine.
//!
//! This crate provides the foundational vocabulary shared by the flag
//! system and the region store: player and world identities, integer
//! block geometry, and the ordered trust ladder.
//!
//! ## Key Types
//!
//! - [`PlayerId`]: Validated player name (the unit of ownership and trust)
//! - [`Owner`]: A region holder, either a player or the server itself
//! - [`BlockPos`] / [`Cuboid`]: Integer world coordinates and axis-aligned claim volumes
//! - [`TrustLevel`]: The ordered permission ladder (none < access < container < build < management)

pub mod error;
pub mod geometry;
pub mod identity;
pub mod trust;

// Re-export main types
pub use error::*;
pub use geometry::*;
pub use identity::*;
pub use trust::*;
