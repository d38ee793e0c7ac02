//! # Freehold Flags
//!
//! The flag system: typed per-region policies with a canonical string
//! encoding shared by persistence and user input.
//!
//! A flag is a key (registered in the [`FlagRegistry`]) paired with a
//! [`FlagValue`], a closed union of payload kinds: allow/deny states,
//! tag and text filters, the trust table, messages, teleport anchors,
//! templated commands, and small single-choice policies. Containers
//! ([`FlagContainer`]) hold the explicit entries of one region or of a
//! world's defaults; lookups resolve through a caller-supplied fallback
//! chain and end at the registry default, so a query always produces a
//! value.
//!
//! ## Key Types
//!
//! - [`FlagValue`] / [`FlagKind`]: the payload union and its type tags
//! - [`FlagRegistry`] / [`FlagDescriptor`]: the startup-built flag catalog
//! - [`FlagContainer`]: explicit entries of one region or world default
//! - [`Filter`]: whitelist/blacklist element sets
//! - [`TrustTable`]: per-player trust levels plus the public level

pub mod container;
pub mod error;
pub mod filter;
pub mod payload;
pub mod registry;
pub mod trust_table;
pub mod value;

// Re-export main types
pub use container::*;
pub use error::*;
pub use filter::*;
pub use payload::*;
pub use registry::*;
pub use trust_table::*;
pub use value::*;
