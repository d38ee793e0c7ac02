//! The trust ladder
//!
//! Trust is a strict total order. A player holding some level implicitly
//! holds everything below it, so permission checks reduce to an ordering
//! comparison.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrustParseError;

/// Permission level a player can hold on a region
///
/// - `None`: no rights (the level of an untrusted visitor)
/// - `Access`: interact with doors, buttons, beds
/// - `Container`: open chests and other inventories
/// - `Build`: place and break blocks
/// - `Management`: grant trust and edit flags on behalf of the owner
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum TrustLevel {
    #[default]
    None,
    Access,
    Container,
    Build,
    Management,
}

impl TrustLevel {
    /// All levels in ascending order
    pub const ALL: [TrustLevel; 5] = [
        TrustLevel::None,
        TrustLevel::Access,
        TrustLevel::Container,
        TrustLevel::Build,
        TrustLevel::Management,
    ];

    /// Whether this level grants at least `required`
    pub fn is_at_least(&self, required: TrustLevel) -> bool {
        *self >= required
    }

    /// The lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::None => "none",
            TrustLevel::Access => "access",
            TrustLevel::Container => "container",
            TrustLevel::Build => "build",
            TrustLevel::Management => "management",
        }
    }
}

impl Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = TrustParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TrustLevel::None),
            "access" => Ok(TrustLevel::Access),
            "container" => Ok(TrustLevel::Container),
            "build" => Ok(TrustLevel::Build),
            "management" => Ok(TrustLevel::Management),
            other => Err(TrustParseError::UnknownLevel(other.to_string())),
        }
    }
}
