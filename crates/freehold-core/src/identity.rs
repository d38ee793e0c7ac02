//! Player and world identities
//!
//! Players are identified by their exact account name. Comparison is
//! case-sensitive: `Alice` and `alice` are different players. The name
//! `public` (any casing) is reserved by the trust-table wire encoding
//! and can never be a [`PlayerId`].

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Maximum length of a player name.
pub const MAX_NAME_LEN: usize = 16;

/// A validated player name
///
/// 1 to 16 characters of `[A-Za-z0-9_]`. Validation runs both at
/// construction and at deserialization, so a `PlayerId` in hand is
/// always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    /// Create a new player identity, validating the name
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(IdentityError::InvalidLength {
                actual: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        if let Some(found) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(IdentityError::InvalidCharacter { name, found });
        }
        if name.eq_ignore_ascii_case("public") {
            return Err(IdentityError::Reserved(name));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PlayerId {
    type Error = IdentityError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

/// The holder of a region
///
/// Server-owned regions are administrative: they are never charged
/// claim blocks and never expire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// The server itself (administrative region)
    Server,
    /// A regular player
    Player(PlayerId),
}

impl Owner {
    /// The owning player, if any
    pub fn as_player(&self) -> Option<&PlayerId> {
        match self {
            Owner::Server => None,
            Owner::Player(id) => Some(id),
        }
    }

    /// Whether this is a server-owned (administrative) holder
    pub fn is_server(&self) -> bool {
        matches!(self, Owner::Server)
    }

    /// Whether the given player is this holder
    pub fn is_player(&self, player: &PlayerId) -> bool {
        self.as_player() == Some(player)
    }
}

impl Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Server => write!(f, "server"),
            Owner::Player(id) => write!(f, "{}", id),
        }
    }
}

/// A world name
///
/// Worlds partition the region index: regions in different worlds never
/// interact, and snapshots are taken per world.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorldId(String);

impl WorldId {
    /// Create a new world identity; the name must be non-empty
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdentityError::EmptyWorldName);
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorldId {
    /// The conventional main-world name
    fn default() -> Self {
        Self("world".to_string())
    }
}

impl Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for WorldId {
    type Error = IdentityError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<WorldId> for String {
    fn from(id: WorldId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_validation() {
        assert!(PlayerId::new("Alice").is_ok());
        assert!(PlayerId::new("x_42_X").is_ok());
        assert!(PlayerId::new("a").is_ok());
        assert!(PlayerId::new("sixteen_chars_ab").is_ok());

        assert!(PlayerId::new("").is_err());
        assert!(PlayerId::new("seventeen_chars_x").is_err());
        assert!(PlayerId::new("bad name").is_err());
        assert!(PlayerId::new("héllo").is_err());
    }

    #[test]
    fn test_public_name_reserved() {
        assert!(matches!(
            PlayerId::new("public"),
            Err(IdentityError::Reserved(_))
        ));
        assert!(matches!(
            PlayerId::new("Public"),
            Err(IdentityError::Reserved(_))
        ));
        // But names merely containing it are fine
        assert!(PlayerId::new("publican").is_ok());
    }

    #[test]
    fn test_player_id_case_sensitive() {
        let a = PlayerId::new("Alice").unwrap();
        let b = PlayerId::new("alice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_owner_accessors() {
        let alice = PlayerId::new("Alice").unwrap();
        let owner = Owner::Player(alice.clone());
        assert!(!owner.is_server());
        assert!(owner.is_player(&alice));
        assert_eq!(owner.as_player(), Some(&alice));

        assert!(Owner::Server.is_server());
        assert_eq!(Owner::Server.as_player(), None);
        assert_eq!(format!("{}", Owner::Server), "server");
    }

    #[test]
    fn test_world_id_validation() {
        assert!(WorldId::new("world").is_ok());
        assert!(WorldId::new("the_nether").is_ok());
        assert!(WorldId::new("").is_err());
    }
}
