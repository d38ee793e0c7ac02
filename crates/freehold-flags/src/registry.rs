//! The flag catalog
//!
//! The registry is built once at startup (built-in flags plus any
//! registered from configuration) and read-only afterwards. It owns the
//! authority over each flag's payload kind, default value, and whether
//! a region owner may toggle it without elevated rights.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FlagError, ParseError};
use crate::filter::Filter;
use crate::payload::{Anchor, CommandSpec, TextValue};
use crate::trust_table::TrustTable;
use crate::value::{BorderPolicy, FlagKind, FlagValue, GameMode};

/// A validated flag identifier: 1-32 chars of `[a-z0-9-]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlagKey(String);

impl FlagKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ParseError> {
        let key = key.into();
        let valid = !key.is_empty()
            && key.len() <= 32
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid {
            Ok(Self(key))
        } else {
            Err(ParseError::InvalidFlagKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for FlagKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FlagKey {
    type Error = ParseError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

impl From<FlagKey> for String {
    fn from(key: FlagKey) -> Self {
        key.0
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDescriptor {
    key: FlagKey,
    default: FlagValue,
    /// Whether a region owner may set this flag without elevated rights
    player_toggleable: bool,
    /// For state flags: the value a bare (empty) user entry sets
    toggle_state: bool,
}

impl FlagDescriptor {
    /// A state flag; a bare entry toggles to the opposite of the default
    pub fn state(key: FlagKey, default_allow: bool, player_toggleable: bool) -> Self {
        Self {
            key,
            default: FlagValue::State(default_allow),
            player_toggleable,
            toggle_state: !default_allow,
        }
    }

    /// Any non-state flag, with its kind taken from the default value
    pub fn new(key: FlagKey, default: FlagValue, player_toggleable: bool) -> Self {
        Self {
            key,
            default,
            player_toggleable,
            toggle_state: false,
        }
    }

    pub fn key(&self) -> &FlagKey {
        &self.key
    }

    pub fn kind(&self) -> FlagKind {
        self.default.kind()
    }

    pub fn default_value(&self) -> &FlagValue {
        &self.default
    }

    pub fn player_toggleable(&self) -> bool {
        self.player_toggleable
    }
}

/// The startup-built flag catalog
#[derive(Debug, Clone, Default)]
pub struct FlagRegistry {
    descriptors: BTreeMap<FlagKey, FlagDescriptor>,
}

impl FlagRegistry {
    /// An empty catalog (tests and unusual embeddings)
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in catalog
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let key = |k: &str| FlagKey(k.to_string());

        // States
        registry.register(FlagDescriptor::state(key("tnt"), false, true));
        registry.register(FlagDescriptor::state(key("pvp"), true, true));
        registry.register(FlagDescriptor::state(key("fire-spread"), false, true));
        registry.register(FlagDescriptor::state(key("mob-spawning"), true, true));
        registry.register(FlagDescriptor::state(key("mob-griefing"), false, true));
        registry.register(FlagDescriptor::state(key("allow-overlap"), false, false));

        // Filters
        registry.register(FlagDescriptor::new(
            key("place-filter"),
            FlagValue::TagFilter(Filter::empty()),
            true,
        ));
        registry.register(FlagDescriptor::new(
            key("break-filter"),
            FlagValue::TagFilter(Filter::empty()),
            true,
        ));
        registry.register(FlagDescriptor::new(
            key("use-filter"),
            FlagValue::TextFilter(Filter::empty()),
            true,
        ));

        // Trust is edited through the dedicated trust operations
        registry.register(FlagDescriptor::new(
            key("trust"),
            FlagValue::Trust(TrustTable::new()),
            false,
        ));

        // Messages and entry effects
        registry.register(FlagDescriptor::new(
            key("greeting"),
            FlagValue::Text(TextValue::default()),
            true,
        ));
        registry.register(FlagDescriptor::new(
            key("farewell"),
            FlagValue::Text(TextValue::default()),
            true,
        ));
        registry.register(FlagDescriptor::new(
            key("entry-command"),
            FlagValue::Command(CommandSpec::default()),
            false,
        ));
        registry.register(FlagDescriptor::new(
            key("exit-command"),
            FlagValue::Command(CommandSpec::default()),
            false,
        ));
        registry.register(FlagDescriptor::new(
            key("warp"),
            FlagValue::Location(Anchor::default()),
            true,
        ));

        // Single choices
        registry.register(FlagDescriptor::new(
            key("game-mode"),
            FlagValue::GameMode(GameMode::Survival),
            false,
        ));
        registry.register(FlagDescriptor::new(
            key("border"),
            FlagValue::Border(BorderPolicy::None),
            true,
        ));

        registry
    }

    /// Add or replace a catalog entry
    pub fn register(&mut self, descriptor: FlagDescriptor) {
        let key = descriptor.key.clone();
        if let Some(previous) = self.descriptors.insert(key.clone(), descriptor) {
            warn!(flag = %key, previous_kind = %previous.kind(), "flag descriptor replaced");
        } else {
            debug!(flag = %key, "flag registered");
        }
    }

    /// Look up a catalog entry
    pub fn descriptor(&self, key: &str) -> Result<&FlagDescriptor, FlagError> {
        self.descriptors
            .get(key)
            .ok_or_else(|| FlagError::UnknownFlag(key.to_string()))
    }

    /// The default value a lookup falls back to when nothing in the
    /// container chain has the flag set
    pub fn default_value(&self, key: &str) -> Result<&FlagValue, FlagError> {
        Ok(self.descriptor(key)?.default_value())
    }

    /// Parse a user-entered or persisted payload string for a flag
    ///
    /// A bare string on a state flag means the flag's toggle polarity.
    pub fn parse_value(&self, key: &str, input: &str) -> Result<FlagValue, FlagError> {
        let descriptor = self.descriptor(key)?;
        if descriptor.kind() == FlagKind::State && input.trim().is_empty() {
            return Ok(FlagValue::State(descriptor.toggle_state));
        }
        Ok(FlagValue::decode(descriptor.kind(), input)?)
    }

    /// Verify a value's kind against the flag's declared kind
    pub fn check_type(&self, key: &str, value: &FlagValue) -> Result<(), FlagError> {
        let descriptor = self.descriptor(key)?;
        if descriptor.kind() == value.kind() {
            Ok(())
        } else {
            Err(FlagError::TypeMismatch {
                key: key.to_string(),
                expected: descriptor.kind(),
                found: value.kind(),
            })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
