//! The flag payload union and its canonical string codec
//!
//! [`FlagValue`] is a closed set: adding a payload kind means adding a
//! variant here, and every `match` over values is checked by the
//! compiler. The canonical encoding is the single source of truth for
//! both persistence and user-entered strings; for every valid input
//! `s`, `decode(encode(decode(s))) == decode(s)`.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::filter::Filter;
use crate::payload::{Anchor, CommandSpec, TextValue};
use crate::trust_table::TrustTable;

/// Type tag of a flag payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    State,
    TagFilter,
    TextFilter,
    Trust,
    Text,
    Location,
    Command,
    GameMode,
    Border,
}

impl Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlagKind::State => "state",
            FlagKind::TagFilter => "tag-filter",
            FlagKind::TextFilter => "text-filter",
            FlagKind::Trust => "trust",
            FlagKind::Text => "text",
            FlagKind::Location => "location",
            FlagKind::Command => "command",
            FlagKind::GameMode => "game-mode",
            FlagKind::Border => "border",
        };
        write!(f, "{}", name)
    }
}

/// Player game mode imposed inside a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Survival => "survival",
            GameMode::Creative => "creative",
            GameMode::Adventure => "adventure",
            GameMode::Spectator => "spectator",
        }
    }
}

impl Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "survival" => Ok(GameMode::Survival),
            "creative" => Ok(GameMode::Creative),
            "adventure" => Ok(GameMode::Adventure),
            "spectator" => Ok(GameMode::Spectator),
            other => Err(ParseError::UnknownChoice {
                kind: "game-mode",
                value: other.to_string(),
            }),
        }
    }
}

/// How a region edge is enforced against outside players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorderPolicy {
    /// Entry is blocked
    Hard,
    /// Entry is allowed but announced
    Soft,
    /// No enforcement
    None,
}

impl BorderPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorderPolicy::Hard => "hard",
            BorderPolicy::Soft => "soft",
            BorderPolicy::None => "none",
        }
    }
}

impl Display for BorderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BorderPolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(BorderPolicy::Hard),
            "soft" => Ok(BorderPolicy::Soft),
            "none" => Ok(BorderPolicy::None),
            other => Err(ParseError::UnknownChoice {
                kind: "border",
                value: other.to_string(),
            }),
        }
    }
}

/// A flag's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlagValue {
    /// Allow (`true`) or deny (`false`)
    State(bool),
    /// Allow/deny-list over a finite tag set (block and entity ids)
    TagFilter(Filter),
    /// Same semantics over free-form strings (commands, chat)
    TextFilter(Filter),
    /// Per-player trust levels plus the public level
    Trust(TrustTable),
    /// Message text with substitution placeholders
    Text(TextValue),
    /// A teleport anchor
    Location(Anchor),
    /// A command run on region entry or exit
    Command(CommandSpec),
    /// Imposed game mode
    GameMode(GameMode),
    /// Edge enforcement policy
    Border(BorderPolicy),
}

impl FlagValue {
    /// The payload's type tag
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::State(_) => FlagKind::State,
            FlagValue::TagFilter(_) => FlagKind::TagFilter,
            FlagValue::TextFilter(_) => FlagKind::TextFilter,
            FlagValue::Trust(_) => FlagKind::Trust,
            FlagValue::Text(_) => FlagKind::Text,
            FlagValue::Location(_) => FlagKind::Location,
            FlagValue::Command(_) => FlagKind::Command,
            FlagValue::GameMode(_) => FlagKind::GameMode,
            FlagValue::Border(_) => FlagKind::Border,
        }
    }

    /// Decode the canonical string form of a payload of the given kind
    ///
    /// A bare (empty) state payload is resolved by the registry, which
    /// knows the flag's toggle polarity; here it is rejected.
    pub fn decode(kind: FlagKind, input: &str) -> Result<FlagValue, ParseError> {
        match kind {
            FlagKind::State => match input.trim() {
                "allow" | "true" => Ok(FlagValue::State(true)),
                "deny" | "false" => Ok(FlagValue::State(false)),
                other => Err(ParseError::InvalidState(other.to_string())),
            },
            FlagKind::TagFilter => Ok(FlagValue::TagFilter(Filter::decode(input)?)),
            FlagKind::TextFilter => Ok(FlagValue::TextFilter(Filter::decode(input)?)),
            FlagKind::Trust => Ok(FlagValue::Trust(TrustTable::decode(input)?)),
            FlagKind::Text => Ok(FlagValue::Text(TextValue::decode(input))),
            FlagKind::Location => Ok(FlagValue::Location(Anchor::decode(input)?)),
            FlagKind::Command => Ok(FlagValue::Command(CommandSpec::decode(input)?)),
            FlagKind::GameMode => Ok(FlagValue::GameMode(input.trim().parse()?)),
            FlagKind::Border => Ok(FlagValue::Border(input.trim().parse()?)),
        }
    }

    /// The canonical string form
    ///
    /// States always encode explicitly (`allow`/`deny`) so the persisted
    /// form is lossless regardless of toggle polarity.
    pub fn encode(&self) -> String {
        match self {
            FlagValue::State(true) => "allow".to_string(),
            FlagValue::State(false) => "deny".to_string(),
            FlagValue::TagFilter(filter) | FlagValue::TextFilter(filter) => filter.encode(),
            FlagValue::Trust(table) => table.encode(),
            FlagValue::Text(text) => text.encode(),
            FlagValue::Location(anchor) => anchor.encode(),
            FlagValue::Command(spec) => spec.encode(),
            FlagValue::GameMode(mode) => mode.as_str().to_string(),
            FlagValue::Border(policy) => policy.as_str().to_string(),
        }
    }

    /// The state payload, if this is a state flag
    pub fn as_state(&self) -> Option<bool> {
        match self {
            FlagValue::State(allowed) => Some(*allowed),
            _ => None,
        }
    }

    /// The trust table, if this is the trust flag
    pub fn as_trust(&self) -> Option<&TrustTable> {
        match self {
            FlagValue::Trust(table) => Some(table),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(kind: FlagKind, input: &str) -> FlagValue {
        let first = FlagValue::decode(kind, input).unwrap();
        let second = FlagValue::decode(kind, &first.encode()).unwrap();
        assert_eq!(first, second, "unstable encoding for {:?}", input);
        first
    }

    #[test]
    fn test_state_codec() {
        assert_eq!(roundtrip(FlagKind::State, "allow"), FlagValue::State(true));
        assert_eq!(roundtrip(FlagKind::State, "deny"), FlagValue::State(false));
        assert_eq!(roundtrip(FlagKind::State, "true"), FlagValue::State(true));
        assert!(FlagValue::decode(FlagKind::State, "maybe").is_err());
        assert!(FlagValue::decode(FlagKind::State, "").is_err());
    }

    #[test]
    fn test_choice_codecs() {
        assert_eq!(
            roundtrip(FlagKind::GameMode, "creative"),
            FlagValue::GameMode(GameMode::Creative)
        );
        assert_eq!(
            roundtrip(FlagKind::Border, "hard"),
            FlagValue::Border(BorderPolicy::Hard)
        );
        assert!(FlagValue::decode(FlagKind::GameMode, "hardcore").is_err());
        assert!(FlagValue::decode(FlagKind::Border, "firm").is_err());
    }

    #[test]
    fn test_filter_codec_roundtrip() {
        roundtrip(FlagKind::TagFilter, "~");
        roundtrip(FlagKind::TagFilter, "tnt,lava_bucket");
        roundtrip(FlagKind::TagFilter, "*stone,dirt,!bedrock");
        roundtrip(FlagKind::TextFilter, "spawn,home");
    }

    #[test]
    fn test_trust_codec_roundtrip() {
        roundtrip(FlagKind::Trust, "");
        roundtrip(FlagKind::Trust, "build:Alice,Bob access:public");
        roundtrip(FlagKind::Trust, "none:public management:Carol");
    }

    #[test]
    fn test_text_codec_roundtrip() {
        roundtrip(FlagKind::Text, "~");
        roundtrip(FlagKind::Text, "Welcome, %player%!");
        roundtrip(FlagKind::Text, "line one\\nline two");
    }

    #[test]
    fn test_location_codec_roundtrip() {
        roundtrip(FlagKind::Location, "world 100.5 64 -20 90 0");
        assert!(FlagValue::decode(FlagKind::Location, "world 1 2").is_err());
    }

    #[test]
    fn test_command_codec_roundtrip() {
        roundtrip(FlagKind::Command, "console:broadcast %player% entered");
        roundtrip(FlagKind::Command, "player:warp %world%");
        assert!(FlagValue::decode(FlagKind::Command, "root:reboot").is_err());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(FlagValue::State(true).kind(), FlagKind::State);
        assert_eq!(
            FlagValue::Border(BorderPolicy::Soft).kind(),
            FlagKind::Border
        );
        assert_eq!(format!("{}", FlagKind::TagFilter), "tag-filter");
    }
}
