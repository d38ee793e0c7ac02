//! The per-region trust table
//!
//! Maps players to trust levels, plus one optional public level that
//! applies to everyone without an explicit entry. An *unset* public
//! level defers to the parent region during resolution; an explicitly
//! set one (including `none`) overrides the parent's.
//!
//! Wire form: space-separated groups `<level>:<name1>,<name2>,...`.
//! The reserved name `public` inside a group sets the public level to
//! that group's level. The empty string is the empty table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use freehold_core::{PlayerId, TrustLevel};

use crate::error::ParseError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustTable {
    players: BTreeMap<PlayerId, TrustLevel>,
    public: Option<TrustLevel>,
}

impl TrustTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The explicit level for a player, if one is set
    pub fn level_for(&self, player: &PlayerId) -> Option<TrustLevel> {
        self.players.get(player).copied()
    }

    /// The public level, if explicitly set
    pub fn public(&self) -> Option<TrustLevel> {
        self.public
    }

    pub fn set_player(&mut self, player: PlayerId, level: TrustLevel) {
        self.players.insert(player, level);
    }

    pub fn remove_player(&mut self, player: &PlayerId) -> Option<TrustLevel> {
        self.players.remove(player)
    }

    pub fn set_public(&mut self, level: Option<TrustLevel>) {
        self.public = level;
    }

    pub fn players(&self) -> impl Iterator<Item = (&PlayerId, TrustLevel)> {
        self.players.iter().map(|(player, level)| (player, *level))
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.public.is_none()
    }

    /// Decode the wire form
    pub fn decode(input: &str) -> Result<Self, ParseError> {
        let mut table = TrustTable::new();
        for group in input.split_whitespace() {
            let (level_name, names) =
                group
                    .split_once(':')
                    .ok_or_else(|| ParseError::InvalidTrustGroup {
                        group: group.to_string(),
                        reason: "missing ':' separator".to_string(),
                    })?;
            let level: TrustLevel = level_name.parse()?;
            for name in names.split(',') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                if name.eq_ignore_ascii_case("public") {
                    table.public = Some(level);
                } else {
                    table.players.insert(PlayerId::new(name)?, level);
                }
            }
        }
        Ok(table)
    }

    /// Encode to the wire form: groups in ascending level order, player
    /// names sorted, `public` last within its group
    pub fn encode(&self) -> String {
        let mut groups = Vec::new();
        for level in TrustLevel::ALL {
            let mut names: Vec<&str> = self
                .players
                .iter()
                .filter(|(_, l)| **l == level)
                .map(|(player, _)| player.as_str())
                .collect();
            if self.public == Some(level) {
                names.push("public");
            }
            if !names.is_empty() {
                groups.push(format!("{}:{}", level, names.join(",")));
            }
        }
        groups.join(" ")
    }
}
