//! Flag containers and chain resolution
//!
//! A container holds the flags explicitly set on one region (or the
//! world defaults). Lookups that miss resolve through a caller-supplied
//! fallback chain and terminate at the registry default, so a query
//! always yields a value. The world default container is the last
//! container in any chain and is never itself chained further.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FlagError;
use crate::registry::{FlagKey, FlagRegistry};
use crate::value::FlagValue;

/// The explicit flag entries of one region or of a world's defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagContainer {
    entries: BTreeMap<FlagKey, FlagValue>,
}

/// One entry of a persisted container that failed to decode
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDecodeIssue {
    pub key: String,
    pub error: FlagError,
}

impl FlagContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// This container's own entry, no fallback
    pub fn get(&self, key: &str) -> Option<&FlagValue> {
        self.entries.get(key)
    }

    /// Set a flag after checking the value against the registered kind
    pub fn set(
        &mut self,
        registry: &FlagRegistry,
        key: &str,
        value: FlagValue,
    ) -> Result<(), FlagError> {
        registry.check_type(key, &value)?;
        let key = registry.descriptor(key)?.key().clone();
        self.entries.insert(key, value);
        Ok(())
    }

    /// Parse a payload string through the registry, then set it
    pub fn set_parsed(
        &mut self,
        registry: &FlagRegistry,
        key: &str,
        input: &str,
    ) -> Result<(), FlagError> {
        let value = registry.parse_value(key, input)?;
        self.set(registry, key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<FlagValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlagKey, &FlagValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union filter elements of `other` into same-keyed filter entries
    pub fn augment(&mut self, other: &FlagContainer) {
        for (key, value) in &mut self.entries {
            match (value, other.get(key.as_str())) {
                (FlagValue::TagFilter(mine), Some(FlagValue::TagFilter(theirs)))
                | (FlagValue::TextFilter(mine), Some(FlagValue::TextFilter(theirs))) => {
                    mine.union_with(theirs);
                }
                _ => {}
            }
        }
    }

    /// Subtract filter elements of `other` from same-keyed filter entries
    pub fn reduce(&mut self, other: &FlagContainer) {
        for (key, value) in &mut self.entries {
            match (value, other.get(key.as_str())) {
                (FlagValue::TagFilter(mine), Some(FlagValue::TagFilter(theirs)))
                | (FlagValue::TextFilter(mine), Some(FlagValue::TextFilter(theirs))) => {
                    mine.subtract(theirs);
                }
                _ => {}
            }
        }
    }

    /// Canonical-string form of every entry, for the snapshot layer
    pub fn encode_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.encode()))
            .collect()
    }

    /// Rebuild a container from persisted canonical strings
    ///
    /// Entries that no longer parse (unknown flag, malformed payload)
    /// are collected as issues rather than failing the whole container;
    /// the caller decides whether to drop or quarantine.
    pub fn decode_map(
        registry: &FlagRegistry,
        map: &BTreeMap<String, String>,
    ) -> (Self, Vec<FlagDecodeIssue>) {
        let mut container = Self::new();
        let mut issues = Vec::new();
        for (key, payload) in map {
            match registry.parse_value(key, payload) {
                Ok(value) => {
                    // Key came back from the descriptor, so it is valid
                    if let Ok(descriptor) = registry.descriptor(key) {
                        container.entries.insert(descriptor.key().clone(), value);
                    }
                }
                Err(error) => issues.push(FlagDecodeIssue {
                    key: key.clone(),
                    error,
                }),
            }
        }
        (container, issues)
    }
}

/// Resolve a flag through a fallback chain, ending at the registry default
///
/// The chain is ordered nearest-first: the region's own container, its
/// ancestors root-ward, then the world default.
pub fn resolve_flag<'a>(
    chain: impl IntoIterator<Item = &'a FlagContainer>,
    registry: &'a FlagRegistry,
    key: &str,
) -> Result<&'a FlagValue, FlagError> {
    for container in chain {
        if let Some(value) = container.get(key) {
            return Ok(value);
        }
    }
    registry.default_value(key)
}

/// Convenience for state flags: allowed unless the resolved value denies
pub fn flag_allows<'a>(
    chain: impl IntoIterator<Item = &'a FlagContainer>,
    registry: &'a FlagRegistry,
    key: &str,
) -> Result<bool, FlagError> {
    let value = resolve_flag(chain, registry, key)?;
    value.as_state().ok_or_else(|| FlagError::TypeMismatch {
        key: key.to_string(),
        expected: crate::value::FlagKind::State,
        found: value.kind(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::payload::TextValue;

    #[test]
    fn test_set_type_checks() {
        let registry = FlagRegistry::builtin();
        let mut container = FlagContainer::new();
        container
            .set(&registry, "tnt", FlagValue::State(true))
            .unwrap();
        assert_eq!(container.get("tnt"), Some(&FlagValue::State(true)));

        let err = container
            .set(&registry, "tnt", FlagValue::Text(TextValue::new("boom")))
            .unwrap_err();
        assert!(matches!(err, FlagError::TypeMismatch { .. }));
        // Failed set leaves the old value in place
        assert_eq!(container.get("tnt"), Some(&FlagValue::State(true)));
    }

    #[test]
    fn test_set_unknown_flag() {
        let registry = FlagRegistry::builtin();
        let mut container = FlagContainer::new();
        let err = container
            .set(&registry, "frobnicate", FlagValue::State(true))
            .unwrap_err();
        assert!(matches!(err, FlagError::UnknownFlag(_)));
    }

    #[test]
    fn test_chain_resolution_order() {
        let registry = FlagRegistry::builtin();
        let mut region = FlagContainer::new();
        let mut world_default = FlagContainer::new();
        world_default
            .set(&registry, "tnt", FlagValue::State(false))
            .unwrap();

        // Region unset: falls through to the world default
        let resolved = resolve_flag([&region, &world_default], &registry, "tnt").unwrap();
        assert_eq!(resolved, &FlagValue::State(false));

        // Region explicit: wins without touching the default
        region.set(&registry, "tnt", FlagValue::State(true)).unwrap();
        let resolved = resolve_flag([&region, &world_default], &registry, "tnt").unwrap();
        assert_eq!(resolved, &FlagValue::State(true));
        assert_eq!(world_default.get("tnt"), Some(&FlagValue::State(false)));
    }

    #[test]
    fn test_chain_falls_back_to_registry_default() {
        let registry = FlagRegistry::builtin();
        let empty = FlagContainer::new();
        // pvp defaults to allow in the catalog
        assert!(flag_allows([&empty], &registry, "pvp").unwrap());
        // tnt defaults to deny
        assert!(!flag_allows([&empty], &registry, "tnt").unwrap());
    }

    #[test]
    fn test_flag_allows_rejects_non_state() {
        let registry = FlagRegistry::builtin();
        let empty = FlagContainer::new();
        assert!(matches!(
            flag_allows([&empty], &registry, "greeting"),
            Err(FlagError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_augment_and_reduce_filters() {
        let registry = FlagRegistry::builtin();
        let mut base = FlagContainer::new();
        base.set_parsed(&registry, "place-filter", "tnt").unwrap();
        base.set(&registry, "pvp", FlagValue::State(true)).unwrap();

        let mut extra = FlagContainer::new();
        extra
            .set_parsed(&registry, "place-filter", "lava_bucket")
            .unwrap();
        extra.set(&registry, "pvp", FlagValue::State(false)).unwrap();

        base.augment(&extra);
        match base.get("place-filter").unwrap() {
            FlagValue::TagFilter(filter) => {
                assert!(!filter.allows("tnt"));
                assert!(!filter.allows("lava_bucket"));
            }
            other => panic!("unexpected value {:?}", other),
        }
        // Non-filter entries are untouched
        assert_eq!(base.get("pvp"), Some(&FlagValue::State(true)));

        base.reduce(&extra);
        match base.get("place-filter").unwrap() {
            FlagValue::TagFilter(filter) => {
                assert!(!filter.allows("tnt"));
                assert!(filter.allows("lava_bucket"));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_encode_decode_map() {
        let registry = FlagRegistry::builtin();
        let mut container = FlagContainer::new();
        container
            .set(&registry, "tnt", FlagValue::State(true))
            .unwrap();
        container
            .set(
                &registry,
                "break-filter",
                FlagValue::TagFilter(Filter::blacklist(["bedrock".to_string()])),
            )
            .unwrap();
        container
            .set_parsed(&registry, "trust", "build:Alice access:public")
            .unwrap();

        let encoded = container.encode_map();
        let (decoded, issues) = FlagContainer::decode_map(&registry, &encoded);
        assert!(issues.is_empty());
        assert_eq!(decoded, container);
    }

    #[test]
    fn test_decode_map_collects_issues() {
        let registry = FlagRegistry::builtin();
        let mut map = BTreeMap::new();
        map.insert("tnt".to_string(), "allow".to_string());
        map.insert("no-such-flag".to_string(), "x".to_string());
        map.insert("border".to_string(), "porous".to_string());

        let (decoded, issues) = FlagContainer::decode_map(&registry, &map);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.get("tnt"), Some(&FlagValue::State(true)));
        assert_eq!(issues.len(), 2);
    }
}
