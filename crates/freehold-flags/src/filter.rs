//! Whitelist/blacklist element filters
//!
//! Filters gate finite tag sets (block ids, entity ids) or free-form
//! strings (command names). A blacklist allows everything except its
//! entries; a whitelist allows only its entries, minus any negated
//! exceptions.
//!
//! Wire form: `~` is the empty blacklist. Otherwise a comma-separated
//! list; a leading `*` switches to whitelist mode, where `!` prefixes
//! negated entries. Blacklist entries are always bare.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    /// Allow everything except the listed entries
    Blacklist,
    /// Allow only the listed entries, minus exceptions
    Whitelist,
}

/// An allow/deny-list over string elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    mode: FilterMode,
    entries: BTreeSet<String>,
    exceptions: BTreeSet<String>,
}

impl Filter {
    /// The empty blacklist: everything allowed
    pub fn empty() -> Self {
        Self {
            mode: FilterMode::Blacklist,
            entries: BTreeSet::new(),
            exceptions: BTreeSet::new(),
        }
    }

    pub fn blacklist(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode: FilterMode::Blacklist,
            entries: entries.into_iter().collect(),
            exceptions: BTreeSet::new(),
        }
    }

    pub fn whitelist(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode: FilterMode::Whitelist,
            entries: entries.into_iter().collect(),
            exceptions: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &str> {
        self.exceptions.iter().map(String::as_str)
    }

    /// Whether the element passes this filter
    pub fn allows(&self, element: &str) -> bool {
        match self.mode {
            FilterMode::Blacklist => !self.entries.contains(element),
            FilterMode::Whitelist => {
                self.entries.contains(element) && !self.exceptions.contains(element)
            }
        }
    }

    /// Add every explicit element of `other` to this filter
    pub fn union_with(&mut self, other: &Filter) {
        self.entries.extend(other.entries.iter().cloned());
        self.exceptions.extend(other.exceptions.iter().cloned());
    }

    /// Remove every explicit element of `other` from this filter
    pub fn subtract(&mut self, other: &Filter) {
        for entry in &other.entries {
            self.entries.remove(entry);
        }
        for exception in &other.exceptions {
            self.exceptions.remove(exception);
        }
    }

    /// Decode the wire form
    pub fn decode(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        if input.is_empty() || input == "~" {
            return Ok(Self::empty());
        }

        let (mode, list) = match input.strip_prefix('*') {
            Some(rest) => (FilterMode::Whitelist, rest),
            None => (FilterMode::Blacklist, input),
        };

        let mut entries = BTreeSet::new();
        let mut exceptions = BTreeSet::new();
        for element in list.split(',') {
            let element = element.trim();
            if element.is_empty() {
                continue;
            }
            match element.strip_prefix('!') {
                Some(negated) if mode == FilterMode::Whitelist => {
                    if negated.is_empty() {
                        return Err(ParseError::InvalidFilter(
                            "bare '!' with no element".to_string(),
                        ));
                    }
                    exceptions.insert(negated.to_string());
                }
                Some(_) => {
                    return Err(ParseError::InvalidFilter(format!(
                        "negated element {:?} outside whitelist mode",
                        element
                    )));
                }
                None => {
                    entries.insert(element.to_string());
                }
            }
        }
        Ok(Self {
            mode,
            entries,
            exceptions,
        })
    }

    /// Encode to the wire form (sorted, so the output is deterministic)
    pub fn encode(&self) -> String {
        match self.mode {
            FilterMode::Blacklist => {
                if self.entries.is_empty() {
                    "~".to_string()
                } else {
                    self.entries.iter().cloned().collect::<Vec<_>>().join(",")
                }
            }
            FilterMode::Whitelist => {
                let elements: Vec<String> = self
                    .entries
                    .iter()
                    .cloned()
                    .chain(self.exceptions.iter().map(|e| format!("!{}", e)))
                    .collect();
                format!("*{}", elements.join(","))
            }
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::empty()
    }
}
