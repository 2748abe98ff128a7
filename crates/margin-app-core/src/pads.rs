// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pad id resolution port: maps read-only aliases onto the canonical pad id
//! rooms are keyed by.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Outcome of resolving a raw pad id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPad {
    /// Canonical pad id.
    pub canonical: String,
    /// True when the raw id was a read-only alias.
    pub read_only: bool,
}

/// Errors raised by pad resolvers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PadError {
    /// Raw id is empty or has a disallowed shape.
    #[error("invalid pad id {0:?}")]
    Invalid(String),
    /// Read-only alias that maps to no pad.
    #[error("unknown read-only alias {0:?}")]
    UnknownAlias(String),
}

/// Resolves raw pad ids to canonical ones.
pub trait PadResolver: Send + Sync {
    /// Resolve `raw`.
    fn resolve(&self, raw: &str) -> Result<ResolvedPad, PadError>;
}

/// Static alias table: `alias → canonical id`. Ids with the read-only prefix
/// must be present in the table; any other id is already canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTable {
    /// Prefix marking read-only aliases.
    pub read_only_prefix: String,
    /// Alias → canonical pad id.
    pub aliases: BTreeMap<String, String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            read_only_prefix: "r.".to_owned(),
            aliases: BTreeMap::new(),
        }
    }
}

impl AliasTable {
    /// Empty table using the `r.` read-only prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias` for `canonical`.
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases.insert(alias.to_owned(), canonical.to_owned());
        self
    }

    fn is_alias_shaped(&self, raw: &str) -> bool {
        !self.read_only_prefix.is_empty() && raw.starts_with(&self.read_only_prefix)
    }
}

impl PadResolver for AliasTable {
    fn resolve(&self, raw: &str) -> Result<ResolvedPad, PadError> {
        if raw.trim().is_empty() {
            return Err(PadError::Invalid(raw.to_owned()));
        }
        if let Some(canonical) = self.aliases.get(raw) {
            return Ok(ResolvedPad {
                canonical: canonical.clone(),
                read_only: true,
            });
        }
        if self.is_alias_shaped(raw) {
            return Err(PadError::UnknownAlias(raw.to_owned()));
        }
        Ok(ResolvedPad {
            canonical: raw.to_owned(),
            read_only: false,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn alias_and_canonical_resolve_to_same_pad() {
        let table = AliasTable::new().with_alias("r.abc", "doc1");
        let ro = table.resolve("r.abc").unwrap();
        let rw = table.resolve("doc1").unwrap();
        assert_eq!(ro.canonical, rw.canonical);
        assert!(ro.read_only);
        assert!(!rw.read_only);
    }

    #[test]
    fn unknown_alias_and_empty_ids_fail() {
        let table = AliasTable::new();
        assert_eq!(
            table.resolve("r.nope"),
            Err(PadError::UnknownAlias("r.nope".into()))
        );
        assert_eq!(table.resolve("  "), Err(PadError::Invalid("  ".into())));
    }

    #[test]
    fn table_loads_from_json() {
        let table: AliasTable =
            serde_json::from_str(r#"{"read_only_prefix":"ro-","aliases":{"ro-1":"doc1"}}"#)
                .unwrap();
        assert!(table.resolve("ro-1").unwrap().read_only);
        assert!(table.resolve("ro-2").is_err());
        assert!(!table.resolve("r.x").unwrap().read_only);
    }
}
