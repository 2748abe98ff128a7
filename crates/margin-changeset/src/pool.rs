// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribute pools: the code ↔ `(name, value)` dictionary a changeset's `*N`
//! markers refer to.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A `(name, value)` attribute pair. Serialises as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute(pub String, pub String);

impl Attribute {
    /// Build an attribute from name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(name.into(), value.into())
    }

    /// Attribute name (e.g. `comment`).
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Attribute value (e.g. a comment id, or empty when clearing).
    pub fn value(&self) -> &str {
        &self.1
    }
}

/// Errors raised when loading a pool from its jsonable form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// A `numToAttrib` key is not a decimal code.
    #[error("attribute code {0:?} is not a decimal integer")]
    BadCode(String),
    /// Every code up to `u32::MAX` is taken.
    #[error("attribute pool exhausted")]
    Exhausted,
}

/// Wire/JSON form of a pool: `{"numToAttrib": {"0": ["comment","c-1"]}, "nextNum": 1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonablePool {
    /// Decimal code → attribute.
    pub num_to_attrib: BTreeMap<String, Attribute>,
    /// Next code the sender would allocate.
    #[serde(default)]
    pub next_num: u32,
}

/// Bidirectional attribute dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePool {
    num_to_attrib: BTreeMap<u32, Attribute>,
    attrib_to_num: HashMap<Attribute, u32>,
    next_num: u32,
}

impl AttributePool {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the code for `attrib`, allocating the next one when absent.
    pub fn put_attrib(&mut self, attrib: Attribute) -> Result<u32, PoolError> {
        if let Some(code) = self.attrib_to_num.get(&attrib) {
            return Ok(*code);
        }
        let code = self.next_num;
        self.next_num = code.checked_add(1).ok_or(PoolError::Exhausted)?;
        self.attrib_to_num.insert(attrib.clone(), code);
        self.num_to_attrib.insert(code, attrib);
        Ok(code)
    }

    /// Code already assigned to `attrib`, if any.
    pub fn lookup(&self, attrib: &Attribute) -> Option<u32> {
        self.attrib_to_num.get(attrib).copied()
    }

    /// Attribute for `code`.
    pub fn get_attrib(&self, code: u32) -> Option<&Attribute> {
        self.num_to_attrib.get(&code)
    }

    /// Attribute name for `code`.
    pub fn get_attrib_key(&self, code: u32) -> Option<&str> {
        self.get_attrib(code).map(Attribute::name)
    }

    /// Number of attributes in the pool.
    pub fn len(&self) -> usize {
        self.num_to_attrib.len()
    }

    /// True when no attribute has been registered.
    pub fn is_empty(&self) -> bool {
        self.num_to_attrib.is_empty()
    }

    /// Load a pool from its jsonable form. `nextNum` is raised past the
    /// highest code present when the sender under-reports it.
    pub fn from_jsonable(jsonable: JsonablePool) -> Result<Self, PoolError> {
        let mut pool = Self::new();
        for (key, attrib) in jsonable.num_to_attrib {
            let code: u32 = key.parse().map_err(|_| PoolError::BadCode(key.clone()))?;
            pool.attrib_to_num.entry(attrib.clone()).or_insert(code);
            pool.num_to_attrib.insert(code, attrib);
            pool.next_num = pool.next_num.max(code.saturating_add(1));
        }
        pool.next_num = pool.next_num.max(jsonable.next_num);
        Ok(pool)
    }

    /// Jsonable form of this pool.
    pub fn to_jsonable(&self) -> JsonablePool {
        JsonablePool {
            num_to_attrib: self
                .num_to_attrib
                .iter()
                .map(|(code, attrib)| (code.to_string(), attrib.clone()))
                .collect(),
            next_num: self.next_num,
        }
    }
}
