//! Path-prefix failure table.
//!
//! # Grammar
//! ```text
//! table := "" | entry (";" entry)*
//! entry := prefix ":" code
//! ```
//!
//! # Design Decisions
//! - Prefix matching is byte-wise and case-sensitive
//! - Overlapping prefixes resolve to the longest match
//! - Duplicate prefixes: the last entry wins

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned for a malformed `prefix:code;...` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrefixFormatError {
    #[error("decoding {input:?}: entry {entry:?} is not of the form prefix:code")]
    MalformedEntry { input: String, entry: String },

    #[error("decoding {input:?}: entry {entry:?} has an empty prefix")]
    EmptyPrefix { input: String, entry: String },

    #[error("cannot convert {code:?} to a status code: {source}")]
    InvalidCode {
        code: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Mapping from path prefix to the status code requests under it fail with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrefixFailureTable {
    entries: BTreeMap<String, u16>,
}

impl PrefixFailureTable {
    /// Parse a table from its `prefix:code;prefix:code` form.
    pub fn parse(input: &str) -> Result<Self, PrefixFormatError> {
        let mut entries = BTreeMap::new();
        if input.is_empty() {
            return Ok(Self { entries });
        }

        for entry in input.split(';') {
            let fields: Vec<&str> = entry.split(':').collect();
            let [prefix, code] = fields[..] else {
                return Err(PrefixFormatError::MalformedEntry {
                    input: input.to_string(),
                    entry: entry.to_string(),
                });
            };
            if prefix.is_empty() {
                return Err(PrefixFormatError::EmptyPrefix {
                    input: input.to_string(),
                    entry: entry.to_string(),
                });
            }
            let code = code.parse::<u16>().map_err(|source| PrefixFormatError::InvalidCode {
                code: code.to_string(),
                source,
            })?;
            entries.insert(prefix.to_string(), code);
        }

        Ok(Self { entries })
    }

    /// Returns the status code of the longest prefix of `path`, if any.
    pub fn match_path(&self, path: &str) -> Option<u16> {
        self.entries
            .iter()
            .filter(|(prefix, _)| path.as_bytes().starts_with(prefix.as_bytes()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, code)| *code)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over `(prefix, code)` pairs, sorted by prefix.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), *c))
    }
}

impl FromStr for PrefixFailureTable {
    type Err = PrefixFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PrefixFailureTable {
    type Error = PrefixFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrefixFailureTable> for String {
    fn from(table: PrefixFailureTable) -> Self {
        table.to_string()
    }
}

impl fmt::Display for PrefixFailureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (prefix, code)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}:{}", prefix, code)?;
        }
        Ok(())
    }
}
