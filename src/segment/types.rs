//! Core types for the segment-based index

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LucernaError, Result};

/// Segment identifier (monotonically increasing per index)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

/// Dense document number within a segment (0..max_doc)
///
/// Assigned in insertion order at flush time; not stable across merges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub const MAX: DocId = DocId(u32::MAX);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Separator between field name and term text in dictionary keys
pub const TERM_KEY_SEPARATOR: u8 = 0x00;

/// A term: the unit of indexing, ordered by `(field, text)` on unsigned bytes
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub field: String,
    pub text: Vec<u8>,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<Vec<u8>>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
        }
    }

    /// The term text as UTF-8, if it is valid UTF-8
    pub fn text_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.text).ok()
    }

    /// Encode the term as a dictionary key (`field ‖ 0x00 ‖ text`).
    ///
    /// Field names never contain NUL, so key byte order equals `(field, text)` order.
    pub fn to_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.field.len() + 1 + self.text.len());
        key.extend_from_slice(self.field.as_bytes());
        key.push(TERM_KEY_SEPARATOR);
        key.extend_from_slice(&self.text);
        key
    }

    /// Key prefix shared by every term of `field`
    pub fn field_key_prefix(field: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(field.len() + 1);
        key.extend_from_slice(field.as_bytes());
        key.push(TERM_KEY_SEPARATOR);
        key
    }

    /// Decode a dictionary key back into a term
    pub fn from_key(key: &[u8]) -> Result<Self> {
        let sep = key
            .iter()
            .position(|&b| b == TERM_KEY_SEPARATOR)
            .ok_or_else(|| LucernaError::decode("term key without field separator"))?;
        let field = std::str::from_utf8(&key[..sep])
            .map_err(|e| LucernaError::decode(format!("field name is not UTF-8: {}", e)))?;
        Ok(Self {
            field: field.to_string(),
            text: key[sep + 1..].to_vec(),
        })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, String::from_utf8_lossy(&self.text))
    }
}

/// Validate a field name for use in term keys
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LucernaError::InvalidArgument(
            "field name must not be empty".to_string(),
        ));
    }
    if name.as_bytes().contains(&TERM_KEY_SEPARATOR) {
        return Err(LucernaError::InvalidArgument(format!(
            "field name {:?} contains a NUL byte",
            name
        )));
    }
    Ok(())
}

/// A single posting entry within a posting list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Document number within the segment
    pub doc: DocId,
    /// Term frequency in this document
    pub term_frequency: u32,
    /// Token positions (empty when positions are not indexed)
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc: DocId, term_frequency: u32) -> Self {
        Self {
            doc,
            term_frequency,
            positions: Vec::new(),
        }
    }

    pub fn with_positions(doc: DocId, positions: Vec<u32>) -> Self {
        Self {
            doc,
            term_frequency: positions.len() as u32,
            positions,
        }
    }
}

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Posting list metadata stored in the term dictionary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    /// Offset in the postings file
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
    /// Number of postings (deleted documents included until merged away)
    pub doc_frequency: u32,
    /// Total term frequency across all postings
    pub total_term_frequency: u64,
    /// Whether positions are stored for this list
    pub has_positions: bool,
}
