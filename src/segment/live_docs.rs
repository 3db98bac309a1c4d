//! Per-segment deletion tracking
//!
//! Deletions are kept as a roaring bitmap of deleted doc ids bounded by the
//! segment's `max_doc`. A `LiveDocs` value is immutable once shared: the
//! writer clones it, applies deletes to the clone and publishes the new
//! version, so readers holding the old `Arc` keep their view.
//!
//! File format (`live_<delgen>.bin`): `u32le(max_doc)`, `u32le(bitmap_len)`,
//! the serialized bitmap, `u32le(crc32)` over everything before it.

use roaring::RoaringBitmap;

use crate::error::{LucernaError, Result};

use super::types::DocId;

#[derive(Clone, Debug, PartialEq)]
pub struct LiveDocs {
    max_doc: u32,
    deleted: RoaringBitmap,
}

impl LiveDocs {
    /// All documents live
    pub fn new(max_doc: u32) -> Self {
        Self {
            max_doc,
            deleted: RoaringBitmap::new(),
        }
    }

    /// Build from an explicit deleted set; ids past `max_doc` are rejected
    pub fn from_deleted(max_doc: u32, deleted: RoaringBitmap) -> Result<Self> {
        if let Some(max) = deleted.max() {
            if max >= max_doc {
                return Err(LucernaError::InvalidArgument(format!(
                    "deleted doc {} out of range for max_doc {}",
                    max, max_doc
                )));
            }
        }
        Ok(Self { max_doc, deleted })
    }

    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    pub fn is_deleted(&self, doc: DocId) -> bool {
        self.deleted.contains(doc.0)
    }

    /// Live means in range and not deleted
    pub fn is_live(&self, doc: DocId) -> bool {
        doc.0 < self.max_doc && !self.deleted.contains(doc.0)
    }

    /// Mark `doc` deleted; returns `true` if it was live before
    pub fn delete(&mut self, doc: DocId) -> bool {
        doc.0 < self.max_doc && self.deleted.insert(doc.0)
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted.len() as u32
    }

    pub fn live_count(&self) -> u32 {
        self.max_doc - self.deleted_count()
    }

    pub fn has_deletions(&self) -> bool {
        !self.deleted.is_empty()
    }

    /// Fraction of documents deleted (for merge selection)
    pub fn delete_ratio(&self) -> f64 {
        if self.max_doc == 0 {
            0.0
        } else {
            self.deleted.len() as f64 / self.max_doc as f64
        }
    }

    pub fn deleted(&self) -> &RoaringBitmap {
        &self.deleted
    }

    /// Iterate live doc ids in ascending order
    pub fn iter_live(&self) -> impl Iterator<Item = DocId> + '_ {
        (0..self.max_doc)
            .filter(move |doc| !self.deleted.contains(*doc))
            .map(DocId)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut bitmap = Vec::with_capacity(self.deleted.serialized_size());
        self.deleted.serialize_into(&mut bitmap)?;

        let mut output = Vec::with_capacity(bitmap.len() + 12);
        output.extend_from_slice(&self.max_doc.to_le_bytes());
        output.extend_from_slice(&(bitmap.len() as u32).to_le_bytes());
        output.extend_from_slice(&bitmap);
        let checksum = crc32fast::hash(&output);
        output.extend_from_slice(&checksum.to_le_bytes());
        Ok(output)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(LucernaError::Corrupt("live docs file too short".to_string()));
        }
        let (body, tail) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        if crc32fast::hash(body) != stored {
            return Err(LucernaError::Corrupt("live docs checksum mismatch".to_string()));
        }

        let max_doc = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        let len = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) as usize;
        let bitmap = body
            .get(8..8 + len)
            .ok_or_else(|| LucernaError::decode("live docs bitmap truncated"))?;
        let deleted = RoaringBitmap::deserialize_from(bitmap)
            .map_err(|e| LucernaError::decode(format!("live docs bitmap: {}", e)))?;
        Self::from_deleted(max_doc, deleted)
            .map_err(|e| LucernaError::Corrupt(e.to_string()))
    }
}
