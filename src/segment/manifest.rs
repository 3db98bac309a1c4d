//! Commit points
//!
//! A commit is one `segments_<generation>` file listing the active segments
//! in order, each with the live-docs generation it was committed at. The
//! file is written to a temp name, fsynced and renamed, so a reader either
//! sees the whole manifest or the previous one.
//!
//! File format: `b"LSEG"`, `u32le(version)`, bincode payload,
//! `u32le(crc32)` over everything before it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::{LucernaError, Result};

use super::reader::SegmentMeta;
use super::types::{current_timestamp, SegmentId};

const MAGIC: &[u8; 4] = b"LSEG";
const MANIFEST_PREFIX: &str = "segments_";

/// Manifest entry for one committed segment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCommitInfo {
    pub meta: SegmentMeta,
    /// Generation of the `live_<del_gen>.bin` file to load
    pub del_gen: u64,
    pub live_doc_count: u32,
}

impl SegmentCommitInfo {
    pub fn id(&self) -> SegmentId {
        self.meta.id
    }
}

/// The segment set of one commit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentManifest {
    /// Manifest format version
    pub version: u32,
    /// Commit generation, strictly increasing
    pub generation: u64,
    /// Next segment ID to allocate
    pub next_segment_id: SegmentId,
    /// Active segments in index order
    pub segments: Vec<SegmentCommitInfo>,
    /// Timestamp of the commit
    pub updated_at: u64,
}

impl SegmentManifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    /// Empty manifest of a fresh index (never written)
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            generation: 0,
            next_segment_id: SegmentId::new(0),
            segments: Vec::new(),
            updated_at: 0,
        }
    }

    /// Manifest for the next commit
    pub fn next_generation(
        &self,
        next_segment_id: SegmentId,
        segments: Vec<SegmentCommitInfo>,
    ) -> Self {
        Self {
            version: Self::VERSION,
            generation: self.generation + 1,
            next_segment_id,
            segments,
            updated_at: current_timestamp(),
        }
    }

    /// File name of the manifest for `generation`
    pub fn file_name(generation: u64) -> String {
        format!("{}{}", MANIFEST_PREFIX, generation)
    }

    /// Generation encoded in a manifest file name, if it is one
    pub fn parse_generation(name: &str) -> Option<u64> {
        name.strip_prefix(MANIFEST_PREFIX)?.parse().ok()
    }

    /// Documents written across all segments, deleted ones included
    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.meta.max_doc as u64).sum()
    }

    pub fn total_live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_doc_count as u64).sum()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.meta.size_bytes).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get_segment(&self, id: SegmentId) -> Option<&SegmentCommitInfo> {
        self.segments.iter().find(|s| s.meta.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentCommitInfo> {
        self.segments.iter()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut output = Vec::with_capacity(payload.len() + 12);
        output.extend_from_slice(MAGIC);
        output.extend_from_slice(&self.version.to_le_bytes());
        output.extend_from_slice(&payload);
        let checksum = crc32fast::hash(&output);
        output.extend_from_slice(&checksum.to_le_bytes());
        Ok(output)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 12 || &data[..4] != MAGIC {
            return Err(LucernaError::Corrupt("not a segments manifest".to_string()));
        }
        let (body, tail) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        if crc32fast::hash(body) != stored {
            return Err(LucernaError::Corrupt("manifest checksum mismatch".to_string()));
        }
        let version = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        if version != Self::VERSION {
            return Err(LucernaError::Corrupt(format!(
                "unsupported manifest version {}",
                version
            )));
        }
        Ok(bincode::deserialize(&body[8..])?)
    }

    /// Human-readable dump of the manifest
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LucernaError::encode(format!("manifest json: {}", e)))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| LucernaError::decode(format!("manifest json: {}", e)))
    }
}

impl Default for SegmentManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Last published commit, readable without taking the writer lock
pub struct ManifestHolder {
    inner: ArcSwap<SegmentManifest>,
}

impl ManifestHolder {
    pub fn new(manifest: SegmentManifest) -> Self {
        Self {
            inner: ArcSwap::from_pointee(manifest),
        }
    }

    pub fn load(&self) -> Arc<SegmentManifest> {
        self.inner.load_full()
    }

    pub fn store(&self, manifest: SegmentManifest) {
        self.inner.store(Arc::new(manifest));
    }

    pub fn generation(&self) -> u64 {
        self.inner.load().generation
    }
}

impl Default for ManifestHolder {
    fn default() -> Self {
        Self::new(SegmentManifest::new())
    }
}
