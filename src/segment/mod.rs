//! Segment-based inverted index storage
//!
//! Documents are inverted into an in-memory buffer and flushed as immutable
//! segments. Each segment holds a term dictionary, postings, stored fields
//! and a versioned live-docs bitmap. Segments are combined by the merge
//! engine and published through numbered commit manifests.
//!
//! # Architecture
//!
//! - `DocumentsBuffer`: in-memory inverted buffer for unflushed documents
//! - `SegmentWriter` / `SegmentData`: turns a buffer into segment files
//! - `SegmentReader`: shared immutable core plus one live-docs version
//! - `SegmentStore`: directory layout, atomic writes, reference-counted deletion
//! - `SegmentManifest`: the segment set of one commit generation
//! - `MergeEngine` / `TieredMergePolicy`: what to merge and how

mod types;
mod buffer;
mod codec;
mod postings;
mod term_dict;
mod live_docs;
mod stored;
mod field_cache;
pub(crate) mod reader;
mod writer;
mod store;
mod manifest;
mod merge;
mod merge_policy;

pub use types::*;
pub use buffer::*;
pub use codec::*;
pub use postings::*;
pub use term_dict::*;
pub use live_docs::*;
pub use stored::*;
pub use field_cache::*;
pub use reader::*;
pub use writer::*;
pub use store::*;
pub use manifest::*;
pub use merge::*;
pub use merge_policy::*;
