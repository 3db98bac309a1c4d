//! Segment merging
//!
//! Merging walks every input's term enumeration through a k-way min-heap.
//! Each distinct term is written once, with the postings of every input that
//! holds it concatenated in input order. Deleted documents are dropped and the
//! survivors renumbered densely: input 0's live docs first, then input 1's.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::{LucernaError, Result};

use super::codec::PostingsFormat;
use super::live_docs::LiveDocs;
use super::reader::SegmentReader;
use super::stored::StoredFieldsWriter;
use super::term_dict::TermEnum;
use super::types::{DocId, Posting, SegmentId};
use super::writer::{SegmentData, TermsWriter};

/// Terms merged between two cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Old-to-new doc numbering for one merge input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocMap {
    mapping: Vec<Option<DocId>>,
    live: u32,
}

impl DocMap {
    /// Number the live docs of `live_docs` consecutively from `base`
    pub fn new(live_docs: &LiveDocs, base: u32) -> Self {
        let mut next = base;
        let mapping = (0..live_docs.max_doc())
            .map(|doc| {
                if live_docs.is_live(DocId(doc)) {
                    let new = DocId(next);
                    next += 1;
                    Some(new)
                } else {
                    None
                }
            })
            .collect();
        Self {
            mapping,
            live: next - base,
        }
    }

    /// New doc id of `doc`, or `None` if it was deleted when the merge started
    pub fn get(&self, doc: DocId) -> Option<DocId> {
        self.mapping.get(doc.as_usize()).copied().flatten()
    }

    pub fn live_count(&self) -> u32 {
        self.live
    }

    pub fn max_doc(&self) -> u32 {
        self.mapping.len() as u32
    }
}

/// Result of a merge, not yet persisted
pub struct MergeOutput {
    pub data: SegmentData,
    /// One map per input, in input order
    pub doc_maps: Vec<DocMap>,
}

/// Merges segments into one new segment
pub struct MergeEngine {
    format: PostingsFormat,
}

impl MergeEngine {
    pub fn new(format: PostingsFormat) -> Self {
        Self { format }
    }

    /// Merge `inputs` into a segment named `id`.
    ///
    /// Each input is read at the live docs it carries; deletes made later do
    /// not affect the output. Returns `MergeAborted` once `cancel` is set.
    /// Nothing is written to disk here, so an aborted or failed merge leaves
    /// no trace.
    pub fn merge(
        &self,
        id: SegmentId,
        inputs: &[SegmentReader],
        cancel: &AtomicBool,
    ) -> Result<MergeOutput> {
        let input_ids: Vec<SegmentId> = inputs.iter().map(|s| s.id()).collect();
        info!(segment = %id, inputs = ?input_ids, "merge started");

        let mut doc_maps = Vec::with_capacity(inputs.len());
        let mut base = 0u32;
        for input in inputs {
            let map = DocMap::new(input.live_docs(), base);
            base += map.live_count();
            doc_maps.push(map);
        }

        let terms = self.merge_terms(inputs, &doc_maps, cancel)?;
        let stored = merge_stored(inputs, &doc_maps)?;
        if cancel.load(Ordering::Acquire) {
            return Err(LucernaError::MergeAborted);
        }

        let data = SegmentData::assemble(id, self.format, terms, stored, LiveDocs::new(base))?;
        info!(
            segment = %id,
            docs = data.meta.max_doc,
            terms = data.meta.term_count,
            "merge finished"
        );
        Ok(MergeOutput { data, doc_maps })
    }

    fn merge_terms(
        &self,
        inputs: &[SegmentReader],
        doc_maps: &[DocMap],
        cancel: &AtomicBool,
    ) -> Result<TermsWriter> {
        let mut writer = TermsWriter::new(self.format);
        let mut enums: Vec<TermEnum<'_>> = inputs.iter().map(|s| s.terms()).collect();
        let mut heap: BinaryHeap<Reverse<(Vec<u8>, usize)>> = BinaryHeap::new();
        for (idx, terms) in enums.iter_mut().enumerate() {
            if let Some(key) = terms.peek_key() {
                heap.push(Reverse((key.to_vec(), idx)));
            }
        }

        let mut merged_terms = 0usize;
        let mut matching = Vec::with_capacity(inputs.len());
        while let Some(Reverse((key, first))) = heap.pop() {
            matching.clear();
            matching.push(first);
            while let Some(Reverse((next_key, _))) = heap.peek() {
                if *next_key != key {
                    break;
                }
                if let Some(Reverse((_, idx))) = heap.pop() {
                    matching.push(idx);
                }
            }
            matching.sort_unstable();

            let mut postings = Vec::new();
            let mut with_positions = true;
            for &idx in &matching {
                let Some((_, info)) = enums[idx].next_key()? else {
                    continue;
                };
                with_positions &= info.has_positions;
                let mut iter = inputs[idx].postings_for(&info)?;
                while let Some(doc) = iter.next_doc()? {
                    if let Some(new_doc) = doc_maps[idx].get(doc) {
                        postings.push(Posting {
                            doc: new_doc,
                            term_frequency: iter.term_frequency(),
                            positions: iter.positions().to_vec(),
                        });
                    }
                }
                if let Some(next) = enums[idx].peek_key() {
                    heap.push(Reverse((next.to_vec(), idx)));
                }
            }

            if !postings.is_empty() {
                if !with_positions {
                    for posting in &mut postings {
                        posting.positions.clear();
                    }
                }
                writer.write_key(&key, &postings, with_positions)?;
            }

            merged_terms += 1;
            if merged_terms % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Acquire) {
                debug!(merged_terms, "merge cancelled");
                return Err(LucernaError::MergeAborted);
            }
        }
        Ok(writer)
    }
}

fn merge_stored(inputs: &[SegmentReader], doc_maps: &[DocMap]) -> Result<StoredFieldsWriter> {
    let mut stored = StoredFieldsWriter::new();
    for (input, map) in inputs.iter().zip(doc_maps) {
        for doc in 0..map.max_doc() {
            if map.get(DocId(doc)).is_some() {
                stored.add_raw(input.stored_raw(DocId(doc))?);
            }
        }
    }
    Ok(stored)
}
