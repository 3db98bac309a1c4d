//! Segment writer for creating new immutable segments
//!
//! A flushed segment is fully assembled in memory as `SegmentData` (postings,
//! term dictionary, stored fields and initial live docs) before anything
//! touches disk; the store then persists it atomically.

use crc32fast::Hasher;
use tracing::debug;

use crate::error::Result;

use super::buffer::DocumentsBuffer;
use super::codec::PostingsFormat;
use super::live_docs::LiveDocs;
use super::postings::PostingsWriter;
use super::reader::SegmentMeta;
use super::stored::StoredFieldsWriter;
use super::term_dict::{TermDictionary, TermDictionaryBuilder};
use super::types::{current_timestamp, DocId, Posting, SegmentId, Term};

/// A complete segment ready to be persisted
pub struct SegmentData {
    pub meta: SegmentMeta,
    pub postings: Vec<u8>,
    pub terms_fst: Vec<u8>,
    pub term_infos: Vec<u8>,
    pub stored: Vec<u8>,
    /// Deletions known at write time (buffered deletes)
    pub live_docs: LiveDocs,
    /// The dictionary already built for `terms_fst`
    pub dictionary: TermDictionary,
}

impl SegmentData {
    /// Checksum over all immutable segment files.
    ///
    /// Coverage: postings, FST, term infos, stored fields (in that order).
    /// Live docs carry their own checksum since they change per generation.
    pub fn compute_checksum(postings: &[u8], fst: &[u8], infos: &[u8], stored: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(postings);
        hasher.update(fst);
        hasher.update(infos);
        hasher.update(stored);
        hasher.finalize()
    }

    /// Assemble the output of a terms writer and a stored fields writer
    pub fn assemble(
        id: SegmentId,
        format: PostingsFormat,
        terms: TermsWriter,
        stored: StoredFieldsWriter,
        live_docs: LiveDocs,
    ) -> Result<Self> {
        let max_doc = stored.len() as u32;
        let (postings, dictionary) = terms.finish()?;
        let terms_fst = dictionary.fst_bytes().to_vec();
        let term_infos = dictionary.info_bytes()?;
        let stored = stored.finish();

        let checksum = Self::compute_checksum(&postings, &terms_fst, &term_infos, &stored);
        let meta = SegmentMeta {
            id,
            max_doc,
            postings_format: format.name().to_string(),
            term_count: dictionary.len() as u64,
            size_bytes: (postings.len() + terms_fst.len() + term_infos.len() + stored.len())
                as u64,
            checksum,
            created_at: current_timestamp(),
        };

        Ok(Self {
            meta,
            postings,
            terms_fst,
            term_infos,
            stored,
            live_docs,
            dictionary,
        })
    }
}

/// Writes terms with their posting lists in ascending term order
pub struct TermsWriter {
    postings: PostingsWriter,
    dictionary: TermDictionaryBuilder,
}

impl TermsWriter {
    pub fn new(format: PostingsFormat) -> Self {
        Self {
            postings: format.writer(),
            dictionary: TermDictionaryBuilder::new(),
        }
    }

    /// Append one term. Fails with `OutOfOrderTerm` before writing anything
    /// if `term` does not sort after the previous one.
    pub fn write_term(
        &mut self,
        term: &Term,
        postings: &[Posting],
        with_positions: bool,
    ) -> Result<()> {
        self.write_key(&term.to_key(), postings, with_positions)
    }

    pub fn write_key(
        &mut self,
        key: &[u8],
        postings: &[Posting],
        with_positions: bool,
    ) -> Result<()> {
        self.dictionary.check_key_order(key)?;
        let info = self.postings.write_posting_list(postings, with_positions)?;
        self.dictionary.add_key(key, info)
    }

    pub fn term_count(&self) -> usize {
        self.dictionary.len()
    }

    pub fn finish(self) -> Result<(Vec<u8>, TermDictionary)> {
        let dictionary = self.dictionary.finish()?;
        Ok((self.postings.into_data(), dictionary))
    }
}

/// Writer for creating segments from the in-memory buffer
pub struct SegmentWriter {
    segment_id: SegmentId,
    format: PostingsFormat,
}

impl SegmentWriter {
    pub fn new(segment_id: SegmentId, format: PostingsFormat) -> Self {
        Self { segment_id, format }
    }

    /// Write a segment from the buffer; the buffer itself is left untouched
    pub fn write_from_buffer(&self, buffer: &DocumentsBuffer) -> Result<SegmentData> {
        let mut terms = TermsWriter::new(self.format);
        for (term, buffered) in buffer.sorted_terms() {
            terms.write_term(term, &buffered.postings, buffered.with_positions)?;
        }

        let mut stored = StoredFieldsWriter::new();
        for doc in buffer.stored_documents() {
            stored.add(doc)?;
        }

        let mut live_docs = LiveDocs::new(buffer.doc_count());
        for (doc, &deleted) in buffer.deleted_flags().iter().enumerate() {
            if deleted {
                live_docs.delete(DocId(doc as u32));
            }
        }

        let data = SegmentData::assemble(self.segment_id, self.format, terms, stored, live_docs)?;
        debug!(
            segment = %self.segment_id,
            docs = data.meta.max_doc,
            terms = data.meta.term_count,
            bytes = data.meta.size_bytes,
            "segment written from buffer"
        );
        Ok(data)
    }
}
