//! Immutable segment reader
//!
//! A `SegmentReader` pairs the segment's shared, immutable core (dictionary,
//! postings, stored fields, field cache) with one version of its live docs.
//! Cloning is cheap; applying deletes produces a new reader over the same
//! core while older clones keep seeing the previous live docs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LucernaError, Result};
use crate::models::{StoredDocument, TermVector};

use super::codec::{self, PostingsFormat};
use super::field_cache::{FieldCache, FieldLengths};
use super::live_docs::LiveDocs;
use super::postings::{PostingIterator, PostingsReader};
use super::store::SegmentFiles;
use super::stored::StoredFieldsReader;
use super::term_dict::{TermDictionary, TermEnum};
use super::types::{DocId, SegmentId, Term, TermInfo};
use super::writer::SegmentData;

/// Metadata for a segment stored in the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    /// Number of documents written, deleted ones included
    pub max_doc: u32,
    /// Registry name of the postings format
    pub postings_format: String,
    pub term_count: u64,
    /// Size in bytes of the immutable segment files
    pub size_bytes: u64,
    /// CRC32 over the immutable segment files
    pub checksum: u32,
    pub created_at: u64,
}

struct SegmentCore {
    meta: SegmentMeta,
    format: PostingsFormat,
    terms: TermDictionary,
    postings: PostingsReader,
    stored: StoredFieldsReader,
    field_cache: FieldCache,
    /// Keeps the segment directory alive while any reader uses it
    files: Option<Arc<SegmentFiles>>,
}

/// Read access to one segment at one live-docs version
#[derive(Clone)]
pub struct SegmentReader {
    core: Arc<SegmentCore>,
    live_docs: Arc<LiveDocs>,
    del_gen: u64,
}

impl SegmentReader {
    /// Open a reader over decoded segment parts
    pub fn open(
        meta: SegmentMeta,
        terms: TermDictionary,
        postings: Vec<u8>,
        stored: Vec<u8>,
        live_docs: LiveDocs,
        del_gen: u64,
        files: Option<Arc<SegmentFiles>>,
    ) -> Result<Self> {
        let format = codec::lookup(&meta.postings_format)?;
        let stored = StoredFieldsReader::open(stored)?;
        if stored.len() != meta.max_doc as usize {
            return Err(LucernaError::Corrupt(format!(
                "{} stores {} documents but max_doc is {}",
                meta.id,
                stored.len(),
                meta.max_doc
            )));
        }
        if live_docs.max_doc() != meta.max_doc {
            return Err(LucernaError::Corrupt(format!(
                "{} live docs cover {} documents but max_doc is {}",
                meta.id,
                live_docs.max_doc(),
                meta.max_doc
            )));
        }

        Ok(Self {
            core: Arc::new(SegmentCore {
                meta,
                format,
                terms,
                postings: format.reader(postings),
                stored,
                field_cache: FieldCache::new(),
                files,
            }),
            live_docs: Arc::new(live_docs),
            del_gen,
        })
    }

    /// Open a reader directly over freshly written segment data
    pub fn from_data(data: SegmentData, files: Option<Arc<SegmentFiles>>) -> Result<Self> {
        Self::open(
            data.meta,
            data.dictionary,
            data.postings,
            data.stored,
            data.live_docs,
            0,
            files,
        )
    }

    /// Same segment, different live docs version
    pub fn with_live_docs(&self, live_docs: Arc<LiveDocs>, del_gen: u64) -> Self {
        Self {
            core: Arc::clone(&self.core),
            live_docs,
            del_gen,
        }
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.core.meta
    }

    pub fn id(&self) -> SegmentId {
        self.core.meta.id
    }

    pub fn format(&self) -> PostingsFormat {
        self.core.format
    }

    /// Live docs generation this reader was opened at
    pub fn del_gen(&self) -> u64 {
        self.del_gen
    }

    pub fn files(&self) -> Option<&Arc<SegmentFiles>> {
        self.core.files.as_ref()
    }

    /// Whether both readers share the same segment core
    pub fn same_core(&self, other: &SegmentReader) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub fn term_dictionary(&self) -> &TermDictionary {
        &self.core.terms
    }

    /// Enumerate all terms in ascending order; each call starts over
    pub fn terms(&self) -> TermEnum<'_> {
        self.core.terms.terms()
    }

    /// Enumeration positioned on the first term `>= term`
    pub fn seek_term(&self, term: &Term) -> Option<TermEnum<'_>> {
        self.core.terms.seek(term)
    }

    pub fn term_info(&self, term: &Term) -> Option<&TermInfo> {
        self.core.terms.get(term)
    }

    /// Postings written for `term`, deleted docs included
    pub fn doc_freq(&self, term: &Term) -> u32 {
        self.term_info(term).map_or(0, |info| info.doc_frequency)
    }

    pub fn total_term_freq(&self, term: &Term) -> u64 {
        self.term_info(term).map_or(0, |info| info.total_term_frequency)
    }

    /// Raw posting iterator for `term`; callers filter deleted docs
    pub fn postings(&self, term: &Term) -> Result<Option<PostingIterator<'_>>> {
        match self.core.terms.get(term) {
            Some(info) => Ok(Some(self.core.postings.postings(info)?)),
            None => Ok(None),
        }
    }

    pub fn postings_for(&self, info: &TermInfo) -> Result<PostingIterator<'_>> {
        self.core.postings.postings(info)
    }

    /// Documents written to the segment, deleted ones included
    pub fn max_doc(&self) -> u32 {
        self.core.meta.max_doc
    }

    pub fn total_doc_count(&self) -> u32 {
        self.max_doc()
    }

    pub fn live_doc_count(&self) -> u32 {
        self.live_docs.live_count()
    }

    pub fn deleted_doc_count(&self) -> u32 {
        self.live_docs.deleted_count()
    }

    pub fn delete_ratio(&self) -> f64 {
        self.live_docs.delete_ratio()
    }

    pub fn is_deleted(&self, doc: DocId) -> bool {
        self.live_docs.is_deleted(doc)
    }

    pub fn live_docs(&self) -> &LiveDocs {
        &self.live_docs
    }

    /// Point-in-time live docs; later deletes never change the returned value
    pub fn acquire_live_docs_snapshot(&self) -> Arc<LiveDocs> {
        Arc::clone(&self.live_docs)
    }

    /// Stored fields of a live document
    pub fn document(&self, doc: DocId) -> Result<StoredDocument> {
        if doc.0 >= self.max_doc() || self.is_deleted(doc) {
            return Err(LucernaError::DocNotFound(doc.0));
        }
        self.core.stored.document(doc)
    }

    /// Encoded stored record, deleted docs included (used when merging)
    pub fn stored_raw(&self, doc: DocId) -> Result<&[u8]> {
        self.core.stored.raw(doc)
    }

    /// Term vector of `field` in a live document, if one was stored
    pub fn term_vector(&self, doc: DocId, field: &str) -> Result<Option<TermVector>> {
        let stored = self.document(doc)?;
        Ok(stored
            .term_vectors
            .into_iter()
            .find(|tv| tv.field == field))
    }

    /// Per-document token counts of `field`, cached per segment
    pub fn field_lengths(&self, field: &str) -> Result<Arc<FieldLengths>> {
        self.core.field_cache.field_lengths(
            field,
            &self.core.terms,
            &self.core.postings,
            self.max_doc(),
        )
    }

    pub fn field_cache(&self) -> &FieldCache {
        &self.core.field_cache
    }

    pub fn term_count(&self) -> usize {
        self.core.terms.len()
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("id", &self.id())
            .field("max_doc", &self.max_doc())
            .field("live", &self.live_doc_count())
            .field("del_gen", &self.del_gen)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::models::{Document, Field};
    use crate::segment::buffer::DocumentsBuffer;
    use crate::segment::writer::SegmentWriter;

    /// Build an in-memory segment with one `body` field per text
    pub(crate) fn segment_from_texts(id: u64, texts: &[&str]) -> SegmentReader {
        let analyzer = StandardAnalyzer::default();
        let mut buffer = DocumentsBuffer::new();
        for text in texts {
            let doc = Document::new()
                .with_field(Field::keyword("id", format!("{}-{}", id, buffer.doc_count())))
                .with_field(Field::text("body", *text).with_term_vectors());
            buffer.add_document(&doc, &analyzer).unwrap();
        }
        let data = SegmentWriter::new(SegmentId(id), PostingsFormat::default())
            .write_from_buffer(&buffer)
            .unwrap();
        SegmentReader::from_data(data, None).unwrap()
    }

    #[test]
    fn test_reader_stats_and_postings() {
        let reader = segment_from_texts(1, &["a b c", "b c d", "c d e"]);
        assert_eq!(reader.max_doc(), 3);
        assert_eq!(reader.live_doc_count(), 3);
        assert_eq!(reader.doc_freq(&Term::new("body", "c")), 3);
        assert_eq!(reader.doc_freq(&Term::new("body", "zzz")), 0);

        let mut iter = reader.postings(&Term::new("body", "d")).unwrap().unwrap();
        assert_eq!(iter.next_doc().unwrap(), Some(DocId(1)));
        assert_eq!(iter.next_doc().unwrap(), Some(DocId(2)));
        assert_eq!(iter.next_doc().unwrap(), None);
        assert!(reader.postings(&Term::new("body", "q")).unwrap().is_none());
    }

    #[test]
    fn test_terms_ascending_and_restartable() {
        let reader = segment_from_texts(1, &["b a", "c"]);
        let first: Vec<Term> = reader.terms().map(|r| r.unwrap().0).collect();
        assert!(first.windows(2).all(|w| w[0] < w[1]));
        let second: Vec<Term> = reader.terms().map(|r| r.unwrap().0).collect();
        assert_eq!(first, second);

        let mut seek = reader.seek_term(&Term::new("body", "bb")).unwrap();
        assert_eq!(seek.next().unwrap().unwrap().0, Term::new("body", "c"));
    }

    #[test]
    fn test_live_docs_copy_on_write() {
        let reader = segment_from_texts(1, &["x", "y"]);
        let snapshot = reader.acquire_live_docs_snapshot();

        let mut live = (*snapshot).clone();
        live.delete(DocId(0));
        let updated = reader.with_live_docs(Arc::new(live), 1);

        assert!(updated.is_deleted(DocId(0)));
        assert_eq!(updated.live_doc_count(), 1);
        assert!(!reader.is_deleted(DocId(0)));
        assert!(!snapshot.is_deleted(DocId(0)));
        assert!(updated.same_core(&reader));
        assert_eq!(updated.del_gen(), 1);
    }

    #[test]
    fn test_document_lookup() {
        let reader = segment_from_texts(4, &["hello world"]);
        let doc = reader.document(DocId(0)).unwrap();
        assert_eq!(doc.get_text("body"), Some("hello world"));
        assert_eq!(doc.get_text("id"), Some("4-0"));
        assert!(matches!(
            reader.document(DocId(1)),
            Err(LucernaError::DocNotFound(1))
        ));

        let vector = reader.term_vector(DocId(0), "body").unwrap().unwrap();
        assert_eq!(vector.terms.len(), 2);
        assert!(reader.term_vector(DocId(0), "id").unwrap().is_none());

        let mut live = LiveDocs::new(1);
        live.delete(DocId(0));
        let deleted = reader.with_live_docs(Arc::new(live), 1);
        assert!(matches!(
            deleted.document(DocId(0)),
            Err(LucernaError::DocNotFound(0))
        ));
    }

    #[test]
    fn test_field_lengths_shared_across_versions() {
        let reader = segment_from_texts(1, &["a b c", "d"]);
        let lengths = reader.field_lengths("body").unwrap();
        assert_eq!(lengths.get(0), 3);
        assert_eq!(lengths.get(1), 1);

        let other = reader.with_live_docs(Arc::new(LiveDocs::new(2)), 1);
        assert!(Arc::ptr_eq(&lengths, &other.field_lengths("body").unwrap()));
    }
}
