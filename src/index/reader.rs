use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{LucernaError, Result};
use crate::models::{StoredDocument, TermVector};
use crate::segment::{DocId, SegmentReader, SegmentStore, Term};

/// Attempts at opening a commit that a writer keeps replacing
const OPEN_RETRIES: usize = 3;

/// Point-in-time view over a fixed list of segments.
///
/// Global doc ids are `doc_base(segment) + segment doc`; they are only
/// meaningful for this reader. Cloning is cheap and clones share segments.
#[derive(Clone, Debug)]
pub struct IndexReader {
    segments: Arc<Vec<SegmentReader>>,
    doc_bases: Arc<Vec<u64>>,
    generation: u64,
    max_doc: u64,
    num_docs: u64,
}

impl IndexReader {
    /// Open the newest commit in `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = SegmentStore::open_existing(path.as_ref())?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let manifest = store
                .load_latest_manifest()?
                .ok_or_else(|| LucernaError::IndexNotFound(store.path().to_path_buf()))?;

            let opened: Result<Vec<SegmentReader>> = manifest
                .iter()
                .map(|info| store.read_segment(info, None))
                .collect();
            match opened {
                Ok(segments) => {
                    debug!(
                        generation = manifest.generation,
                        segments = segments.len(),
                        "opened index reader"
                    );
                    return Ok(Self::from_segments(segments, manifest.generation));
                }
                Err(e) if attempt < OPEN_RETRIES && newer_commit(&store, manifest.generation) => {
                    // a writer committed and cleaned up underneath us
                    warn!("Commit {} changed while opening: {}", manifest.generation, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reader over already-open segments
    pub fn from_segments(segments: Vec<SegmentReader>, generation: u64) -> Self {
        let mut doc_bases = Vec::with_capacity(segments.len());
        let mut max_doc = 0u64;
        let mut num_docs = 0u64;
        for segment in &segments {
            doc_bases.push(max_doc);
            max_doc += segment.max_doc() as u64;
            num_docs += segment.live_doc_count() as u64;
        }
        Self {
            segments: Arc::new(segments),
            doc_bases: Arc::new(doc_bases),
            generation,
            max_doc,
            num_docs,
        }
    }

    pub fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    pub fn segment(&self, ord: usize) -> Option<&SegmentReader> {
        self.segments.get(ord)
    }

    /// First global doc id of segment `ord`
    pub fn doc_base(&self, ord: usize) -> Option<u64> {
        self.doc_bases.get(ord).copied()
    }

    /// Split a global doc id into segment ordinal and segment doc
    pub fn resolve(&self, global: u64) -> Option<(usize, DocId)> {
        if global >= self.max_doc {
            return None;
        }
        let ord = self.doc_bases.partition_point(|&base| base <= global) - 1;
        Some((ord, DocId((global - self.doc_bases[ord]) as u32)))
    }

    fn locate(&self, global: u64) -> Result<(&SegmentReader, DocId)> {
        let (ord, doc) = self
            .resolve(global)
            .ok_or(LucernaError::DocNotFound(global.min(u32::MAX as u64) as u32))?;
        Ok((&self.segments[ord], doc))
    }

    /// Stored fields of a live document
    pub fn document(&self, global: u64) -> Result<StoredDocument> {
        let (segment, doc) = self.locate(global)?;
        segment.document(doc)
    }

    pub fn term_vector(&self, global: u64, field: &str) -> Result<Option<TermVector>> {
        let (segment, doc) = self.locate(global)?;
        segment.term_vector(doc, field)
    }

    pub fn is_deleted(&self, global: u64) -> bool {
        match self.resolve(global) {
            Some((ord, doc)) => self.segments[ord].is_deleted(doc),
            None => true,
        }
    }

    /// Documents containing `term` across segments, deleted ones included
    pub fn doc_freq(&self, term: &Term) -> u64 {
        self.segments.iter().map(|s| s.doc_freq(term) as u64).sum()
    }

    pub fn total_term_freq(&self, term: &Term) -> u64 {
        self.segments.iter().map(|s| s.total_term_freq(term)).sum()
    }

    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    pub fn max_doc(&self) -> u64 {
        self.max_doc
    }

    pub fn num_deleted_docs(&self) -> u64 {
        self.max_doc - self.num_docs
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Commit generation this reader was opened at (or last committed, for
    /// readers taken from a writer)
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn newer_commit(store: &SegmentStore, generation: u64) -> bool {
    store
        .manifest_generations()
        .map(|gens| gens.first().is_some_and(|&newest| newest > generation))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::reader::tests::segment_from_texts;

    #[test]
    fn test_resolve_global_ids() {
        let a = segment_from_texts(0, &["a", "b"]);
        let b = segment_from_texts(1, &["c"]);
        let c = segment_from_texts(2, &["d", "e", "f"]);
        let reader = IndexReader::from_segments(vec![a, b, c], 4);

        assert_eq!(reader.max_doc(), 6);
        assert_eq!(reader.num_docs(), 6);
        assert_eq!(reader.doc_base(2), Some(3));
        assert_eq!(reader.resolve(0), Some((0, DocId(0))));
        assert_eq!(reader.resolve(2), Some((1, DocId(0))));
        assert_eq!(reader.resolve(5), Some((2, DocId(2))));
        assert_eq!(reader.resolve(6), None);
        assert_eq!(reader.document(4).unwrap().get_text("body"), Some("e"));
        assert!(matches!(reader.document(9), Err(LucernaError::DocNotFound(9))));
    }

    #[test]
    fn test_doc_freq_sums_segments() {
        let a = segment_from_texts(0, &["x y", "x"]);
        let b = segment_from_texts(1, &["x"]);
        let reader = IndexReader::from_segments(vec![a, b], 1);
        assert_eq!(reader.doc_freq(&Term::new("body", "x")), 3);
        assert_eq!(reader.doc_freq(&Term::new("body", "y")), 1);
        assert_eq!(reader.doc_freq(&Term::new("body", "nope")), 0);
    }

    #[test]
    fn test_open_missing_index() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            IndexReader::open(dir.path().join("absent")),
            Err(LucernaError::IndexNotFound(_))
        ));
        assert!(matches!(
            IndexReader::open(dir.path()),
            Err(LucernaError::IndexNotFound(_))
        ));
    }
}
