//! Leaf scorer over one posting list, skipping deleted docs

use std::sync::Arc;

use crate::error::{LucernaError, Result};
use crate::segment::{DocId, FieldLengths, LiveDocs, PostingIterator};

use super::scorer::{Scorer, ScorerState};
use super::similarity::Bm25Weight;

/// Scores the docs of one posting list, skipping deleted ones
pub struct TermScorer<'a> {
    postings: PostingIterator<'a>,
    live_docs: &'a LiveDocs,
    field_lengths: Arc<FieldLengths>,
    weight: Bm25Weight,
    state: ScorerState,
}

impl<'a> TermScorer<'a> {
    pub fn new(
        postings: PostingIterator<'a>,
        live_docs: &'a LiveDocs,
        field_lengths: Arc<FieldLengths>,
        weight: Bm25Weight,
    ) -> Self {
        Self {
            postings,
            live_docs,
            field_lengths,
            weight,
            state: ScorerState::Unstarted,
        }
    }

    /// Term frequency at the current doc
    pub fn term_frequency(&self) -> u32 {
        self.postings.term_frequency()
    }

    pub fn positions(&self) -> &[u32] {
        self.postings.positions()
    }

    /// Settle on `found` or the next live doc after it
    fn settle(&mut self, mut found: Option<DocId>) -> Result<bool> {
        while let Some(doc) = found {
            if self.live_docs.is_live(doc) {
                self.state = ScorerState::Positioned(doc);
                return Ok(true);
            }
            found = self.postings.next_doc()?;
        }
        self.state = ScorerState::Exhausted;
        Ok(false)
    }
}

impl<'a> Scorer for TermScorer<'a> {
    fn next(&mut self) -> Result<bool> {
        if self.state == ScorerState::Exhausted {
            return Ok(false);
        }
        let found = self.postings.next_doc()?;
        self.settle(found)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if self.state == ScorerState::Exhausted {
            return Ok(false);
        }
        let found = self.postings.skip_to(target)?;
        self.settle(found)
    }

    fn state(&self) -> ScorerState {
        self.state
    }

    fn score(&self) -> Result<f32> {
        let ScorerState::Positioned(doc) = self.state else {
            return Err(LucernaError::NotPositioned);
        };
        let length = self.field_lengths.get(doc.as_usize());
        Ok(self.weight.score(self.postings.term_frequency(), length))
    }

    fn cost(&self) -> u64 {
        self.postings.doc_frequency() as u64
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::search::scorer::ScorerNode;
    use crate::search::similarity::Bm25Params;
    use crate::segment::reader::tests::segment_from_texts;
    use crate::segment::{SegmentReader, Term};

    /// Term scorer over the `body` field, or an empty scorer for unknown terms
    pub(crate) fn term_node<'a>(segment: &'a SegmentReader, text: &str) -> ScorerNode<'a> {
        if segment.term_info(&Term::new("body", text)).is_none() {
            return ScorerNode::empty();
        }
        ScorerNode::Term(scorer(segment, text))
    }

    fn scorer<'a>(segment: &'a SegmentReader, text: &str) -> TermScorer<'a> {
        let term = Term::new("body", text);
        let postings = segment.postings(&term).unwrap().unwrap();
        let lengths = segment.field_lengths("body").unwrap();
        let weight = Bm25Weight::new(
            Bm25Params::default(),
            segment.doc_freq(&term) as u64,
            segment.max_doc() as u64,
            lengths.average(),
            1.0,
        );
        TermScorer::new(postings, segment.live_docs(), lengths, weight)
    }

    #[test]
    fn test_iterates_in_order() {
        let segment = segment_from_texts(0, &["a b c", "b c d", "c d e"]);
        let mut s = scorer(&segment, "c");
        assert_eq!(s.state(), ScorerState::Unstarted);
        assert!(matches!(s.score(), Err(LucernaError::NotPositioned)));

        let mut docs = Vec::new();
        while s.next().unwrap() {
            docs.push(s.doc().unwrap().0);
            assert!(s.score().unwrap() > 0.0);
        }
        assert_eq!(docs, vec![0, 1, 2]);
        assert_eq!(s.state(), ScorerState::Exhausted);
        assert!(!s.next().unwrap());
        assert!(matches!(s.doc(), Err(LucernaError::NotPositioned)));
    }

    #[test]
    fn test_skips_deleted_docs() {
        let segment = segment_from_texts(0, &["a b c", "b c d", "c d e"]);
        let mut live = LiveDocs::new(3);
        live.delete(DocId(0));
        live.delete(DocId(1));
        let segment = segment.with_live_docs(Arc::new(live), 1);

        let mut s = scorer(&segment, "c");
        assert!(s.next().unwrap());
        assert_eq!(s.doc().unwrap(), DocId(2));
        assert!(!s.next().unwrap());

        let mut s = scorer(&segment, "b");
        assert!(!s.skip_to(DocId(0)).unwrap());
    }

    #[test]
    fn test_skip_to() {
        let texts: Vec<&str> = (0..300).map(|i| if i % 3 == 0 { "x y" } else { "y" }).collect();
        let segment = segment_from_texts(0, &texts);
        let mut s = scorer(&segment, "x");

        assert!(s.skip_to(DocId(100)).unwrap());
        assert_eq!(s.doc().unwrap(), DocId(102));
        // behind the current doc acts like next
        assert!(s.skip_to(DocId(50)).unwrap());
        assert_eq!(s.doc().unwrap(), DocId(105));
        assert!(s.skip_to(DocId(297)).unwrap());
        assert_eq!(s.doc().unwrap(), DocId(297));
        assert!(!s.skip_to(DocId(298)).unwrap());
        assert_eq!(s.state(), ScorerState::Exhausted);
    }

    #[test]
    fn test_higher_tf_scores_higher() {
        let segment = segment_from_texts(0, &["z q", "z z q"]);
        let mut s = scorer(&segment, "z");
        s.next().unwrap();
        let once = s.score().unwrap();
        s.next().unwrap();
        assert_eq!(s.term_frequency(), 2);
        assert!(s.score().unwrap() > once);
    }
}
