use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::index::IndexReader;
use crate::segment::DocId;

use super::query::Query;
use super::scorer::Scorer;
use super::similarity::Bm25Params;

/// One scored document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Global doc id within the searched reader
    pub doc: u64,
    /// Ordinal of the segment holding the doc
    pub segment: usize,
    pub segment_doc: DocId,
    pub score: f32,
}

/// Best hits of a search, highest score first
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    /// Every matching live doc, not just the returned ones
    pub total_hits: u64,
    pub hits: Vec<SearchHit>,
}

impl TopDocs {
    pub fn docs(&self) -> Vec<u64> {
        self.hits.iter().map(|h| h.doc).collect()
    }

    pub fn max_score(&self) -> Option<f32> {
        self.hits.first().map(|h| h.score)
    }
}

/// Orders hits best-first: higher score, then lower doc
struct Ranked(SearchHit);

impl Ranked {
    fn rank(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .total_cmp(&self.0.score)
            .then_with(|| self.0.doc.cmp(&other.0.doc))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    /// Worse hits compare greater, so a max-heap keeps the worst on top
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

/// Runs queries against a reader snapshot
#[derive(Clone, Debug)]
pub struct IndexSearcher {
    reader: IndexReader,
    params: Bm25Params,
}

impl IndexSearcher {
    pub fn new(reader: IndexReader) -> Self {
        Self {
            reader,
            params: Bm25Params::default(),
        }
    }

    pub fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    /// The `k` best live docs for `query`
    pub fn search(&self, query: &Query, k: usize) -> Result<TopDocs> {
        let weight = query.weight(&self.reader, self.params)?;
        let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k.saturating_add(1).min(1024));
        let mut total_hits = 0u64;

        for (ord, segment) in self.reader.segments().iter().enumerate() {
            let Some(mut scorer) = weight.scorer(segment)? else {
                continue;
            };
            let base = self.reader.doc_base(ord).unwrap_or(0);
            while scorer.next()? {
                total_hits += 1;
                if k == 0 {
                    continue;
                }
                let segment_doc = scorer.doc()?;
                let hit = Ranked(SearchHit {
                    doc: base + segment_doc.0 as u64,
                    segment: ord,
                    segment_doc,
                    score: scorer.score()?,
                });
                if heap.len() < k {
                    heap.push(hit);
                } else if heap.peek().is_some_and(|worst| hit < *worst) {
                    heap.pop();
                    heap.push(hit);
                }
            }
        }

        let hits: Vec<SearchHit> = heap.into_sorted_vec().into_iter().map(|r| r.0).collect();
        debug!(total_hits, returned = hits.len(), "search finished");
        Ok(TopDocs { total_hits, hits })
    }

    /// Global ids of every live doc matching `query`, ascending
    pub fn matching_docs(&self, query: &Query) -> Result<Vec<u64>> {
        let weight = query.weight(&self.reader, self.params)?;
        let mut docs = Vec::new();
        for (ord, segment) in self.reader.segments().iter().enumerate() {
            let Some(mut scorer) = weight.scorer(segment)? else {
                continue;
            };
            let base = self.reader.doc_base(ord).unwrap_or(0);
            while scorer.next()? {
                docs.push(base + scorer.doc()?.0 as u64);
            }
        }
        Ok(docs)
    }

    /// Number of live docs matching `query`
    pub fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.matching_docs(query)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::{BooleanQuery, TermQuery};
    use crate::segment::reader::tests::segment_from_texts;
    use crate::segment::LiveDocs;
    use std::sync::Arc;

    fn searcher() -> IndexSearcher {
        let a = segment_from_texts(0, &["a b c", "b c d", "c d e"]);
        let b = segment_from_texts(1, &["c c c", "x y"]);
        IndexSearcher::new(IndexReader::from_segments(vec![a, b], 1))
    }

    #[test]
    fn test_matching_docs_across_segments() {
        let s = searcher();
        assert_eq!(s.matching_docs(&Query::term("body", "c")).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(s.matching_docs(&Query::term("body", "x")).unwrap(), vec![4]);
        assert_eq!(s.count(&Query::term("body", "nope")).unwrap(), 0);
    }

    #[test]
    fn test_top_docs_ordering() {
        let s = searcher();
        let top = s.search(&Query::term("body", "c"), 10).unwrap();
        assert_eq!(top.total_hits, 4);
        assert_eq!(top.hits.len(), 4);
        // highest tf wins
        assert_eq!(top.hits[0].doc, 3);
        assert_eq!(top.hits[0].segment, 1);
        assert_eq!(top.hits[0].segment_doc, DocId(0));
        assert!(top.hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(top.max_score(), Some(top.hits[0].score));
    }

    #[test]
    fn test_ties_break_on_doc_and_k_limits() {
        let a = segment_from_texts(0, &["t", "t", "t", "t"]);
        let s = IndexSearcher::new(IndexReader::from_segments(vec![a], 1));
        let top = s.search(&Query::term("body", "t"), 2).unwrap();
        assert_eq!(top.total_hits, 4);
        assert_eq!(top.docs(), vec![0, 1]);

        let none = s.search(&Query::term("body", "t"), 0).unwrap();
        assert_eq!(none.total_hits, 4);
        assert!(none.hits.is_empty());
    }

    #[test]
    fn test_deleted_docs_never_returned() {
        let a = segment_from_texts(0, &["a b c", "b c d", "c d e"]);
        let mut live = LiveDocs::new(3);
        live.delete(DocId(0));
        live.delete(DocId(1));
        let a = a.with_live_docs(Arc::new(live), 1);
        let s = IndexSearcher::new(IndexReader::from_segments(vec![a], 1));

        assert_eq!(s.matching_docs(&Query::term("body", "c")).unwrap(), vec![2]);
        let q = BooleanQuery::new()
            .should(TermQuery::new("body", "b"))
            .should(TermQuery::new("body", "e"));
        assert_eq!(s.search(&q.into(), 5).unwrap().docs(), vec![2]);
    }
}
