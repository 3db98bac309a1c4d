//! Queries and their per-segment scorer trees
//!
//! A `Query` is first turned into a `Weight` that holds index-wide
//! statistics (doc frequencies, average field lengths), then into one
//! `ScorerNode` tree per segment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexReader;
use crate::segment::{SegmentReader, Term};

use super::conjunction::ConjunctionScorer;
use super::disjunction::DisjunctionScorer;
use super::exclusion::ExclusionScorer;
use super::req_opt::ReqOptScorer;
use super::scorer::ScorerNode;
use super::similarity::{Bm25Params, Bm25Weight};
use super::term_scorer::TermScorer;

fn default_boost() -> f32 {
    1.0
}

/// Matches docs containing one exact term
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub term: Term,
    #[serde(default = "default_boost")]
    pub boost: f32,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, text: impl Into<Vec<u8>>) -> Self {
        Self {
            term: Term::new(field, text),
            boost: 1.0,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

/// Combines clauses with AND (`must`), OR (`should`) and NOT (`must_not`).
///
/// Without `must` clauses at least `max(minimum_should_match, 1)` `should`
/// clauses have to match. With `must` clauses, `should` clauses only add to
/// the score unless `minimum_should_match` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BooleanQuery {
    #[serde(default)]
    pub must: Vec<Query>,
    #[serde(default)]
    pub should: Vec<Query>,
    #[serde(default)]
    pub must_not: Vec<Query>,
    #[serde(default)]
    pub minimum_should_match: usize,
    #[serde(default = "default_boost")]
    pub boost: f32,
}

impl Default for BooleanQuery {
    fn default() -> Self {
        Self {
            must: Vec::new(),
            should: Vec::new(),
            must_not: Vec::new(),
            minimum_should_match: 0,
            boost: 1.0,
        }
    }
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: impl Into<Query>) -> Self {
        self.must.push(query.into());
        self
    }

    pub fn should(mut self, query: impl Into<Query>) -> Self {
        self.should.push(query.into());
        self
    }

    pub fn must_not(mut self, query: impl Into<Query>) -> Self {
        self.must_not.push(query.into());
        self
    }

    pub fn with_minimum_should_match(mut self, count: usize) -> Self {
        self.minimum_should_match = count;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Term(TermQuery),
    Boolean(BooleanQuery),
}

impl From<TermQuery> for Query {
    fn from(query: TermQuery) -> Self {
        Query::Term(query)
    }
}

impl From<BooleanQuery> for Query {
    fn from(query: BooleanQuery) -> Self {
        Query::Boolean(query)
    }
}

impl Query {
    /// Shorthand for a term query with boost 1
    pub fn term(field: impl Into<String>, text: impl Into<Vec<u8>>) -> Self {
        Query::Term(TermQuery::new(field, text))
    }

    /// Every term the query looks up
    pub fn terms(&self) -> Vec<&Term> {
        let mut terms = Vec::new();
        self.collect_terms(&mut terms);
        terms
    }

    fn collect_terms<'q>(&'q self, terms: &mut Vec<&'q Term>) {
        match self {
            Query::Term(q) => terms.push(&q.term),
            Query::Boolean(q) => {
                for clause in q.must.iter().chain(&q.should).chain(&q.must_not) {
                    clause.collect_terms(terms);
                }
            }
        }
    }

    /// Resolve index-wide statistics against `reader`
    pub fn weight(&self, reader: &IndexReader, params: Bm25Params) -> Result<Weight> {
        let mut stats = CollectionStats::new(reader);
        self.weight_with(&mut stats, params, 1.0)
    }

    fn weight_with(
        &self,
        stats: &mut CollectionStats<'_>,
        params: Bm25Params,
        boost: f32,
    ) -> Result<Weight> {
        match self {
            Query::Term(q) => {
                let avg = stats.average_field_length(&q.term.field)?;
                let bm25 = Bm25Weight::new(
                    params,
                    stats.reader.doc_freq(&q.term),
                    stats.reader.max_doc(),
                    avg,
                    boost * q.boost,
                );
                Ok(Weight::Term(TermWeight {
                    term: q.term.clone(),
                    bm25,
                }))
            }
            Query::Boolean(q) => {
                let boost = boost * q.boost;
                let mut clauses = |queries: &[Query]| -> Result<Vec<Weight>> {
                    queries
                        .iter()
                        .map(|c| c.weight_with(stats, params, boost))
                        .collect()
                };
                let must = clauses(&q.must)?;
                let should = clauses(&q.should)?;
                let must_not = clauses(&q.must_not)?;
                Ok(Weight::Boolean(BooleanWeight {
                    must,
                    should,
                    must_not,
                    minimum_should_match: q.minimum_should_match,
                }))
            }
        }
    }
}

struct CollectionStats<'r> {
    reader: &'r IndexReader,
    average_lengths: HashMap<String, f32>,
}

impl<'r> CollectionStats<'r> {
    fn new(reader: &'r IndexReader) -> Self {
        Self {
            reader,
            average_lengths: HashMap::new(),
        }
    }

    /// Average length of `field` over every doc in the index
    fn average_field_length(&mut self, field: &str) -> Result<f32> {
        if let Some(avg) = self.average_lengths.get(field) {
            return Ok(*avg);
        }
        let mut total = 0u64;
        let mut docs = 0u64;
        for segment in self.reader.segments() {
            total += segment.field_lengths(field)?.total();
            docs += segment.max_doc() as u64;
        }
        let avg = if docs == 0 {
            0.0
        } else {
            (total as f64 / docs as f64) as f32
        };
        self.average_lengths.insert(field.to_string(), avg);
        Ok(avg)
    }
}

#[derive(Clone, Debug)]
pub struct TermWeight {
    term: Term,
    bm25: Bm25Weight,
}

#[derive(Clone, Debug)]
pub struct BooleanWeight {
    must: Vec<Weight>,
    should: Vec<Weight>,
    must_not: Vec<Weight>,
    minimum_should_match: usize,
}

/// A query bound to the statistics of one reader
#[derive(Clone, Debug)]
pub enum Weight {
    Term(TermWeight),
    Boolean(BooleanWeight),
}

impl Weight {
    /// Scorer over `segment`, or `None` if nothing in it can match
    pub fn scorer<'a>(&self, segment: &'a SegmentReader) -> Result<Option<ScorerNode<'a>>> {
        match self {
            Weight::Term(w) => {
                let Some(postings) = segment.postings(&w.term)? else {
                    return Ok(None);
                };
                let lengths = segment.field_lengths(&w.term.field)?;
                Ok(Some(ScorerNode::Term(TermScorer::new(
                    postings,
                    segment.live_docs(),
                    lengths,
                    w.bm25,
                ))))
            }
            Weight::Boolean(w) => w.scorer(segment),
        }
    }
}

impl BooleanWeight {
    fn scorer<'a>(&self, segment: &'a SegmentReader) -> Result<Option<ScorerNode<'a>>> {
        let mut must = Vec::with_capacity(self.must.len());
        for clause in &self.must {
            match clause.scorer(segment)? {
                Some(scorer) => must.push(scorer),
                None => return Ok(None),
            }
        }
        let should = present(&self.should, segment)?;
        let must_not = present(&self.must_not, segment)?;

        let required = if must.is_empty() {
            let min = self.minimum_should_match.max(1);
            if should.len() < min {
                return Ok(None);
            }
            single_or(should, |s| {
                ScorerNode::Disjunction(DisjunctionScorer::new(s, min))
            })
        } else if self.minimum_should_match > 0 {
            if should.len() < self.minimum_should_match {
                return Ok(None);
            }
            let min = self.minimum_should_match;
            must.push(single_or(should, |s| {
                ScorerNode::Disjunction(DisjunctionScorer::new(s, min))
            }));
            single_or(must, |m| ScorerNode::Conjunction(ConjunctionScorer::new(m)))
        } else {
            let required = single_or(must, |m| ScorerNode::Conjunction(ConjunctionScorer::new(m)));
            if should.is_empty() {
                required
            } else {
                let optional = single_or(should, |s| {
                    ScorerNode::Disjunction(DisjunctionScorer::new(s, 1))
                });
                ScorerNode::ReqOpt(ReqOptScorer::new(required, optional))
            }
        };

        if must_not.is_empty() {
            return Ok(Some(required));
        }
        let excluded = single_or(must_not, |n| {
            ScorerNode::Disjunction(DisjunctionScorer::new(n, 1))
        });
        Ok(Some(ScorerNode::Exclusion(ExclusionScorer::new(
            required, excluded,
        ))))
    }
}

fn present<'a>(weights: &[Weight], segment: &'a SegmentReader) -> Result<Vec<ScorerNode<'a>>> {
    let mut scorers = Vec::with_capacity(weights.len());
    for weight in weights {
        if let Some(scorer) = weight.scorer(segment)? {
            scorers.push(scorer);
        }
    }
    Ok(scorers)
}

/// The only scorer of a one-element list, or `combine` over all of them
fn single_or<'a>(
    mut scorers: Vec<ScorerNode<'a>>,
    combine: impl FnOnce(Vec<ScorerNode<'a>>) -> ScorerNode<'a>,
) -> ScorerNode<'a> {
    if scorers.len() == 1 {
        if let Some(scorer) = scorers.pop() {
            return scorer;
        }
    }
    combine(scorers)
}
