//! Scorer iterator protocol
//!
//! A scorer walks matching documents of one segment in strictly increasing
//! doc order: `Unstarted -> Positioned(doc) -> Exhausted`. `doc` and `score`
//! are only valid while positioned.

use crate::error::{LucernaError, Result};
use crate::segment::DocId;

use super::conjunction::ConjunctionScorer;
use super::disjunction::DisjunctionScorer;
use super::exclusion::ExclusionScorer;
use super::req_opt::ReqOptScorer;
use super::term_scorer::TermScorer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScorerState {
    Unstarted,
    Positioned(DocId),
    Exhausted,
}

impl ScorerState {
    pub fn doc(&self) -> Option<DocId> {
        match self {
            ScorerState::Positioned(doc) => Some(*doc),
            _ => None,
        }
    }
}

pub trait Scorer {
    /// Move to the next matching doc; `false` once exhausted
    fn next(&mut self) -> Result<bool>;

    /// Move to the first matching doc `>= target` beyond the current one.
    ///
    /// A target at or behind the current doc behaves like `next`.
    fn skip_to(&mut self, target: DocId) -> Result<bool>;

    fn state(&self) -> ScorerState;

    /// Relevance of the current doc
    fn score(&self) -> Result<f32>;

    /// Upper bound on the number of docs this scorer can match
    fn cost(&self) -> u64;

    fn doc(&self) -> Result<DocId> {
        self.state().doc().ok_or(LucernaError::NotPositioned)
    }
}

/// Scorer that matches nothing
#[derive(Debug, Default)]
pub struct EmptyScorer {
    exhausted: bool,
}

impl Scorer for EmptyScorer {
    fn next(&mut self) -> Result<bool> {
        self.exhausted = true;
        Ok(false)
    }

    fn skip_to(&mut self, _target: DocId) -> Result<bool> {
        self.next()
    }

    fn state(&self) -> ScorerState {
        if self.exhausted {
            ScorerState::Exhausted
        } else {
            ScorerState::Unstarted
        }
    }

    fn score(&self) -> Result<f32> {
        Err(LucernaError::NotPositioned)
    }

    fn cost(&self) -> u64 {
        0
    }
}

/// The closed set of scorers a query tree is built from
pub enum ScorerNode<'a> {
    Term(TermScorer<'a>),
    Conjunction(ConjunctionScorer<'a>),
    Disjunction(DisjunctionScorer<'a>),
    Exclusion(ExclusionScorer<'a>),
    ReqOpt(ReqOptScorer<'a>),
    Empty(EmptyScorer),
}

macro_rules! dispatch {
    ($node:expr, $s:ident => $body:expr) => {
        match $node {
            ScorerNode::Term($s) => $body,
            ScorerNode::Conjunction($s) => $body,
            ScorerNode::Disjunction($s) => $body,
            ScorerNode::Exclusion($s) => $body,
            ScorerNode::ReqOpt($s) => $body,
            ScorerNode::Empty($s) => $body,
        }
    };
}

impl<'a> Scorer for ScorerNode<'a> {
    fn next(&mut self) -> Result<bool> {
        dispatch!(self, s => s.next())
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        dispatch!(self, s => s.skip_to(target))
    }

    fn state(&self) -> ScorerState {
        dispatch!(self, s => s.state())
    }

    fn score(&self) -> Result<f32> {
        dispatch!(self, s => s.score())
    }

    fn cost(&self) -> u64 {
        dispatch!(self, s => s.cost())
    }
}

impl<'a> ScorerNode<'a> {
    pub fn empty() -> Self {
        ScorerNode::Empty(EmptyScorer::default())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ScorerNode::Empty(_))
    }

    /// Drain the remaining docs in order
    pub fn collect_docs(&mut self) -> Result<Vec<DocId>> {
        let mut docs = Vec::new();
        while self.next()? {
            docs.push(self.doc()?);
        }
        Ok(docs)
    }
}

impl<'a> std::fmt::Debug for ScorerNode<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ScorerNode::Term(_) => "Term",
            ScorerNode::Conjunction(_) => "Conjunction",
            ScorerNode::Disjunction(_) => "Disjunction",
            ScorerNode::Exclusion(_) => "Exclusion",
            ScorerNode::ReqOpt(_) => "ReqOpt",
            ScorerNode::Empty(_) => "Empty",
        };
        f.debug_struct("ScorerNode")
            .field("kind", &kind)
            .field("state", &self.state())
            .field("cost", &self.cost())
            .finish()
    }
}
