//! Required scorer whose score is raised by an optional one

use crate::error::Result;
use crate::segment::DocId;

use super::scorer::{Scorer, ScorerNode, ScorerState};

/// Docs of `required`, scored higher when `optional` also matches them
pub struct ReqOptScorer<'a> {
    required: Box<ScorerNode<'a>>,
    optional: Box<ScorerNode<'a>>,
}

impl<'a> ReqOptScorer<'a> {
    pub fn new(required: ScorerNode<'a>, optional: ScorerNode<'a>) -> Self {
        Self {
            required: Box::new(required),
            optional: Box::new(optional),
        }
    }

    /// Bring `optional` up to the required doc so `score` can read it
    fn sync_optional(&mut self, found: bool) -> Result<bool> {
        if !found {
            return Ok(false);
        }
        let doc = self.required.doc()?;
        let behind = match self.optional.state() {
            ScorerState::Unstarted => true,
            ScorerState::Positioned(opt) => opt < doc,
            ScorerState::Exhausted => false,
        };
        if behind {
            self.optional.skip_to(doc)?;
        }
        Ok(true)
    }
}

impl<'a> Scorer for ReqOptScorer<'a> {
    fn next(&mut self) -> Result<bool> {
        let found = self.required.next()?;
        self.sync_optional(found)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        let found = self.required.skip_to(target)?;
        self.sync_optional(found)
    }

    fn state(&self) -> ScorerState {
        self.required.state()
    }

    fn score(&self) -> Result<f32> {
        let score = self.required.score()?;
        if self.optional.state() == self.required.state() {
            Ok(score + self.optional.score()?)
        } else {
            Ok(score)
        }
    }

    fn cost(&self) -> u64 {
        self.required.cost()
    }
}
