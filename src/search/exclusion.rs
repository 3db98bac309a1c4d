//! Required scorer minus the docs an excluded scorer matches

use crate::error::Result;
use crate::segment::DocId;

use super::scorer::{Scorer, ScorerNode, ScorerState};

/// Docs of `required` that `excluded` does not match; scores come from `required` only
pub struct ExclusionScorer<'a> {
    required: Box<ScorerNode<'a>>,
    excluded: Box<ScorerNode<'a>>,
}

impl<'a> ExclusionScorer<'a> {
    pub fn new(required: ScorerNode<'a>, excluded: ScorerNode<'a>) -> Self {
        Self {
            required: Box::new(required),
            excluded: Box::new(excluded),
        }
    }

    /// Advance `required` past every doc the exclusion matches
    fn skip_excluded(&mut self, mut found: bool) -> Result<bool> {
        while found {
            let doc = self.required.doc()?;
            let excluded_doc = match self.excluded.state() {
                ScorerState::Exhausted => return Ok(true),
                ScorerState::Positioned(e) if e >= doc => e,
                _ => {
                    if !self.excluded.skip_to(doc)? {
                        return Ok(true);
                    }
                    self.excluded.doc()?
                }
            };
            if excluded_doc != doc {
                return Ok(true);
            }
            found = self.required.next()?;
        }
        Ok(false)
    }
}

impl<'a> Scorer for ExclusionScorer<'a> {
    fn next(&mut self) -> Result<bool> {
        let found = self.required.next()?;
        self.skip_excluded(found)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        let found = self.required.skip_to(target)?;
        self.skip_excluded(found)
    }

    fn state(&self) -> ScorerState {
        self.required.state()
    }

    fn score(&self) -> Result<f32> {
        self.required.score()
    }

    fn cost(&self) -> u64 {
        self.required.cost()
    }
}
