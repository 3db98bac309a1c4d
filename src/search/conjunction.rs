//! Intersection of scorers by leapfrogging to the largest doc

use crate::error::{LucernaError, Result};
use crate::segment::DocId;

use super::scorer::{Scorer, ScorerNode, ScorerState};

/// Docs matched by every sub-scorer (leapfrog intersection).
///
/// The cheapest scorer leads; the others are skipped forward to the lead's
/// candidate, and any scorer that overshoots becomes the new candidate.
pub struct ConjunctionScorer<'a> {
    scorers: Vec<ScorerNode<'a>>,
    state: ScorerState,
}

impl<'a> ConjunctionScorer<'a> {
    pub fn new(mut scorers: Vec<ScorerNode<'a>>) -> Self {
        scorers.sort_by_key(|s| s.cost());
        let state = if scorers.is_empty() {
            ScorerState::Exhausted
        } else {
            ScorerState::Unstarted
        };
        Self { scorers, state }
    }

    fn exhaust(&mut self) -> bool {
        self.state = ScorerState::Exhausted;
        false
    }

    /// Advance the others until all agree with the lead
    fn align(&mut self) -> Result<bool> {
        let Some(mut candidate) = self.scorers[0].state().doc() else {
            return Ok(self.exhaust());
        };
        'candidates: loop {
            for i in 1..self.scorers.len() {
                let doc = match self.scorers[i].state() {
                    ScorerState::Positioned(doc) if doc >= candidate => doc,
                    _ => {
                        if !self.scorers[i].skip_to(candidate)? {
                            return Ok(self.exhaust());
                        }
                        self.scorers[i].doc()?
                    }
                };
                if doc > candidate {
                    if !self.scorers[0].skip_to(doc)? {
                        return Ok(self.exhaust());
                    }
                    candidate = self.scorers[0].doc()?;
                    continue 'candidates;
                }
            }
            self.state = ScorerState::Positioned(candidate);
            return Ok(true);
        }
    }
}

impl<'a> Scorer for ConjunctionScorer<'a> {
    fn next(&mut self) -> Result<bool> {
        if self.state == ScorerState::Exhausted {
            return Ok(false);
        }
        if !self.scorers[0].next()? {
            return Ok(self.exhaust());
        }
        self.align()
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        match self.state {
            ScorerState::Exhausted => return Ok(false),
            ScorerState::Positioned(current) if current >= target => return self.next(),
            _ => {}
        }
        if !self.scorers[0].skip_to(target)? {
            return Ok(self.exhaust());
        }
        self.align()
    }

    fn state(&self) -> ScorerState {
        self.state
    }

    fn score(&self) -> Result<f32> {
        if !matches!(self.state, ScorerState::Positioned(_)) {
            return Err(LucernaError::NotPositioned);
        }
        let mut sum = 0.0;
        for scorer in &self.scorers {
            sum += scorer.score()?;
        }
        Ok(sum)
    }

    fn cost(&self) -> u64 {
        self.scorers.first().map_or(0, |s| s.cost())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::term_scorer::tests::term_node;
    use crate::segment::reader::tests::segment_from_texts;

    fn and<'a>(nodes: Vec<ScorerNode<'a>>) -> ScorerNode<'a> {
        ScorerNode::Conjunction(ConjunctionScorer::new(nodes))
    }

    #[test]
    fn test_intersection() {
        let segment = segment_from_texts(0, &["a b c", "b c d", "c d e", "b d", "b c"]);
        let mut scorer = and(vec![term_node(&segment, "b"), term_node(&segment, "c")]);
        assert_eq!(
            scorer.collect_docs().unwrap(),
            vec![DocId(0), DocId(1), DocId(4)]
        );

        let mut three = and(vec![
            term_node(&segment, "b"),
            term_node(&segment, "c"),
            term_node(&segment, "d"),
        ]);
        assert_eq!(three.collect_docs().unwrap(), vec![DocId(1)]);
    }

    #[test]
    fn test_score_is_sum_of_clauses() {
        let segment = segment_from_texts(0, &["a b", "a"]);
        let mut both = and(vec![term_node(&segment, "a"), term_node(&segment, "b")]);
        let mut a = term_node(&segment, "a");
        let mut b = term_node(&segment, "b");
        assert!(both.next().unwrap());
        a.next().unwrap();
        b.next().unwrap();
        let expected = a.score().unwrap() + b.score().unwrap();
        assert!((both.score().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_skip_to_and_empty_clause() {
        let texts: Vec<String> = (0..400)
            .map(|i| match (i % 2, i % 5) {
                (0, 0) => "p q".to_string(),
                (0, _) => "p".to_string(),
                _ => "q".to_string(),
            })
            .collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let segment = segment_from_texts(0, &refs);

        let mut scorer = and(vec![term_node(&segment, "p"), term_node(&segment, "q")]);
        assert!(scorer.skip_to(DocId(101)).unwrap());
        assert_eq!(scorer.doc().unwrap(), DocId(110));
        assert!(scorer.skip_to(DocId(0)).unwrap());
        assert_eq!(scorer.doc().unwrap(), DocId(120));

        let mut none = and(vec![term_node(&segment, "p"), term_node(&segment, "missing")]);
        assert!(!none.next().unwrap());
        assert_eq!(none.state(), ScorerState::Exhausted);
    }
}
