//! Union of scorers over a min-heap, with a minimum match count

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{LucernaError, Result};
use crate::segment::DocId;

use super::scorer::{Scorer, ScorerNode, ScorerState};

/// Docs matched by at least `minimum_should_match` sub-scorers.
///
/// Sub-scorers sit in a min-heap keyed by their current doc. The score is the
/// sum of the scorers positioned on the current doc.
pub struct DisjunctionScorer<'a> {
    scorers: Vec<ScorerNode<'a>>,
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    /// Scorers positioned on the current doc, taken out of the heap
    matching: Vec<usize>,
    minimum_should_match: usize,
    started: bool,
    state: ScorerState,
}

impl<'a> DisjunctionScorer<'a> {
    pub fn new(scorers: Vec<ScorerNode<'a>>, minimum_should_match: usize) -> Self {
        let minimum_should_match = minimum_should_match.max(1);
        let state = if scorers.len() < minimum_should_match {
            ScorerState::Exhausted
        } else {
            ScorerState::Unstarted
        };
        Self {
            heap: BinaryHeap::with_capacity(scorers.len()),
            matching: Vec::with_capacity(scorers.len()),
            scorers,
            minimum_should_match,
            started: false,
            state,
        }
    }

    /// Number of sub-scorers matching the current doc
    pub fn match_count(&self) -> usize {
        match self.state {
            ScorerState::Positioned(_) => self.matching.len(),
            _ => 0,
        }
    }

    fn push(&mut self, idx: usize) -> Result<()> {
        let doc = self.scorers[idx].doc()?;
        self.heap.push(Reverse((doc, idx)));
        Ok(())
    }

    /// Pop the smallest doc group until one has enough matches
    fn settle(&mut self) -> Result<bool> {
        loop {
            let Some(&Reverse((doc, _))) = self.heap.peek() else {
                self.state = ScorerState::Exhausted;
                return Ok(false);
            };
            self.matching.clear();
            while let Some(&Reverse((next, idx))) = self.heap.peek() {
                if next != doc {
                    break;
                }
                self.heap.pop();
                self.matching.push(idx);
            }
            // remaining scorers cannot reach the minimum on any doc
            if self.matching.len() + self.heap.len() < self.minimum_should_match {
                self.state = ScorerState::Exhausted;
                return Ok(false);
            }
            if self.matching.len() >= self.minimum_should_match {
                self.state = ScorerState::Positioned(doc);
                return Ok(true);
            }
            for idx in std::mem::take(&mut self.matching) {
                if self.scorers[idx].next()? {
                    self.push(idx)?;
                }
            }
        }
    }
}

impl<'a> Scorer for DisjunctionScorer<'a> {
    fn next(&mut self) -> Result<bool> {
        if self.state == ScorerState::Exhausted {
            return Ok(false);
        }
        if !self.started {
            self.started = true;
            for idx in 0..self.scorers.len() {
                if self.scorers[idx].next()? {
                    self.push(idx)?;
                }
            }
        } else {
            for idx in std::mem::take(&mut self.matching) {
                if self.scorers[idx].next()? {
                    self.push(idx)?;
                }
            }
        }
        self.settle()
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        match self.state {
            ScorerState::Exhausted => return Ok(false),
            ScorerState::Positioned(current) if current >= target => return self.next(),
            _ => {}
        }
        if !self.started {
            self.started = true;
            for idx in 0..self.scorers.len() {
                if self.scorers[idx].skip_to(target)? {
                    self.push(idx)?;
                }
            }
            return self.settle();
        }

        let mut behind = std::mem::take(&mut self.matching);
        while let Some(&Reverse((doc, idx))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            behind.push(idx);
        }
        for idx in behind {
            if self.scorers[idx].skip_to(target)? {
                self.push(idx)?;
            }
        }
        self.settle()
    }

    fn state(&self) -> ScorerState {
        self.state
    }

    fn score(&self) -> Result<f32> {
        if !matches!(self.state, ScorerState::Positioned(_)) {
            return Err(LucernaError::NotPositioned);
        }
        let mut sum = 0.0;
        for &idx in &self.matching {
            sum += self.scorers[idx].score()?;
        }
        Ok(sum)
    }

    fn cost(&self) -> u64 {
        self.scorers.iter().map(|s| s.cost()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::term_scorer::tests::term_node;
    use crate::segment::reader::tests::segment_from_texts;

    fn or<'a>(nodes: Vec<ScorerNode<'a>>, min: usize) -> DisjunctionScorer<'a> {
        DisjunctionScorer::new(nodes, min)
    }

    fn docs(scorer: &mut DisjunctionScorer<'_>) -> Vec<u32> {
        let mut docs = Vec::new();
        while scorer.next().unwrap() {
            docs.push(scorer.doc().unwrap().0);
        }
        docs
    }

    #[test]
    fn test_union() {
        let segment = segment_from_texts(0, &["a", "b", "c", "a b", "d"]);
        let mut scorer = or(
            vec![
                term_node(&segment, "a"),
                term_node(&segment, "b"),
                term_node(&segment, "missing"),
            ],
            1,
        );
        assert_eq!(docs(&mut scorer), vec![0, 1, 3]);
    }

    #[test]
    fn test_minimum_should_match() {
        let segment = segment_from_texts(0, &["a b", "a", "b c", "a b c", "c"]);
        let mut two = or(
            vec![
                term_node(&segment, "a"),
                term_node(&segment, "b"),
                term_node(&segment, "c"),
            ],
            2,
        );
        assert!(two.next().unwrap());
        assert_eq!(two.match_count(), 2);
        let mut rest = vec![two.doc().unwrap().0];
        while two.next().unwrap() {
            rest.push(two.doc().unwrap().0);
        }
        assert_eq!(rest, vec![0, 2, 3]);

        let mut impossible = or(vec![term_node(&segment, "a")], 2);
        assert_eq!(impossible.state(), ScorerState::Exhausted);
        assert!(!impossible.next().unwrap());
    }

    #[test]
    fn test_more_matches_score_higher() {
        let segment = segment_from_texts(0, &["a x", "a b"]);
        let mut scorer = or(vec![term_node(&segment, "a"), term_node(&segment, "b")], 1);
        scorer.next().unwrap();
        let single = scorer.score().unwrap();
        scorer.next().unwrap();
        assert_eq!(scorer.match_count(), 2);
        assert!(scorer.score().unwrap() > single);
    }

    #[test]
    fn test_skip_to() {
        let texts: Vec<&str> = (0..300)
            .map(|i| match i % 3 {
                0 => "a",
                1 => "b",
                _ => "z",
            })
            .collect();
        let segment = segment_from_texts(0, &texts);
        let mut scorer = or(vec![term_node(&segment, "a"), term_node(&segment, "b")], 1);
        assert!(scorer.skip_to(DocId(200)).unwrap());
        assert_eq!(scorer.doc().unwrap(), DocId(201));
        assert!(scorer.skip_to(DocId(203)).unwrap());
        assert_eq!(scorer.doc().unwrap(), DocId(204));
        assert!(scorer.skip_to(DocId(0)).unwrap());
        assert_eq!(scorer.doc().unwrap(), DocId(205));
        assert!(!scorer.skip_to(DocId(299)).unwrap());
    }
}
