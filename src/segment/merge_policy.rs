//! Tiered merge policy and merge bookkeeping
//!
//! Segments are grouped into tiers by live document count: tier 0 holds
//! segments up to `floor_segment_docs * segments_per_tier`, and each next
//! tier is `segments_per_tier` times larger. A tier holding more than
//! `segments_per_tier` segments merges its smallest members, which keeps
//! the segment count logarithmic in the number of documents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::reader::SegmentReader;
use super::types::SegmentId;

const MAX_TIERS: usize = 16;

/// Configuration for the tiered merge policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicyConfig {
    /// Largest merged segment the policy will produce, in live docs
    pub max_merged_segment_docs: u64,
    /// Segments allowed per tier before the tier merges
    pub segments_per_tier: usize,
    /// Minimum number of segments to merge at once
    pub min_merge_count: usize,
    /// Maximum number of segments to merge at once
    pub max_merge_count: usize,
    /// Deleted fraction above which a segment is merged regardless of tier
    pub delete_ratio_threshold: f64,
    /// Segments smaller than this count as this size when tiering
    pub floor_segment_docs: u64,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        Self {
            max_merged_segment_docs: 5_000_000,
            segments_per_tier: 10,
            min_merge_count: 2,
            max_merge_count: 10,
            delete_ratio_threshold: 0.3,
            floor_segment_docs: 1000,
        }
    }
}

/// A merge the policy wants to run; ids are listed in index order
#[derive(Clone, Debug, PartialEq)]
pub struct MergeCandidate {
    pub segment_ids: Vec<SegmentId>,
    /// Live docs the merged segment will hold
    pub estimated_docs: u64,
    /// Higher runs first
    pub score: f64,
    pub reason: MergeReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many segments in a tier
    TierOverflow,
    /// Segments carrying many deleted documents
    HighDeleteRatio,
    /// Requested through `force_merge`
    Forced,
}

pub struct TieredMergePolicy {
    config: MergePolicyConfig,
}

impl TieredMergePolicy {
    pub fn new(config: MergePolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergePolicyConfig {
        &self.config
    }

    /// Merges worth running over `segments` (index order), best first.
    ///
    /// Candidates never share a segment.
    pub fn find_merges(&self, segments: &[SegmentReader]) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();
        if segments.len() < self.config.min_merge_count.max(1) {
            return candidates;
        }

        if let Some(candidate) = self.find_high_delete_merge(segments) {
            candidates.push(candidate);
        }
        for candidate in self.find_tiered_merges(segments) {
            let overlaps = candidates
                .iter()
                .any(|c| c.segment_ids.iter().any(|id| candidate.segment_ids.contains(id)));
            if !overlaps {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// One merge of the smallest segments that brings the count down to
    /// `max_segments`. Once the count is there, segments still holding
    /// deletes are rewritten; `None` when nothing is left to do.
    pub fn find_forced_merge(
        &self,
        segments: &[SegmentReader],
        max_segments: usize,
    ) -> Option<MergeCandidate> {
        let max_segments = max_segments.max(1);
        if segments.len() <= max_segments {
            let with_deletes: Vec<&SegmentReader> = segments
                .iter()
                .filter(|s| s.deleted_doc_count() > 0)
                .collect();
            if with_deletes.is_empty() {
                return None;
            }
            return Some(self.candidate(segments, &with_deletes, 0.0, MergeReason::Forced));
        }
        let merge_count = segments.len() - max_segments + 1;
        let mut by_size: Vec<&SegmentReader> = segments.iter().collect();
        by_size.sort_by_key(|s| (s.live_doc_count(), s.id()));
        by_size.truncate(merge_count);

        Some(self.candidate(segments, &by_size, 0.0, MergeReason::Forced))
    }

    fn find_high_delete_merge(&self, segments: &[SegmentReader]) -> Option<MergeCandidate> {
        let mut selected: Vec<&SegmentReader> = segments
            .iter()
            .filter(|s| s.delete_ratio() > self.config.delete_ratio_threshold)
            .collect();
        if selected.len() < self.config.min_merge_count {
            return None;
        }
        selected.sort_by(|a, b| {
            b.delete_ratio()
                .partial_cmp(&a.delete_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        selected.truncate(self.config.max_merge_count.max(self.config.min_merge_count));

        let avg_delete_ratio =
            selected.iter().map(|s| s.delete_ratio()).sum::<f64>() / selected.len() as f64;
        Some(self.candidate(
            segments,
            &selected,
            avg_delete_ratio * 100.0,
            MergeReason::HighDeleteRatio,
        ))
    }

    fn find_tiered_merges(&self, segments: &[SegmentReader]) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();
        let per_tier = self.config.segments_per_tier.max(1);

        for (tier_idx, mut tier) in self.group_by_tier(segments).into_iter().enumerate() {
            if tier.len() <= per_tier {
                continue;
            }
            let merge_count = (tier.len() - per_tier + 1)
                .min(self.config.max_merge_count)
                .max(self.config.min_merge_count);

            tier.sort_by_key(|s| (s.live_doc_count(), s.id()));
            let mut selected = Vec::new();
            let mut total = 0u64;
            for segment in tier.into_iter().take(merge_count) {
                let docs = segment.live_doc_count() as u64;
                if !selected.is_empty() && total + docs > self.config.max_merged_segment_docs {
                    break;
                }
                total += docs;
                selected.push(segment);
            }

            if selected.len() >= self.config.min_merge_count.max(2) {
                let score = (MAX_TIERS as f64 - tier_idx as f64).max(1.0) * selected.len() as f64;
                candidates.push(self.candidate(segments, &selected, score, MergeReason::TierOverflow));
            }
        }
        candidates
    }

    fn group_by_tier<'a>(&self, segments: &'a [SegmentReader]) -> Vec<Vec<&'a SegmentReader>> {
        let mut tiers: Vec<Vec<&SegmentReader>> = vec![Vec::new(); MAX_TIERS];
        for segment in segments {
            let tier = self.size_to_tier(segment.live_doc_count() as u64);
            tiers[tier].push(segment);
        }
        while tiers.last().is_some_and(|t| t.is_empty()) {
            tiers.pop();
        }
        tiers
    }

    /// Tier of a segment holding `docs` live documents
    pub fn size_to_tier(&self, docs: u64) -> usize {
        let floor = self.config.floor_segment_docs.max(1);
        let ratio = (self.config.segments_per_tier as u64).max(2);
        let docs = docs.max(floor);

        let mut tier_max = floor.saturating_mul(ratio);
        let mut tier = 0;
        while docs > tier_max && tier < MAX_TIERS - 1 {
            tier += 1;
            tier_max = tier_max.saturating_mul(ratio);
        }
        tier
    }

    fn candidate(
        &self,
        segments: &[SegmentReader],
        selected: &[&SegmentReader],
        score: f64,
        reason: MergeReason,
    ) -> MergeCandidate {
        // merge inputs keep their relative index order
        let segment_ids: Vec<SegmentId> = segments
            .iter()
            .filter(|s| selected.iter().any(|sel| sel.id() == s.id()))
            .map(|s| s.id())
            .collect();
        MergeCandidate {
            segment_ids,
            estimated_docs: selected.iter().map(|s| s.live_doc_count() as u64).sum(),
            score,
            reason,
        }
    }
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        Self::new(MergePolicyConfig::default())
    }
}

/// A merge that has been handed to a worker
#[derive(Debug)]
pub struct RunningMerge {
    pub segment_ids: Vec<SegmentId>,
    pub output_id: SegmentId,
    pub cancel: Arc<AtomicBool>,
}

/// Tracks which segments are being merged and bounds concurrency
#[derive(Debug)]
pub struct MergeScheduler {
    running: Vec<RunningMerge>,
    max_concurrent: usize,
}

impl MergeScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            running: Vec::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn is_merging(&self, id: SegmentId) -> bool {
        self.running.iter().any(|m| m.segment_ids.contains(&id))
    }

    pub fn has_capacity(&self) -> bool {
        self.running.len() < self.max_concurrent
    }

    /// Register `candidate` as running under `output_id`.
    ///
    /// Returns its cancel flag, or `None` when it overlaps a running merge.
    pub fn start(&mut self, candidate: &MergeCandidate, output_id: SegmentId) -> Option<Arc<AtomicBool>> {
        if candidate.segment_ids.iter().any(|id| self.is_merging(*id)) {
            return None;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        self.running.push(RunningMerge {
            segment_ids: candidate.segment_ids.clone(),
            output_id,
            cancel: Arc::clone(&cancel),
        });
        Some(cancel)
    }

    pub fn finish(&mut self, output_id: SegmentId) {
        self.running.retain(|m| m.output_id != output_id);
    }

    /// Ask every running merge to stop at its next checkpoint
    pub fn cancel_all(&self) {
        for merge in &self.running {
            merge.cancel.store(true, Ordering::Release);
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl Default for MergeScheduler {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::live_docs::LiveDocs;
    use crate::segment::reader::tests::segment_from_texts;
    use crate::segment::types::DocId;

    fn segment(id: u64, docs: usize, deleted: usize) -> SegmentReader {
        let texts = vec!["doc"; docs];
        let reader = segment_from_texts(id, &texts);
        if deleted == 0 {
            return reader;
        }
        let mut live = LiveDocs::new(docs as u32);
        for doc in 0..deleted {
            live.delete(DocId(doc as u32));
        }
        reader.with_live_docs(Arc::new(live), 1)
    }

    fn small_policy() -> TieredMergePolicy {
        TieredMergePolicy::new(MergePolicyConfig {
            segments_per_tier: 3,
            floor_segment_docs: 2,
            ..Default::default()
        })
    }

    #[test]
    fn test_tier_calculation() {
        let policy = small_policy();
        assert_eq!(policy.size_to_tier(0), 0);
        assert_eq!(policy.size_to_tier(6), 0);
        assert_eq!(policy.size_to_tier(7), 1);
        assert_eq!(policy.size_to_tier(18), 1);
        assert_eq!(policy.size_to_tier(19), 2);
    }

    #[test]
    fn test_tier_overflow_merges_smallest() {
        let policy = small_policy();
        let segments: Vec<_> = (0..5).map(|i| segment(i, 1 + i as usize % 2, 0)).collect();

        let candidates = policy.find_merges(&segments);
        let tiered = candidates
            .iter()
            .find(|c| c.reason == MergeReason::TierOverflow)
            .unwrap();
        assert_eq!(tiered.segment_ids.len(), 3);
        // ids come back in index order
        assert!(tiered.segment_ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_no_merge_within_tier_budget() {
        let policy = small_policy();
        let segments: Vec<_> = (0..3).map(|i| segment(i, 1, 0)).collect();
        assert!(policy.find_merges(&segments).is_empty());
    }

    #[test]
    fn test_high_delete_merge() {
        let policy = TieredMergePolicy::new(MergePolicyConfig {
            delete_ratio_threshold: 0.4,
            ..Default::default()
        });
        let segments = vec![segment(1, 4, 3), segment(2, 4, 2), segment(3, 4, 0)];

        let candidates = policy.find_merges(&segments);
        let candidate = candidates
            .iter()
            .find(|c| c.reason == MergeReason::HighDeleteRatio)
            .unwrap();
        assert_eq!(candidate.segment_ids, vec![SegmentId(1), SegmentId(2)]);
        assert_eq!(candidate.estimated_docs, 3);
    }

    #[test]
    fn test_forced_merge() {
        let policy = TieredMergePolicy::default();
        let segments = vec![segment(0, 5, 0), segment(1, 1, 0), segment(2, 2, 0)];

        let candidate = policy.find_forced_merge(&segments, 2).unwrap();
        assert_eq!(candidate.segment_ids, vec![SegmentId(1), SegmentId(2)]);
        assert_eq!(candidate.reason, MergeReason::Forced);

        let all = policy.find_forced_merge(&segments, 1).unwrap();
        assert_eq!(all.segment_ids.len(), 3);
        assert!(policy.find_forced_merge(&segments, 3).is_none());
    }

    #[test]
    fn test_forced_merge_expunges_deletes() {
        let policy = TieredMergePolicy::default();
        let segments = vec![segment(0, 4, 1), segment(1, 3, 0)];

        let candidate = policy.find_forced_merge(&segments, 2).unwrap();
        assert_eq!(candidate.segment_ids, vec![SegmentId(0)]);
        assert_eq!(candidate.estimated_docs, 3);
    }

    #[test]
    fn test_scheduler_rejects_overlap() {
        let mut scheduler = MergeScheduler::new(2);
        let first = MergeCandidate {
            segment_ids: vec![SegmentId(1), SegmentId(2)],
            estimated_docs: 10,
            score: 1.0,
            reason: MergeReason::TierOverflow,
        };
        let overlapping = MergeCandidate {
            segment_ids: vec![SegmentId(2), SegmentId(3)],
            ..first.clone()
        };

        let cancel = scheduler.start(&first, SegmentId(10)).unwrap();
        assert!(scheduler.is_merging(SegmentId(2)));
        assert!(scheduler.start(&overlapping, SegmentId(11)).is_none());
        assert!(scheduler.has_capacity());

        scheduler.cancel_all();
        assert!(cancel.load(Ordering::Acquire));

        scheduler.finish(SegmentId(10));
        assert!(!scheduler.has_running());
        assert!(scheduler.start(&overlapping, SegmentId(11)).is_some());
    }
}
