//! Invariant checking over reader snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::LucernaError;
use crate::index::IndexReader;
use crate::segment::{DocId, SegmentId, SegmentReader, Term};

/// A violation of an invariant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: String,
    pub description: String,
    /// Segment the violation was found in, if it is local to one
    pub segment: Option<SegmentId>,
    pub context: BTreeMap<String, String>,
}

impl Violation {
    fn new(invariant: &str, segment: Option<SegmentId>, description: impl Into<String>) -> Self {
        Self {
            invariant: invariant.to_string(),
            description: description.into(),
            segment,
            context: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INVARIANT VIOLATION: {}", self.invariant)?;
        writeln!(f, "  Description: {}", self.description)?;
        if let Some(segment) = self.segment {
            writeln!(f, "  Segment: {}", segment)?;
        }
        if !self.context.is_empty() {
            writeln!(f, "  Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "    {}: {}", key, value)?;
            }
        }
        Ok(())
    }
}

/// A structural property every reader snapshot must satisfy
pub trait Invariant: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, reader: &IndexReader) -> Result<(), Violation>;

    fn description(&self) -> &str {
        "No description provided"
    }
}

/// Check all invariants and return violations
pub fn check_all_invariants(
    reader: &IndexReader,
    invariants: &[Box<dyn Invariant>],
) -> Vec<Violation> {
    invariants
        .iter()
        .filter_map(|invariant| invariant.check(reader).err())
        .collect()
}

pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(TermsStrictlyAscending),
        Box::new(PostingsWellFormed),
        Box::new(DocFreqMatchesPostings),
        Box::new(LiveCountsConsistent),
        Box::new(StoredDocsReadable),
    ]
}

fn for_each_segment(
    reader: &IndexReader,
    mut check: impl FnMut(&SegmentReader) -> Result<(), Violation>,
) -> Result<(), Violation> {
    reader.segments().iter().try_for_each(|segment| check(segment))
}

fn read_error(name: &str, segment: &SegmentReader, e: LucernaError) -> Violation {
    Violation::new(name, Some(segment.id()), "segment could not be read").with("error", e)
}

/// Term enumeration yields strictly ascending `(field, text)` pairs
pub struct TermsStrictlyAscending;

impl Invariant for TermsStrictlyAscending {
    fn name(&self) -> &str {
        "TermsStrictlyAscending"
    }

    fn description(&self) -> &str {
        "Every segment enumerates its terms in strictly ascending order"
    }

    fn check(&self, reader: &IndexReader) -> Result<(), Violation> {
        for_each_segment(reader, |segment| {
            let mut previous: Option<Term> = None;
            for entry in segment.terms() {
                let (term, _) = entry.map_err(|e| read_error(self.name(), segment, e))?;
                if let Some(prev) = &previous {
                    if *prev >= term {
                        return Err(Violation::new(
                            self.name(),
                            Some(segment.id()),
                            "term does not follow its predecessor",
                        )
                        .with("previous", prev)
                        .with("term", &term));
                    }
                }
                previous = Some(term);
            }
            Ok(())
        })
    }
}

/// Posting lists hold strictly increasing in-range docs with positive frequencies
pub struct PostingsWellFormed;

impl Invariant for PostingsWellFormed {
    fn name(&self) -> &str {
        "PostingsWellFormed"
    }

    fn description(&self) -> &str {
        "Postings are strictly increasing, below max_doc, with tf > 0"
    }

    fn check(&self, reader: &IndexReader) -> Result<(), Violation> {
        for_each_segment(reader, |segment| {
            for entry in segment.terms() {
                let (term, info) = entry.map_err(|e| read_error(self.name(), segment, e))?;
                let mut postings = segment
                    .postings_for(&info)
                    .map_err(|e| read_error(self.name(), segment, e))?;
                let mut previous: Option<DocId> = None;
                while let Some(doc) = postings
                    .next_doc()
                    .map_err(|e| read_error(self.name(), segment, e))?
                {
                    let bad = if previous.is_some_and(|p| p >= doc) {
                        Some("doc ids not strictly increasing")
                    } else if doc.0 >= segment.max_doc() {
                        Some("doc id beyond max_doc")
                    } else if postings.term_frequency() == 0 {
                        Some("zero term frequency")
                    } else {
                        None
                    };
                    if let Some(reason) = bad {
                        return Err(Violation::new(self.name(), Some(segment.id()), reason)
                            .with("term", &term)
                            .with("doc", doc));
                    }
                    previous = Some(doc);
                }
            }
            Ok(())
        })
    }
}

/// Recorded doc frequencies equal the posting list lengths
pub struct DocFreqMatchesPostings;

impl Invariant for DocFreqMatchesPostings {
    fn name(&self) -> &str {
        "DocFreqMatchesPostings"
    }

    fn check(&self, reader: &IndexReader) -> Result<(), Violation> {
        for_each_segment(reader, |segment| {
            for entry in segment.terms() {
                let (term, info) = entry.map_err(|e| read_error(self.name(), segment, e))?;
                let postings = segment
                    .postings_for(&info)
                    .map_err(|e| read_error(self.name(), segment, e))?;
                let mut count = 0u32;
                for posting in postings {
                    posting.map_err(|e| read_error(self.name(), segment, e))?;
                    count += 1;
                }
                if count != info.doc_frequency {
                    return Err(Violation::new(
                        self.name(),
                        Some(segment.id()),
                        "doc frequency differs from postings",
                    )
                    .with("term", &term)
                    .with("recorded", info.doc_frequency)
                    .with("postings", count));
                }
            }
            Ok(())
        })
    }
}

/// Live and deleted counts add up, per segment and for the whole reader
pub struct LiveCountsConsistent;

impl Invariant for LiveCountsConsistent {
    fn name(&self) -> &str {
        "LiveCountsConsistent"
    }

    fn check(&self, reader: &IndexReader) -> Result<(), Violation> {
        for_each_segment(reader, |segment| {
            if segment.live_doc_count() + segment.deleted_doc_count() != segment.max_doc() {
                return Err(Violation::new(
                    self.name(),
                    Some(segment.id()),
                    "live + deleted != max_doc",
                )
                .with("live", segment.live_doc_count())
                .with("deleted", segment.deleted_doc_count())
                .with("max_doc", segment.max_doc()));
            }
            Ok(())
        })?;

        let live: u64 = reader
            .segments()
            .iter()
            .map(|s| s.live_doc_count() as u64)
            .sum();
        if live != reader.num_docs() {
            return Err(Violation::new(self.name(), None, "reader num_docs is stale")
                .with("segments", live)
                .with("reader", reader.num_docs()));
        }
        Ok(())
    }
}

/// Every live doc has a decodable stored record
pub struct StoredDocsReadable;

impl Invariant for StoredDocsReadable {
    fn name(&self) -> &str {
        "StoredDocsReadable"
    }

    fn check(&self, reader: &IndexReader) -> Result<(), Violation> {
        for_each_segment(reader, |segment| {
            for doc in segment.live_docs().iter_live() {
                if let Err(e) = segment.document(doc) {
                    return Err(Violation::new(
                        self.name(),
                        Some(segment.id()),
                        "stored document unreadable",
                    )
                    .with("doc", doc)
                    .with("error", e));
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::reader::tests::segment_from_texts;
    use crate::segment::LiveDocs;
    use std::sync::Arc;

    #[test]
    fn test_healthy_reader_passes() {
        let a = segment_from_texts(0, &["a b c", "b c d"]);
        let mut live = LiveDocs::new(1);
        live.delete(DocId(0));
        let b = segment_from_texts(1, &["x"]).with_live_docs(Arc::new(live), 1);
        let reader = IndexReader::from_segments(vec![a, b], 1);

        let violations = check_all_invariants(&reader, &default_invariants());
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_empty_reader_passes() {
        let reader = IndexReader::from_segments(Vec::new(), 0);
        assert!(check_all_invariants(&reader, &default_invariants()).is_empty());
    }

    #[test]
    fn test_violation_display() {
        let violation = Violation::new("TestInvariant", Some(SegmentId(3)), "Something went wrong")
            .with("doc", 42);

        let display = format!("{}", violation);
        assert!(display.contains("TestInvariant"));
        assert!(display.contains("Something went wrong"));
        assert!(display.contains("segment_3"));
        assert!(display.contains("42"));
    }
}
