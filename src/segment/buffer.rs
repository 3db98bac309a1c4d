//! In-memory inverted buffer for documents not yet flushed
//!
//! Documents get sequential doc ids as they are added. Postings per term are
//! appended in doc order, so every list is already sorted when the buffer is
//! flushed; only the term table needs sorting.

use std::collections::HashMap;

use crate::analysis::Analyzer;
use crate::error::{LucernaError, Result};
use crate::models::{
    Document, FieldValue, StoredDocument, StoredField, TermVector, TermVectorEntry,
};

use super::types::{validate_field_name, DocId, Posting, Term};

/// Check that a document can be indexed without touching any buffer
pub fn validate_document(doc: &Document) -> Result<()> {
    for field in doc.fields() {
        validate_field_name(&field.name)?;
        if field.flags.indexed && field.flags.tokenized && field.value.as_text().is_none() {
            return Err(LucernaError::InvalidArgument(format!(
                "tokenized field {:?} requires a text value",
                field.name
            )));
        }
    }
    Ok(())
}

/// Buffered postings of one term
#[derive(Clone, Debug)]
pub struct BufferedPostings {
    pub postings: Vec<Posting>,
    /// Cleared as soon as one document indexes the term without positions
    pub with_positions: bool,
}

#[derive(Default)]
struct DocTerm {
    frequency: u32,
    positions: Vec<u32>,
    with_positions: bool,
    term_vector: bool,
}

/// In-memory inverted buffer
#[derive(Debug, Default)]
pub struct DocumentsBuffer {
    terms: HashMap<Term, BufferedPostings>,
    stored: Vec<StoredDocument>,
    deleted: Vec<bool>,
    deleted_count: u32,
    size_bytes: usize,
}

impl DocumentsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invert a document into the buffer and return its doc id
    pub fn add_document(&mut self, doc: &Document, analyzer: &dyn Analyzer) -> Result<DocId> {
        validate_document(doc)?;

        let doc_id = DocId(self.stored.len() as u32);
        let mut doc_terms: HashMap<Term, DocTerm> = HashMap::new();
        // last position used per field, so repeated fields keep counting
        let mut last_position: HashMap<&str, u32> = HashMap::new();
        let mut stored = StoredDocument::default();

        for field in doc.fields() {
            if field.flags.stored {
                stored.fields.push(StoredField {
                    name: field.name.clone(),
                    value: field.value.clone(),
                });
            }
            if !field.flags.indexed {
                continue;
            }

            let mut record = |text: Vec<u8>, position: u32| {
                let entry = doc_terms
                    .entry(Term::new(field.name.as_str(), text))
                    .or_insert_with(|| DocTerm {
                        with_positions: true,
                        ..Default::default()
                    });
                entry.frequency += 1;
                entry.positions.push(position);
                entry.with_positions &= field.flags.positions;
                entry.term_vector |= field.flags.term_vectors;
            };

            let previous = last_position.get(field.name.as_str()).copied();
            let mut position = previous;
            match (&field.value, field.flags.tokenized) {
                (FieldValue::Text(text), true) => {
                    for token in analyzer.token_stream(&field.name, text) {
                        let next = match position {
                            None => token.position_increment.saturating_sub(1),
                            Some(p) => p.saturating_add(token.position_increment),
                        };
                        record(token.text.into_bytes(), next);
                        position = Some(next);
                    }
                }
                (value, _) => {
                    let next = position.map_or(0, |p| p.saturating_add(1));
                    record(value.as_bytes().to_vec(), next);
                    position = Some(next);
                }
            }
            if let Some(p) = position {
                last_position.insert(field.name.as_str(), p);
            }
        }

        let mut vectors: HashMap<String, Vec<TermVectorEntry>> = HashMap::new();
        for (term, entry) in doc_terms {
            if entry.term_vector {
                vectors
                    .entry(term.field.clone())
                    .or_default()
                    .push(TermVectorEntry {
                        text: term.text.clone(),
                        frequency: entry.frequency,
                        positions: entry.positions.clone(),
                    });
            }

            self.size_bytes +=
                std::mem::size_of::<Posting>() + term.text.len() + entry.positions.len() * 4;
            let buffered = self.terms.entry(term).or_insert_with(|| BufferedPostings {
                postings: Vec::new(),
                with_positions: true,
            });
            buffered.with_positions &= entry.with_positions;
            buffered.postings.push(Posting {
                doc: doc_id,
                term_frequency: entry.frequency,
                positions: entry.positions,
            });
        }

        for (field, mut terms) in vectors {
            terms.sort_by(|a, b| a.text.cmp(&b.text));
            stored.term_vectors.push(TermVector { field, terms });
        }
        stored.term_vectors.sort_by(|a, b| a.field.cmp(&b.field));

        self.size_bytes += doc.estimated_bytes();
        self.stored.push(stored);
        self.deleted.push(false);
        Ok(doc_id)
    }

    /// Mark every buffered document containing `term` deleted
    ///
    /// Returns the number of documents that were live before the call.
    pub fn delete_term(&mut self, term: &Term) -> u32 {
        let Some(buffered) = self.terms.get(term) else {
            return 0;
        };
        let mut count = 0;
        for posting in &buffered.postings {
            let flag = &mut self.deleted[posting.doc.as_usize()];
            if !*flag {
                *flag = true;
                count += 1;
            }
        }
        self.deleted_count += count;
        count
    }

    pub fn is_deleted(&self, doc: DocId) -> bool {
        self.deleted.get(doc.as_usize()).copied().unwrap_or(false)
    }

    pub fn get_postings(&self, term: &Term) -> Option<&BufferedPostings> {
        self.terms.get(term)
    }

    /// Terms with their postings in ascending term order
    pub fn sorted_terms(&self) -> Vec<(&Term, &BufferedPostings)> {
        let mut terms: Vec<_> = self.terms.iter().collect();
        terms.sort_by(|a, b| a.0.cmp(b.0));
        terms
    }

    pub fn stored_documents(&self) -> &[StoredDocument] {
        &self.stored
    }

    pub fn deleted_flags(&self) -> &[bool] {
        &self.deleted
    }

    pub fn doc_count(&self) -> u32 {
        self.stored.len() as u32
    }

    pub fn live_doc_count(&self) -> u32 {
        self.doc_count() - self.deleted_count
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn should_flush(&self, max_docs: usize, max_bytes: usize) -> bool {
        self.stored.len() >= max_docs || self.size_bytes >= max_bytes
    }

    pub fn clear(&mut self) {
        self.terms.clear();
        self.stored.clear();
        self.deleted.clear();
        self.deleted_count = 0;
        self.size_bytes = 0;
    }
}
