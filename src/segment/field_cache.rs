//! Per-segment field cache
//!
//! Un-inverts postings into per-document field lengths on first use. The
//! cache belongs to one segment's shared core and is dropped with it, so
//! every reader snapshot of the segment shares one copy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{LucernaError, Result};

use super::postings::PostingsReader;
use super::term_dict::TermDictionary;

/// Number of indexed tokens per document for one field
#[derive(Debug)]
pub struct FieldLengths {
    lengths: Vec<u32>,
    total: u64,
}

impl FieldLengths {
    /// Length of `doc`'s field (0 if the doc never had the field)
    pub fn get(&self, doc: usize) -> u32 {
        self.lengths.get(doc).copied().unwrap_or(0)
    }

    /// Sum of lengths across all documents
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn doc_count(&self) -> usize {
        self.lengths.len()
    }

    pub fn average(&self) -> f32 {
        if self.lengths.is_empty() {
            0.0
        } else {
            (self.total as f64 / self.lengths.len() as f64) as f32
        }
    }
}

#[derive(Default)]
pub struct FieldCache {
    lengths: RwLock<HashMap<String, Arc<FieldLengths>>>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field lengths for `field`, computed from the postings on first request
    pub fn field_lengths(
        &self,
        field: &str,
        terms: &TermDictionary,
        postings: &PostingsReader,
        max_doc: u32,
    ) -> Result<Arc<FieldLengths>> {
        if let Some(cached) = self.lengths.read().get(field) {
            return Ok(Arc::clone(cached));
        }

        let mut lengths = vec![0u32; max_doc as usize];
        let mut total = 0u64;
        let mut field_terms = terms.field_terms(field);
        while let Some((_, info)) = field_terms.next_key()? {
            let mut iter = postings.postings(&info)?;
            while let Some(doc) = iter.next_doc()? {
                let slot = lengths
                    .get_mut(doc.as_usize())
                    .ok_or_else(|| LucernaError::Corrupt(format!("doc {} beyond max_doc", doc)))?;
                let tf = iter.term_frequency();
                *slot = slot.saturating_add(tf);
                total += tf as u64;
            }
        }
        debug!(field, docs = max_doc, total, "un-inverted field lengths");

        let computed = Arc::new(FieldLengths { lengths, total });
        let mut cache = self.lengths.write();
        Ok(Arc::clone(
            cache.entry(field.to_string()).or_insert(computed),
        ))
    }

    pub fn cached_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.lengths.read().keys().cloned().collect();
        fields.sort();
        fields
    }

    pub fn clear(&self) {
        self.lengths.write().clear();
    }
}
