use serde::{Deserialize, Serialize};

/// BM25 parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation
    pub k1: f32,
    /// Length normalization strength (0 disables it)
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Inverse document frequency of a term found in `doc_freq` of `doc_count` docs
pub fn idf(doc_freq: u64, doc_count: u64) -> f32 {
    let df = doc_freq as f32;
    let n = doc_count.max(doc_freq) as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Query-time constants for scoring one term
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bm25Weight {
    params: Bm25Params,
    /// idf multiplied by the query boost
    weight: f32,
    avg_field_length: f32,
}

impl Bm25Weight {
    pub fn new(
        params: Bm25Params,
        doc_freq: u64,
        doc_count: u64,
        avg_field_length: f32,
        boost: f32,
    ) -> Self {
        Self {
            params,
            weight: idf(doc_freq, doc_count) * boost,
            avg_field_length,
        }
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Score of a doc with `tf` occurrences in a field of `field_length` tokens
    pub fn score(&self, tf: u32, field_length: u32) -> f32 {
        let tf = tf as f32;
        let norm = if self.avg_field_length > 0.0 {
            1.0 - self.params.b + self.params.b * (field_length as f32 / self.avg_field_length)
        } else {
            1.0
        };
        self.weight * (tf * (self.params.k1 + 1.0)) / (tf + self.params.k1 * norm)
    }
}
