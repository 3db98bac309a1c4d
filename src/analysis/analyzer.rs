use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// One token produced by an analyzer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Byte offset of the token start in the source text
    pub start_offset: usize,
    /// Byte offset one past the token end
    pub end_offset: usize,
    /// Distance from the previous emitted token (1 for adjacent tokens)
    pub position_increment: u32,
}

/// Turns field text into a lazy token stream
///
/// The index writer consumes tokens only; it never tokenizes on its own.
pub trait Analyzer: Send + Sync {
    fn token_stream<'a>(
        &'a self,
        field: &'a str,
        text: &'a str,
    ) -> Box<dyn Iterator<Item = Token> + 'a>;
}

/// Which analyzer implementation to build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Standard,
    Whitespace,
}

/// Analyzer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub kind: AnalyzerKind,
    pub lowercase: bool,
    /// Dropped tokens still advance the position counter
    pub stopwords: Vec<String>,
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            kind: AnalyzerKind::Standard,
            lowercase: true,
            stopwords: Vec::new(),
            min_token_length: 1,
            max_token_length: 255,
        }
    }
}

impl AnalyzerConfig {
    pub fn build(&self) -> Arc<dyn Analyzer> {
        match self.kind {
            AnalyzerKind::Standard => Arc::new(StandardAnalyzer::new(self)),
            AnalyzerKind::Whitespace => Arc::new(WhitespaceAnalyzer),
        }
    }
}

/// Unicode word segmentation with lowercasing, stopwords and length limits
pub struct StandardAnalyzer {
    lowercase: bool,
    stopwords: HashSet<String>,
    min_token_length: usize,
    max_token_length: usize,
}

impl StandardAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            lowercase: config.lowercase,
            stopwords: config.stopwords.iter().map(|s| s.to_lowercase()).collect(),
            min_token_length: config.min_token_length,
            max_token_length: config.max_token_length,
        }
    }

    fn keep(&self, token: &str) -> bool {
        token.len() >= self.min_token_length
            && token.len() <= self.max_token_length
            && !self.stopwords.contains(token)
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

impl Analyzer for StandardAnalyzer {
    fn token_stream<'a>(
        &'a self,
        _field: &'a str,
        text: &'a str,
    ) -> Box<dyn Iterator<Item = Token> + 'a> {
        let mut skipped = 0u32;
        Box::new(text.unicode_word_indices().filter_map(move |(start, word)| {
            let token = if self.lowercase {
                word.to_lowercase()
            } else {
                word.to_string()
            };
            if !self.keep(&token) {
                skipped += 1;
                return None;
            }
            let position_increment = 1 + skipped;
            skipped = 0;
            Some(Token {
                text: token,
                start_offset: start,
                end_offset: start + word.len(),
                position_increment,
            })
        }))
    }
}

/// Splits on whitespace, no normalization
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceAnalyzer;

impl Analyzer for WhitespaceAnalyzer {
    fn token_stream<'a>(
        &'a self,
        _field: &'a str,
        text: &'a str,
    ) -> Box<dyn Iterator<Item = Token> + 'a> {
        Box::new(text.split_whitespace().map(move |word| {
            // split_whitespace yields subslices of `text`
            let start = word.as_ptr() as usize - text.as_ptr() as usize;
            Token {
                text: word.to_string(),
                start_offset: start,
                end_offset: start + word.len(),
                position_increment: 1,
            }
        }))
    }
}
