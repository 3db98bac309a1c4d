//! Analyzer boundary: the writer consumes token streams produced here

mod analyzer;

pub use analyzer::{
    Analyzer, AnalyzerConfig, AnalyzerKind, StandardAnalyzer, Token, WhitespaceAnalyzer,
};
