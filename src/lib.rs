//! Segment-based inverted index engine
//!
//! Documents are analyzed into an in-memory buffer, flushed as immutable
//! segments (FST term dictionary, block-compressed postings, stored fields,
//! live-docs bitmap) and published through crash-safe numbered commits.
//! Segments are merged in the background; queries run as pull-based scorer
//! trees over point-in-time reader snapshots.
//!
//! ```rust,ignore
//! use lucerna::{Document, Field, IndexSearcher, IndexWriter, IndexWriterConfig, Query};
//!
//! let writer = IndexWriter::open("/tmp/index", IndexWriterConfig::default())?;
//! writer.add_document(&Document::new().with_field(Field::text("body", "hello world")))?;
//! writer.commit()?;
//!
//! let searcher = IndexSearcher::new(writer.reader()?);
//! let top = searcher.search(&Query::term("body", "hello"), 10)?;
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod segment;
pub mod testing;

pub use analysis::{Analyzer, AnalyzerConfig, StandardAnalyzer, WhitespaceAnalyzer};
pub use config::{IndexWriterConfig, IndexingProfile, OpenMode};
pub use error::{LucernaError, Result};
pub use index::{IndexReader, IndexWriter, WriterStatus};
pub use models::*;
pub use search::{BooleanQuery, IndexSearcher, Query, SearchHit, TermQuery, TopDocs};
pub use segment::{DocId, SegmentId, Term};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
