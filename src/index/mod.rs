//! Index-level writer and reader over a directory of segments

mod reader;
mod writer;

pub use reader::IndexReader;
pub use writer::{IndexWriter, WriterStatus};
