//! Postings format registry
//!
//! Every segment records the name of the postings format it was written with.
//! Names resolve through a fixed table of constructors, so opening a segment
//! never depends on runtime discovery.

use crate::error::{LucernaError, Result};

use super::postings::{PostingsReader, PostingsWriter};

/// How integer streams inside a postings block are encoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockEncoding {
    /// Minimum-width bitpacking per block
    BitPacked,
    /// One variable-byte integer per value
    VByte,
}

/// A named postings layout: block size plus integer encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostingsFormat {
    name: &'static str,
    block_size: usize,
    encoding: BlockEncoding,
}

impl PostingsFormat {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn encoding(&self) -> BlockEncoding {
        self.encoding
    }

    pub fn writer(&self) -> PostingsWriter {
        PostingsWriter::new(*self)
    }

    pub fn reader(&self, data: Vec<u8>) -> PostingsReader {
        PostingsReader::new(data, *self)
    }
}

impl Default for PostingsFormat {
    fn default() -> Self {
        bitpacked128()
    }
}

/// Name of the format used when the configuration does not choose one
pub const DEFAULT_POSTINGS_FORMAT: &str = "bitpacked128";

type FormatConstructor = fn() -> PostingsFormat;

const REGISTRY: &[(&str, FormatConstructor)] = &[
    ("bitpacked128", bitpacked128),
    ("vbyte64", vbyte64),
];

fn bitpacked128() -> PostingsFormat {
    PostingsFormat {
        name: "bitpacked128",
        block_size: 128,
        encoding: BlockEncoding::BitPacked,
    }
}

fn vbyte64() -> PostingsFormat {
    PostingsFormat {
        name: "vbyte64",
        block_size: 64,
        encoding: BlockEncoding::VByte,
    }
}

/// Resolve a postings format by name
pub fn lookup(name: &str) -> Result<PostingsFormat> {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, construct)| construct())
        .ok_or_else(|| LucernaError::UnknownCodec(name.to_string()))
}

/// Names of all registered postings formats
pub fn registered_formats() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_registered_formats() {
        for name in registered_formats() {
            let format = lookup(name).unwrap();
            assert_eq!(format.name(), name);
            assert!(format.block_size() > 0);
        }
        assert_eq!(lookup(DEFAULT_POSTINGS_FORMAT).unwrap(), PostingsFormat::default());
    }

    #[test]
    fn test_lookup_unknown_format() {
        match lookup("lucene41") {
            Err(LucernaError::UnknownCodec(name)) => assert_eq!(name, "lucene41"),
            other => panic!("expected UnknownCodec, got {:?}", other.map(|f| f.name())),
        }
    }
}
