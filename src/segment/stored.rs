//! Stored fields file
//!
//! Layout of `stored.bin`:
//! - bincode-encoded `StoredDocument` records, one per doc in doc order
//! - `u64le` start offset of every record
//! - `u32le(doc_count)`
//! - `u32le(crc32)` over everything before it

use crate::error::{LucernaError, Result};
use crate::models::StoredDocument;

use super::types::DocId;

const FOOTER_LEN: usize = 8;

#[derive(Default)]
pub struct StoredFieldsWriter {
    data: Vec<u8>,
    offsets: Vec<u64>,
}

impl StoredFieldsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, doc: &StoredDocument) -> Result<()> {
        let record = bincode::serialize(doc)?;
        self.add_raw(&record);
        Ok(())
    }

    /// Append an already encoded record (used when merging)
    pub fn add_raw(&mut self, record: &[u8]) {
        self.offsets.push(self.data.len() as u64);
        self.data.extend_from_slice(record);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn finish(mut self) -> Vec<u8> {
        for offset in &self.offsets {
            self.data.extend_from_slice(&offset.to_le_bytes());
        }
        self.data
            .extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        let checksum = crc32fast::hash(&self.data);
        self.data.extend_from_slice(&checksum.to_le_bytes());
        self.data
    }
}

pub struct StoredFieldsReader {
    data: Vec<u8>,
    offsets: Vec<u64>,
    records_end: u64,
}

impl StoredFieldsReader {
    /// Open a stored fields file, verifying its checksum
    pub fn open(data: Vec<u8>) -> Result<Self> {
        if data.len() < FOOTER_LEN {
            return Err(LucernaError::Corrupt("stored fields file too short".to_string()));
        }
        let body_len = data.len() - 4;
        let stored = read_u32(&data, body_len)?;
        if crc32fast::hash(&data[..body_len]) != stored {
            return Err(LucernaError::Corrupt(
                "stored fields checksum mismatch".to_string(),
            ));
        }

        let count = read_u32(&data, body_len - 4)? as usize;
        let table_len = count
            .checked_mul(8)
            .filter(|&len| len <= body_len - 4)
            .ok_or_else(|| LucernaError::decode("stored fields offset table truncated"))?;
        let table_start = body_len - 4 - table_len;

        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let at = table_start + i * 8;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[at..at + 8]);
            offsets.push(u64::from_le_bytes(buf));
        }
        let records_end = table_start as u64;
        if offsets.windows(2).any(|w| w[0] > w[1])
            || offsets.last().map_or(false, |&last| last > records_end)
        {
            return Err(LucernaError::decode("stored fields offsets out of order"));
        }

        Ok(Self {
            data,
            offsets,
            records_end,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Encoded record for `doc`
    pub fn raw(&self, doc: DocId) -> Result<&[u8]> {
        let idx = doc.as_usize();
        let start = *self
            .offsets
            .get(idx)
            .ok_or(LucernaError::DocNotFound(doc.0))?;
        let end = self
            .offsets
            .get(idx + 1)
            .copied()
            .unwrap_or(self.records_end);
        Ok(&self.data[start as usize..end as usize])
    }

    pub fn document(&self, doc: DocId) -> Result<StoredDocument> {
        Ok(bincode::deserialize(self.raw(doc)?)?)
    }
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    let bytes = data
        .get(at..at + 4)
        .ok_or_else(|| LucernaError::decode("unexpected end of stored fields"))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, StoredField};

    fn doc(text: &str) -> StoredDocument {
        StoredDocument {
            fields: vec![StoredField {
                name: "body".to_string(),
                value: FieldValue::from(text),
            }],
            term_vectors: Vec::new(),
        }
    }

    #[test]
    fn test_write_read() {
        let mut writer = StoredFieldsWriter::new();
        writer.add(&doc("one")).unwrap();
        writer.add(&StoredDocument::default()).unwrap();
        writer.add(&doc("three")).unwrap();

        let reader = StoredFieldsReader::open(writer.finish()).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.document(DocId(0)).unwrap(), doc("one"));
        assert_eq!(reader.document(DocId(1)).unwrap(), StoredDocument::default());
        assert_eq!(reader.document(DocId(2)).unwrap(), doc("three"));
        assert!(matches!(
            reader.document(DocId(3)),
            Err(LucernaError::DocNotFound(3))
        ));
    }

    #[test]
    fn test_raw_copy() {
        let mut writer = StoredFieldsWriter::new();
        writer.add(&doc("moved")).unwrap();
        let source = StoredFieldsReader::open(writer.finish()).unwrap();

        let mut copy = StoredFieldsWriter::new();
        copy.add_raw(source.raw(DocId(0)).unwrap());
        let copied = StoredFieldsReader::open(copy.finish()).unwrap();
        assert_eq!(copied.document(DocId(0)).unwrap(), doc("moved"));
    }

    #[test]
    fn test_empty_file() {
        let reader = StoredFieldsReader::open(StoredFieldsWriter::new().finish()).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut writer = StoredFieldsWriter::new();
        writer.add(&doc("x")).unwrap();
        let mut data = writer.finish();
        data[1] ^= 0x01;
        assert!(matches!(
            StoredFieldsReader::open(data),
            Err(LucernaError::Corrupt(_))
        ));
    }
}
