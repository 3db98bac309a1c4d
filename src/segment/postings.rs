//! Block-compressed posting lists
//!
//! A posting list is laid out as:
//! - `vbyte(block_count)`
//! - per block a skip entry: `vbyte(last_doc)` + `u64le(block_offset)`
//! - the blocks themselves
//!
//! Each block holds `vbyte(count)`, doc deltas, term frequencies and, when the
//! list stores positions, `vbyte(byte_len)` followed by per-document position
//! deltas. Doc deltas are taken against the previous block's last doc, so any
//! block decodes on its own once its skip entry is known.

use crate::error::{LucernaError, Result};

use super::codec::{BlockEncoding, PostingsFormat};
use super::types::{DocId, Posting, TermInfo};

/// Variable-byte encoding for integers
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80); // high bit marks the last byte
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a variable-byte encoded integer
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;

    loop {
        let byte = *input
            .get(*pos)
            .ok_or_else(|| LucernaError::decode("unexpected end of vbyte"))?;
        *pos += 1;

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 28 {
            return Err(LucernaError::decode("vbyte value too large"));
        }
    }
}

/// Pack integers with the minimum bit width needed for the block maximum
pub fn bitpack_encode(values: &[u32], output: &mut Vec<u8>) {
    let max_val = match values.iter().max() {
        Some(&max) => max,
        None => {
            output.push(0);
            return;
        }
    };
    let bits_needed = if max_val == 0 {
        1
    } else {
        32 - max_val.leading_zeros()
    } as u8;

    output.push(bits_needed);

    let mut current: u64 = 0;
    let mut bits_in_current = 0;

    for &value in values {
        current |= (value as u64) << bits_in_current;
        bits_in_current += bits_needed as u32;

        while bits_in_current >= 8 {
            output.push(current as u8);
            current >>= 8;
            bits_in_current -= 8;
        }
    }

    if bits_in_current > 0 {
        output.push(current as u8);
    }
}

/// Decode `count` bitpacked integers
pub fn bitpack_decode(input: &[u8], pos: &mut usize, count: usize) -> Result<Vec<u32>> {
    let bits_needed = *input
        .get(*pos)
        .ok_or_else(|| LucernaError::decode("unexpected end of bitpack header"))?
        as u32;
    *pos += 1;

    if bits_needed == 0 {
        return Ok(vec![0; count]);
    }
    if bits_needed > 32 {
        return Err(LucernaError::decode(format!(
            "invalid bitpack width {}",
            bits_needed
        )));
    }

    let total_bits = count as u64 * bits_needed as u64;
    let bytes_needed = ((total_bits + 7) / 8) as usize;
    if *pos + bytes_needed > input.len() {
        return Err(LucernaError::decode("not enough bytes for bitpack"));
    }

    let mut values = Vec::with_capacity(count);
    let mut current: u64 = 0;
    let mut bits_available = 0;
    let mask = (1u64 << bits_needed) - 1;
    let end = *pos + bytes_needed;

    for _ in 0..count {
        while bits_available < bits_needed {
            if *pos < end {
                current |= (input[*pos] as u64) << bits_available;
                *pos += 1;
            }
            bits_available += 8;
        }

        values.push((current & mask) as u32);
        current >>= bits_needed;
        bits_available -= bits_needed;
    }
    *pos = end;

    Ok(values)
}

fn encode_values(encoding: BlockEncoding, values: &[u32], output: &mut Vec<u8>) {
    match encoding {
        BlockEncoding::BitPacked => bitpack_encode(values, output),
        BlockEncoding::VByte => {
            for &value in values {
                encode_vbyte(value, output);
            }
        }
    }
}

fn decode_values(
    encoding: BlockEncoding,
    input: &[u8],
    pos: &mut usize,
    count: usize,
) -> Result<Vec<u32>> {
    match encoding {
        BlockEncoding::BitPacked => bitpack_decode(input, pos, count),
        BlockEncoding::VByte => (0..count).map(|_| decode_vbyte(input, pos)).collect(),
    }
}

fn read_u64_le(input: &[u8], pos: &mut usize) -> Result<u64> {
    let bytes = input
        .get(*pos..*pos + 8)
        .ok_or_else(|| LucernaError::decode("unexpected end of skip entry"))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    *pos += 8;
    Ok(u64::from_le_bytes(buf))
}

/// Skip data for jumping over whole blocks
#[derive(Clone, Debug, Default)]
pub struct SkipEntry {
    /// Last doc in this block
    pub last_doc: DocId,
    /// Offset of the block relative to the start of the block area
    pub block_offset: u64,
}

#[derive(Default)]
struct PendingBlock {
    docs: Vec<u32>,
    tfs: Vec<u32>,
    positions: Vec<Vec<u32>>,
}

impl PendingBlock {
    fn len(&self) -> usize {
        self.docs.len()
    }

    fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Writer for posting lists
///
/// Lists are appended one after another into a single buffer that becomes
/// the segment's postings file.
pub struct PostingsWriter {
    format: PostingsFormat,
    /// Encoded blocks of the current list
    block_data: Vec<u8>,
    skip_entries: Vec<SkipEntry>,
    current_block: PendingBlock,
    /// Delta base for the next block
    block_base: u32,
    last_doc: Option<DocId>,
    with_positions: bool,
    doc_frequency: u32,
    total_term_frequency: u64,
    data: Vec<u8>,
}

impl PostingsWriter {
    pub fn new(format: PostingsFormat) -> Self {
        Self {
            format,
            block_data: Vec::new(),
            skip_entries: Vec::new(),
            current_block: PendingBlock::default(),
            block_base: 0,
            last_doc: None,
            with_positions: false,
            doc_frequency: 0,
            total_term_frequency: 0,
            data: Vec::new(),
        }
    }

    /// Start writing a new posting list
    pub fn start_posting_list(&mut self, with_positions: bool) {
        self.block_data.clear();
        self.skip_entries.clear();
        self.current_block = PendingBlock::default();
        self.block_base = 0;
        self.last_doc = None;
        self.with_positions = with_positions;
        self.doc_frequency = 0;
        self.total_term_frequency = 0;
    }

    /// Add a posting to the current list; docs must be strictly increasing
    pub fn add_posting(&mut self, posting: &Posting) -> Result<()> {
        if let Some(previous) = self.last_doc {
            if posting.doc <= previous {
                return Err(LucernaError::NonMonotonicDocId {
                    previous: previous.0,
                    doc: posting.doc.0,
                });
            }
        }
        if posting.term_frequency == 0 {
            return Err(LucernaError::encode(format!(
                "posting for doc {} has zero term frequency",
                posting.doc
            )));
        }
        if self.with_positions {
            if posting.positions.len() != posting.term_frequency as usize {
                return Err(LucernaError::encode(format!(
                    "doc {} has {} positions for term frequency {}",
                    posting.doc,
                    posting.positions.len(),
                    posting.term_frequency
                )));
            }
            if posting.positions.windows(2).any(|w| w[1] < w[0]) {
                return Err(LucernaError::encode(format!(
                    "positions for doc {} are not sorted",
                    posting.doc
                )));
            }
            self.current_block.positions.push(posting.positions.clone());
        }

        self.current_block.docs.push(posting.doc.0);
        self.current_block.tfs.push(posting.term_frequency);
        self.last_doc = Some(posting.doc);
        self.doc_frequency += 1;
        self.total_term_frequency += posting.term_frequency as u64;

        if self.current_block.len() >= self.format.block_size() {
            self.flush_block();
        }
        Ok(())
    }

    /// Finish the current posting list and return its dictionary metadata
    pub fn finish_posting_list(&mut self) -> Result<TermInfo> {
        self.flush_block();
        if self.skip_entries.is_empty() {
            return Err(LucernaError::encode("posting list is empty"));
        }

        let offset = self.data.len() as u64;

        encode_vbyte(self.skip_entries.len() as u32, &mut self.data);
        for skip in &self.skip_entries {
            encode_vbyte(skip.last_doc.0, &mut self.data);
            self.data.extend_from_slice(&skip.block_offset.to_le_bytes());
        }
        self.data.extend_from_slice(&self.block_data);

        let length = self.data.len() as u64 - offset;
        let info = TermInfo {
            offset,
            length,
            doc_frequency: self.doc_frequency,
            total_term_frequency: self.total_term_frequency,
            has_positions: self.with_positions,
        };
        self.start_posting_list(false);
        Ok(info)
    }

    /// Write a complete posting list in one call
    pub fn write_posting_list(
        &mut self,
        postings: &[Posting],
        with_positions: bool,
    ) -> Result<TermInfo> {
        self.start_posting_list(with_positions);
        for posting in postings {
            self.add_posting(posting)?;
        }
        self.finish_posting_list()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn flush_block(&mut self) {
        if self.current_block.is_empty() {
            return;
        }
        let block = std::mem::take(&mut self.current_block);
        let last_doc = block.docs[block.len() - 1];

        self.skip_entries.push(SkipEntry {
            last_doc: DocId(last_doc),
            block_offset: self.block_data.len() as u64,
        });

        encode_vbyte(block.len() as u32, &mut self.block_data);

        let mut deltas = Vec::with_capacity(block.len());
        let mut prev = self.block_base;
        for &doc in &block.docs {
            deltas.push(doc - prev);
            prev = doc;
        }
        encode_values(self.format.encoding(), &deltas, &mut self.block_data);
        encode_values(self.format.encoding(), &block.tfs, &mut self.block_data);

        if self.with_positions {
            let mut position_bytes = Vec::new();
            for positions in &block.positions {
                let mut prev = 0u32;
                for &position in positions {
                    encode_vbyte(position - prev, &mut position_bytes);
                    prev = position;
                }
            }
            encode_vbyte(position_bytes.len() as u32, &mut self.block_data);
            self.block_data.extend_from_slice(&position_bytes);
        }

        self.block_base = last_doc;
    }
}

impl Default for PostingsWriter {
    fn default() -> Self {
        Self::new(PostingsFormat::default())
    }
}

/// Reader over a segment's postings file
pub struct PostingsReader {
    data: Vec<u8>,
    format: PostingsFormat,
}

impl PostingsReader {
    pub fn new(data: Vec<u8>, format: PostingsFormat) -> Self {
        Self { data, format }
    }

    /// Open an iterator over the posting list described by `info`
    pub fn postings(&self, info: &TermInfo) -> Result<PostingIterator<'_>> {
        let start = info.offset as usize;
        let end = info
            .offset
            .checked_add(info.length)
            .map(|e| e as usize)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| LucernaError::decode("posting list extends beyond postings data"))?;

        PostingIterator::new(&self.data[start..end], info, self.format.encoding())
    }

    pub fn format(&self) -> PostingsFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Cursor over one posting list
///
/// Starts unpositioned; `next_doc` and `skip_to` move it forward and return
/// `None` once the list is exhausted.
pub struct PostingIterator<'a> {
    data: &'a [u8],
    encoding: BlockEncoding,
    has_positions: bool,
    doc_frequency: u32,
    blocks_start: usize,
    skip_entries: Vec<SkipEntry>,
    /// Index of the next block to decode
    next_block: usize,
    docs: Vec<DocId>,
    tfs: Vec<u32>,
    positions: Vec<Vec<u32>>,
    /// Index of the next posting to return from the decoded block
    cursor: usize,
    current: Option<DocId>,
    exhausted: bool,
}

impl<'a> PostingIterator<'a> {
    fn new(data: &'a [u8], info: &TermInfo, encoding: BlockEncoding) -> Result<Self> {
        let mut pos = 0;
        let block_count = decode_vbyte(data, &mut pos)? as usize;

        let mut skip_entries = Vec::with_capacity(block_count.min(data.len()));
        for _ in 0..block_count {
            let last_doc = decode_vbyte(data, &mut pos)?;
            let block_offset = read_u64_le(data, &mut pos)?;
            skip_entries.push(SkipEntry {
                last_doc: DocId(last_doc),
                block_offset,
            });
        }

        let blocks_start = pos;
        if skip_entries
            .iter()
            .any(|s| blocks_start as u64 + s.block_offset >= data.len() as u64)
        {
            return Err(LucernaError::decode("skip entry points past posting list"));
        }

        Ok(Self {
            data,
            encoding,
            has_positions: info.has_positions,
            doc_frequency: info.doc_frequency,
            blocks_start,
            skip_entries,
            next_block: 0,
            docs: Vec::new(),
            tfs: Vec::new(),
            positions: Vec::new(),
            cursor: 0,
            current: None,
            exhausted: false,
        })
    }

    /// Current doc, `None` before the first advance and after exhaustion
    pub fn doc(&self) -> Option<DocId> {
        self.current
    }

    /// Term frequency at the current doc (0 when unpositioned)
    pub fn term_frequency(&self) -> u32 {
        match self.current {
            Some(_) => self.tfs[self.cursor - 1],
            None => 0,
        }
    }

    /// Positions at the current doc (empty when not stored)
    pub fn positions(&self) -> &[u32] {
        match self.current {
            Some(_) if self.has_positions => &self.positions[self.cursor - 1],
            _ => &[],
        }
    }

    pub fn has_positions(&self) -> bool {
        self.has_positions
    }

    pub fn doc_frequency(&self) -> u32 {
        self.doc_frequency
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advance to the next posting
    pub fn next_doc(&mut self) -> Result<Option<DocId>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.cursor >= self.docs.len() {
            match self.load_next_block() {
                Ok(true) => {}
                Ok(false) => return Ok(self.exhaust()),
                Err(e) => {
                    self.exhaust();
                    return Err(e);
                }
            }
        }
        let doc = self.docs[self.cursor];
        self.cursor += 1;
        self.current = Some(doc);
        Ok(Some(doc))
    }

    /// Advance to the first doc `>= target` that lies beyond the current doc.
    ///
    /// A target at or behind the current doc behaves like `next_doc`.
    pub fn skip_to(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.exhausted {
            return Ok(None);
        }
        let target = match self.current {
            Some(current) if current >= target => match current.0.checked_add(1) {
                Some(next) => DocId(next),
                None => return Ok(self.exhaust()),
            },
            _ => target,
        };

        let in_loaded_block = self.cursor < self.docs.len()
            && self.docs.last().map_or(false, |&last| last >= target);
        if !in_loaded_block {
            let remaining = &self.skip_entries[self.next_block..];
            let offset = remaining.partition_point(|s| s.last_doc < target);
            if offset == remaining.len() {
                return Ok(self.exhaust());
            }
            self.next_block += offset;
            self.docs.clear();
            self.cursor = 0;
        }

        while let Some(doc) = self.next_doc()? {
            if doc >= target {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    fn exhaust(&mut self) -> Option<DocId> {
        self.exhausted = true;
        self.current = None;
        None
    }

    fn load_next_block(&mut self) -> Result<bool> {
        let Some(skip) = self.skip_entries.get(self.next_block) else {
            return Ok(false);
        };
        let mut pos = self.blocks_start + skip.block_offset as usize;
        let mut doc = if self.next_block == 0 {
            0
        } else {
            self.skip_entries[self.next_block - 1].last_doc.0
        };
        let expected_last = skip.last_doc;

        let count = decode_vbyte(self.data, &mut pos)? as usize;
        if count == 0 {
            return Err(LucernaError::decode("empty postings block"));
        }

        let deltas = decode_values(self.encoding, self.data, &mut pos, count)?;
        let tfs = decode_values(self.encoding, self.data, &mut pos, count)?;

        self.docs.clear();
        for (i, delta) in deltas.into_iter().enumerate() {
            if i > 0 && delta == 0 {
                return Err(LucernaError::decode("repeated doc in postings block"));
            }
            doc = doc
                .checked_add(delta)
                .ok_or_else(|| LucernaError::decode("doc delta overflow"))?;
            self.docs.push(DocId(doc));
        }
        if self.docs.last() != Some(&expected_last) {
            return Err(LucernaError::decode(
                "postings block does not end at its skip entry",
            ));
        }
        if tfs.iter().any(|&tf| tf == 0) {
            return Err(LucernaError::decode("zero term frequency in postings block"));
        }

        self.positions.clear();
        if self.has_positions {
            let byte_len = decode_vbyte(self.data, &mut pos)? as usize;
            let end = pos
                .checked_add(byte_len)
                .filter(|&e| e <= self.data.len())
                .ok_or_else(|| LucernaError::decode("positions extend beyond posting list"))?;
            let section = &self.data[..end];
            for &tf in &tfs {
                let mut positions = Vec::with_capacity(tf as usize);
                let mut position = 0u32;
                for _ in 0..tf {
                    let delta = decode_vbyte(section, &mut pos)?;
                    position = position
                        .checked_add(delta)
                        .ok_or_else(|| LucernaError::decode("position delta overflow"))?;
                    positions.push(position);
                }
                self.positions.push(positions);
            }
            if pos != end {
                return Err(LucernaError::decode("positions section length mismatch"));
            }
        }

        self.tfs = tfs;
        self.cursor = 0;
        self.next_block += 1;
        Ok(true)
    }
}

impl<'a> Iterator for PostingIterator<'a> {
    type Item = Result<Posting>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_doc() {
            Ok(Some(doc)) => Some(Ok(Posting {
                doc,
                term_frequency: self.term_frequency(),
                positions: self.positions().to_vec(),
            })),
            Ok(None) => None,
            Err(e) => {
                self.exhausted = true;
                self.current = None;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::codec::lookup;

    fn write_list(format: PostingsFormat, postings: &[Posting], positions: bool) -> (PostingsReader, TermInfo) {
        let mut writer = format.writer();
        let info = writer.write_posting_list(postings, positions).unwrap();
        (format.reader(writer.into_data()), info)
    }

    #[test]
    fn test_vbyte_encoding() {
        let mut output = Vec::new();

        encode_vbyte(0, &mut output);
        encode_vbyte(127, &mut output);
        encode_vbyte(128, &mut output);
        encode_vbyte(16383, &mut output);
        encode_vbyte(u32::MAX, &mut output);

        let mut pos = 0;
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 0);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 127);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 128);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 16383);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), u32::MAX);
        assert!(decode_vbyte(&output, &mut pos).is_err());
    }

    #[test]
    fn test_bitpack_large_values() {
        let values = vec![1000, 2000, 3000, u32::MAX];
        let mut output = Vec::new();

        bitpack_encode(&values, &mut output);

        let mut pos = 0;
        let decoded = bitpack_decode(&output, &mut pos, values.len()).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(pos, output.len());
    }

    #[test]
    fn test_bitpack_truncated_input() {
        let mut output = Vec::new();
        bitpack_encode(&[5, 6, 7, 8, 9, 10, 11, 12], &mut output);
        output.truncate(output.len() - 1);
        let mut pos = 0;
        assert!(bitpack_decode(&output, &mut pos, 8).is_err());
    }

    #[test]
    fn test_postings_writer_reader() {
        for name in ["bitpacked128", "vbyte64"] {
            let format = lookup(name).unwrap();
            let postings: Vec<Posting> = (0..10)
                .map(|i| Posting::new(DocId(i * 10), i + 1))
                .collect();
            let (reader, info) = write_list(format, &postings, false);
            assert_eq!(info.doc_frequency, 10);
            assert_eq!(info.total_term_frequency, 55);

            let decoded: Vec<Posting> = reader
                .postings(&info)
                .unwrap()
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(decoded, postings);
        }
    }

    #[test]
    fn test_positions_survive_block_boundaries() {
        let format = lookup("vbyte64").unwrap();
        let postings: Vec<Posting> = (0..150)
            .map(|i| Posting::with_positions(DocId(i * 3 + 1), vec![i, i + 2, i + 2, i + 40]))
            .collect();
        let (reader, info) = write_list(format, &postings, true);
        assert!(info.has_positions);

        let decoded: Vec<Posting> = reader
            .postings(&info)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(decoded, postings);
    }

    #[test]
    fn test_postings_skip() {
        let format = PostingsFormat::default();
        let postings: Vec<Posting> = (0..300).map(|i| Posting::new(DocId(i * 2), 1)).collect();
        let (reader, info) = write_list(format, &postings, false);
        let mut iter = reader.postings(&info).unwrap();

        assert_eq!(iter.skip_to(DocId(401)).unwrap(), Some(DocId(402)));
        assert_eq!(iter.doc(), Some(DocId(402)));
        // target behind the cursor still advances
        assert_eq!(iter.skip_to(DocId(10)).unwrap(), Some(DocId(404)));
        assert_eq!(iter.next_doc().unwrap(), Some(DocId(406)));
        assert_eq!(iter.skip_to(DocId(598)).unwrap(), Some(DocId(598)));
        assert_eq!(iter.skip_to(DocId(599)).unwrap(), None);
        assert!(iter.is_exhausted());
        assert_eq!(iter.next_doc().unwrap(), None);
        assert_eq!(iter.term_frequency(), 0);
    }

    #[test]
    fn test_skip_within_first_block_from_unstarted() {
        let format = PostingsFormat::default();
        let postings = vec![Posting::new(DocId(0), 2), Posting::new(DocId(7), 1)];
        let (reader, info) = write_list(format, &postings, false);
        let mut iter = reader.postings(&info).unwrap();
        assert_eq!(iter.doc(), None);
        assert_eq!(iter.skip_to(DocId(0)).unwrap(), Some(DocId(0)));
        assert_eq!(iter.term_frequency(), 2);
        assert_eq!(iter.skip_to(DocId(3)).unwrap(), Some(DocId(7)));
    }

    #[test]
    fn test_writer_rejects_non_monotonic_docs() {
        let mut writer = PostingsWriter::default();
        writer.start_posting_list(false);
        writer.add_posting(&Posting::new(DocId(5), 1)).unwrap();
        match writer.add_posting(&Posting::new(DocId(5), 1)) {
            Err(LucernaError::NonMonotonicDocId { previous, doc }) => {
                assert_eq!((previous, doc), (5, 5));
            }
            other => panic!("expected NonMonotonicDocId, got {:?}", other),
        }
        assert!(writer.add_posting(&Posting::new(DocId(6), 0)).is_err());
    }

    #[test]
    fn test_writer_rejects_empty_list() {
        let mut writer = PostingsWriter::default();
        writer.start_posting_list(true);
        assert!(writer.finish_posting_list().is_err());
    }

    #[test]
    fn test_truncated_list_is_decode_error() {
        let format = PostingsFormat::default();
        let postings: Vec<Posting> = (0..20).map(|i| Posting::new(DocId(i), 1)).collect();
        let mut writer = format.writer();
        let mut info = writer.write_posting_list(&postings, false).unwrap();
        info.length -= 3;
        let reader = format.reader(writer.into_data());
        let result: Result<Vec<Posting>> = match reader.postings(&info) {
            Ok(iter) => iter.collect(),
            Err(e) => Err(e),
        };
        assert!(matches!(result, Err(LucernaError::Decode(_))));
    }

    #[test]
    fn test_decode_error_during_skip_unpositions() {
        let format = lookup("vbyte64").unwrap();
        let postings: Vec<Posting> = (0..200)
            .map(|i| Posting::with_positions(DocId(i), vec![0, 3]))
            .collect();
        let mut writer = format.writer();
        let mut info = writer.write_posting_list(&postings, true).unwrap();
        info.length -= 3;
        let reader = format.reader(writer.into_data());

        let mut iter = reader.postings(&info).unwrap();
        assert_eq!(iter.next_doc().unwrap(), Some(DocId(0)));
        assert_eq!(iter.term_frequency(), 2);
        // the last block is truncated
        assert!(iter.skip_to(DocId(195)).is_err());
        assert_eq!(iter.doc(), None);
        assert_eq!(iter.term_frequency(), 0);
        assert!(iter.positions().is_empty());
        assert!(iter.is_exhausted());
        assert_eq!(iter.next_doc().unwrap(), None);
    }

    #[test]
    fn test_multiple_lists_share_buffer() {
        let format = PostingsFormat::default();
        let mut writer = format.writer();
        let first = writer
            .write_posting_list(&[Posting::new(DocId(1), 1)], false)
            .unwrap();
        let second = writer
            .write_posting_list(&[Posting::new(DocId(2), 3)], false)
            .unwrap();
        assert_eq!(second.offset, first.length);

        let reader = format.reader(writer.into_data());
        let mut iter = reader.postings(&second).unwrap();
        assert_eq!(iter.next_doc().unwrap(), Some(DocId(2)));
        assert_eq!(iter.term_frequency(), 3);
    }
}
