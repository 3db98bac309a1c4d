//! Term dictionary using FST (Finite State Transducer)
//!
//! Keys are encoded terms (`field ‖ 0x00 ‖ text`); the FST value indexes a
//! parallel `TermInfo` table holding each posting list's location and stats.
//! The FST gives O(|key|) lookups and ordered range streams for seeking and
//! prefix enumeration.

use fst::map::Stream;
use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use crate::error::{LucernaError, Result};

use super::types::{Term, TermInfo};

/// Immutable term dictionary for one segment
pub struct TermDictionary {
    fst: Map<Vec<u8>>,
    infos: Vec<TermInfo>,
}

impl TermDictionary {
    /// Create a term dictionary from FST bytes and the term info table
    pub fn new(fst_data: Vec<u8>, infos: Vec<TermInfo>) -> Result<Self> {
        let fst = Map::new(fst_data)
            .map_err(|e| LucernaError::decode(format!("invalid term dictionary: {}", e)))?;
        if fst.len() != infos.len() {
            return Err(LucernaError::decode(format!(
                "term dictionary has {} keys but {} term infos",
                fst.len(),
                infos.len()
            )));
        }
        Ok(Self { fst, infos })
    }

    /// Rebuild a dictionary from its two on-disk files
    pub fn from_bytes(fst_data: Vec<u8>, info_bytes: &[u8]) -> Result<Self> {
        let infos: Vec<TermInfo> = bincode::deserialize(info_bytes)?;
        Self::new(fst_data, infos)
    }

    /// Look up a term and return its postings metadata
    pub fn get(&self, term: &Term) -> Option<&TermInfo> {
        self.get_key(&term.to_key())
    }

    pub fn get_key(&self, key: &[u8]) -> Option<&TermInfo> {
        self.fst
            .get(key)
            .and_then(|idx| self.infos.get(idx as usize))
    }

    pub fn contains(&self, term: &Term) -> bool {
        self.fst.contains_key(term.to_key())
    }

    /// Number of distinct terms
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Enumerate every term in ascending `(field, text)` order
    pub fn terms(&self) -> TermEnum<'_> {
        TermEnum::new(self.fst.stream(), &self.infos, Vec::new())
    }

    /// Position an enumeration on the first term `>= term`.
    ///
    /// Returns `None` when every term sorts before `term`.
    pub fn seek(&self, term: &Term) -> Option<TermEnum<'_>> {
        let stream = self.fst.range().ge(term.to_key()).into_stream();
        let mut terms = TermEnum::new(stream, &self.infos, Vec::new());
        terms.peek_key()?;
        Some(terms)
    }

    /// Enumerate the terms of `field` whose text starts with `prefix`
    pub fn prefix(&self, field: &str, prefix: &[u8]) -> TermEnum<'_> {
        let mut key = Term::field_key_prefix(field);
        key.extend_from_slice(prefix);
        let stream = self.fst.range().ge(&key).into_stream();
        TermEnum::new(stream, &self.infos, key)
    }

    /// Enumerate all terms of one field
    pub fn field_terms(&self, field: &str) -> TermEnum<'_> {
        self.prefix(field, &[])
    }

    pub fn fst_bytes(&self) -> &[u8] {
        self.fst.as_fst().as_bytes()
    }

    pub fn infos(&self) -> &[TermInfo] {
        &self.infos
    }

    /// Serialize the term info table
    pub fn info_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.infos)?)
    }
}

/// Ordered, finite enumeration over dictionary terms
///
/// Bounded by an optional key prefix; enumerations are cheap to recreate,
/// so callers restart by asking the dictionary for a new one.
pub struct TermEnum<'a> {
    stream: Stream<'a>,
    infos: &'a [TermInfo],
    prefix: Vec<u8>,
    peeked: Option<(Vec<u8>, u64)>,
    done: bool,
}

impl<'a> TermEnum<'a> {
    fn new(stream: Stream<'a>, infos: &'a [TermInfo], prefix: Vec<u8>) -> Self {
        Self {
            stream,
            infos,
            prefix,
            peeked: None,
            done: false,
        }
    }

    /// Encoded key of the next term without consuming it
    pub fn peek_key(&mut self) -> Option<&[u8]> {
        if self.peeked.is_none() {
            self.peeked = self.pull();
        }
        self.peeked.as_ref().map(|(key, _)| key.as_slice())
    }

    /// Advance and return the next raw `(key, info)` pair
    pub fn next_key(&mut self) -> Result<Option<(Vec<u8>, TermInfo)>> {
        let next = match self.peeked.take() {
            Some(entry) => Some(entry),
            None => self.pull(),
        };
        match next {
            Some((key, idx)) => {
                let info = self
                    .infos
                    .get(idx as usize)
                    .cloned()
                    .ok_or_else(|| LucernaError::decode("term info index out of range"))?;
                Ok(Some((key, info)))
            }
            None => Ok(None),
        }
    }

    fn pull(&mut self) -> Option<(Vec<u8>, u64)> {
        if self.done {
            return None;
        }
        match self.stream.next() {
            Some((key, idx)) if key.starts_with(&self.prefix) => Some((key.to_vec(), idx)),
            _ => {
                self.done = true;
                None
            }
        }
    }
}

impl<'a> Iterator for TermEnum<'a> {
    type Item = Result<(Term, TermInfo)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_key() {
            Ok(Some((key, info))) => Some(Term::from_key(&key).map(|term| (term, info))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Builder for term dictionaries; terms must arrive in ascending order
pub struct TermDictionaryBuilder {
    builder: MapBuilder<Vec<u8>>,
    infos: Vec<TermInfo>,
    last_key: Option<Vec<u8>>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self {
            builder: MapBuilder::memory(),
            infos: Vec::new(),
            last_key: None,
        }
    }

    /// Fail with `OutOfOrderTerm` unless `key` sorts after the last added key
    pub fn check_key_order(&self, key: &[u8]) -> Result<()> {
        match &self.last_key {
            Some(last) if last.as_slice() >= key => Err(LucernaError::OutOfOrderTerm {
                previous: describe_key(last),
                term: describe_key(key),
            }),
            _ => Ok(()),
        }
    }

    pub fn add(&mut self, term: &Term, info: TermInfo) -> Result<()> {
        self.add_key(&term.to_key(), info)
    }

    pub fn add_key(&mut self, key: &[u8], info: TermInfo) -> Result<()> {
        self.check_key_order(key)?;
        self.builder
            .insert(key, self.infos.len() as u64)
            .map_err(|e| LucernaError::encode(format!("term dictionary insert: {}", e)))?;
        self.infos.push(info);
        self.last_key = Some(key.to_vec());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn finish(self) -> Result<TermDictionary> {
        let fst_data = self
            .builder
            .into_inner()
            .map_err(|e| LucernaError::encode(format!("term dictionary finish: {}", e)))?;
        TermDictionary::new(fst_data, self.infos)
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_key(key: &[u8]) -> String {
    match Term::from_key(key) {
        Ok(term) => term.to_string(),
        Err(_) => String::from_utf8_lossy(key).into_owned(),
    }
}
