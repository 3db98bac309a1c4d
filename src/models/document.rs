use serde::{Deserialize, Serialize};

/// How a field is handled by the writer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    /// Keep the value retrievable verbatim
    pub stored: bool,
    /// Produce terms for the field
    pub indexed: bool,
    /// Run the value through the analyzer (otherwise index it as one term)
    pub tokenized: bool,
    /// Record token positions in postings
    pub positions: bool,
    /// Store a per-document term vector alongside stored fields
    pub term_vectors: bool,
}

impl FieldFlags {
    /// Stored, analyzed, with positions
    pub const TEXT: FieldFlags = FieldFlags {
        stored: true,
        indexed: true,
        tokenized: true,
        positions: true,
        term_vectors: false,
    };

    /// Stored, indexed as a single untokenized term
    pub const KEYWORD: FieldFlags = FieldFlags {
        stored: true,
        indexed: true,
        tokenized: false,
        positions: false,
        term_vectors: false,
    };

    pub const STORED_ONLY: FieldFlags = FieldFlags {
        stored: true,
        indexed: false,
        tokenized: false,
        positions: false,
        term_vectors: false,
    };

    /// Analyzed for search only, value not retrievable
    pub const INDEXED_TEXT: FieldFlags = FieldFlags {
        stored: false,
        indexed: true,
        tokenized: true,
        positions: true,
        term_vectors: false,
    };
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(text) => text.as_bytes(),
            FieldValue::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

/// A named value plus indexing flags
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub flags: FieldFlags,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>, flags: FieldFlags) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flags,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(name, value, FieldFlags::TEXT)
    }

    pub fn keyword(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(name, value, FieldFlags::KEYWORD)
    }

    pub fn stored(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(name, value, FieldFlags::STORED_ONLY)
    }

    pub fn with_term_vectors(mut self) -> Self {
        self.flags.term_vectors = true;
        self
    }

    pub fn without_positions(mut self) -> Self {
        self.flags.positions = false;
        self
    }
}

/// An ordered list of fields; field names may repeat
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First field with the given name
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rough in-memory footprint used for buffer accounting
    pub fn estimated_bytes(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.name.len() + f.value.len() + 32)
            .sum()
    }
}

/// A stored field as read back from a segment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredField {
    pub name: String,
    pub value: FieldValue,
}

/// One term of a term vector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVectorEntry {
    pub text: Vec<u8>,
    pub frequency: u32,
    pub positions: Vec<u32>,
}

/// Per-document terms of one field, sorted by term text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVector {
    pub field: String,
    pub terms: Vec<TermVectorEntry>,
}

/// Everything a segment keeps per document beyond its postings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub fields: Vec<StoredField>,
    pub term_vectors: Vec<TermVector>,
}

impl StoredDocument {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// All values of a repeated field
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldValue> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn term_vector(&self, field: &str) -> Option<&TermVector> {
        self.term_vectors.iter().find(|tv| tv.field == field)
    }
}
