pub mod document;

pub use document::{
    Document, Field, FieldFlags, FieldValue, StoredDocument, StoredField, TermVector,
    TermVectorEntry,
};
