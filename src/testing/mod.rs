//! Structural checks for index snapshots
//!
//! Each `Invariant` inspects an `IndexReader` and reports a `Violation` when
//! the segments it sees are malformed. Tests run them after flushes, merges,
//! deletes and reopen to catch corruption close to where it happens.
//!
//! ```rust,ignore
//! use lucerna::testing::prelude::*;
//!
//! let reader = writer.reader()?;
//! let violations = check_all_invariants(&reader, &default_invariants());
//! assert!(violations.is_empty(), "{:?}", violations);
//! ```

pub mod invariants;

pub use invariants::{
    check_all_invariants, default_invariants, DocFreqMatchesPostings, Invariant,
    LiveCountsConsistent, PostingsWellFormed, StoredDocsReadable, TermsStrictlyAscending,
    Violation,
};

pub mod prelude {
    pub use super::invariants::{check_all_invariants, default_invariants, Invariant, Violation};
}
