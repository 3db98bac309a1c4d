//! Query evaluation
//!
//! Queries become per-segment trees of scorers that walk matching docs in
//! ascending order. Leaves are `TermScorer`s over posting lists; inner nodes
//! intersect (`ConjunctionScorer`), unite (`DisjunctionScorer`), subtract
//! (`ExclusionScorer`) or add optional score (`ReqOptScorer`).

mod scorer;
mod similarity;
mod term_scorer;
mod conjunction;
mod disjunction;
mod exclusion;
mod req_opt;
mod query;
mod searcher;

pub use scorer::*;
pub use similarity::*;
pub use term_scorer::TermScorer;
pub use conjunction::ConjunctionScorer;
pub use disjunction::DisjunctionScorer;
pub use exclusion::ExclusionScorer;
pub use req_opt::ReqOptScorer;
pub use query::*;
pub use searcher::*;
