//! Mapmend SPARQL: statement compiler for the correction workflow
//!
//! Translates normalized field sets into the four statements the graph
//! merge coordinator applies:
//!
//! 1. staging insert — a report node plus one triple per proposed field,
//! 2. canonical merge — replace exactly the touched predicates of a POI,
//! 3. status update — flip a report's review status tag,
//! 4. pending listing — newest-first read over the staging area.
//!
//! All functions are pure: strings in, SPARQL text out. The field →
//! predicate → literal-kind table lives in `mapmend-core`; anything that is
//! not in that table never reaches this crate.

pub mod compile;
pub mod literal;

pub use compile::{GraphNames, StatementCompiler};
pub use literal::{escape_text, literal};
