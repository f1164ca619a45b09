//! Mapmend Core: domain model for crowdsourced POI corrections
//!
//! Everything the consensus engine agrees *about* lives here:
//!
//! - A fixed vocabulary of correctable POI fields ([`PoiField`]), each with a
//!   wire name, a destination predicate in the graph vocabulary, and a
//!   literal kind.
//! - Normalized field sets ([`FieldSet`]): unknown names and empty values are
//!   dropped at construction, type mismatches are rejected.
//! - [`Proposal`] and [`Vote`] rows as persisted by the contribution ledger.
//! - The deterministic dedup [`fingerprint`](fingerprint::fingerprint) over
//!   `(target, normalized field set)`.
//!
//! This crate is deliberately free of storage and transport concerns; the
//! ledger and engine crates build on it.

pub mod fields;
pub mod fingerprint;
pub mod model;

pub use fields::{FieldError, FieldKind, FieldSet, FieldValue, PoiField};
pub use fingerprint::fingerprint;
pub use model::{Proposal, ProposalStatus, Vote, VoteType};
