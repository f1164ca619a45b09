//! Mapmend Engine: consensus over crowdsourced POI corrections
//!
//! The engine coordinates the full correction lifecycle:
//!
//! ```text
//! submit ──► fingerprint ──► pending proposal?
//!                              │no            │yes
//!                              ▼              ▼
//!                       create (1 upvote)   prior vote? ──yes──► reported,
//!                       stage into graph      │no                no mutation
//!                              │              ▼
//!                              │        record upvote
//!                              └──────┬───────┘
//!                                     ▼
//!                         upvotes ≥ threshold && pending?
//!                                     │yes
//!                                     ▼
//!                        merge canonical ► flip staging status
//!                                 ► mark approved ► commit
//! ```
//!
//! Every submit/vote runs inside one ledger transaction; graph-store writes
//! happen before the relational commit, so the ledger never reports
//! `approved` for a proposal whose canonical merge did not land.

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;

pub use config::EngineConfig;
pub use engine::{
    ConsensusEngine, ProposalPage, SubmitOutcome, SubmitReceipt, VoteOutcome, VoteReceipt,
};
pub use error::EngineError;
pub use graph::{GraphError, GraphLog, GraphStore, HttpGraphStore, RecordingGraph};
