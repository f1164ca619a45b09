//! Operation-boundary error taxonomy.
//!
//! Everything internal is translated into one of these kinds before it
//! reaches a caller: validation failures are rejected before any
//! transaction opens, conflicts never mutate state, dependency failures
//! roll the whole transaction back (an identical retry is safe because
//! dedup and promotion are idempotent).

use crate::graph::GraphError;
use mapmend_ledger::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("graph store failure: {0}")]
    Graph(#[from] GraphError),

    #[error("ledger failure: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ProposalNotFound(id) => {
                EngineError::NotFound(format!("proposal {id}"))
            }
            LedgerError::DuplicateVote { proposal_id, .. } => EngineError::Conflict(format!(
                "you have already voted on proposal {proposal_id}"
            )),
            other => EngineError::Ledger(other),
        }
    }
}
