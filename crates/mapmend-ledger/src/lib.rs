//! Mapmend Ledger: durable, transactional storage for proposals and votes
//!
//! Single source of truth for vote counts and proposal status. All
//! multi-step operations (dedup-check + create, vote-check + insert +
//! counter update + possible promotion) run inside one [`LedgerTx`];
//! dropping a transaction without [`LedgerTx::commit`] rolls everything
//! back, so a caller never observes partial state.
//!
//! The repository seam is a pair of object-safe traits so the engine does
//! not care whether rows live in a relational database or in the bundled
//! [`MemoryLedger`] (process memory plus an optional JSON snapshot file).

pub mod memory;


use chrono::{DateTime, Utc};
use mapmend_core::{FieldSet, Proposal, ProposalStatus, Vote, VoteType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryLedger;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("proposal {0} not found")]
    ProposalNotFound(Uuid),

    /// Unique-constraint violation on `(proposal_id, voter)`.
    #[error("voter '{voter}' already voted on proposal {proposal_id}")]
    DuplicateVote { proposal_id: Uuid, voter: String },

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot corrupt: {0}")]
    Snapshot(#[from] serde_json::Error),
}

// ============================================================================
// Filters
// ============================================================================

/// Listing filter; `status = None` means pending (the common case for
/// review UIs), `page` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalFilter {
    pub target_id: Option<String>,
    pub status: Option<ProposalStatus>,
    pub page: usize,
    pub limit: usize,
}

impl Default for ProposalFilter {
    fn default() -> Self {
        ProposalFilter {
            target_id: None,
            status: None,
            page: 1,
            limit: 10,
        }
    }
}

impl ProposalFilter {
    pub fn effective_status(&self) -> ProposalStatus {
        self.status.unwrap_or(ProposalStatus::Pending)
    }
}

// ============================================================================
// Repository traits
// ============================================================================

/// Handle to the contribution ledger. Read-only lookups may bypass a
/// transaction; every write goes through [`Ledger::begin`].
pub trait Ledger: Send + Sync {
    /// Open a transaction. Writers are serialized: while a transaction is
    /// live, no other transaction can observe or interleave with its
    /// check-then-insert sequences.
    fn begin<'a>(&'a self) -> Result<Box<dyn LedgerTx + 'a>, LedgerError>;

    fn get(&self, id: Uuid) -> Result<Option<Proposal>, LedgerError>;

    /// Filtered listing ordered by creation time descending; the second
    /// element is the total match count before pagination.
    fn list(&self, filter: &ProposalFilter) -> Result<(Vec<Proposal>, usize), LedgerError>;
}

/// Operations inside one atomic transaction. Dropping the transaction
/// without committing discards every staged mutation.
pub trait LedgerTx {
    fn find_pending_by_fingerprint(
        &self,
        target_id: &str,
        fingerprint: &str,
    ) -> Result<Option<Proposal>, LedgerError>;

    /// Insert a new proposal row: `upvotes = 1`, `status = Pending`,
    /// `created_at` stamped now, threshold captured from the caller.
    fn create_proposal(
        &mut self,
        target_id: &str,
        proposer: &str,
        fields: FieldSet,
        fingerprint: &str,
        threshold: u32,
    ) -> Result<Proposal, LedgerError>;

    fn find_vote(&self, proposal_id: Uuid, voter: &str) -> Result<Option<Vote>, LedgerError>;

    fn record_vote(
        &mut self,
        proposal_id: Uuid,
        voter: &str,
        vote: VoteType,
        voter_ip: Option<String>,
        comment: Option<String>,
    ) -> Result<Vote, LedgerError>;

    /// Bump `upvotes` or `downvotes` and return the updated row.
    fn increment_vote(&mut self, proposal_id: Uuid, vote: VoteType)
        -> Result<Proposal, LedgerError>;

    /// Flip status to `Approved` and stamp `approved_at`. Idempotent: an
    /// already-approved row is returned unchanged.
    fn mark_approved(&mut self, proposal_id: Uuid) -> Result<Proposal, LedgerError>;

    fn get(&self, id: Uuid) -> Result<Option<Proposal>, LedgerError>;

    /// Publish the staged mutations. Consumes the transaction; on error the
    /// shared state is left untouched.
    fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Stamp helper shared by implementations.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
