//! In-process ledger with optional JSON snapshot persistence.
//!
//! State lives behind a `parking_lot::RwLock`. A transaction holds the
//! write guard for its whole lifetime and mutates a staged clone; commit
//! persists the staged state (when a snapshot path is configured) and then
//! swaps it in. Holding the guard across check-then-insert makes the
//! duplicate-vote race impossible and linearizes counter increments.

use crate::{now, Ledger, LedgerError, LedgerTx, ProposalFilter};
use mapmend_core::{FieldSet, Proposal, ProposalStatus, Vote, VoteType};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    proposals: BTreeMap<Uuid, Proposal>,
    /// Keyed by `"{proposal_id}:{voter}"`; a UUID contains no `:` so the
    /// key is unambiguous. This is the unique constraint.
    votes: BTreeMap<String, Vote>,
}

fn vote_key(proposal_id: Uuid, voter: &str) -> String {
    format!("{proposal_id}:{voter}")
}

impl LedgerState {
    fn list(&self, filter: &ProposalFilter) -> (Vec<Proposal>, usize) {
        let status = filter.effective_status();
        let mut matches: Vec<&Proposal> = self
            .proposals
            .values()
            .filter(|p| p.status == status)
            .filter(|p| {
                filter
                    .target_id
                    .as_deref()
                    .map_or(true, |t| p.target_id == t)
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len();
        let items = matches
            .into_iter()
            .skip(filter.page.saturating_sub(1).saturating_mul(filter.limit))
            .take(filter.limit)
            .cloned()
            .collect();
        (items, total)
    }
}

/// Ledger backed by process memory, optionally mirrored to a JSON snapshot
/// file that is loaded on open and rewritten on every commit.
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    snapshot: Option<PathBuf>,
}

impl MemoryLedger {
    /// Purely in-memory ledger (tests, ephemeral tooling).
    pub fn in_memory() -> Self {
        MemoryLedger {
            state: RwLock::new(LedgerState::default()),
            snapshot: None,
        }
    }

    /// Load an existing snapshot or start empty if the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            LedgerState::default()
        };
        Ok(MemoryLedger {
            state: RwLock::new(state),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }
}

impl Ledger for MemoryLedger {
    fn begin<'a>(&'a self) -> Result<Box<dyn LedgerTx + 'a>, LedgerError> {
        let guard = self.state.write();
        let staged = (*guard).clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            snapshot: self.snapshot.as_deref(),
            committed: false,
        }))
    }

    fn get(&self, id: Uuid) -> Result<Option<Proposal>, LedgerError> {
        Ok(self.state.read().proposals.get(&id).cloned())
    }

    fn list(&self, filter: &ProposalFilter) -> Result<(Vec<Proposal>, usize), LedgerError> {
        Ok(self.state.read().list(filter))
    }
}

struct MemoryTx<'a> {
    guard: RwLockWriteGuard<'a, LedgerState>,
    staged: LedgerState,
    snapshot: Option<&'a Path>,
    committed: bool,
}

impl LedgerTx for MemoryTx<'_> {
    fn find_pending_by_fingerprint(
        &self,
        target_id: &str,
        fingerprint: &str,
    ) -> Result<Option<Proposal>, LedgerError> {
        Ok(self
            .staged
            .proposals
            .values()
            .find(|p| {
                p.status == ProposalStatus::Pending
                    && p.target_id == target_id
                    && p.fingerprint == fingerprint
            })
            .cloned())
    }

    fn create_proposal(
        &mut self,
        target_id: &str,
        proposer: &str,
        fields: FieldSet,
        fingerprint: &str,
        threshold: u32,
    ) -> Result<Proposal, LedgerError> {
        let proposal = Proposal::new(
            target_id.to_string(),
            proposer.to_string(),
            fields,
            fingerprint.to_string(),
            threshold,
        );
        self.staged.proposals.insert(proposal.id, proposal.clone());
        tracing::debug!(proposal = %proposal.id, target = target_id, "proposal created");
        Ok(proposal)
    }

    fn find_vote(&self, proposal_id: Uuid, voter: &str) -> Result<Option<Vote>, LedgerError> {
        Ok(self.staged.votes.get(&vote_key(proposal_id, voter)).cloned())
    }

    fn record_vote(
        &mut self,
        proposal_id: Uuid,
        voter: &str,
        vote: VoteType,
        voter_ip: Option<String>,
        comment: Option<String>,
    ) -> Result<Vote, LedgerError> {
        if !self.staged.proposals.contains_key(&proposal_id) {
            return Err(LedgerError::ProposalNotFound(proposal_id));
        }
        let key = vote_key(proposal_id, voter);
        if self.staged.votes.contains_key(&key) {
            return Err(LedgerError::DuplicateVote {
                proposal_id,
                voter: voter.to_string(),
            });
        }
        let row = Vote {
            proposal_id,
            voter: voter.to_string(),
            vote,
            voter_ip,
            comment,
            cast_at: now(),
        };
        self.staged.votes.insert(key, row.clone());
        Ok(row)
    }

    fn increment_vote(
        &mut self,
        proposal_id: Uuid,
        vote: VoteType,
    ) -> Result<Proposal, LedgerError> {
        let proposal = self
            .staged
            .proposals
            .get_mut(&proposal_id)
            .ok_or(LedgerError::ProposalNotFound(proposal_id))?;
        match vote {
            VoteType::Up => proposal.upvotes += 1,
            VoteType::Down => proposal.downvotes += 1,
        }
        Ok(proposal.clone())
    }

    fn mark_approved(&mut self, proposal_id: Uuid) -> Result<Proposal, LedgerError> {
        let proposal = self
            .staged
            .proposals
            .get_mut(&proposal_id)
            .ok_or(LedgerError::ProposalNotFound(proposal_id))?;
        if proposal.status != ProposalStatus::Approved {
            proposal.status = ProposalStatus::Approved;
            proposal.approved_at = Some(now());
        }
        Ok(proposal.clone())
    }

    fn get(&self, id: Uuid) -> Result<Option<Proposal>, LedgerError> {
        Ok(self.staged.proposals.get(&id).cloned())
    }

    fn commit(mut self: Box<Self>) -> Result<(), LedgerError> {
        // Persist first: a failed snapshot write must leave the shared
        // state exactly as it was.
        if let Some(path) = self.snapshot {
            let contents = serde_json::to_string_pretty(&self.staged)?;
            std::fs::write(path, contents)?;
        }
        *self.guard = std::mem::take(&mut self.staged);
        self.committed = true;
        tracing::debug!("ledger transaction committed");
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("ledger transaction rolled back");
        }
    }
}
