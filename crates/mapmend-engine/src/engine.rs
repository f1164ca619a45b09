//! The consensus state machine and graph merge coordinator.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{Binding, GraphStore};
use mapmend_core::{fingerprint, FieldSet, Proposal, ProposalStatus, VoteType};
use mapmend_ledger::{Ledger, LedgerTx, ProposalFilter};
use mapmend_sparql::StatementCompiler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Receipts
// ============================================================================

/// Outcome of a propose-or-vote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitOutcome {
    /// No pending proposal existed; a new one was created and staged.
    New,
    /// An identical pending proposal existed; this call became an upvote.
    Voted,
    /// The vote crossed the threshold and the proposal was promoted.
    AutoMerged,
    /// The caller already voted on the matching proposal; nothing changed.
    AlreadyVoted,
}

/// Response to [`ConsensusEngine::submit_or_vote`]: outcome plus enough
/// vote-count context for a client to render progress without a follow-up
/// query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub outcome: SubmitOutcome,
    pub proposal_id: Uuid,
    pub current_votes: u32,
    pub required_votes: u32,
    pub message: String,
}

impl SubmitReceipt {
    /// `false` only for the non-mutating duplicate-vote report.
    pub fn success(&self) -> bool {
        self.outcome != SubmitOutcome::AlreadyVoted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteOutcome {
    Voted,
    AutoMerged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub outcome: VoteOutcome,
    pub proposal_id: Uuid,
    pub current_votes: u32,
    pub required_votes: u32,
    pub message: String,
}

/// One page of proposals plus the pre-page total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalPage {
    pub items: Vec<Proposal>,
    pub total: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Request-driven consensus engine. Shared freely across threads; every
/// operation opens its own ledger transaction, and the ledger serializes
/// those, so concurrent submits and votes on the same proposal linearize.
pub struct ConsensusEngine {
    ledger: Arc<dyn Ledger>,
    graph: Arc<dyn GraphStore>,
    compiler: StatementCompiler,
    config: EngineConfig,
}

impl ConsensusEngine {
    pub fn new(ledger: Arc<dyn Ledger>, graph: Arc<dyn GraphStore>, config: EngineConfig) -> Self {
        ConsensusEngine {
            compiler: StatementCompiler::new(config.graphs.clone()),
            ledger,
            graph,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a correction, or upvote the identical pending one.
    ///
    /// Raw field pairs are normalized first (unknown names and empty values
    /// dropped); validation failures reject before any transaction opens.
    /// A duplicate vote is reported in the receipt, not as an error.
    pub fn submit_or_vote<I>(
        &self,
        user_id: &str,
        target_id: &str,
        field_pairs: I,
        client_ip: Option<&str>,
    ) -> Result<SubmitReceipt, EngineError>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let (user_id, target_id) = validate_identity(user_id, target_id)?;
        let fields = FieldSet::from_pairs(field_pairs)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        if fields.is_empty() {
            return Err(EngineError::Validation(
                "submission contains no recognized, non-empty fields".to_string(),
            ));
        }
        let digest = fingerprint(target_id, &fields);

        let mut tx = self.ledger.begin()?;

        let receipt = match tx.find_pending_by_fingerprint(target_id, &digest)? {
            None => {
                let proposal = tx.create_proposal(
                    target_id,
                    user_id,
                    fields.clone(),
                    &digest,
                    self.config.approval_threshold,
                )?;
                // The implicit first upvote gets a vote row too, so the
                // proposer cannot vote a second time later.
                tx.record_vote(
                    proposal.id,
                    user_id,
                    VoteType::Up,
                    client_ip.map(String::from),
                    None,
                )?;
                let staging = self.compiler.insert_staging(
                    &proposal.report_ref,
                    target_id,
                    user_id,
                    &fields,
                    proposal.created_at,
                );
                self.graph.update(&staging)?;
                tracing::info!(proposal = %proposal.id, target = target_id, "new proposal staged");

                self.finish_submit(&mut *tx, proposal, SubmitOutcome::New)?
            }
            Some(existing) => {
                if tx.find_vote(existing.id, user_id)?.is_some() {
                    tracing::debug!(proposal = %existing.id, user = user_id, "duplicate vote reported");
                    return Ok(SubmitReceipt {
                        outcome: SubmitOutcome::AlreadyVoted,
                        proposal_id: existing.id,
                        current_votes: existing.upvotes,
                        required_votes: existing.threshold,
                        message: "you have already voted on this correction".to_string(),
                    });
                }
                tx.record_vote(
                    existing.id,
                    user_id,
                    VoteType::Up,
                    client_ip.map(String::from),
                    None,
                )?;
                let updated = tx.increment_vote(existing.id, VoteType::Up)?;
                tracing::info!(proposal = %updated.id, upvotes = updated.upvotes, "upvote recorded");

                self.finish_submit(&mut *tx, updated, SubmitOutcome::Voted)?
            }
        };

        tx.commit()?;
        Ok(receipt)
    }

    /// Threshold check shared by both submit branches; promotes when the
    /// re-read upvote count has reached the row's captured threshold.
    fn finish_submit(
        &self,
        tx: &mut dyn LedgerTx,
        proposal: Proposal,
        outcome: SubmitOutcome,
    ) -> Result<SubmitReceipt, EngineError> {
        let proposal = tx
            .get(proposal.id)?
            .ok_or_else(|| EngineError::NotFound(format!("proposal {}", proposal.id)))?;

        if proposal.status == ProposalStatus::Pending && proposal.upvotes >= proposal.threshold {
            let promoted = self.promote_in_tx(tx, &proposal)?;
            return Ok(SubmitReceipt {
                outcome: SubmitOutcome::AutoMerged,
                proposal_id: promoted.id,
                current_votes: promoted.upvotes,
                required_votes: promoted.threshold,
                message: "correction reached consensus and was merged".to_string(),
            });
        }

        let message = match outcome {
            SubmitOutcome::New => "correction submitted for review".to_string(),
            _ => "vote recorded".to_string(),
        };
        Ok(SubmitReceipt {
            outcome,
            proposal_id: proposal.id,
            current_votes: proposal.upvotes,
            required_votes: proposal.threshold,
            message,
        })
    }

    /// Cast an explicit up/down vote on a known proposal.
    ///
    /// Unlike [`Self::submit_or_vote`], a duplicate vote here is an error,
    /// as is voting on a proposal that is no longer pending. Downvotes are
    /// recorded but never drive promotion or rejection; only the upvote
    /// counter participates in the threshold comparison.
    pub fn vote(
        &self,
        user_id: &str,
        proposal_id: Uuid,
        vote: VoteType,
        comment: Option<String>,
        client_ip: Option<&str>,
    ) -> Result<VoteReceipt, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Validation("user id must not be empty".to_string()));
        }

        let mut tx = self.ledger.begin()?;
        let proposal = tx
            .get(proposal_id)?
            .ok_or_else(|| EngineError::NotFound(format!("proposal {proposal_id}")))?;
        if proposal.status != ProposalStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "proposal {proposal_id} is {}, voting is closed",
                proposal.status
            )));
        }
        if tx.find_vote(proposal_id, user_id)?.is_some() {
            return Err(EngineError::Conflict(format!(
                "you have already voted on proposal {proposal_id}"
            )));
        }

        tx.record_vote(proposal_id, user_id, vote, client_ip.map(String::from), comment)?;
        let updated = tx.increment_vote(proposal_id, vote)?;
        tracing::info!(proposal = %proposal_id, ?vote, upvotes = updated.upvotes, downvotes = updated.downvotes, "vote recorded");

        let receipt = if vote == VoteType::Up
            && updated.status == ProposalStatus::Pending
            && updated.upvotes >= updated.threshold
        {
            let promoted = self.promote_in_tx(&mut *tx, &updated)?;
            VoteReceipt {
                outcome: VoteOutcome::AutoMerged,
                proposal_id,
                current_votes: promoted.upvotes,
                required_votes: promoted.threshold,
                message: "correction reached consensus and was merged".to_string(),
            }
        } else {
            VoteReceipt {
                outcome: VoteOutcome::Voted,
                proposal_id,
                current_votes: updated.upvotes,
                required_votes: updated.threshold,
                message: "vote recorded".to_string(),
            }
        };

        tx.commit()?;
        Ok(receipt)
    }

    /// Promote a proposal into the canonical graph.
    ///
    /// Normally triggered by the threshold check, but callable directly to
    /// retry after a partial failure. A pending proposal below its captured
    /// threshold is a conflict: consensus cannot be bypassed. Idempotent: a
    /// proposal that is no longer pending produces no graph traffic and no
    /// error.
    pub fn promote(&self, proposal_id: Uuid) -> Result<Proposal, EngineError> {
        let mut tx = self.ledger.begin()?;
        let proposal = tx
            .get(proposal_id)?
            .ok_or_else(|| EngineError::NotFound(format!("proposal {proposal_id}")))?;
        if proposal.status == ProposalStatus::Pending && proposal.upvotes < proposal.threshold {
            return Err(EngineError::Conflict(format!(
                "proposal {} has {} of {} required votes",
                proposal.id, proposal.upvotes, proposal.threshold
            )));
        }
        let promoted = self.promote_in_tx(&mut *tx, &proposal)?;
        tx.commit()?;
        Ok(promoted)
    }

    /// Promotion protocol: canonical merge, then staging status flip, then
    /// the ledger status update. The caller's transaction commit is the
    /// last step and gates on both graph writes having succeeded.
    fn promote_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        proposal: &Proposal,
    ) -> Result<Proposal, EngineError> {
        if proposal.status != ProposalStatus::Pending {
            return Ok(proposal.clone());
        }

        let merge = self
            .compiler
            .merge_canonical(&proposal.target_id, &proposal.fields);
        self.graph.update(&merge).map_err(|e| {
            tracing::warn!(proposal = %proposal.id, error = %e, "canonical merge failed, rolling back");
            e
        })?;

        let status = self.compiler.status_update(&proposal.report_ref, "approved");
        self.graph.update(&status).map_err(|e| {
            tracing::warn!(proposal = %proposal.id, error = %e, "staging status update failed, rolling back");
            e
        })?;

        let approved = tx.mark_approved(proposal.id)?;
        tracing::info!(proposal = %approved.id, target = %approved.target_id, "proposal promoted to canonical");
        Ok(approved)
    }

    /// List proposals from the ledger; status defaults to pending, ordered
    /// newest first.
    pub fn list_pending(
        &self,
        target_id: Option<&str>,
        status: Option<ProposalStatus>,
        page: usize,
        limit: usize,
    ) -> Result<ProposalPage, EngineError> {
        let filter = ProposalFilter {
            target_id: target_id.map(String::from),
            status,
            page: page.max(1),
            limit: if limit == 0 { self.config.page_size } else { limit },
        };
        let (items, total) = self.ledger.list(&filter)?;
        Ok(ProposalPage { items, total })
    }

    /// Fetch one proposal by id.
    pub fn get_detail(&self, proposal_id: Uuid) -> Result<Proposal, EngineError> {
        self.ledger
            .get(proposal_id)?
            .ok_or_else(|| EngineError::NotFound(format!("proposal {proposal_id}")))
    }

    /// Run the compiled pending-report listing against the graph store
    /// (staging-side view, newest first, fixed page size).
    pub fn list_staged_reports(&self, target_id: Option<&str>) -> Result<Vec<Binding>, EngineError> {
        let query = self.compiler.list_pending(target_id);
        Ok(self.graph.select(&query)?)
    }
}

fn validate_identity<'a>(
    user_id: &'a str,
    target_id: &'a str,
) -> Result<(&'a str, &'a str), EngineError> {
    let user_id = user_id.trim();
    let target_id = target_id.trim();
    if user_id.is_empty() {
        return Err(EngineError::Validation("user id must not be empty".to_string()));
    }
    if target_id.is_empty() {
        return Err(EngineError::Validation("target id must not be empty".to_string()));
    }
    Ok((user_id, target_id))
}
