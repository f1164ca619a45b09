//! Proposal and vote rows as owned by the contribution ledger.

use crate::fields::FieldSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a proposal.
///
/// `Rejected` is a reachable terminal state, but no engine operation
/// transitions into it; rejection is an operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Up,
    Down,
}

/// A user-submitted candidate change to one POI.
///
/// Created once, mutated only by vote-processing transactions (counter
/// increments, status flip), never deleted — approved and rejected rows
/// stay as the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub target_id: String,
    /// First submitter; later voters appear only in vote rows.
    pub proposer: String,
    pub fingerprint: String,
    pub fields: FieldSet,
    /// Staging-graph report identifier correlating this row with its
    /// graph-store representation.
    pub report_ref: String,
    pub status: ProposalStatus,
    pub upvotes: u32,
    pub downvotes: u32,
    /// Upvote count required for auto-promotion, captured at creation.
    /// Later configuration changes never affect this row.
    pub threshold: u32,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(
        target_id: String,
        proposer: String,
        fields: FieldSet,
        fingerprint: String,
        threshold: u32,
    ) -> Self {
        let id = Uuid::new_v4();
        Proposal {
            report_ref: format!("report-{id}"),
            id,
            target_id,
            proposer,
            fingerprint,
            fields,
            status: ProposalStatus::Pending,
            // The proposer's submission is the implicit first upvote.
            upvotes: 1,
            downvotes: 0,
            threshold,
            created_at: Utc::now(),
            approved_at: None,
        }
    }
}

/// A single vote on a proposal. Written once, never mutated or deleted;
/// uniqueness over `(proposal_id, voter)` is enforced by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: Uuid,
    pub voter: String,
    pub vote: VoteType,
    pub voter_ip: Option<String>,
    pub comment: Option<String>,
    pub cast_at: DateTime<Utc>,
}
