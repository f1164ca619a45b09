//! End-to-end consensus scenarios over an in-memory ledger and a recording
//! graph store.

use mapmend_core::{ProposalStatus, VoteType};
use mapmend_engine::{
    ConsensusEngine, EngineConfig, EngineError, RecordingGraph, SubmitOutcome, VoteOutcome,
};
use mapmend_ledger::{Ledger, MemoryLedger};
use serde_json::json;
use std::sync::Arc;

fn engine_with_threshold(
    threshold: u32,
) -> (ConsensusEngine, Arc<MemoryLedger>, Arc<RecordingGraph>) {
    let ledger = Arc::new(MemoryLedger::in_memory());
    let graph = Arc::new(RecordingGraph::new());
    let config = EngineConfig {
        approval_threshold: threshold,
        ..Default::default()
    };
    let engine = ConsensusEngine::new(ledger.clone(), graph.clone(), config);
    (engine, ledger, graph)
}

fn phone(number: &str) -> Vec<(String, serde_json::Value)> {
    vec![("telephone".to_string(), json!(number))]
}

#[test]
fn submit_then_vote_then_duplicate_scenario() {
    let (engine, _ledger, _) = engine_with_threshold(5);

    let first = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(first.outcome, SubmitOutcome::New);
    assert_eq!(first.current_votes, 1);
    assert_eq!(first.required_votes, 5);
    assert!(first.success());

    let second = engine
        .submit_or_vote("user-b", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(second.outcome, SubmitOutcome::Voted);
    assert_eq!(second.current_votes, 2);
    assert_eq!(second.proposal_id, first.proposal_id);

    let third = engine
        .submit_or_vote("user-b", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(third.outcome, SubmitOutcome::AlreadyVoted);
    assert_eq!(third.current_votes, 2);
    assert!(!third.success());

    let page = engine.list_pending(None, None, 1, 10).unwrap();
    assert_eq!(page.total, 1, "dedup must not create a second row");
    assert_eq!(page.items[0].upvotes, 2);
}

#[test]
fn field_order_does_not_defeat_dedup() {
    let (engine, _, _) = engine_with_threshold(5);

    let a = engine
        .submit_or_vote(
            "user-a",
            "poi_1",
            vec![
                ("telephone".to_string(), json!("0123")),
                ("website".to_string(), json!("https://example.org")),
            ],
            None,
        )
        .unwrap();
    let b = engine
        .submit_or_vote(
            "user-b",
            "poi_1",
            vec![
                ("website".to_string(), json!("https://example.org")),
                ("email".to_string(), json!(null)),
                ("telephone".to_string(), json!("0123")),
            ],
            None,
        )
        .unwrap();
    assert_eq!(b.outcome, SubmitOutcome::Voted);
    assert_eq!(b.proposal_id, a.proposal_id);
}

#[test]
fn different_fields_create_separate_proposals() {
    let (engine, _, _) = engine_with_threshold(5);

    let a = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    let b = engine
        .submit_or_vote("user-a", "poi_1", phone("0456"), None)
        .unwrap();
    assert_eq!(b.outcome, SubmitOutcome::New);
    assert_ne!(b.proposal_id, a.proposal_id);
}

#[test]
fn proposer_cannot_vote_on_own_proposal_again() {
    let (engine, _, _) = engine_with_threshold(5);

    let first = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    let err = engine
        .vote("user-a", first.proposal_id, VoteType::Up, None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[test]
fn promotion_happens_exactly_at_threshold() {
    let (engine, ledger, graph) = engine_with_threshold(5);

    let first = engine
        .submit_or_vote("user-1", "poi_1", phone("0123"), None)
        .unwrap();
    for (i, expected_votes) in [(2u32, 2u32), (3, 3), (4, 4)] {
        let receipt = engine
            .submit_or_vote(&format!("user-{i}"), "poi_1", phone("0123"), None)
            .unwrap();
        assert_eq!(receipt.outcome, SubmitOutcome::Voted);
        assert_eq!(receipt.current_votes, expected_votes);
        assert_eq!(
            ledger.get(first.proposal_id).unwrap().unwrap().status,
            ProposalStatus::Pending
        );
    }

    // Only the staging insert has touched the graph so far.
    assert_eq!(graph.update_count(), 1);

    let fifth = engine
        .submit_or_vote("user-5", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(fifth.outcome, SubmitOutcome::AutoMerged);
    assert_eq!(fifth.current_votes, 5);

    let row = ledger.get(first.proposal_id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Approved);
    assert!(row.approved_at.is_some());
    // Canonical merge + staging status flip.
    assert_eq!(graph.update_count(), 3);

    // Approved proposals stay approved; further votes are conflicts.
    let err = engine
        .vote("user-6", first.proposal_id, VoteType::Up, None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(
        ledger.get(first.proposal_id).unwrap().unwrap().status,
        ProposalStatus::Approved
    );
}

#[test]
fn threshold_one_merges_on_first_submission() {
    let (engine, ledger, graph) = engine_with_threshold(1);

    let receipt = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(receipt.outcome, SubmitOutcome::AutoMerged);
    assert_eq!(receipt.current_votes, 1);

    let row = ledger.get(receipt.proposal_id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Approved);
    // Staging insert, canonical merge, status flip.
    assert_eq!(graph.update_count(), 3);
    let statements = graph.statements();
    assert!(statements[0].contains("INSERT DATA"));
    assert!(statements[1].contains("mm:PointOfInterest"));
    assert!(statements[2].contains("\"approved\""));
}

#[test]
fn promotion_is_idempotent() {
    let (engine, _, graph) = engine_with_threshold(1);

    let receipt = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    let applied = graph.update_count();

    let row = engine.promote(receipt.proposal_id).unwrap();
    assert_eq!(row.status, ProposalStatus::Approved);
    assert_eq!(
        graph.update_count(),
        applied,
        "re-promotion must not touch the graph again"
    );
}

#[test]
fn promote_below_threshold_is_a_conflict() {
    let (engine, ledger, graph) = engine_with_threshold(5);

    let receipt = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(receipt.current_votes, 1);

    let err = engine.promote(receipt.proposal_id).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let row = ledger.get(receipt.proposal_id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Pending);
    // Staging insert only; no canonical merge happened.
    assert_eq!(graph.update_count(), 1);
}

#[test]
fn staged_report_listing_reaches_the_graph_store() {
    let (engine, _, graph) = engine_with_threshold(5);

    engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    let rows = engine.list_staged_reports(Some("poi_1")).unwrap();
    assert!(rows.is_empty(), "recording double returns no bindings");

    let queries = graph.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("SELECT"));
    assert!(queries[0].contains("poi_1"));
}

#[test]
fn snapshot_backed_ledger_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let config = EngineConfig {
        approval_threshold: 5,
        ..Default::default()
    };

    let proposal_id = {
        let ledger = Arc::new(MemoryLedger::open(&path).unwrap());
        let engine =
            ConsensusEngine::new(ledger, Arc::new(RecordingGraph::new()), config.clone());
        engine
            .submit_or_vote("user-a", "poi_1", phone("0123"), None)
            .unwrap()
            .proposal_id
    };

    let ledger = Arc::new(MemoryLedger::open(&path).unwrap());
    let engine = ConsensusEngine::new(ledger, Arc::new(RecordingGraph::new()), config);
    let receipt = engine
        .submit_or_vote("user-b", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(receipt.outcome, SubmitOutcome::Voted);
    assert_eq!(receipt.proposal_id, proposal_id);
    assert_eq!(receipt.current_votes, 2);
}

#[test]
fn staging_failure_rolls_back_the_new_proposal() {
    let (engine, _ledger, graph) = engine_with_threshold(5);
    graph.set_failing(true);

    let err = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Graph(_)));

    let page = engine.list_pending(None, None, 1, 10).unwrap();
    assert_eq!(page.total, 0, "failed staging insert must leave no row");

    // The identical request is safe to retry.
    graph.set_failing(false);
    let retry = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(retry.outcome, SubmitOutcome::New);
}

#[test]
fn merge_failure_rolls_back_the_triggering_vote() {
    let (engine, ledger, graph) = engine_with_threshold(2);

    let first = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();
    graph.set_failing(true);

    let err = engine
        .submit_or_vote("user-b", "poi_1", phone("0123"), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Graph(_)));

    // Neither the vote nor the approval may survive the rollback.
    let row = ledger.get(first.proposal_id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Pending);
    assert_eq!(row.upvotes, 1);

    // Retrying the identical vote completes the promotion.
    graph.set_failing(false);
    let retry = engine
        .submit_or_vote("user-b", "poi_1", phone("0123"), None)
        .unwrap();
    assert_eq!(retry.outcome, SubmitOutcome::AutoMerged);
    assert_eq!(
        ledger.get(first.proposal_id).unwrap().unwrap().status,
        ProposalStatus::Approved
    );
}

#[test]
fn downvotes_never_promote() {
    let (engine, ledger, graph) = engine_with_threshold(2);

    let first = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), None)
        .unwrap();

    for user in ["user-b", "user-c", "user-d"] {
        let receipt = engine
            .vote(user, first.proposal_id, VoteType::Down, None, None)
            .unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Voted);
    }

    let row = ledger.get(first.proposal_id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Pending);
    assert_eq!(row.downvotes, 3);
    assert_eq!(row.upvotes, 1);
    assert_eq!(graph.update_count(), 1, "downvotes cause no graph traffic");

    // One more upvote still promotes: only upvotes enter the comparison.
    let up = engine
        .vote("user-e", first.proposal_id, VoteType::Up, Some("looks right".into()), None)
        .unwrap();
    assert_eq!(up.outcome, VoteOutcome::AutoMerged);
}

#[test]
fn vote_errors_are_structured() {
    let (engine, _, _) = engine_with_threshold(5);

    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        engine.vote("user-a", missing, VoteType::Up, None, None),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.get_detail(missing),
        Err(EngineError::NotFound(_))
    ));

    assert!(matches!(
        engine.submit_or_vote("", "poi_1", phone("0123"), None),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.submit_or_vote("user-a", "   ", phone("0123"), None),
        Err(EngineError::Validation(_))
    ));
    // Only unknown/empty fields → nothing to propose.
    assert!(matches!(
        engine.submit_or_vote(
            "user-a",
            "poi_1",
            vec![("favourite_colour".to_string(), json!("mauve"))],
            None
        ),
        Err(EngineError::Validation(_))
    ));
    // Known field, wrong type.
    assert!(matches!(
        engine.submit_or_vote(
            "user-a",
            "poi_1",
            vec![("price_level".to_string(), json!("cheap"))],
            None
        ),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn get_detail_returns_the_row() {
    let (engine, _, _) = engine_with_threshold(5);
    let receipt = engine
        .submit_or_vote("user-a", "poi_1", phone("0123"), Some("10.0.0.1"))
        .unwrap();
    let row = engine.get_detail(receipt.proposal_id).unwrap();
    assert_eq!(row.target_id, "poi_1");
    assert_eq!(row.proposer, "user-a");
    assert_eq!(row.threshold, 5);
}

#[test]
fn concurrent_submissions_converge_on_one_row() {
    let (engine, _ledger, _) = engine_with_threshold(100);
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine
                    .submit_or_vote(&format!("user-{i}"), "poi_1", phone("0123"), None)
                    .unwrap()
            })
        })
        .collect();
    let receipts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let news = receipts
        .iter()
        .filter(|r| r.outcome == SubmitOutcome::New)
        .count();
    assert_eq!(news, 1, "exactly one request may create the proposal");

    let page = engine.list_pending(None, None, 1, 10).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].upvotes, 8, "every increment lands exactly once");
}
