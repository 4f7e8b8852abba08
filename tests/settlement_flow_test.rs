// End-to-end settlement flows driven directly against the engine.
//
// Every test asserts balances from the ledger, never from any cached
// number, and checks that the full posting set still sums to zero.

use std::sync::{Arc, Mutex};
use std::thread;

use eightball_markets::app_state::{AppState, STARTING_BALANCE_CENTS};
use eightball_markets::models::{
    AcceptBetRequest, BetOutcome, BetStatus, CancelBetRequest, DisputeBetRequest,
    ProposeBetRequest, ResolveBetRequest,
};
use eightball_markets::settlement::EngineError;

// ============================================================================
// HELPERS
// ============================================================================

/// Fresh state with alice, bob, carol and one admin account
fn setup() -> (AppState, i64, i64, i64, i64) {
    let mut state = AppState::new();
    let alice = state.create_user("alice", "hash").unwrap().user_id;
    let bob = state.create_user("bob", "hash").unwrap().user_id;
    let carol = state.create_user("carol", "hash").unwrap().user_id;
    let admin = state.create_user("admin", "hash").unwrap().user_id;
    state.users.get_mut(&admin).unwrap().is_admin = true;
    (state, alice, bob, carol, admin)
}

fn propose_req(proposer_id: i64, stake: i64) -> ProposeBetRequest {
    ProposeBetRequest {
        proposer_id,
        event_description: "Lakers win game 7".to_string(),
        stake_proposer_cents: stake,
        arbiter_id: None,
        target_user_id: None,
        odds_format: None,
        odds_proposer: None,
        currency: None,
        payout_model: None,
        fee_bps: None,
    }
}

fn accept_req(acceptor_id: i64, stake: i64) -> AcceptBetRequest {
    AcceptBetRequest {
        acceptor_id,
        stake_acceptor_cents: stake,
        odds_acceptor: None,
    }
}

/// Grand total across every posting in the ledger; must always be zero
fn total_posted(state: &AppState) -> i64 {
    state
        .ledger
        .entries()
        .iter()
        .flat_map(|e| e.postings.iter())
        .map(|p| p.amount_cents)
        .sum()
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[test]
fn test_propose_accept_resolve_pays_winner() {
    let (mut state, alice, bob, carol, _admin) = setup();

    let mut req = propose_req(alice, 25_000);
    req.arbiter_id = Some(carol);
    let bet_id = state.bet_propose(req).unwrap().bet.bet_id;

    assert_eq!(state.ledger.available_balance(alice), 75_000);
    assert_eq!(state.ledger.held_balance(alice), 25_000);

    state.bet_accept(bet_id, accept_req(bob, 25_000)).unwrap();
    assert_eq!(state.ledger.available_balance(bob), 75_000);
    assert_eq!(state.bets[&bet_id].status, BetStatus::Active);

    let receipt = state
        .bet_resolve(
            bet_id,
            ResolveBetRequest {
                actor_id: carol,
                outcome: BetOutcome::ProposerWin,
                notes: Some("final score 102-99".to_string()),
            },
        )
        .unwrap();

    assert_eq!(receipt.bet.status, BetStatus::Resolved);
    assert_eq!(receipt.bet.outcome, Some(BetOutcome::ProposerWin));
    assert!(receipt.ledger_tx_id.is_some());

    // Winner takes the full pot, loser is down a stake, escrow is empty
    assert_eq!(state.ledger.available_balance(alice), 125_000);
    assert_eq!(state.ledger.available_balance(bob), 75_000);
    assert_eq!(state.ledger.held_balance(alice), 0);
    assert_eq!(state.ledger.held_balance(bob), 0);
    assert_eq!(total_posted(&state), 0);
}

#[test]
fn test_void_resolution_restores_both_stakes() {
    let (mut state, alice, bob, carol, _admin) = setup();

    let mut req = propose_req(alice, 10_000);
    req.arbiter_id = Some(carol);
    let bet_id = state.bet_propose(req).unwrap().bet.bet_id;
    state.bet_accept(bet_id, accept_req(bob, 10_000)).unwrap();

    state
        .bet_resolve(
            bet_id,
            ResolveBetRequest { actor_id: carol, outcome: BetOutcome::Void, notes: None },
        )
        .unwrap();

    assert_eq!(state.ledger.available_balance(alice), STARTING_BALANCE_CENTS);
    assert_eq!(state.ledger.available_balance(bob), STARTING_BALANCE_CENTS);
    assert_eq!(state.bets[&bet_id].outcome, Some(BetOutcome::Void));
    assert_eq!(total_posted(&state), 0);
}

#[test]
fn test_fee_is_skimmed_to_the_house() {
    let (mut state, alice, bob, carol, _admin) = setup();

    // 5% fee on a 2000-cent pot: winner nets +900, house keeps 100
    let mut req = propose_req(alice, 1_000);
    req.arbiter_id = Some(carol);
    req.fee_bps = Some(500);
    let bet_id = state.bet_propose(req).unwrap().bet.bet_id;
    state.bet_accept(bet_id, accept_req(bob, 1_000)).unwrap();

    state
        .bet_resolve(
            bet_id,
            ResolveBetRequest { actor_id: carol, outcome: BetOutcome::ProposerWin, notes: None },
        )
        .unwrap();

    assert_eq!(state.ledger.available_balance(alice), STARTING_BALANCE_CENTS + 900);
    assert_eq!(state.ledger.available_balance(bob), STARTING_BALANCE_CENTS - 1_000);
    assert_eq!(total_posted(&state), 0);
}

// ============================================================================
// FAILED OPERATIONS LEAVE NO TRACE
// ============================================================================

#[test]
fn test_insufficient_funds_leaves_no_trace() {
    let (mut state, alice, _bob, _carol, _admin) = setup();
    let entries_before = state.ledger.len();

    let err = state.bet_propose(propose_req(alice, 200_000)).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds { available_cents: 100_000, requested_cents: 200_000 }
    ));

    assert_eq!(state.ledger.len(), entries_before);
    assert!(state.bets.is_empty());
    assert_eq!(state.ledger.available_balance(alice), STARTING_BALANCE_CENTS);
}

#[test]
fn test_double_resolve_moves_no_money() {
    let (mut state, alice, bob, carol, _admin) = setup();

    let mut req = propose_req(alice, 5_000);
    req.arbiter_id = Some(carol);
    let bet_id = state.bet_propose(req).unwrap().bet.bet_id;
    state.bet_accept(bet_id, accept_req(bob, 5_000)).unwrap();

    state
        .bet_resolve(
            bet_id,
            ResolveBetRequest { actor_id: carol, outcome: BetOutcome::AcceptorWin, notes: None },
        )
        .unwrap();
    let entries_after_first = state.ledger.len();
    let bob_balance = state.ledger.available_balance(bob);

    let err = state
        .bet_resolve(
            bet_id,
            ResolveBetRequest { actor_id: carol, outcome: BetOutcome::ProposerWin, notes: None },
        )
        .unwrap_err();

    assert!(matches!(err, EngineError::AlreadyResolved(_)));
    assert_eq!(state.ledger.len(), entries_after_first);
    assert_eq!(state.ledger.available_balance(bob), bob_balance);
    assert_eq!(state.bets[&bet_id].outcome, Some(BetOutcome::AcceptorWin));
}

// ============================================================================
// TARGETING & PERMISSIONS
// ============================================================================

#[test]
fn test_targeted_bet_only_acceptable_by_target() {
    let (mut state, alice, bob, carol, _admin) = setup();

    let mut req = propose_req(alice, 2_000);
    req.target_user_id = Some(bob);
    let bet_id = state.bet_propose(req).unwrap().bet.bet_id;

    let err = state.bet_accept(bet_id, accept_req(carol, 2_000)).unwrap_err();
    assert!(matches!(err, EngineError::NotTargeted(_)));
    assert_eq!(state.ledger.available_balance(carol), STARTING_BALANCE_CENTS);

    state.bet_accept(bet_id, accept_req(bob, 2_000)).unwrap();
    assert_eq!(state.bets[&bet_id].acceptor_id, Some(bob));
}

#[test]
fn test_target_rejects_by_canceling() {
    let (mut state, alice, bob, _carol, _admin) = setup();

    let mut req = propose_req(alice, 2_000);
    req.target_user_id = Some(bob);
    let bet_id = state.bet_propose(req).unwrap().bet.bet_id;

    state
        .bet_cancel_or_expire(
            bet_id,
            CancelBetRequest { actor_id: bob, new_status: BetStatus::Canceled },
        )
        .unwrap();

    assert_eq!(state.bets[&bet_id].status, BetStatus::Canceled);
    assert_eq!(state.ledger.available_balance(alice), STARTING_BALANCE_CENTS);
    assert_eq!(state.ledger.held_balance(alice), 0);
}

#[test]
fn test_expire_requires_admin() {
    let (mut state, alice, _bob, _carol, admin) = setup();
    let bet_id = state.bet_propose(propose_req(alice, 1_000)).unwrap().bet.bet_id;

    let err = state
        .bet_cancel_or_expire(
            bet_id,
            CancelBetRequest { actor_id: alice, new_status: BetStatus::Expired },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    state
        .bet_cancel_or_expire(
            bet_id,
            CancelBetRequest { actor_id: admin, new_status: BetStatus::Expired },
        )
        .unwrap();
    assert_eq!(state.bets[&bet_id].status, BetStatus::Expired);
    assert_eq!(state.ledger.available_balance(alice), STARTING_BALANCE_CENTS);
}

#[test]
fn test_dispute_freezes_escrow_until_admin_resolves() {
    let (mut state, alice, bob, _carol, admin) = setup();

    let bet_id = state.bet_propose(propose_req(alice, 3_000)).unwrap().bet.bet_id;
    state.bet_accept(bet_id, accept_req(bob, 3_000)).unwrap();

    let receipt = state
        .bet_dispute(
            bet_id,
            DisputeBetRequest { actor_id: bob, notes: "game was postponed".to_string() },
        )
        .unwrap();
    assert_eq!(receipt.bet.status, BetStatus::Disputed);
    assert!(receipt.ledger_tx_id.is_none());
    assert_eq!(state.ledger.held_balance(alice), 3_000);
    assert_eq!(state.ledger.held_balance(bob), 3_000);

    // No arbiter on this bet, so only an admin can settle the dispute
    state
        .bet_resolve(
            bet_id,
            ResolveBetRequest { actor_id: admin, outcome: BetOutcome::AcceptorWin, notes: None },
        )
        .unwrap();
    assert_eq!(state.ledger.available_balance(bob), STARTING_BALANCE_CENTS + 3_000);
    assert_eq!(total_posted(&state), 0);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_accepts_single_winner() {
    let (mut state, alice, bob, carol, _admin) = setup();
    let bet_id = state.bet_propose(propose_req(alice, 4_000)).unwrap().bet.bet_id;

    let shared = Arc::new(Mutex::new(state));
    let mut handles = Vec::new();
    for acceptor in [bob, carol] {
        let shared = shared.clone();
        handles.push(thread::spawn(move || {
            let mut app = shared.lock().unwrap();
            app.bet_accept(bet_id, accept_req(acceptor, 4_000)).is_ok()
        }));
    }
    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);

    let app = shared.lock().unwrap();
    let bet = &app.bets[&bet_id];
    assert_eq!(bet.status, BetStatus::Active);
    let winner = bet.acceptor_id.unwrap();
    let loser = if winner == bob { carol } else { bob };
    assert_eq!(app.ledger.available_balance(winner), STARTING_BALANCE_CENTS - 4_000);
    assert_eq!(app.ledger.available_balance(loser), STARTING_BALANCE_CENTS);
    assert_eq!(total_posted(&app), 0);
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[test]
fn test_snapshot_round_trip() {
    let state_file = std::env::temp_dir()
        .join(format!("eightball_snapshot_test_{}.json", std::process::id()))
        .to_string_lossy()
        .to_string();

    let (mut state, alice, bob, _carol, _admin) = setup();
    state.state_file = state_file.clone();

    let bet_id = state.bet_propose(propose_req(alice, 7_500)).unwrap().bet.bet_id;
    state.bet_accept(bet_id, accept_req(bob, 7_500)).unwrap();
    state.save_to_disk().unwrap();

    let restored = AppState::load_or_new(&state_file);
    assert_eq!(restored.users.len(), 4);
    assert_eq!(restored.bets.len(), 1);
    assert_eq!(restored.bets[&bet_id].status, BetStatus::Active);
    assert_eq!(restored.ledger.available_balance(alice), STARTING_BALANCE_CENTS - 7_500);
    assert_eq!(restored.ledger.held_balance(bob), 7_500);
    assert_eq!(total_posted(&restored), 0);

    let _ = std::fs::remove_file(&state_file);
}
