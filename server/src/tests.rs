//! End-to-end tests driving the coordinator the way the gateway does.

use std::sync::Arc;
use std::time::Duration;

use greenfelt_types::api::TableSnapshot;

use crate::config::ServerConfig;
use crate::coordinator::{Coordinator, CoordinatorError, TableHandle};
use crate::ledger::LedgerError;
use crate::store::MemoryStore;
use crate::table_actor::ActorError;

fn setup() -> (Arc<Coordinator>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(store.clone(), ServerConfig::default());
    (coordinator, store)
}

async fn snapshot_of(handle: &TableHandle, player: &str) -> TableSnapshot {
    handle
        .mailbox
        .snapshot(Some(player))
        .await
        .expect("table actor alive")
}

#[tokio::test]
async fn test_reconnect_within_grace_restores_seat_and_phase() {
    let (coordinator, _) = setup();
    let (joined_alice, _) = coordinator
        .join_table("alice", "t1", "war", Some(1_000), None)
        .await
        .unwrap();
    let (joined_bob, handle) = coordinator
        .join_table("bob", "t1", "war", Some(1_000), None)
        .await
        .unwrap();
    assert_ne!(joined_alice.seat, joined_bob.seat);

    coordinator.place_bet("alice", 50).await.unwrap();
    coordinator.place_bet("bob", 50).await.unwrap();
    let before = snapshot_of(&handle, "bob").await;

    coordinator.disconnect("bob").await;
    let (after, _) = coordinator.reconnect("bob").await.unwrap();

    assert_eq!(after.your_seat, before.your_seat);
    assert_eq!(after.phase, before.phase);
    assert_eq!(after.round_id, before.round_id);
    assert!(!snapshot_of(&handle, "bob").await.seats.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_grace_finds_seat_resolved() {
    let (coordinator, _) = setup();
    let (_, handle) = coordinator
        .join_table("alice", "bj-1", "blackjack", Some(1_000), None)
        .await
        .unwrap();
    // The lone occupied seat is ready, so the bet deals immediately.
    coordinator.place_bet("alice", 100).await.unwrap();

    coordinator.disconnect("alice").await;
    // Sleep (virtual time) far past the grace window; every pending decision
    // defaults and the seat is released.
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert!(coordinator.reconnect("alice").await.is_err());
    // With the last seat gone and the round settled, the table actor exits.
    assert!(matches!(
        handle.mailbox.snapshot(None).await,
        Err(ActorError::Closed)
    ));
    // The round fully settled: the bet either lost, pushed, won, or paid a
    // natural, and the materialized balance matches the log.
    let balance = coordinator.ledger().balance("alice").await.unwrap();
    assert!(
        [900, 1_000, 1_100, 1_150].contains(&balance),
        "unexpected balance {balance}"
    );
    assert!(coordinator.ledger().reconcile("alice").await.unwrap());
}

#[tokio::test]
async fn test_blackjack_round_through_coordinator() {
    let (coordinator, _) = setup();
    let (_, handle) = coordinator
        .join_table("alice", "bj-2", "blackjack", Some(1_000), None)
        .await
        .unwrap();
    coordinator.place_bet("alice", 100).await.unwrap();

    // Drive the round: decline insurance, then stand everything.
    for _ in 0..8 {
        let snapshot = snapshot_of(&handle, "alice").await;
        if snapshot.phase != "player_action" {
            break;
        }
        let action = if snapshot.your_actions.iter().any(|a| a == "insurance") {
            "pass"
        } else {
            "stand"
        };
        coordinator
            .submit_action("alice", action, None)
            .await
            .unwrap();
    }

    let snapshot = snapshot_of(&handle, "alice").await;
    assert_eq!(snapshot.phase, "complete");
    // Dealer hole card is revealed once the round resolves.
    assert!(snapshot.dealer_cards.iter().all(|card| card != "??"));

    let balance = coordinator.ledger().balance("alice").await.unwrap();
    assert!(
        [900, 1_000, 1_100, 1_150].contains(&balance),
        "unexpected balance {balance}"
    );
    assert!(coordinator.ledger().reconcile("alice").await.unwrap());
}

#[tokio::test]
async fn test_transfer_flow_through_coordinator() {
    let (coordinator, _) = setup();
    coordinator
        .join_table("alice", "t2", "war", Some(1_000), None)
        .await
        .unwrap();
    coordinator
        .join_table("bob", "t2", "war", Some(1_000), None)
        .await
        .unwrap();

    // Transfers need an accepted friendship.
    let err = coordinator.transfer("alice", "bob", 100).await.unwrap_err();
    assert_eq!(
        err,
        CoordinatorError::Ledger(LedgerError::NotFriends)
    );
    assert!(!coordinator.add_friend("alice", "bob").unwrap());
    assert!(coordinator.add_friend("bob", "alice").unwrap());

    coordinator.transfer("alice", "bob", 100).await.unwrap();
    assert_eq!(coordinator.ledger().balance("alice").await, Some(900));
    assert_eq!(coordinator.ledger().balance("bob").await, Some(1_100));

    // Below-minimum and self transfers are rejected with no records.
    assert!(matches!(
        coordinator.transfer("alice", "bob", 5).await.unwrap_err(),
        CoordinatorError::Ledger(LedgerError::BelowMinimum { .. })
    ));
    assert!(matches!(
        coordinator
            .transfer("alice", "alice", 100)
            .await
            .unwrap_err(),
        CoordinatorError::Ledger(LedgerError::SelfTransfer)
    ));
    assert!(coordinator.ledger().reconcile("alice").await.unwrap());
    assert!(coordinator.ledger().reconcile("bob").await.unwrap());
}

#[tokio::test]
async fn test_daily_claim_through_coordinator() {
    let (coordinator, _) = setup();
    coordinator
        .join_table("alice", "t3", "war", Some(0), None)
        .await
        .unwrap();
    let (tx, streak) = coordinator.claim_daily("alice").await.unwrap();
    assert_eq!(streak, 1);
    assert!(tx.amount > 0);
    let err = coordinator.claim_daily("alice").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Engagement(_)));
}

#[tokio::test]
async fn test_degraded_store_does_not_block_join() {
    let (coordinator, store) = setup();
    store.poison();
    // The welcome bonus is a non-critical side effect; the join proceeds.
    let (outcome, _) = coordinator
        .join_table("alice", "t4", "war", Some(1_000), None)
        .await
        .unwrap();
    assert_eq!(outcome.seat, 0);
    assert_eq!(coordinator.ledger().balance("alice").await, Some(0));

    store.heal();
    // Core-critical operations still fail loudly while the balance is empty.
    let err = coordinator.place_bet("alice", 50).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Actor(ActorError::Ledger(LedgerError::InsufficientBalance { .. }))
    ));
}
