//! High concurrency stress tests for queueing and result reporting
//!
//! These tests validate that pairing, match registration and record updates
//! stay consistent when many requests arrive at once.

mod fixtures;

use ladder_room::rating::PlayerStore;
use ladder_room::types::{JoinOutcome, QueueKind};
use std::collections::HashSet;
use std::time::{Duration, Instant};

use fixtures::{create_memory_system, create_sqlite_system, play_ranked};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_100_concurrent_ranked_joins() {
    let (manager, event_publisher) = create_memory_system();
    let concurrent_requests = 100;

    let start_time = Instant::now();

    let handles: Vec<_> = (0..concurrent_requests)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.join_ranked(&format!("load_player_{}", i)).await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let duration = start_time.elapsed();

    let mut matched = 0;
    for result in results {
        match result.expect("join task panicked").expect("join failed") {
            JoinOutcome::Matched(_) => matched += 1,
            JoinOutcome::Queued { .. } => {}
        }
    }

    // Every second join completes a pair
    assert_eq!(matched, concurrent_requests / 2);
    assert_eq!(manager.queue_len(QueueKind::Ranked).unwrap(), 0);
    assert_eq!(
        manager.get_stats().await.unwrap().active_matches,
        concurrent_requests / 2
    );

    // No player was paired twice and nobody is paired with themselves
    let mut seen = HashSet::new();
    for found in event_publisher.matches_found() {
        assert_ne!(found.player_one, found.player_two);
        assert!(seen.insert(found.player_one.clone()));
        assert!(seen.insert(found.player_two.clone()));
        assert_eq!(
            manager.active_opponent(&found.player_one).unwrap(),
            Some(found.player_two.clone())
        );
    }
    assert_eq!(seen.len(), concurrent_requests);

    assert!(
        duration < Duration::from_secs(10),
        "100 joins should complete within 10 seconds, took: {:?}",
        duration
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_joins_admit_one() {
    let (manager, _) = create_memory_system();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.join_casual("same_player").await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let accepted = results
        .into_iter()
        .filter(|result| matches!(result, Ok(Ok(_))))
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(manager.queue_len(QueueKind::Casual).unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reports_on_separate_matches() {
    let (manager, store, event_publisher) = create_sqlite_system().await;
    let match_count = 25;

    for i in 0..match_count {
        play_ranked(&manager, &format!("winner_{:02}", i), &format!("loser_{:02}", i)).await;
    }

    let handles: Vec<_> = (0..match_count)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .report_result(&format!("winner_{:02}", i), &format!("loser_{:02}", i), true)
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        let reported = result.expect("report task panicked").expect("report failed");
        assert_eq!(reported.rating_delta, 16);
    }

    assert_eq!(store.player_count().await.unwrap(), match_count * 2);
    assert_eq!(event_publisher.count_events_of_type("MatchReported"), match_count);
    assert_eq!(manager.get_stats().await.unwrap().active_matches, 0);

    let board = manager.leaderboard().await.unwrap();
    assert_eq!(board.len(), 10);
    assert!(board.iter().all(|record| record.rating == 516));
    assert_eq!(board[0].player_id, "winner_00");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_reports_for_one_match() {
    let (manager, store, _) = create_sqlite_system().await;
    play_ranked(&manager, "x", "y").await;

    let handles: Vec<_> = [("x", "y", true), ("y", "x", true), ("x", "y", false)]
        .into_iter()
        .map(|(reporter, opponent, won)| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.report_result(reporter, opponent, won).await })
        })
        .collect();

    let accepted = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|result| matches!(result, Ok(Ok(_))))
        .count();
    assert_eq!(accepted, 1);

    let x = store.get_player("x").await.unwrap().unwrap();
    let y = store.get_player("y").await.unwrap().unwrap();
    assert_eq!(x.games_played() + y.games_played(), 2);
    assert_eq!(x.rating + y.rating, 1000);
}
