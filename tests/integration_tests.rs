//! Integration tests for the ladder-room matchmaking service
//!
//! These tests validate the system working together, including:
//! - Casual and ranked queue workflows
//! - Ranked result reporting against a SQLite player store
//! - Leaderboard ordering and reset
//! - Command execution and replies through the production handler
//! - Storage failure and recovery

mod fixtures;

use ladder_room::amqp::handlers::MessageHandler;
use ladder_room::error::MatchmakingError;
use ladder_room::matchmaking::MatchmakingManager;
use ladder_room::metrics::MetricsCollector;
use ladder_room::rating::{InMemoryPlayerStore, PlayerStore, SqlitePlayerStore};
use ladder_room::service::ProductionMessageHandler;
use ladder_room::types::{
    AmqpMessage, Command, CommandOutcome, CommandPayload, CommandRequest, JoinOutcome, QueueKind,
};
use ladder_room::utils::current_timestamp;
use std::sync::Arc;

use fixtures::{
    create_memory_system, create_sqlite_system, play_ranked, temp_database_path,
    FlakyPlayerStore, MockEventPublisher,
};

fn error_kind(err: &anyhow::Error) -> &'static str {
    MatchmakingError::find(err)
        .map(|known| known.kind())
        .unwrap_or("unknown")
}

fn command(player_id: &str, command: Command) -> CommandRequest {
    CommandRequest {
        request_id: uuid::Uuid::new_v4().to_string(),
        player_id: player_id.to_string(),
        command,
        timestamp: current_timestamp(),
    }
}

#[tokio::test]
async fn test_complete_ranked_workflow() {
    let (manager, store, event_publisher) = create_sqlite_system().await;

    // Step 1: X waits alone
    let outcome = manager.join_ranked("X").await.unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::Queued {
            queue: QueueKind::Ranked,
            position: 1
        }
    );

    // Step 2: Y completes the pair and both are locked into the match
    let found = manager
        .join_ranked("Y")
        .await
        .unwrap()
        .match_found()
        .cloned()
        .unwrap();
    assert_eq!((found.player_one.as_str(), found.player_two.as_str()), ("X", "Y"));
    assert_eq!(event_publisher.count_events_of_type("MatchFound"), 1);

    // Step 3: X reports the win
    let reported = manager.report_result("X", "Y", true).await.unwrap();
    assert_eq!(reported.rating_delta, 16);

    let x = store.get_player("X").await.unwrap().unwrap();
    let y = store.get_player("Y").await.unwrap().unwrap();
    assert_eq!((x.wins, x.losses, x.rating), (1, 0, 516));
    assert_eq!((y.wins, y.losses, y.rating), (0, 1, 484));

    // Step 4: the match is gone, so a second report is refused
    let err = manager.report_result("X", "Y", true).await.unwrap_err();
    assert_eq!(error_kind(&err), "no_active_match");
    assert_eq!(event_publisher.count_events_of_type("MatchReported"), 1);

    // Step 5: both can queue again
    manager.join_ranked("Y").await.unwrap();
    manager.join_ranked("X").await.unwrap();
    assert_eq!(manager.active_opponent("Y").unwrap().unwrap(), "X");
}

#[tokio::test]
async fn test_casual_queue_never_touches_records() {
    let (manager, store, event_publisher) = create_sqlite_system().await;

    for player in ["a", "b", "c", "d"] {
        manager.join_casual(player).await.unwrap();
    }

    let pairs: Vec<_> = event_publisher
        .matches_found()
        .into_iter()
        .map(|found| (found.player_one, found.player_two))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("a".to_string(), "b".to_string()),
            ("c".to_string(), "d".to_string())
        ]
    );

    assert_eq!(store.player_count().await.unwrap(), 0);
    assert!(manager.active_opponent("a").unwrap().is_none());

    let err = manager.report_result("a", "b", true).await.unwrap_err();
    assert_eq!(error_kind(&err), "no_active_match");
}

#[tokio::test]
async fn test_rating_drift_over_several_matches() {
    let (manager, store, _) = create_sqlite_system().await;

    play_ranked(&manager, "champ", "rival").await;
    manager.report_result("champ", "rival", true).await.unwrap();

    // 516 vs 484: the favourite gains less the second time
    play_ranked(&manager, "champ", "rival").await;
    let second = manager.report_result("champ", "rival", true).await.unwrap();
    assert_eq!(second.rating_delta, 15);

    // Upset: the underdog gains more
    play_ranked(&manager, "rival", "champ").await;
    let upset = manager.report_result("rival", "champ", true).await.unwrap();
    assert_eq!(upset.rating_delta, 19);

    let champ = store.get_player("champ").await.unwrap().unwrap();
    let rival = store.get_player("rival").await.unwrap().unwrap();
    assert_eq!(champ.rating + rival.rating, 1000);
    assert_eq!(champ.games_played(), 3);
    assert_eq!((rival.wins, rival.losses), (1, 2));
}

#[tokio::test]
async fn test_leaderboard_order_and_limit() {
    let (manager, _, _) = create_sqlite_system().await;
    let manager = manager.with_leaderboard_size(3);

    play_ranked(&manager, "b", "a").await;
    manager.report_result("b", "a", true).await.unwrap();
    play_ranked(&manager, "c", "d").await;
    manager.report_result("c", "d", true).await.unwrap();
    play_ranked(&manager, "e", "f").await;
    manager.report_result("f", "e", false).await.unwrap();

    let board = manager.leaderboard().await.unwrap();
    let entries: Vec<_> = board
        .iter()
        .map(|record| (record.player_id.as_str(), record.rating))
        .collect();

    // Three winners tie at 516 and are ordered by id
    assert_eq!(entries, vec![("b", 516), ("c", 516), ("e", 516)]);
}

#[tokio::test]
async fn test_reset_then_fresh_defaults() {
    let (manager, store, event_publisher) = create_sqlite_system().await;

    play_ranked(&manager, "x", "y").await;
    manager.report_result("x", "y", true).await.unwrap();

    let reset = manager.reset_leaderboard().await.unwrap();
    assert_eq!(reset.players_removed, 2);
    assert!(manager.leaderboard().await.unwrap().is_empty());
    assert_eq!(event_publisher.count_events_of_type("LeaderboardReset"), 1);

    // Records come back at the default rating
    play_ranked(&manager, "x", "y").await;
    let reported = manager.report_result("y", "x", true).await.unwrap();
    assert_eq!(reported.rating_delta, 16);
    assert_eq!(store.get_player("y").await.unwrap().unwrap().rating, 516);
}

#[tokio::test]
async fn test_reset_keeps_active_matches() {
    let (manager, _, _) = create_sqlite_system().await;

    play_ranked(&manager, "x", "y").await;
    manager.reset_leaderboard().await.unwrap();

    assert_eq!(manager.active_opponent("x").unwrap().unwrap(), "y");
    let reported = manager.report_result("x", "y", true).await.unwrap();
    assert_eq!(reported.reporter_record.rating, 516);
}

#[tokio::test]
async fn test_storage_failure_then_retry() {
    let event_publisher = Arc::new(MockEventPublisher::new());
    let inner = Arc::new(InMemoryPlayerStore::new());
    let store = Arc::new(FlakyPlayerStore::new(inner.clone(), 1));
    let manager = MatchmakingManager::new(store, event_publisher.clone());

    play_ranked(&manager, "x", "y").await;

    let err = manager.report_result("x", "y", true).await.unwrap_err();
    assert_eq!(error_kind(&err), "storage_error");
    assert_eq!(manager.active_opponent("x").unwrap().unwrap(), "y");

    // Nothing was half-applied
    let x = inner.get_player("x").await.unwrap().unwrap();
    assert_eq!((x.wins, x.rating), (0, 500));

    let reported = manager.report_result("x", "y", true).await.unwrap();
    assert_eq!(reported.reporter_record.rating, 516);
    assert_eq!(event_publisher.count_events_of_type("MatchReported"), 1);
}

#[tokio::test]
async fn test_records_survive_restart() {
    let path = temp_database_path("restart");
    let url = format!("sqlite://{}", path.display());

    {
        let store = Arc::new(SqlitePlayerStore::connect(&url, 2).await.unwrap());
        let manager = MatchmakingManager::new(store.clone(), Arc::new(MockEventPublisher::new()));
        play_ranked(&manager, "x", "y").await;
        manager.report_result("x", "y", true).await.unwrap();
        store.close().await;
    }

    let store = Arc::new(SqlitePlayerStore::connect(&url, 2).await.unwrap());
    let manager = MatchmakingManager::new(store.clone(), Arc::new(MockEventPublisher::new()));

    let board = manager.leaderboard().await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].player_id, "x");
    assert_eq!(board[0].rating, 516);

    // Queues and matches are not persisted
    assert!(manager.active_opponent("x").unwrap().is_none());

    store.close().await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_production_handler_round_trip() {
    let (manager, _store, event_publisher) = create_sqlite_system().await;
    let handler = ProductionMessageHandler::new(
        manager.clone(),
        event_publisher.clone(),
        Arc::new(MetricsCollector::new().unwrap()),
    );

    handler
        .handle_command(command("alice", Command::JoinRanked))
        .await
        .unwrap();
    let reply = handler
        .handle_command(command("bob", Command::JoinRanked))
        .await
        .unwrap();
    assert!(matches!(
        reply.outcome,
        CommandOutcome::Success {
            payload: CommandPayload::Joined(JoinOutcome::Matched(_))
        }
    ));

    let reply = handler
        .handle_command(command(
            "bob",
            Command::Report {
                opponent: "alice".to_string(),
                won: false,
            },
        ))
        .await
        .unwrap();
    match reply.outcome {
        CommandOutcome::Success {
            payload: CommandPayload::Reported(reported),
        } => {
            assert_eq!(reported.winner(), "alice");
            assert_eq!(reported.opponent_record.rating, 516);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let reply = handler
        .handle_command(command("carol", Command::Leaderboard))
        .await
        .unwrap();
    match reply.outcome {
        CommandOutcome::Success {
            payload: CommandPayload::Leaderboard(board),
        } => {
            let ids: Vec<_> = board.iter().map(|r| r.player_id.as_str()).collect();
            assert_eq!(ids, vec!["alice", "bob"]);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Every command got a reply, every reply echoes its request
    assert_eq!(event_publisher.count_events_of_type("CommandReply"), 4);
    let replies: Vec<_> = event_publisher
        .get_published_events()
        .into_iter()
        .filter_map(|event| match event {
            AmqpMessage::CommandReply(reply) => Some(reply.player_id),
            _ => None,
        })
        .collect();
    assert_eq!(replies, vec!["alice", "bob", "bob", "carol"]);
}

#[tokio::test]
async fn test_failure_replies_carry_kind() {
    let (manager, _) = create_memory_system();

    manager.join_ranked("x").await.unwrap();
    let outcome = manager.execute(&command("x", Command::JoinRanked)).await;
    assert!(matches!(
        outcome,
        CommandOutcome::Failure { ref kind, .. } if kind == "already_queued"
    ));

    manager.join_ranked("y").await.unwrap();
    let outcome = manager.execute(&command("x", Command::JoinRanked)).await;
    match outcome {
        CommandOutcome::Failure { kind, message } => {
            assert_eq!(kind, "match_in_progress");
            assert!(!message.is_empty());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
