//! Matchmaking manager implementation
//!
//! This module provides the core MatchmakingManager that owns the casual and
//! ranked queues and the ranked match registry, and drives player records
//! through the injected [`PlayerStore`].
//!
//! Locking: each queue has its own mutex and the registry has a read-write
//! lock. Whenever both a queue and the registry are held, the registry is
//! taken first. Ranked reports are additionally serialized by an async mutex
//! that stays held across the store round-trip, so two reports can never
//! interleave their read-compute-write sequences. Leaderboard resets take the
//! same mutex.

use crate::amqp::publisher::EventPublisher;
use crate::error::{MatchmakingError, Result};
use crate::matchmaking::queue::MatchQueue;
use crate::matchmaking::registry::{ActiveMatch, MatchRegistry};
use crate::metrics::MetricsCollector;
use crate::rating::calculator::RatingCalculator;
use crate::rating::elo::EloRatingCalculator;
use crate::rating::storage::{PlayerStore, RecordDelta};
use crate::types::{
    Command, CommandOutcome, CommandPayload, CommandRequest, JoinOutcome, LeaderboardReset,
    MatchFound, MatchReported, PlayerId, PlayerRecord, QueueKind,
};
use crate::utils::{current_timestamp, generate_match_id, is_valid_player_id};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Number of records returned by the leaderboard unless configured otherwise
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// Statistics about matchmaking operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchmakingStats {
    /// Players currently waiting in the casual queue
    pub casual_waiting: usize,
    /// Players currently waiting in the ranked queue
    pub ranked_waiting: usize,
    /// Ranked matches awaiting a result
    pub active_matches: usize,
    /// Total casual pairs announced
    pub casual_matches_made: u64,
    /// Total ranked pairs created
    pub ranked_matches_made: u64,
    /// Total ranked results applied
    pub results_reported: u64,
    /// Total leaderboard resets
    pub leaderboard_resets: u64,
}

/// The main matchmaking manager
#[derive(Clone)]
pub struct MatchmakingManager {
    /// Casual FIFO queue
    casual_queue: Arc<Mutex<MatchQueue>>,
    /// Ranked FIFO queue
    ranked_queue: Arc<Mutex<MatchQueue>>,
    /// Active ranked matches
    registry: Arc<RwLock<MatchRegistry>>,
    /// Serializes ranked reports across the store round-trip
    report_lock: Arc<tokio::sync::Mutex<()>>,
    /// Durable player records
    player_store: Arc<dyn PlayerStore>,
    /// Rating delta calculator
    rating_calculator: Arc<dyn RatingCalculator>,
    /// Event publisher for match events
    event_publisher: Arc<dyn EventPublisher>,
    /// Manager statistics
    stats: Arc<RwLock<MatchmakingStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
    /// Records returned by the leaderboard
    leaderboard_size: usize,
}

impl MatchmakingManager {
    /// Create a new matchmaking manager
    pub fn new(
        player_store: Arc<dyn PlayerStore>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(player_store, event_publisher, metrics_collector)
    }

    /// Create a new matchmaking manager with metrics collector
    pub fn with_metrics(
        player_store: Arc<dyn PlayerStore>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            casual_queue: Arc::new(Mutex::new(MatchQueue::new(QueueKind::Casual))),
            ranked_queue: Arc::new(Mutex::new(MatchQueue::new(QueueKind::Ranked))),
            registry: Arc::new(RwLock::new(MatchRegistry::new())),
            report_lock: Arc::new(tokio::sync::Mutex::new(())),
            player_store,
            rating_calculator: Arc::new(EloRatingCalculator::new()),
            event_publisher,
            stats: Arc::new(RwLock::new(MatchmakingStats::default())),
            metrics_collector,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
        }
    }

    /// Replace the rating calculator
    pub fn with_calculator(mut self, rating_calculator: Arc<dyn RatingCalculator>) -> Self {
        self.rating_calculator = rating_calculator;
        self
    }

    /// Set how many records the leaderboard returns
    pub fn with_leaderboard_size(mut self, leaderboard_size: usize) -> Self {
        self.leaderboard_size = leaderboard_size;
        self
    }

    pub fn leaderboard_size(&self) -> usize {
        self.leaderboard_size
    }

    pub fn player_store(&self) -> Arc<dyn PlayerStore> {
        self.player_store.clone()
    }

    /// Join the casual queue; a completed pair is announced and forgotten
    pub async fn join_casual(&self, player_id: &str) -> Result<JoinOutcome> {
        self.join(QueueKind::Casual, player_id).await
    }

    /// Join the ranked queue; a completed pair becomes an active match
    pub async fn join_ranked(&self, player_id: &str) -> Result<JoinOutcome> {
        self.join(QueueKind::Ranked, player_id).await
    }

    async fn join(&self, queue_kind: QueueKind, player_id: &str) -> Result<JoinOutcome> {
        if !is_valid_player_id(player_id) {
            self.metrics_collector
                .record_queue_join(queue_kind, "rejected");
            return Err(MatchmakingError::InvalidCommand {
                reason: "Player ID cannot be empty".to_string(),
            }
            .into());
        }

        info!(
            "Processing join request - player_id: '{}', queue: {}",
            player_id, queue_kind
        );

        let enqueued = match queue_kind {
            QueueKind::Casual => self.enqueue_casual(player_id),
            QueueKind::Ranked => self.enqueue_ranked(player_id),
        };

        let (outcome, waits) = match enqueued {
            Ok(result) => result,
            Err(e) => {
                let result = MatchmakingError::find(&e)
                    .map(|known| known.kind())
                    .unwrap_or("error");
                self.metrics_collector.record_queue_join(queue_kind, result);
                warn!(
                    "Join refused - player_id: '{}', queue: {}, reason: {}",
                    player_id, queue_kind, e
                );
                return Err(e);
            }
        };

        match &outcome {
            JoinOutcome::Queued { position, .. } => {
                self.metrics_collector.record_queue_join(queue_kind, "queued");
                self.metrics_collector
                    .record_queue_length(queue_kind, *position);
                info!(
                    "Player '{}' waiting in {} queue at position {}",
                    player_id, queue_kind, position
                );
            }
            JoinOutcome::Matched(found) => {
                self.metrics_collector
                    .record_queue_join(queue_kind, "matched");
                self.metrics_collector.record_match_made(queue_kind, &waits);
                if let Ok(remaining) = self.queue_len(queue_kind) {
                    self.metrics_collector
                        .record_queue_length(queue_kind, remaining);
                }

                {
                    let mut stats =
                        self.stats
                            .write()
                            .map_err(|_| MatchmakingError::InternalError {
                                message: "Failed to acquire stats lock".to_string(),
                            })?;
                    match queue_kind {
                        QueueKind::Casual => stats.casual_matches_made += 1,
                        QueueKind::Ranked => stats.ranked_matches_made += 1,
                    }
                }

                info!(
                    "Match found - match_id: {}, queue: {}, players: '{}' vs '{}'",
                    found.match_id, queue_kind, found.player_one, found.player_two
                );

                // The pairing already happened; a lost announcement is not rolled back
                if let Err(e) = self.event_publisher.publish_match_found(found.clone()).await {
                    warn!(
                        "Failed to publish MatchFound for match {}: {}",
                        found.match_id, e
                    );
                }
            }
        }

        Ok(outcome)
    }

    fn lock_queue<'a>(
        &self,
        queue: &'a Mutex<MatchQueue>,
        queue_kind: QueueKind,
    ) -> Result<MutexGuard<'a, MatchQueue>> {
        queue.lock().map_err(|_| {
            MatchmakingError::InternalError {
                message: format!("Failed to acquire {} queue lock", queue_kind),
            }
            .into()
        })
    }

    fn enqueue_casual(&self, player_id: &str) -> Result<(JoinOutcome, Vec<std::time::Duration>)> {
        let mut queue = self.lock_queue(&self.casual_queue, QueueKind::Casual)?;

        if !queue.enqueue(player_id) {
            return Err(MatchmakingError::AlreadyQueued {
                player_id: player_id.to_string(),
                queue: QueueKind::Casual,
            }
            .into());
        }

        match queue.try_extract_pair() {
            Some((first, second)) => {
                let now = current_timestamp();
                let waits = vec![first.waited(now), second.waited(now)];
                let found = MatchFound {
                    match_id: generate_match_id(),
                    queue: QueueKind::Casual,
                    player_one: first.player_id,
                    player_two: second.player_id,
                    timestamp: now,
                };
                Ok((JoinOutcome::Matched(found), waits))
            }
            None => Ok((
                JoinOutcome::Queued {
                    queue: QueueKind::Casual,
                    position: queue.len(),
                },
                Vec::new(),
            )),
        }
    }

    fn enqueue_ranked(&self, player_id: &str) -> Result<(JoinOutcome, Vec<std::time::Duration>)> {
        // Registry first, then queue: extraction and match creation are one step
        let mut registry = self
            .registry
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire registry lock".to_string(),
            })?;

        if let Some(opponent) = registry.get_opponent(player_id) {
            return Err(MatchmakingError::MatchInProgress {
                player_id: player_id.to_string(),
                opponent: opponent.clone(),
            }
            .into());
        }

        let mut queue = self.lock_queue(&self.ranked_queue, QueueKind::Ranked)?;

        if !queue.enqueue(player_id) {
            return Err(MatchmakingError::AlreadyQueued {
                player_id: player_id.to_string(),
                queue: QueueKind::Ranked,
            }
            .into());
        }

        match queue.try_extract_pair() {
            Some((first, second)) => {
                let now = current_timestamp();
                let match_id = generate_match_id();
                registry.create(match_id, &first.player_id, &second.player_id)?;

                let waits = vec![first.waited(now), second.waited(now)];
                let found = MatchFound {
                    match_id,
                    queue: QueueKind::Ranked,
                    player_one: first.player_id,
                    player_two: second.player_id,
                    timestamp: now,
                };
                Ok((JoinOutcome::Matched(found), waits))
            }
            None => Ok((
                JoinOutcome::Queued {
                    queue: QueueKind::Ranked,
                    position: queue.len(),
                },
                Vec::new(),
            )),
        }
    }

    /// Apply the result of the reporter's active ranked match
    ///
    /// The report is refused with `NoActiveMatch` unless `opponent` is the
    /// reporter's current registry opponent. If the store fails, no record is
    /// changed and the match stays active so the report can be retried.
    pub async fn report_result(
        &self,
        reporter: &str,
        opponent: &str,
        reporter_won: bool,
    ) -> Result<MatchReported> {
        let start_time = Instant::now();

        info!(
            "Processing result report - reporter: '{}', opponent: '{}', reporter_won: {}",
            reporter, opponent, reporter_won
        );

        let _report_guard = self.report_lock.lock().await;

        let active = match self.active_match(reporter)? {
            Some(active) if active.opponent == opponent => active,
            _ => {
                self.metrics_collector
                    .record_report_rejected("no_active_match");
                warn!(
                    "Report refused - '{}' has no active match against '{}'",
                    reporter, opponent
                );
                return Err(MatchmakingError::NoActiveMatch {
                    reporter: reporter.to_string(),
                    opponent: opponent.to_string(),
                }
                .into());
            }
        };

        // Both records must exist before their ratings feed a write
        self.store_call("ensure_exists", self.player_store.ensure_exists(reporter))
            .await?;
        self.store_call("ensure_exists", self.player_store.ensure_exists(opponent))
            .await?;

        let reporter_rating = self
            .store_call("get_rating", self.player_store.get_rating(reporter))
            .await?;
        let opponent_rating = self
            .store_call("get_rating", self.player_store.get_rating(opponent))
            .await?;

        let calculation_start = Instant::now();
        let delta =
            self.rating_calculator
                .rating_delta(reporter_rating, opponent_rating, reporter_won);
        self.metrics_collector
            .record_rating_calculation(calculation_start.elapsed());

        debug!(
            "Rating delta computed - '{}' ({}) vs '{}' ({}): {:+}",
            reporter, reporter_rating, opponent, opponent_rating, delta
        );

        let deltas = if reporter_won {
            vec![
                RecordDelta::win(reporter, delta),
                RecordDelta::loss(opponent, -delta),
            ]
        } else {
            vec![
                RecordDelta::loss(reporter, delta),
                RecordDelta::win(opponent, -delta),
            ]
        };

        let mut updated = self
            .store_call("apply_results", self.player_store.apply_results(deltas))
            .await?;

        let (reporter_record, opponent_record) = match (updated.pop(), updated.pop()) {
            (Some(opponent_record), Some(reporter_record)) => (reporter_record, opponent_record),
            _ => {
                error!("Player store returned too few records for match {}", active.match_id);
                return Err(MatchmakingError::ConsistencyFault {
                    message: "player store returned too few records".to_string(),
                }
                .into());
            }
        };

        {
            let mut registry =
                self.registry
                    .write()
                    .map_err(|_| MatchmakingError::InternalError {
                        message: "Failed to acquire registry lock".to_string(),
                    })?;
            registry.resolve(reporter, opponent)?;
        }

        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
            stats.results_reported += 1;
        }

        self.metrics_collector
            .record_result_reported(reporter_won, delta);

        let reported = MatchReported {
            match_id: active.match_id,
            reporter: reporter.to_string(),
            opponent: opponent.to_string(),
            reporter_won,
            rating_delta: delta,
            reporter_record,
            opponent_record,
            timestamp: current_timestamp(),
        };

        info!(
            "Result applied - match_id: {}, winner: '{}', loser: '{}', delta: {}, duration: {:.2}ms",
            reported.match_id,
            reported.winner(),
            reported.loser(),
            delta.abs(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );

        if let Err(e) = self
            .event_publisher
            .publish_match_reported(reported.clone())
            .await
        {
            warn!(
                "Failed to publish MatchReported for match {}: {}",
                reported.match_id, e
            );
        }

        Ok(reported)
    }

    /// Top records by rating; an empty store yields an empty list
    pub async fn leaderboard(&self) -> Result<Vec<PlayerRecord>> {
        let records = self
            .store_call("top_n", self.player_store.top_n(self.leaderboard_size))
            .await?;

        self.metrics_collector.record_leaderboard_read();
        debug!("Leaderboard served with {} records", records.len());

        Ok(records)
    }

    /// Delete every player record
    ///
    /// Queues and active matches are left as they are. Callers are
    /// responsible for checking that the requester may do this.
    pub async fn reset_leaderboard(&self) -> Result<LeaderboardReset> {
        // Never lands between a report's ensure_exists and its write
        let _report_guard = self.report_lock.lock().await;

        let players_removed = self
            .store_call("reset_all", self.player_store.reset_all())
            .await?;

        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
            stats.leaderboard_resets += 1;
        }

        self.metrics_collector
            .record_leaderboard_reset(players_removed);

        info!("Leaderboard reset - {} player records removed", players_removed);

        let reset = LeaderboardReset {
            players_removed,
            timestamp: current_timestamp(),
        };

        if let Err(e) = self
            .event_publisher
            .publish_leaderboard_reset(reset.clone())
            .await
        {
            warn!("Failed to publish LeaderboardReset: {}", e);
        }

        Ok(reset)
    }

    /// Execute a decoded command and turn its result into a reply outcome
    pub async fn execute(&self, request: &CommandRequest) -> CommandOutcome {
        let start_time = Instant::now();
        let player_id = request.player_id.as_str();

        let result = match &request.command {
            Command::JoinCasual => self
                .join_casual(player_id)
                .await
                .map(CommandPayload::Joined),
            Command::JoinRanked => self
                .join_ranked(player_id)
                .await
                .map(CommandPayload::Joined),
            Command::Report { opponent, won } => self
                .report_result(player_id, opponent, *won)
                .await
                .map(CommandPayload::Reported),
            Command::Leaderboard => self.leaderboard().await.map(CommandPayload::Leaderboard),
            Command::ResetLeaderboard => self
                .reset_leaderboard()
                .await
                .map(CommandPayload::LeaderboardReset),
        };

        self.metrics_collector.record_command(
            request.command.name(),
            result.is_ok(),
            start_time.elapsed(),
        );

        match result {
            Ok(payload) => CommandOutcome::Success { payload },
            Err(e) => {
                let outcome = match MatchmakingError::find(&e) {
                    Some(known) => CommandOutcome::Failure {
                        kind: known.kind().to_string(),
                        message: known.user_message(),
                    },
                    None => CommandOutcome::Failure {
                        kind: "internal_error".to_string(),
                        message: MatchmakingError::InternalError {
                            message: e.to_string(),
                        }
                        .user_message(),
                    },
                };
                debug!(
                    "Command {} for '{}' failed: {}",
                    request.command.name(),
                    player_id,
                    e
                );
                outcome
            }
        }
    }

    /// Time a store call and normalize its failure into a `StorageError`
    async fn store_call<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let start_time = Instant::now();
        let result = call.await;
        self.metrics_collector
            .record_storage_operation(operation, start_time.elapsed());

        result.map_err(|e| {
            self.metrics_collector.record_storage_failure(operation);
            error!("Player store operation '{}' failed: {}", operation, e);
            if MatchmakingError::find(&e).is_some() {
                e
            } else {
                MatchmakingError::storage(format!("{}: {}", operation, e)).into()
            }
        })
    }

    fn active_match(&self, player_id: &str) -> Result<Option<ActiveMatch>> {
        let registry = self
            .registry
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire registry lock".to_string(),
            })?;
        Ok(registry.get(player_id).cloned())
    }

    /// Whether `player_id` is waiting in `queue_kind`
    pub fn is_queued(&self, queue_kind: QueueKind, player_id: &str) -> Result<bool> {
        let queue = match queue_kind {
            QueueKind::Casual => self.lock_queue(&self.casual_queue, queue_kind)?,
            QueueKind::Ranked => self.lock_queue(&self.ranked_queue, queue_kind)?,
        };
        Ok(queue.contains(player_id))
    }

    /// Number of players waiting in `queue_kind`
    pub fn queue_len(&self, queue_kind: QueueKind) -> Result<usize> {
        let queue = match queue_kind {
            QueueKind::Casual => self.lock_queue(&self.casual_queue, queue_kind)?,
            QueueKind::Ranked => self.lock_queue(&self.ranked_queue, queue_kind)?,
        };
        Ok(queue.len())
    }

    /// Current ranked opponent of `player_id`, if any
    pub fn active_opponent(&self, player_id: &str) -> Result<Option<PlayerId>> {
        Ok(self
            .active_match(player_id)?
            .map(|active| active.opponent))
    }

    /// Stored record for `player_id`
    pub async fn player(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        self.store_call("get_player", self.player_store.get_player(player_id))
            .await
    }

    /// Get current manager statistics
    pub async fn get_stats(&self) -> Result<MatchmakingStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();

        stats.active_matches = {
            let registry = self
                .registry
                .read()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire registry lock".to_string(),
                })?;
            registry.match_count()
        };
        stats.casual_waiting = self.queue_len(QueueKind::Casual)?;
        stats.ranked_waiting = self.queue_len(QueueKind::Ranked)?;

        Ok(stats)
    }
}
