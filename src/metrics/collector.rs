//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the ladder-room matchmaking
//! service using Prometheus metrics.

use crate::matchmaking::manager::MatchmakingStats;
use crate::types::QueueKind;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Ranked match and result metrics
    match_metrics: MatchMetrics,

    /// Leaderboard metrics
    leaderboard_metrics: LeaderboardMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Join attempts by queue and result (queued, matched, duplicate, rejected)
    pub joins_total: IntCounterVec,

    /// Players currently waiting per queue
    pub players_waiting: IntGaugeVec,

    /// Pairs extracted per queue
    pub matches_made_total: IntCounterVec,

    /// Time a player waited before being paired
    pub queue_wait_time_seconds: HistogramVec,
}

/// Ranked match and result metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Ranked matches awaiting a report
    pub active_matches: IntGauge,

    /// Accepted reports by reporter outcome (win, loss)
    pub results_reported_total: IntCounterVec,

    /// Refused reports by failure kind
    pub report_rejections_total: IntCounterVec,

    /// Absolute rating change applied per report
    pub rating_delta: Histogram,
}

/// Leaderboard metrics
#[derive(Clone)]
pub struct LeaderboardMetrics {
    /// Leaderboard queries served
    pub reads_total: IntCounter,

    /// Leaderboard resets performed
    pub resets_total: IntCounter,

    /// Player records deleted by resets
    pub players_removed_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Command processing time by command and status
    pub command_processing_duration: HistogramVec,

    /// Rating calculation time
    pub rating_calculation_duration: Histogram,

    /// Player store operation durations
    pub storage_operation_duration: HistogramVec,

    /// Player store failures by operation
    pub storage_failures_total: IntCounterVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let leaderboard_metrics = LeaderboardMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            leaderboard_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn leaderboard(&self) -> &LeaderboardMetrics {
        &self.leaderboard_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update gauges from matchmaking stats
    pub fn update_from_matchmaking_stats(&self, stats: &MatchmakingStats) {
        self.queue_metrics
            .players_waiting
            .with_label_values(&[QueueKind::Casual.as_str()])
            .set(stats.casual_waiting as i64);

        self.queue_metrics
            .players_waiting
            .with_label_values(&[QueueKind::Ranked.as_str()])
            .set(stats.ranked_waiting as i64);

        self.match_metrics
            .active_matches
            .set(stats.active_matches as i64);
    }

    /// Record a join attempt and its result
    pub fn record_queue_join(&self, queue: QueueKind, result: &str) {
        self.queue_metrics
            .joins_total
            .with_label_values(&[queue.as_str(), result])
            .inc();
    }

    /// Record the current length of a queue
    pub fn record_queue_length(&self, queue: QueueKind, length: usize) {
        self.queue_metrics
            .players_waiting
            .with_label_values(&[queue.as_str()])
            .set(length as i64);
    }

    /// Record a pair leaving a queue
    pub fn record_match_made(&self, queue: QueueKind, waits: &[Duration]) {
        self.queue_metrics
            .matches_made_total
            .with_label_values(&[queue.as_str()])
            .inc();

        for wait in waits {
            self.queue_metrics
                .queue_wait_time_seconds
                .with_label_values(&[queue.as_str()])
                .observe(wait.as_secs_f64());
        }

        if queue == QueueKind::Ranked {
            self.match_metrics.active_matches.inc();
        }
    }

    /// Record an accepted ranked report
    pub fn record_result_reported(&self, reporter_won: bool, rating_delta: i64) {
        let outcome = if reporter_won { "win" } else { "loss" };

        self.match_metrics
            .results_reported_total
            .with_label_values(&[outcome])
            .inc();

        self.match_metrics
            .rating_delta
            .observe(rating_delta.unsigned_abs() as f64);

        self.match_metrics.active_matches.dec();
    }

    /// Record a refused ranked report
    pub fn record_report_rejected(&self, reason: &str) {
        self.match_metrics
            .report_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_leaderboard_read(&self) {
        self.leaderboard_metrics.reads_total.inc();
    }

    pub fn record_leaderboard_reset(&self, players_removed: u64) {
        self.leaderboard_metrics.resets_total.inc();
        self.leaderboard_metrics
            .players_removed_total
            .inc_by(players_removed);
    }

    /// Record a processed command
    pub fn record_command(&self, command: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "failure" };

        self.performance_metrics
            .command_processing_duration
            .with_label_values(&[command, status])
            .observe(duration.as_secs_f64());
    }

    /// Record rating calculation duration
    pub fn record_rating_calculation(&self, duration: Duration) {
        self.performance_metrics
            .rating_calculation_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a player store operation
    pub fn record_storage_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .storage_operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record a failed player store operation
    pub fn record_storage_failure(&self, operation: &str) {
        self.performance_metrics
            .storage_failures_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("ladder_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "ladder_room_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("ladder_room_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "ladder_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("ladder_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounterVec::new(
            Opts::new("ladder_room_queue_joins_total", "Queue join attempts"),
            &["queue", "result"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let players_waiting = IntGaugeVec::new(
            Opts::new(
                "ladder_room_players_waiting",
                "Players currently waiting in queue",
            ),
            &["queue"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let matches_made_total = IntCounterVec::new(
            Opts::new("ladder_room_matches_made_total", "Total pairs extracted"),
            &["queue"],
        )?;
        registry.register(Box::new(matches_made_total.clone()))?;

        let queue_wait_time_seconds = HistogramVec::new(
            HistogramOpts::new(
                "ladder_room_queue_wait_time_seconds",
                "Player queue wait time",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
            &["queue"],
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            joins_total,
            players_waiting,
            matches_made_total,
            queue_wait_time_seconds,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_matches = IntGauge::new(
            "ladder_room_active_matches",
            "Ranked matches awaiting a result",
        )?;
        registry.register(Box::new(active_matches.clone()))?;

        let results_reported_total = IntCounterVec::new(
            Opts::new(
                "ladder_room_results_reported_total",
                "Ranked results applied",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(results_reported_total.clone()))?;

        let report_rejections_total = IntCounterVec::new(
            Opts::new(
                "ladder_room_report_rejections_total",
                "Ranked reports refused",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(report_rejections_total.clone()))?;

        let rating_delta = Histogram::with_opts(
            HistogramOpts::new(
                "ladder_room_rating_delta",
                "Absolute rating change per ranked result",
            )
            .buckets(vec![0.0, 4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0]),
        )?;
        registry.register(Box::new(rating_delta.clone()))?;

        Ok(Self {
            active_matches,
            results_reported_total,
            report_rejections_total,
            rating_delta,
        })
    }
}

impl LeaderboardMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let reads_total = IntCounter::new(
            "ladder_room_leaderboard_reads_total",
            "Leaderboard queries served",
        )?;
        registry.register(Box::new(reads_total.clone()))?;

        let resets_total = IntCounter::new(
            "ladder_room_leaderboard_resets_total",
            "Leaderboard resets performed",
        )?;
        registry.register(Box::new(resets_total.clone()))?;

        let players_removed_total = IntCounter::new(
            "ladder_room_players_removed_total",
            "Player records deleted by resets",
        )?;
        registry.register(Box::new(players_removed_total.clone()))?;

        Ok(Self {
            reads_total,
            resets_total,
            players_removed_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "ladder_room_command_processing_duration_seconds",
                "Command processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command", "status"],
        )?;
        registry.register(Box::new(command_processing_duration.clone()))?;

        let rating_calculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ladder_room_rating_calculation_duration_seconds",
                "Rating calculation time",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01]),
        )?;
        registry.register(Box::new(rating_calculation_duration.clone()))?;

        let storage_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "ladder_room_storage_operation_duration_seconds",
                "Player store operation duration",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(storage_operation_duration.clone()))?;

        let storage_failures_total = IntCounterVec::new(
            Opts::new(
                "ladder_room_storage_failures_total",
                "Player store failures",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(storage_failures_total.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "ladder_room_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            command_processing_duration,
            rating_calculation_duration,
            storage_operation_duration,
            storage_failures_total,
            amqp_operation_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
