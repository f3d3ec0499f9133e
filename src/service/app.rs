//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the player store,
//! the matchmaking manager, the AMQP transport and the background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{CommandConsumer, MessageHandler};
use crate::amqp::publisher::{AmqpEventPublisher, EventPublisher, PublisherConfig};
use crate::config::AppConfig;
use crate::error::{MatchmakingError, Result as MatchmakingResult};
use crate::matchmaking::{MatchmakingManager, MatchmakingStats};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::rating::{PlayerStore, SqlitePlayerStore};
use crate::types::{CommandOutcome, CommandReply, CommandRequest};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Production message handler that executes commands against the manager
/// and publishes the reply
pub struct ProductionMessageHandler {
    manager: MatchmakingManager,
    reply_publisher: Arc<dyn EventPublisher>,
    metrics_collector: Arc<MetricsCollector>,
}

impl ProductionMessageHandler {
    pub fn new(
        manager: MatchmakingManager,
        reply_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            manager,
            reply_publisher,
            metrics_collector,
        }
    }
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_command(&self, request: CommandRequest) -> MatchmakingResult<CommandReply> {
        let start_time = std::time::Instant::now();

        info!(
            "Processing command in production handler - request_id: '{}', player: '{}', command: {}",
            request.request_id,
            request.player_id,
            request.command.name()
        );

        let outcome = self.manager.execute(&request).await;

        match &outcome {
            CommandOutcome::Success { .. } => info!(
                "Command succeeded - request_id: '{}', player: '{}', time: {:.2}ms",
                request.request_id,
                request.player_id,
                start_time.elapsed().as_secs_f64() * 1000.0
            ),
            CommandOutcome::Failure { kind, message } => warn!(
                "Command failed - request_id: '{}', player: '{}', kind: {}, message: {}",
                request.request_id, request.player_id, kind, message
            ),
        }

        let reply = CommandReply {
            request_id: request.request_id,
            player_id: request.player_id,
            outcome,
            timestamp: current_timestamp(),
        };

        let publish_start = std::time::Instant::now();
        let published = self
            .reply_publisher
            .publish_command_reply(reply.clone())
            .await;
        self.metrics_collector.record_amqp_operation(
            "publish_reply",
            published.is_ok(),
            publish_start.elapsed(),
        );

        // The command already took effect; a lost reply is not retried here
        if let Err(e) = published {
            warn!(
                "Failed to publish reply for request '{}': {}",
                reply.request_id, e
            );
        }

        Ok(reply)
    }

    async fn handle_error(&self, error: MatchmakingError, message_data: &[u8]) {
        error!(
            "Production message handler error - kind: '{}', error: '{}', message_size: {} bytes",
            error.kind(),
            error,
            message_data.len()
        );

        self.metrics_collector
            .record_amqp_operation("consume", false, std::time::Duration::ZERO);

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Core matchmaking service
    manager: MatchmakingManager,

    /// Durable player records
    player_store: Arc<dyn PlayerStore>,

    /// SQLite handle kept for closing the pool on shutdown
    sqlite_store: Option<Arc<SqlitePlayerStore>>,

    /// AMQP connection; absent when the state was assembled without a broker
    amqp_connection: Option<Arc<AmqpConnection>>,

    /// Shared metrics collector
    metrics_collector: Arc<MetricsCollector>,

    /// Health and metrics HTTP service, present while running
    metrics_service: Mutex<Option<MetricsService>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// AMQP consumer for player commands
    command_consumer: Mutex<Option<CommandConsumer>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing ladder-room matchmaking service");
        info!(
            "Configuration: service={}, amqp_url={}, database_url={}",
            config.service.name, config.amqp.url, config.storage.database_url
        );

        let metrics_collector = Self::initialize_metrics()?;
        let player_store = Self::initialize_storage(&config).await?;
        let amqp_connection = Self::initialize_amqp(&config).await?;

        let event_publisher =
            Self::initialize_publisher(&config, amqp_connection.clone()).await?;

        let manager = MatchmakingManager::with_metrics(
            player_store.clone(),
            event_publisher,
            metrics_collector.clone(),
        )
        .with_leaderboard_size(config.matchmaking.leaderboard_size);

        let mut state = Self::from_parts(
            config,
            manager,
            metrics_collector,
            Some(amqp_connection),
        );
        state.sqlite_store = Some(player_store);
        Ok(state)
    }

    /// Assemble a state from already-built components
    pub fn from_parts(
        config: AppConfig,
        manager: MatchmakingManager,
        metrics_collector: Arc<MetricsCollector>,
        amqp_connection: Option<Arc<AmqpConnection>>,
    ) -> Self {
        Self {
            config,
            player_store: manager.player_store(),
            sqlite_store: None,
            manager,
            amqp_connection,
            metrics_collector,
            metrics_service: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            command_consumer: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the health server, command consumption and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting ladder-room matchmaking service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_amqp_consumption().await?;
        self.start_background_tasks().await?;

        info!("✅ Ladder-room matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of ladder-room service");

        *self.is_running.write().await = false;

        if let Some(consumer) = self.command_consumer.lock().await.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP command consumption stopped");
            }
        }

        self.stop_background_tasks().await;

        // Dropping the service releases its handle on this state
        if let Some(metrics_service) = self.metrics_service.lock().await.take() {
            info!("Stopping metrics service...");
            if let Err(e) = metrics_service.stop().await {
                warn!("Failed to stop metrics service: {}", e);
            } else {
                info!("✅ Metrics service stopped");
            }
        }

        let final_stats = self
            .manager
            .get_stats()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;
        info!("Final service statistics: {:?}", final_stats);

        if let Some(store) = &self.sqlite_store {
            store.close().await;
            info!("✅ Player store closed");
        }

        info!("✅ Ladder-room service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    #[cfg(test)]
    pub(crate) async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    /// Get the matchmaking manager
    pub fn manager(&self) -> &MatchmakingManager {
        &self.manager
    }

    pub fn player_store(&self) -> Arc<dyn PlayerStore> {
        self.player_store.clone()
    }

    /// Get the metrics collector
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Get AMQP connection for health checks
    pub fn amqp_connection(&self) -> Option<Arc<AmqpConnection>> {
        self.amqp_connection.clone()
    }

    /// Current matchmaking statistics
    pub async fn stats(&self) -> MatchmakingResult<MatchmakingStats> {
        self.manager.get_stats().await
    }

    fn initialize_metrics() -> Result<Arc<MetricsCollector>, ServiceError> {
        let metrics_collector =
            MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })?;
        Ok(Arc::new(metrics_collector))
    }

    /// Open the SQLite player store and create its schema
    async fn initialize_storage(
        config: &AppConfig,
    ) -> Result<Arc<SqlitePlayerStore>, ServiceError> {
        info!("Opening player store: {}", config.storage.database_url);

        let store = SqlitePlayerStore::connect(
            &config.storage.database_url,
            config.storage.max_connections,
        )
        .await
        .map_err(|e| ServiceError::Storage {
            message: format!("Failed to open player store: {}", e),
        })?;

        Ok(Arc::new(store))
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let mut amqp_config =
            AmqpConfig::from_url(&config.amqp.url).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;
        amqp_config.connection_timeout_ms = config.amqp_connection_timeout().as_millis() as u64;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    async fn initialize_publisher(
        config: &AppConfig,
        amqp_connection: Arc<AmqpConnection>,
    ) -> Result<Arc<dyn EventPublisher>, ServiceError> {
        let channel =
            amqp_connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to open AMQP channel: {}", e),
                })?;

        let publisher_config = PublisherConfig {
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            events_exchange: config.amqp.events_exchange.clone(),
            replies_exchange: config.amqp.replies_exchange.clone(),
            ..PublisherConfig::default()
        };

        let publisher = AmqpEventPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize event publisher: {}", e),
            })?;

        Ok(Arc::new(publisher))
    }

    /// Start the health and metrics HTTP endpoints
    async fn start_metrics_service(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        info!("Starting metrics and health endpoints on port {}", port);

        let health_config = HealthServerConfig {
            port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_app_state(self.clone()),
        );
        let metrics_service = MetricsService::new(self.metrics_collector.clone(), health_server);

        let metrics_handle = {
            let metrics_service = metrics_service.clone();
            tokio::spawn(async move {
                if let Err(e) = metrics_service.start().await {
                    error!("Metrics service failed: {}", e);
                } else {
                    info!("Metrics service task completed");
                }
            })
        };

        *self.metrics_service.lock().await = Some(metrics_service);
        self.background_tasks.lock().await.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    /// Start AMQP command consumption
    async fn start_amqp_consumption(&self) -> Result<(), ServiceError> {
        let amqp_connection =
            self.amqp_connection
                .clone()
                .ok_or_else(|| ServiceError::AmqpConnection {
                    message: "No AMQP connection configured".to_string(),
                })?;
        let queue_name = self.config.amqp.command_queue.clone();

        info!("Opening AMQP channel for command consumption...");
        let channel =
            amqp_connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to open consumer channel: {}", e),
                })?;

        info!("Declaring queue: '{}'...", queue_name);
        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        // Replies go out on their own channel so consumption never blocks on publishing
        let reply_publisher = Self::initialize_publisher(&self.config, amqp_connection).await?;

        let message_handler = Arc::new(ProductionMessageHandler::new(
            self.manager.clone(),
            reply_publisher,
            self.metrics_collector.clone(),
        ));

        let consumer = CommandConsumer::new(message_handler, channel);
        consumer
            .start_consuming(&queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming commands: {}", e),
            })?;

        *self.command_consumer.lock().await = Some(consumer);

        info!(
            "AMQP command consumption started successfully on queue: '{}'",
            queue_name
        );
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        let stats_interval = self.config.stats_interval();
        info!(
            "Starting matchmaking stats task ({}s interval)...",
            stats_interval.as_secs()
        );
        let stats_task = {
            let manager = self.manager.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(stats_interval);
                info!("Matchmaking stats task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match manager.get_stats().await {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - casual waiting: {}, ranked waiting: {}, active matches: {}",
                                stats.casual_waiting, stats.ranked_waiting, stats.active_matches
                            );
                            metrics_collector.update_from_matchmaking_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get matchmaking stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Matchmaking stats task stopped");
            })
        };

        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let metrics_collector = self.metrics_collector.clone();
            let player_store = self.player_store.clone();
            let amqp_connection = self.amqp_connection.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    let storage_ok = player_store.player_count().await.is_ok();
                    let amqp_ok = amqp_connection
                        .as_ref()
                        .map(|connection| connection.is_alive())
                        .unwrap_or(false);

                    metrics_collector.update_component_health("player_store", storage_ok);
                    metrics_collector.update_component_health("amqp", amqp_ok);

                    // 2 = healthy, 1 = degraded, 0 = unhealthy
                    let status = match (storage_ok, amqp_ok) {
                        (true, true) => 2,
                        (true, false) => 1,
                        _ => 0,
                    };
                    metrics_collector.update_health_status(status);

                    debug!(
                        "Updated service health metrics - uptime: {}s, storage: {}, amqp: {}",
                        uptime_seconds, storage_ok, amqp_ok
                    );
                }

                info!("Health metrics task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(stats_task);
        tasks.push(health_metrics_task);

        info!("2 background maintenance tasks started successfully");
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
