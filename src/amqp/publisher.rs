//! AMQP event publisher for outbound events and command replies

use crate::amqp::messages::{
    MessageEnvelope, MessageUtils, COMMAND_REPLY_ROUTING_KEY, LEADERBOARD_RESET_ROUTING_KEY,
    MATCH_EVENTS_EXCHANGE, MATCH_REPORTED_ROUTING_KEY, REPLIES_EXCHANGE,
};
use crate::error::{MatchmakingError, Result};
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Upper bound on remembered correlation ids before the cache is flushed
const DEDUP_CACHE_LIMIT: usize = 10_000;

/// Trait for publishing matchmaking events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a MatchFound event
    async fn publish_match_found(&self, event: MatchFound) -> Result<()>;

    /// Publish a MatchReported event
    async fn publish_match_reported(&self, event: MatchReported) -> Result<()>;

    /// Publish a LeaderboardReset event
    async fn publish_leaderboard_reset(&self, event: LeaderboardReset) -> Result<()>;

    /// Publish the reply to a processed command
    async fn publish_command_reply(&self, reply: CommandReply) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    pub publish_timeout_ms: u64,
    pub events_exchange: String,
    pub replies_exchange: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            publish_timeout_ms: 5000,
            events_exchange: MATCH_EVENTS_EXCHANGE.to_string(),
            replies_exchange: REPLIES_EXCHANGE.to_string(),
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
    published_messages: std::sync::Mutex<HashSet<String>>, // For deduplication
}

impl AmqpEventPublisher {
    /// Create a new event publisher
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(HashSet::new()),
        };

        publisher.setup_exchanges().await?;

        Ok(publisher)
    }

    /// Set up AMQP exchanges for events and replies
    async fn setup_exchanges(&self) -> Result<()> {
        for exchange in [&self.config.events_exchange, &self.config.replies_exchange] {
            let args = ExchangeDeclareArguments::new(exchange, "topic")
                .durable(true)
                .finish();
            self.channel.exchange_declare(args).await.map_err(|e| {
                MatchmakingError::AmqpConnectionFailed {
                    message: format!("Failed to declare exchange {}: {}", exchange, e),
                }
            })?;
        }

        info!(
            "Successfully set up AMQP exchanges '{}' and '{}'",
            self.config.events_exchange, self.config.replies_exchange
        );
        Ok(())
    }

    /// Generic method to publish to an exchange with retry logic
    async fn publish_to_exchange<T>(
        &self,
        exchange: &str,
        envelope: &MessageEnvelope<T>,
    ) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone,
    {
        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| MatchmakingError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Message {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(exchange, envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                MatchmakingError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        if published_messages.len() >= DEDUP_CACHE_LIMIT {
                            published_messages.clear();
                        }
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Successfully published message {} to exchange {} ({})",
                        envelope.correlation_id, exchange, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish<T>(&self, exchange: &str, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        let publish = self.channel.basic_publish(properties, payload, args);
        match tokio::time::timeout(
            Duration::from_millis(self.config.publish_timeout_ms),
            publish,
        )
        .await
        {
            Ok(result) => result.map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?,
            Err(_) => {
                return Err(MatchmakingError::AmqpConnectionFailed {
                    message: format!(
                        "Publish timed out after {}ms",
                        self.config.publish_timeout_ms
                    ),
                }
                .into())
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_found(&self, event: MatchFound) -> Result<()> {
        let routing_key = MessageUtils::match_found_routing_key(event.queue).to_string();
        let correlation_id = format!("{}.{}", routing_key, event.match_id);
        let envelope = MessageEnvelope::with_correlation_id(event, routing_key, correlation_id);
        self.publish_to_exchange(&self.config.events_exchange, &envelope)
            .await
    }

    async fn publish_match_reported(&self, event: MatchReported) -> Result<()> {
        let correlation_id = format!("{}.{}", MATCH_REPORTED_ROUTING_KEY, event.match_id);
        let envelope = MessageEnvelope::with_correlation_id(
            event,
            MATCH_REPORTED_ROUTING_KEY.to_string(),
            correlation_id,
        );
        self.publish_to_exchange(&self.config.events_exchange, &envelope)
            .await
    }

    async fn publish_leaderboard_reset(&self, event: LeaderboardReset) -> Result<()> {
        let envelope = MessageEnvelope::new(event, LEADERBOARD_RESET_ROUTING_KEY.to_string());
        self.publish_to_exchange(&self.config.events_exchange, &envelope)
            .await
    }

    async fn publish_command_reply(&self, reply: CommandReply) -> Result<()> {
        let correlation_id = format!("{}.{}", COMMAND_REPLY_ROUTING_KEY, reply.request_id);
        let envelope = MessageEnvelope::with_correlation_id(
            reply,
            COMMAND_REPLY_ROUTING_KEY.to_string(),
            correlation_id,
        );
        self.publish_to_exchange(&self.config.replies_exchange, &envelope)
            .await
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<AmqpMessage>>,
    fail_publishes: AtomicBool,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher whose every publish fails, for error-path tests
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.set_failing(true);
        publisher
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_publishes.store(failing, Ordering::SeqCst);
    }

    /// Get all published event type names (for testing)
    pub fn get_published_events(&self) -> Vec<String> {
        self.get_published_messages()
            .iter()
            .map(|message| match message {
                AmqpMessage::CommandRequest(_) => "CommandRequest",
                AmqpMessage::CommandReply(_) => "CommandReply",
                AmqpMessage::MatchFound(_) => "MatchFound",
                AmqpMessage::MatchReported(_) => "MatchReported",
                AmqpMessage::LeaderboardReset(_) => "LeaderboardReset",
            })
            .map(str::to_string)
            .collect()
    }

    /// Get all published messages (for testing)
    pub fn get_published_messages(&self) -> Vec<AmqpMessage> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }

    fn record(&self, message: AmqpMessage) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(MatchmakingError::AmqpConnectionFailed {
                message: "mock publisher is failing".to_string(),
            }
            .into());
        }

        if let Ok(mut events) = self.published_events.lock() {
            events.push(message);
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_found(&self, event: MatchFound) -> Result<()> {
        self.record(AmqpMessage::MatchFound(event))
    }

    async fn publish_match_reported(&self, event: MatchReported) -> Result<()> {
        self.record(AmqpMessage::MatchReported(event))
    }

    async fn publish_leaderboard_reset(&self, event: LeaderboardReset) -> Result<()> {
        self.record(AmqpMessage::LeaderboardReset(event))
    }

    async fn publish_command_reply(&self, reply: CommandReply) -> Result<()> {
        self.record(AmqpMessage::CommandReply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;

    fn create_test_match_found() -> MatchFound {
        MatchFound {
            match_id: utils::generate_match_id(),
            queue: QueueKind::Casual,
            player_one: "a".to_string(),
            player_two: "b".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert!(config.enable_deduplication);
        assert_eq!(config.events_exchange, MATCH_EVENTS_EXCHANGE);
        assert_eq!(config.replies_exchange, REPLIES_EXCHANGE);
    }

    #[test]
    fn test_message_envelope_creation() {
        let event = create_test_match_found();
        let envelope = MessageEnvelope::new(event, "match.found.casual".to_string());

        assert_eq!(envelope.routing_key, "match.found.casual");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn test_mock_publisher_records_messages() {
        let publisher = MockEventPublisher::new();

        publisher
            .publish_match_found(create_test_match_found())
            .await
            .unwrap();
        publisher
            .publish_leaderboard_reset(LeaderboardReset {
                players_removed: 3,
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(
            publisher.get_published_events(),
            vec!["MatchFound", "LeaderboardReset"]
        );

        publisher.clear_events();
        assert!(publisher.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_mock_publisher_failure_mode() {
        let publisher = MockEventPublisher::failing();

        let err = publisher
            .publish_match_found(create_test_match_found())
            .await
            .unwrap_err();
        assert_eq!(
            MatchmakingError::find(&err).unwrap().kind(),
            "amqp_connection_failed"
        );
        assert!(publisher.get_published_events().is_empty());

        publisher.set_failing(false);
        publisher
            .publish_match_found(create_test_match_found())
            .await
            .unwrap();
        assert_eq!(publisher.get_published_events().len(), 1);
    }
}
