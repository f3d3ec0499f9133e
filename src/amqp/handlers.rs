//! AMQP message handlers for processing player commands
//!
//! This module provides the consuming side of the command transport: it
//! decodes inbound command requests, hands them to a [`MessageHandler`] and
//! acknowledges the delivery once a reply has been produced.

use crate::amqp::messages::MessageUtils;
use crate::error::{MatchmakingError, Result};
use crate::types::{CommandOutcome, CommandReply, CommandRequest};
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling AMQP messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Execute a command on behalf of a player and produce its reply
    async fn handle_command(&self, request: CommandRequest) -> Result<CommandReply>;

    /// Handle messages that could not be processed
    async fn handle_error(&self, error: MatchmakingError, message_data: &[u8]);
}

/// Consumer for the inbound command queue
pub struct CommandConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl CommandConsumer {
    /// Create a new command consumer
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("command-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let mut args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);
        args.no_ack = false;

        self.channel
            .basic_consume(CommandDeliveryConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming commands from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming commands");
        Ok(())
    }
}

/// Internal consumer implementation
struct CommandDeliveryConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl CommandDeliveryConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    /// Decode and execute one delivery
    async fn process_message(&self, content: &[u8]) -> Result<CommandReply> {
        let request = MessageUtils::deserialize_command_request(content)?;

        debug!(
            "Command parsed - request_id: '{}', player_id: '{}', command: {}",
            request.request_id,
            request.player_id,
            request.command.name()
        );

        self.handler.handle_command(request).await
    }
}

#[async_trait]
impl AsyncConsumer for CommandDeliveryConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();

        info!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        let start_time = std::time::Instant::now();

        match self.process_message(&content).await {
            Ok(reply) => {
                let outcome = match &reply.outcome {
                    CommandOutcome::Success { .. } => "success",
                    CommandOutcome::Failure { .. } => "failure",
                };
                info!(
                    "Command processed - delivery_tag: {}, request_id: '{}', outcome: {}, processing_time: {:.2}ms",
                    delivery_tag,
                    reply.request_id,
                    outcome,
                    start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                error!(
                    "Message processing failed - delivery_tag: {}, processing_time: {:.2}ms, error: {}",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0,
                    e
                );
                let error = match e.downcast::<MatchmakingError>() {
                    Ok(known) => known,
                    Err(other) => MatchmakingError::InternalError {
                        message: other.to_string(),
                    },
                };
                self.handler.handle_error(error, &content).await;
            }
        }

        // Undecodable messages are dropped rather than redelivered forever
        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            warn!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}

/// Mock message handler for testing
pub struct MockMessageHandler {
    pub received_requests: Arc<tokio::sync::Mutex<Vec<CommandRequest>>>,
    pub errors: Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl Default for MockMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self {
            received_requests: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            errors: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_command(&self, request: CommandRequest) -> Result<CommandReply> {
        let reply = CommandReply {
            request_id: request.request_id.clone(),
            player_id: request.player_id.clone(),
            outcome: CommandOutcome::Success {
                payload: crate::types::CommandPayload::Leaderboard(Vec::new()),
            },
            timestamp: crate::utils::current_timestamp(),
        };

        let mut requests = self.received_requests.lock().await;
        requests.push(request);
        Ok(reply)
    }

    async fn handle_error(&self, error: MatchmakingError, _message_data: &[u8]) {
        let mut errors = self.errors.lock().await;
        errors.push(error.kind().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Command;

    fn create_test_command_request() -> CommandRequest {
        CommandRequest {
            request_id: "req-7".to_string(),
            player_id: "test_player".to_string(),
            command: Command::JoinCasual,
            timestamp: crate::utils::current_timestamp(),
        }
    }

    #[tokio::test]
    async fn test_mock_handler() {
        let handler = MockMessageHandler::new();
        let request = create_test_command_request();

        let reply = handler.handle_command(request.clone()).await.unwrap();
        assert_eq!(reply.request_id, "req-7");

        let received = handler.received_requests.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].player_id, request.player_id);
    }

    #[tokio::test]
    async fn test_process_message_dispatches_to_handler() {
        let handler = Arc::new(MockMessageHandler::new());
        let consumer = CommandDeliveryConsumer::new(handler.clone());

        let bytes = MessageUtils::serialize_command_request(&create_test_command_request()).unwrap();
        let reply = consumer.process_message(&bytes).await.unwrap();

        assert_eq!(reply.player_id, "test_player");
        assert_eq!(handler.received_requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_process_message_rejects_garbage() {
        let handler = Arc::new(MockMessageHandler::new());
        let consumer = CommandDeliveryConsumer::new(handler.clone());

        let err = consumer.process_message(b"not json").await.unwrap_err();
        assert_eq!(
            MatchmakingError::find(&err).unwrap().kind(),
            "invalid_command"
        );
        assert!(handler.received_requests.lock().await.is_empty());
    }
}
