//! AMQP publisher
//!
//! Each publish opens its own connection, publishes with confirms enabled and
//! closes the connection again whatever the outcome.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tracing::{debug, error, info, warn};

use super::{Destination, MessagePublisher};
use crate::error::{ApiError, ApiResult};

const PERSISTENT: u8 = 2;

pub struct AmqpPublisher {
    uri: String,
    destination: Destination,
}

impl std::fmt::Debug for AmqpPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URI carries broker credentials
        f.debug_struct("AmqpPublisher")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl AmqpPublisher {
    pub fn new(uri: impl Into<String>, destination: Destination) -> Self {
        Self {
            uri: uri.into(),
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Declare the destination on the broker
    pub async fn declare(&self) -> ApiResult<()> {
        let connection = self.connect().await?;
        let result = match connection.create_channel().await {
            Ok(channel) => declare(&channel, &self.destination).await,
            Err(e) => Err(e),
        };
        close(connection).await;

        result.map_err(|e| publish_error("declare", &self.destination, e))?;
        info!(destination = self.destination.name(), "Declared broker destination");
        Ok(())
    }

    async fn connect(&self) -> ApiResult<Connection> {
        Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| publish_error("connect", &self.destination, e))
    }

    async fn publish_on(&self, connection: &Connection, body: &[u8], tx_id: Option<&str>) -> lapin::Result<bool> {
        let channel = connection.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;
        declare(&channel, &self.destination).await?;

        let mut headers = FieldTable::default();
        if let Some(tx_id) = tx_id {
            headers.insert(
                ShortString::from("tx_id"),
                AMQPValue::LongString(LongString::from(tx_id)),
            );
        }
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(ShortString::from("application/json"))
            .with_headers(headers);

        let (exchange, routing_key) = match &self.destination {
            Destination::Queue(name) => ("", name.as_str()),
            Destination::FanoutExchange(name) => (name.as_str(), ""),
        };
        let options = BasicPublishOptions {
            mandatory: true,
            immediate: false,
        };

        let confirmation = channel
            .basic_publish(exchange, routing_key, options, body, properties)
            .await?
            .await?;

        Ok(match confirmation {
            // A returned message was unroutable even though it was acked
            Confirmation::Ack(returned) => returned.is_none(),
            Confirmation::Nack(_) => false,
            Confirmation::NotRequested => true,
        })
    }
}

#[async_trait]
impl MessagePublisher for AmqpPublisher {
    async fn publish(&self, body: &[u8], tx_id: Option<&str>) -> ApiResult<()> {
        debug!(destination = self.destination.name(), tx_id = ?tx_id, bytes = body.len(), "Publishing message");

        let connection = self.connect().await?;
        let result = self.publish_on(&connection, body, tx_id).await;
        close(connection).await;

        match result {
            Ok(true) => {
                info!(destination = self.destination.name(), tx_id = ?tx_id, "Message published");
                Ok(())
            }
            Ok(false) => {
                error!(destination = self.destination.name(), tx_id = ?tx_id, "Broker did not accept message");
                Err(ApiError::Publish(format!(
                    "{} did not accept the message",
                    self.destination.name()
                )))
            }
            Err(e) => Err(publish_error("publish", &self.destination, e)),
        }
    }
}

async fn declare(channel: &Channel, destination: &Destination) -> lapin::Result<()> {
    match destination {
        Destination::Queue(name) => {
            channel
                .queue_declare(
                    name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        Destination::FanoutExchange(name) => {
            channel
                .exchange_declare(
                    name,
                    ExchangeKind::Fanout,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
    }
    Ok(())
}

async fn close(connection: Connection) {
    if let Err(e) = connection.close(200, "OK").await {
        warn!(error = %e, "Failed to close broker connection");
    }
}

fn publish_error(stage: &str, destination: &Destination, err: lapin::Error) -> ApiError {
    error!(stage, destination = destination.name(), error = %err, "Broker error");
    ApiError::Publish(format!("{} failed for {}: {}", stage, destination.name(), err))
}
