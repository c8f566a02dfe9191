//! Broker hand-off
//!
//! Two logical destinations share one publisher type:
//! - `Seft.Instruments`: durable fanout exchange carrying instrument events
//! - `Seft.Responses`: durable queue carrying encrypted survey responses

pub mod amqp;

pub use amqp::AmqpPublisher;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiResult;

pub const INSTRUMENT_EXCHANGE: &str = "Seft.Instruments";
pub const RESPONSE_QUEUE: &str = "Seft.Responses";

/// Where a publisher delivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Direct to a named queue through the default exchange
    Queue(String),
    /// To every queue bound to a fanout exchange
    FanoutExchange(String),
}

impl Destination {
    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(name) | Destination::FanoutExchange(name) => name,
        }
    }
}

/// Durable message hand-off
///
/// `publish` returns only once the broker has accepted the message.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, body: &[u8], tx_id: Option<&str>) -> ApiResult<()>;
}

/// Event published when an instrument leaves an exercise
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentEvent {
    pub action: &'static str,
    pub exercise_id: Uuid,
    pub instrument_id: Uuid,
}

impl InstrumentEvent {
    pub fn remove(exercise_id: Uuid, instrument_id: Uuid) -> Self {
        Self {
            action: "REMOVE",
            exercise_id,
            instrument_id,
        }
    }
}
