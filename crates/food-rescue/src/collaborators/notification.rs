use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::{call_with_timeout, CollaboratorError};

const SERVICE: &str = "notification delivery";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub contact: String,
    pub body: String,
}

/// Per-recipient acknowledgment from the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
}

/// Sends courier messages over SMS, email, or similar.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        messages: &[OutboundMessage],
    ) -> Result<Vec<DeliveryOutcome>, CollaboratorError>;
}

/// Writes each message to the log and reports it delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        messages: &[OutboundMessage],
    ) -> Result<Vec<DeliveryOutcome>, CollaboratorError> {
        Ok(messages
            .iter()
            .map(|message| {
                info!(contact = %message.contact, chars = message.body.len(), "courier notified");
                DeliveryOutcome::Delivered
            })
            .collect())
    }
}

/// Deliver a batch and count acknowledgments. Partial or total transport
/// failure lowers `delivered`; it is never an error.
pub async fn notify_all(
    notifier: &dyn Notifier,
    messages: &[OutboundMessage],
    timeout: Duration,
) -> DeliveryReport {
    let attempted = messages.len();
    if attempted == 0 {
        return DeliveryReport::default();
    }

    let delivered = match call_with_timeout(SERVICE, timeout, notifier.deliver(messages)).await {
        Ok(outcomes) => {
            for (message, outcome) in messages.iter().zip(&outcomes) {
                if let DeliveryOutcome::Failed(reason) = outcome {
                    warn!(contact = %message.contact, %reason, "notification not delivered");
                }
            }
            outcomes
                .iter()
                .take(attempted)
                .filter(|outcome| **outcome == DeliveryOutcome::Delivered)
                .count()
        }
        Err(err) => {
            warn!(error = %err, attempted, "notification batch failed");
            0
        }
    };

    DeliveryReport {
        attempted,
        delivered,
    }
}
