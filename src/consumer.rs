//! NATS message consumer for incoming scoring events

use crate::types::transaction::ScoringEvent;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use tracing::{error, info};

/// Consumer for receiving scoring events from NATS
pub struct EventConsumer {
    client: Client,
    subject: String,
}

impl EventConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transaction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.subject))?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Connect for the optional streaming lane.
///
/// A failed connection is logged and yields `None`; the caller keeps serving
/// HTTP without the lane.
pub async fn connect_optional(url: &str) -> Option<Client> {
    match async_nats::connect(url).await {
        Ok(client) => {
            info!("Connected to NATS at {}", url);
            Some(client)
        }
        Err(e) => {
            error!(url = %url, error = %e, "Failed to connect to NATS; serving HTTP only");
            None
        }
    }
}

/// Decode a message payload into a scoring event
pub fn decode_event(payload: &[u8]) -> Result<ScoringEvent> {
    serde_json::from_slice(payload).context("Malformed scoring event")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event() {
        let payload = br#"{
            "transaction_id": "tx_000000000042",
            "amount": 1500.0,
            "hour": 2,
            "country_novelty": 1,
            "device_novelty": 1,
            "user_velocity_60s": 6
        }"#;

        let event = decode_event(payload).unwrap();

        assert_eq!(event.transaction_id, "tx_000000000042");
        assert_eq!(event.record.user_velocity_60s, 6);
    }

    #[tokio::test]
    async fn test_unreachable_server_disables_lane() {
        assert!(connect_optional("nats://127.0.0.1:1").await.is_none());
    }

    #[test]
    fn test_decode_rejects_incomplete_event() {
        assert!(decode_event(br#"{"transaction_id": "tx_1", "amount": 10.0}"#).is_err());
        assert!(decode_event(b"not json").is_err());
    }
}
