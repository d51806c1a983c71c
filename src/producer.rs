//! NATS message producer for scoring decisions

use crate::types::score::ScoreDecision;
use anyhow::Result;
use async_nats::Client;
use tracing::debug;

/// Producer for publishing scoring decisions to NATS
#[derive(Clone)]
pub struct DecisionProducer {
    client: Client,
    subject: String,
    publish_all: bool,
}

impl DecisionProducer {
    pub fn new(client: Client, subject: &str, publish_all: bool) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            publish_all,
        }
    }

    /// Publish a decision if it passes the publish filter.
    ///
    /// Returns whether anything was sent.
    pub async fn publish(&self, decision: &ScoreDecision) -> Result<bool> {
        if !should_publish(decision, self.publish_all) {
            return Ok(false);
        }
        let payload = serde_json::to_vec(decision)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            decision_id = %decision.decision_id,
            transaction_id = %decision.transaction_id,
            fraud_probability = decision.result.fraud_probability,
            "Published decision"
        );

        Ok(true)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Flagged or escalated decisions are always published; the rest only with
/// `publish_all`.
pub fn should_publish(decision: &ScoreDecision, publish_all: bool) -> bool {
    publish_all || decision.is_flagged()
}
