//! AMQP message definitions and serialization

use crate::error::{LadderError, Result};
use crate::types::LadderEvent;
use serde_json;

/// Default exchange for ladder events
pub const LADDER_EVENTS_EXCHANGE: &str = "ladder.events";

/// Routing keys for events
pub const MATCH_CREATED_ROUTING_KEY: &str = "match.created";
pub const MATCH_REPORTED_ROUTING_KEY: &str = "match.reported";
pub const MATCH_CANCELLED_ROUTING_KEY: &str = "match.cancelled";
pub const RATING_PERIOD_CLOSED_ROUTING_KEY: &str = "rating.period_closed";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope with a random correlation id
    pub fn new(payload: T, routing_key: String) -> Self {
        Self::with_correlation_id(payload, routing_key, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_correlation_id(payload: T, routing_key: String, correlation_id: String) -> Self {
        Self {
            payload,
            correlation_id,
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            LadderError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            LadderError::InternalError {
                message: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Routing key for an event
pub fn routing_key(event: &LadderEvent) -> &'static str {
    match event {
        LadderEvent::MatchCreated(_) => MATCH_CREATED_ROUTING_KEY,
        LadderEvent::MatchReported(_) => MATCH_REPORTED_ROUTING_KEY,
        LadderEvent::MatchCancelled(_) => MATCH_CANCELLED_ROUTING_KEY,
        LadderEvent::RatingPeriodClosed(_) => RATING_PERIOD_CLOSED_ROUTING_KEY,
    }
}

/// Stable identity of an event; the same logical event always maps to the same key
pub fn event_key(event: &LadderEvent) -> String {
    match event {
        LadderEvent::MatchCreated(e) => format!("{}:{}", MATCH_CREATED_ROUTING_KEY, e.match_id),
        LadderEvent::MatchReported(e) => format!("{}:{}", MATCH_REPORTED_ROUTING_KEY, e.match_id),
        LadderEvent::MatchCancelled(e) => {
            format!("{}:{}", MATCH_CANCELLED_ROUTING_KEY, e.match_id)
        }
        LadderEvent::RatingPeriodClosed(e) => format!(
            "{}:{}",
            RATING_PERIOD_CLOSED_ROUTING_KEY,
            e.period_start.timestamp()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchCancelled, ParticipantId, RatingPeriodClosed};
    use crate::utils::{current_timestamp, generate_match_id};

    fn create_test_cancelled_event() -> LadderEvent {
        LadderEvent::MatchCancelled(MatchCancelled {
            match_id: generate_match_id(),
            participant_a: ParticipantId::new(1, "ryu"),
            participant_b: ParticipantId::new(2, "ken"),
            timestamp: current_timestamp(),
        })
    }

    #[test]
    fn test_message_envelope_creation() {
        let event = create_test_cancelled_event();
        let envelope = MessageEnvelope::new(event, MATCH_CANCELLED_ROUTING_KEY.to_string());

        assert_eq!(envelope.routing_key, "match.cancelled");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_envelope_payload_is_tagged() {
        let envelope = MessageEnvelope::new(
            create_test_cancelled_event(),
            MATCH_CANCELLED_ROUTING_KEY.to_string(),
        );
        let bytes = envelope.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["payload"]["type"], "MatchCancelled");
        assert_eq!(json["payload"]["participant_a"]["character"], "ryu");

        let decoded = MessageEnvelope::<LadderEvent>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.correlation_id, envelope.correlation_id);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(MessageEnvelope::<LadderEvent>::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_routing_key_generation() {
        assert_eq!(
            routing_key(&create_test_cancelled_event()),
            MATCH_CANCELLED_ROUTING_KEY
        );

        let closed = LadderEvent::RatingPeriodClosed(RatingPeriodClosed {
            period_start: current_timestamp(),
            records_inflated: 3,
            timestamp: current_timestamp(),
        });
        assert_eq!(routing_key(&closed), "rating.period_closed");
    }

    #[test]
    fn test_event_key_is_stable_per_event() {
        let event = create_test_cancelled_event();
        let LadderEvent::MatchCancelled(cancelled) = &event else {
            unreachable!()
        };

        assert_eq!(event_key(&event), event_key(&event.clone()));
        assert_eq!(
            event_key(&event),
            format!("match.cancelled:{}", cancelled.match_id)
        );
        assert_ne!(event_key(&event), event_key(&create_test_cancelled_event()));
    }
}
