//! # Wire Format
//!
//! Inbound messages are JSON envelopes `{ type, payload, timestamp }`; the same
//! shape arrives over the WebSocket and is produced by the demo generator.
//! Decoding happens in two stages so a broken payload and an unknown `type`
//! can be told apart: the envelope is read first, then the payload is decoded
//! according to its kind.
//!
//! The only outbound message is `subscribe`, carrying the current filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{
    DashboardFilter, InventoryAlert, MetricSnapshot, RawActivity, RawAlert, TimeRange,
    ActivityEvent,
};

/// Errors raised while decoding an inbound message.
#[derive(Debug, Error)]
pub enum WireError {
    /// The text is not JSON or the envelope lacks a `type`.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload does not match the shape its kind requires.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Message kind whose payload failed.
        kind: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A required metadata field is absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// An activity `eventType` outside the known five.
    #[error("unknown activity type '{0}'")]
    UnknownActivity(String),

    /// A timestamp that is neither RFC 3339 nor epoch milliseconds.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Payload of a `new_order` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    /// Order id.
    pub id: String,
    /// Order total.
    pub total_amount: f64,
    /// Category of the ordered product.
    #[serde(default)]
    pub category: Option<String>,
}

/// A decoded inbound message body.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    /// `metric_update`: replaces the metric snapshot.
    MetricUpdate(MetricSnapshot),
    /// `new_order`: becomes one sales point.
    NewOrder(OrderPayload),
    /// `user_activity`: prepended to the activity feed.
    UserActivity(ActivityEvent),
    /// `inventory_alert`: prepended to the alert list.
    InventoryAlert(InventoryAlert),
}

impl DashboardEvent {
    /// The wire discriminator of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardEvent::MetricUpdate(_) => "metric_update",
            DashboardEvent::NewOrder(_) => "new_order",
            DashboardEvent::UserActivity(_) => "user_activity",
            DashboardEvent::InventoryAlert(_) => "inventory_alert",
        }
    }
}

/// An event together with the producer's timestamp, if one was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The decoded body.
    pub event: DashboardEvent,
    /// Producer timestamp.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Wraps an event stamped with the current time.
    pub fn now(event: DashboardEvent) -> Self {
        Self {
            event,
            timestamp: Some(Utc::now()),
        }
    }
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed message of a known kind.
    Event(Envelope),
    /// A well-formed envelope whose `type` is not handled here.
    Unknown(String),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    timestamp: Value,
}

#[derive(Clone, Copy)]
enum InboundKind {
    MetricUpdate,
    NewOrder,
    UserActivity,
    InventoryAlert,
}

fn payload<T: serde::de::DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, WireError> {
    serde_json::from_value(value).map_err(|source| WireError::InvalidPayload { kind, source })
}

/// Decodes one inbound text frame.
///
/// Server-assigned fields (`id`, `createdAt`, activity `timestamp`) that are
/// absent from the payload are filled from the envelope timestamp, or the
/// current time when the envelope carries none.
pub fn decode_message(text: &str) -> Result<Decoded, WireError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let kind = match raw.kind.as_str() {
        "metric_update" => InboundKind::MetricUpdate,
        "new_order" => InboundKind::NewOrder,
        "user_activity" => InboundKind::UserActivity,
        "inventory_alert" => InboundKind::InventoryAlert,
        _ => return Ok(Decoded::Unknown(raw.kind)),
    };

    let stamped = timestamp::from_value(&raw.timestamp)?;
    let fallback = stamped.unwrap_or_else(Utc::now);

    let event = match kind {
        InboundKind::MetricUpdate => {
            DashboardEvent::MetricUpdate(payload("metric_update", raw.payload)?)
        }
        InboundKind::NewOrder => DashboardEvent::NewOrder(payload("new_order", raw.payload)?),
        InboundKind::UserActivity => {
            let activity: RawActivity = payload("user_activity", raw.payload)?;
            DashboardEvent::UserActivity(activity.into_event(fallback)?)
        }
        InboundKind::InventoryAlert => {
            let alert: RawAlert = payload("inventory_alert", raw.payload)?;
            DashboardEvent::InventoryAlert(alert.into_alert(fallback))
        }
    };

    Ok(Decoded::Event(Envelope {
        event,
        timestamp: stamped,
    }))
}

/// Messages the client sends to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Asks the backend to stream data for the given filter.
    Subscribe {
        /// Sales window.
        #[serde(rename = "timeRange")]
        time_range: TimeRange,
        /// Category, `null` for all.
        category: Option<String>,
    },
}

impl OutboundMessage {
    /// The `subscribe` message for a filter selection.
    pub fn subscribe(filter: &DashboardFilter) -> Self {
        OutboundMessage::Subscribe {
            time_range: filter.time_range,
            category: filter.category.clone(),
        }
    }
}

/// Timestamps arrive as RFC 3339 strings or as epoch milliseconds.
pub mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::WireError;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Millis(i64),
        Fractional(f64),
        Text(String),
    }

    fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms).single()
    }

    fn resolve(raw: Flexible) -> Result<DateTime<Utc>, String> {
        match raw {
            Flexible::Millis(ms) => from_millis(ms).ok_or_else(|| ms.to_string()),
            Flexible::Fractional(ms) if ms.is_finite() => {
                from_millis(ms as i64).ok_or_else(|| ms.to_string())
            }
            Flexible::Fractional(ms) => Err(ms.to_string()),
            Flexible::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| text),
        }
    }

    /// Reads an optional timestamp out of a JSON value; `null` is `None`.
    pub fn from_value(value: &Value) -> Result<Option<DateTime<Utc>>, WireError> {
        if value.is_null() {
            return Ok(None);
        }
        let raw = Flexible::deserialize(value)
            .map_err(|_| WireError::InvalidTimestamp(value.to_string()))?;
        resolve(raw).map(Some).map_err(WireError::InvalidTimestamp)
    }

    /// `deserialize_with` helper for required timestamps.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Flexible::deserialize(deserializer)?;
        resolve(raw).map_err(|bad| serde::de::Error::custom(format!("invalid timestamp: {}", bad)))
    }

    /// `deserialize_with` helper for optional timestamps. Use together with `#[serde(default)]`.
    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Flexible>::deserialize(deserializer)? {
            Some(raw) => resolve(raw)
                .map(Some)
                .map_err(|bad| serde::de::Error::custom(format!("invalid timestamp: {}", bad))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityKind, Severity};
    use serde_json::json;

    #[test]
    fn decodes_new_order_with_epoch_timestamp() {
        let text = json!({
            "type": "new_order",
            "payload": { "id": "o1", "totalAmount": 150.0, "category": "Electronics" },
            "timestamp": 1_714_557_600_000_i64
        })
        .to_string();

        let Decoded::Event(env) = decode_message(&text).unwrap() else {
            panic!("expected an event");
        };
        assert_eq!(env.timestamp.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(
            env.event,
            DashboardEvent::NewOrder(OrderPayload {
                id: "o1".into(),
                total_amount: 150.0,
                category: Some("Electronics".into()),
            })
        );
    }

    #[test]
    fn activity_without_id_or_time_takes_envelope_values() {
        let text = json!({
            "type": "user_activity",
            "payload": {
                "userId": "u1", "sessionId": "s1", "eventType": "search",
                "metadata": { "query": "laptop" }
            },
            "timestamp": "2024-05-01T10:00:00Z"
        })
        .to_string();

        let Decoded::Event(env) = decode_message(&text).unwrap() else {
            panic!("expected an event");
        };
        let DashboardEvent::UserActivity(activity) = env.event else {
            panic!("expected user activity");
        };
        assert!(activity.id.starts_with("activity_"));
        assert_eq!(activity.timestamp, env.timestamp.unwrap());
        assert_eq!(activity.kind, ActivityKind::Search { query: "laptop".into() });
    }

    #[test]
    fn alert_payload_keeps_producer_severity() {
        let text = json!({
            "type": "inventory_alert",
            "payload": {
                "id": "alert_1", "productId": "p", "productName": "Gaming Mouse",
                "currentStock": 9, "threshold": 20, "severity": "critical",
                "createdAt": "2024-05-01T10:00:00Z"
            }
        })
        .to_string();

        let Decoded::Event(env) = decode_message(&text).unwrap() else {
            panic!("expected an event");
        };
        let DashboardEvent::InventoryAlert(alert) = env.event else {
            panic!("expected an alert");
        };
        assert_eq!(alert.id, "alert_1");
        assert_eq!(alert.severity, Severity::Critical);
        assert!(env.timestamp.is_none());
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let decoded = decode_message(r#"{"type":"price_drop","payload":{}}"#).unwrap();
        assert_eq!(decoded, Decoded::Unknown("price_drop".into()));
    }

    #[test]
    fn malformed_input_is_reported() {
        assert!(matches!(decode_message("not json"), Err(WireError::Json(_))));
        assert!(matches!(
            decode_message(r#"{"type":"new_order","payload":{"id":"o1"}}"#),
            Err(WireError::InvalidPayload { kind: "new_order", .. })
        ));
        assert!(matches!(
            decode_message(r#"{"type":"new_order","payload":{"id":"o1","totalAmount":5.0},"timestamp":"yesterday"}"#),
            Err(WireError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn metric_update_without_fields_is_invalid() {
        assert!(matches!(
            decode_message(r#"{"type":"metric_update","payload":{}}"#),
            Err(WireError::InvalidPayload { kind: "metric_update", .. })
        ));
        assert!(matches!(
            decode_message(r#"{"type":"metric_update","payload":{"users":"typo"}}"#),
            Err(WireError::InvalidPayload { kind: "metric_update", .. })
        ));
    }

    #[test]
    fn unknown_kind_ignores_its_timestamp() {
        let decoded = decode_message(r#"{"type":"price_drop","payload":{},"timestamp":"yesterday"}"#).unwrap();
        assert_eq!(decoded, Decoded::Unknown("price_drop".into()));
    }

    #[test]
    fn subscribe_message_shape() {
        let filter = DashboardFilter {
            time_range: TimeRange::Week,
            category: None,
        };
        let value = serde_json::to_value(OutboundMessage::subscribe(&filter)).unwrap();
        assert_eq!(
            value,
            json!({ "type": "subscribe", "payload": { "timeRange": "7d", "category": null } })
        );
    }
}
