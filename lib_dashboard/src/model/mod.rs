//! # Dashboard Domain Model
//!
//! The entities the state store holds and the view layer reads: metric
//! snapshots, sales points, user-activity events, inventory alerts and
//! transient notifications.
//!
//! Field names serialize in camelCase so the JSON produced here is the same
//! shape the dashboard backend emits and the REST surface returns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Inbound/outbound message envelopes and payload decoding.
pub mod wire;

use wire::{timestamp, WireError};

/// Fixed reference stock level carried by every inventory alert.
pub const ALERT_THRESHOLD: u32 = 20;
/// Stock at or below this level is `critical`, above it `low`.
pub const CRITICAL_STOCK_LEVEL: u32 = 3;

/// Maps a producer-supplied number into `[0, inf)`; NaN and infinities become 0.
pub(crate) fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

pub(crate) fn generated_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

// --- Metrics ---

/// Headline numbers shown on the metric cards. Replaced wholesale on every update.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawMetrics")]
pub struct MetricSnapshot {
    /// Users currently on the storefront.
    pub live_users: u64,
    /// Orders placed in the current window.
    pub total_orders: u64,
    /// Revenue in the current window.
    pub revenue: f64,
    /// Fraction in `[0, 1]`. Display layers multiply by 100.
    pub conversion_rate: f64,
    /// Revenue divided by orders.
    pub average_order_value: f64,
}

/// Lenient decoding shape: every field required, read as a float and clamped on conversion.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetrics {
    live_users: f64,
    total_orders: f64,
    revenue: f64,
    conversion_rate: f64,
    average_order_value: f64,
}

impl From<RawMetrics> for MetricSnapshot {
    fn from(raw: RawMetrics) -> Self {
        let rate = if raw.conversion_rate.is_finite() {
            raw.conversion_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            live_users: non_negative(raw.live_users).round() as u64,
            total_orders: non_negative(raw.total_orders).round() as u64,
            revenue: non_negative(raw.revenue),
            conversion_rate: rate,
            average_order_value: non_negative(raw.average_order_value),
        }
    }
}

impl MetricSnapshot {
    /// Conversion rate as a percentage, for display.
    pub fn conversion_percent(&self) -> f64 {
        self.conversion_rate * 100.0
    }
}

// --- Sales ---

/// One point of the sales time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesPoint {
    /// When the sale was recorded. Serialized as RFC 3339.
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    /// Sales amount.
    pub sales: f64,
    /// Number of orders this point stands for.
    pub orders: u32,
    /// Product category, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// --- User activity ---

/// What a shopper did. Each variant carries only the metadata legal for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityKind {
    /// A page was opened.
    PageView {
        /// Page name, e.g. `Category/Electronics`.
        page: String,
    },
    /// A product tile was clicked.
    ProductClick {
        /// Display name of the product.
        product_name: String,
        /// Catalogue id of the product.
        product_id: String,
    },
    /// A search was submitted.
    Search {
        /// The search terms.
        query: String,
    },
    /// A product was added to the cart.
    AddToCart {
        /// Display name of the product.
        product_name: String,
        /// Catalogue id of the product.
        product_id: String,
    },
    /// Checkout was opened.
    CheckoutStart,
}

impl ActivityKind {
    /// The wire discriminator, e.g. `add_to_cart`.
    pub fn event_type(&self) -> &'static str {
        match self {
            ActivityKind::PageView { .. } => "page_view",
            ActivityKind::ProductClick { .. } => "product_click",
            ActivityKind::Search { .. } => "search",
            ActivityKind::AddToCart { .. } => "add_to_cart",
            ActivityKind::CheckoutStart => "checkout_start",
        }
    }

    fn from_parts(event_type: &str, metadata: &Map<String, Value>) -> Result<Self, WireError> {
        let field = |key: &'static str| -> Result<String, WireError> {
            match metadata.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(WireError::MissingField(key)),
            }
        };
        Ok(match event_type {
            "page_view" => ActivityKind::PageView { page: field("page")? },
            "product_click" => ActivityKind::ProductClick {
                product_name: field("productName")?,
                product_id: field("productId")?,
            },
            "search" => ActivityKind::Search { query: field("query")? },
            "add_to_cart" => ActivityKind::AddToCart {
                product_name: field("productName")?,
                product_id: field("productId")?,
            },
            "checkout_start" => ActivityKind::CheckoutStart,
            other => return Err(WireError::UnknownActivity(other.to_string())),
        })
    }

    fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            ActivityKind::PageView { page } => {
                map.insert("page".into(), Value::String(page.clone()));
            }
            ActivityKind::Search { query } => {
                map.insert("query".into(), Value::String(query.clone()));
            }
            ActivityKind::ProductClick { product_name, product_id }
            | ActivityKind::AddToCart { product_name, product_id } => {
                map.insert("productName".into(), Value::String(product_name.clone()));
                map.insert("productId".into(), Value::String(product_id.clone()));
            }
            ActivityKind::CheckoutStart => {}
        }
        map
    }
}

/// A single shopper action shown in the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawActivity", into = "RawActivity")]
pub struct ActivityEvent {
    /// Unique event id.
    pub id: String,
    /// Shopper id.
    pub user_id: String,
    /// Browsing session id.
    pub session_id: String,
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// The action and its metadata.
    pub kind: ActivityKind,
}

/// Wire shape of an activity event: `eventType` plus an open metadata map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawActivity {
    #[serde(default)]
    id: Option<String>,
    user_id: String,
    session_id: String,
    event_type: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl RawActivity {
    /// Builds the typed event, filling a missing id and timestamp.
    pub(crate) fn into_event(self, fallback: DateTime<Utc>) -> Result<ActivityEvent, WireError> {
        let kind = ActivityKind::from_parts(&self.event_type, &self.metadata)?;
        Ok(ActivityEvent {
            id: self.id.unwrap_or_else(|| generated_id("activity")),
            user_id: self.user_id,
            session_id: self.session_id,
            timestamp: self.timestamp.unwrap_or(fallback),
            kind,
        })
    }
}

impl TryFrom<RawActivity> for ActivityEvent {
    type Error = WireError;

    fn try_from(raw: RawActivity) -> Result<Self, Self::Error> {
        raw.into_event(Utc::now())
    }
}

impl From<ActivityEvent> for RawActivity {
    fn from(event: ActivityEvent) -> Self {
        RawActivity {
            id: Some(event.id),
            user_id: event.user_id,
            session_id: event.session_id,
            event_type: event.kind.event_type().to_string(),
            timestamp: Some(event.timestamp),
            metadata: event.kind.metadata(),
        }
    }
}

// --- Inventory ---

/// How urgent an inventory alert is. Set by the producer, never recomputed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Below threshold.
    Low,
    /// Nearly sold out.
    Critical,
}

impl Severity {
    /// Severity rule used by producers: `critical` at or below [`CRITICAL_STOCK_LEVEL`].
    pub fn for_stock(current_stock: u32) -> Self {
        if current_stock <= CRITICAL_STOCK_LEVEL {
            Severity::Critical
        } else {
            Severity::Low
        }
    }
}

/// A low-stock warning for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawAlert")]
pub struct InventoryAlert {
    /// Unique alert id.
    pub id: String,
    /// Catalogue id of the product.
    pub product_id: String,
    /// Display name of the product.
    pub product_name: String,
    /// Units left.
    pub current_stock: u32,
    /// Reference level the stock is compared against.
    pub threshold: u32,
    /// Urgency as decided by the producer.
    pub severity: Severity,
    /// When the alert was raised.
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawAlert {
    #[serde(default)]
    id: Option<String>,
    product_id: String,
    product_name: String,
    current_stock: u32,
    #[serde(default = "default_threshold")]
    threshold: u32,
    severity: Severity,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    created_at: Option<DateTime<Utc>>,
}

fn default_threshold() -> u32 {
    ALERT_THRESHOLD
}

impl RawAlert {
    /// Builds the alert, filling the server-assigned id and creation time when absent.
    pub(crate) fn into_alert(self, fallback: DateTime<Utc>) -> InventoryAlert {
        InventoryAlert {
            id: self.id.unwrap_or_else(|| generated_id("alert")),
            product_id: self.product_id,
            product_name: self.product_name,
            current_stock: self.current_stock,
            threshold: self.threshold,
            severity: self.severity,
            created_at: self.created_at.unwrap_or(fallback),
        }
    }
}

impl From<RawAlert> for InventoryAlert {
    fn from(raw: RawAlert) -> Self {
        raw.into_alert(Utc::now())
    }
}

// --- Notifications ---

/// Visual category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Neutral information.
    Info,
    /// Something went well.
    Success,
    /// Needs attention.
    Warning,
    /// Something failed.
    Error,
}

/// A notification as stored in the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique id assigned by the queue.
    pub id: String,
    /// Visual category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
    /// When the queue accepted it.
    pub created_at: DateTime<Utc>,
    /// Auto-removal delay, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A notification before the queue assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    /// Visual category.
    pub kind: NotificationKind,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Auto-removal delay, if any.
    pub duration_ms: Option<u64>,
}

impl NewNotification {
    /// A notification of the given kind that stays until removed.
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            duration_ms: None,
        }
    }

    /// Shorthand for an `info` notification.
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, title, message)
    }

    /// Shorthand for a `success` notification.
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, title, message)
    }

    /// Shorthand for a `warning` notification.
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, title, message)
    }

    /// Shorthand for an `error` notification.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, message)
    }

    /// Removes the notification automatically after `duration_ms`.
    pub fn lasting(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

// --- Filters ---

/// Window of the sales chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    /// Last hour.
    #[serde(rename = "1h")]
    Hour,
    /// Last 24 hours.
    #[default]
    #[serde(rename = "24h")]
    Day,
    /// Last 7 days.
    #[serde(rename = "7d")]
    Week,
    /// Last 30 days.
    #[serde(rename = "30d")]
    Month,
}

impl TimeRange {
    /// Query-string form, e.g. `24h`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeRange::Hour),
            "24h" => Ok(TimeRange::Day),
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            other => Err(format!("unknown time range '{}', expected 1h, 24h, 7d or 30d", other)),
        }
    }
}

/// The user's current dashboard filter selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilter {
    /// Sales chart window.
    pub time_range: TimeRange,
    /// Selected category, `None` for all.
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metrics_are_clamped_into_their_domain() {
        let m: MetricSnapshot = serde_json::from_value(json!({
            "liveUsers": -4,
            "totalOrders": 85.4,
            "revenue": -10.0,
            "conversionRate": 2.5,
            "averageOrderValue": 147.5
        }))
        .unwrap();
        assert_eq!(m.live_users, 0);
        assert_eq!(m.total_orders, 85);
        assert_eq!(m.revenue, 0.0);
        assert_eq!(m.conversion_rate, 1.0);
        assert_eq!(m.average_order_value, 147.5);
    }

    #[test]
    fn metrics_missing_a_field_are_rejected() {
        assert!(serde_json::from_value::<MetricSnapshot>(json!({})).is_err());
        assert!(serde_json::from_value::<MetricSnapshot>(json!({
            "liveUsers": 150,
            "totalOrders": 85,
            "revenue": 12500.0,
            "conversionRate": 0.025
        }))
        .is_err());
    }

    #[test]
    fn activity_metadata_is_typed_by_event_kind() {
        let event: ActivityEvent = serde_json::from_value(json!({
            "id": "activity_1",
            "userId": "user_a",
            "sessionId": "session_a",
            "eventType": "add_to_cart",
            "timestamp": "2024-05-01T10:00:00Z",
            "metadata": { "productName": "Smart Watch", "productId": "prod_9" }
        }))
        .unwrap();
        assert_eq!(
            event.kind,
            ActivityKind::AddToCart {
                product_name: "Smart Watch".into(),
                product_id: "prod_9".into()
            }
        );

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["eventType"], "add_to_cart");
        assert_eq!(back["metadata"]["productId"], "prod_9");
    }

    #[test]
    fn activity_missing_metadata_is_rejected() {
        let res = serde_json::from_value::<ActivityEvent>(json!({
            "userId": "u", "sessionId": "s", "eventType": "search", "metadata": {}
        }));
        assert!(res.is_err());
    }

    #[test]
    fn alert_accepts_payload_without_server_fields() {
        let alert: InventoryAlert = serde_json::from_value(json!({
            "productId": "prod_1",
            "productName": "Gaming Mouse",
            "currentStock": 2,
            "threshold": 20,
            "severity": "critical"
        }))
        .unwrap();
        assert!(alert.id.starts_with("alert_"));
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn severity_rule_splits_at_three_units() {
        assert_eq!(Severity::for_stock(1), Severity::Critical);
        assert_eq!(Severity::for_stock(3), Severity::Critical);
        assert_eq!(Severity::for_stock(4), Severity::Low);
    }

    #[test]
    fn time_range_parses_query_form() {
        assert_eq!("7d".parse::<TimeRange>().unwrap(), TimeRange::Week);
        assert!("2w".parse::<TimeRange>().is_err());
        assert_eq!(serde_json::to_value(TimeRange::Day).unwrap(), json!("24h"));
    }
}
