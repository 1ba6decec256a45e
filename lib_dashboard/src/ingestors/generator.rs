//! # Demo Data Generator
//!
//! Produces a plausible stream of dashboard events without any backend.
//!
//! On the first `start` it marks the feed live, seeds a short sales history,
//! emits one metric update and then ticks every `tick_period`. Each tick makes
//! four independent draws, so several events can come out of one tick:
//!
//! | event             | default probability |
//! |-------------------|---------------------|
//! | `metric_update`   | 0.3                 |
//! | `new_order`       | 0.4                 |
//! | `user_activity`   | 0.7                 |
//! | `inventory_alert` | 0.1                 |
//!
//! A running generator is a singleton emitter: further `start` calls only add
//! sinks. `stop` cancels the tick task and drops every sink.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::core::source::{EventSource, FeedEvent, FeedSender, FeedSinks, LinkEvent, Snapshot};
use crate::model::wire::{DashboardEvent, Envelope, OrderPayload};
use crate::model::{
    ActivityEvent, ActivityKind, InventoryAlert, MetricSnapshot, SalesPoint, Severity,
    ALERT_THRESHOLD,
};

/// Shortest tick period honoured; `tokio::time::interval` rejects zero.
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

const SALES_CATEGORIES: &[&str] = &["Electronics", "Clothing", "Fitness", "Accessories", "Home"];
const ORDER_CATEGORIES: &[&str] = &["Electronics", "Clothing", "Fitness"];
const SEARCH_TERMS: &[&str] = &["headphones", "laptop", "t-shirt", "water bottle", "gaming mouse"];
const CLICKED_PRODUCTS: &[&str] = &[
    "Wireless Headphones",
    "Gaming Laptop",
    "Cotton T-Shirt",
    "Smart Watch",
    "Bluetooth Speaker",
];
const PAGES: &[&str] = &["Home", "Products", "Category/Electronics", "Cart", "Checkout"];
const LOW_STOCK_PRODUCTS: &[&str] = &[
    "Wireless Bluetooth Headphones",
    "Gaming Mouse",
    "Smart Water Bottle",
    "Premium Laptop Stand",
    "Wireless Keyboard",
];

/// Tuning for the demo generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Time between ticks.
    pub tick_period: Duration,
    /// Chance of a metric update per tick.
    pub metric_probability: f64,
    /// Chance of a new order per tick.
    pub order_probability: f64,
    /// Chance of a user activity event per tick.
    pub activity_probability: f64,
    /// Chance of an inventory alert per tick.
    pub alert_probability: f64,
    /// Sales points emitted as a history snapshot on start; 0 disables seeding.
    pub seed_history: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(3),
            metric_probability: 0.3,
            order_probability: 0.4,
            activity_probability: 0.7,
            alert_probability: 0.1,
            seed_history: 12,
        }
    }
}

/// `random_bool` panics outside `[0, 1]`.
fn probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn pick<'a, R: Rng>(rng: &mut R, list: &[&'a str]) -> &'a str {
    list.choose(rng).copied().unwrap_or_default()
}

fn token<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[derive(Default)]
struct GeneratorState {
    sinks: FeedSinks,
    ticker: Option<CancellationToken>,
}

struct GeneratorInner {
    config: GeneratorConfig,
    rng: Mutex<StdRng>,
    state: Mutex<GeneratorState>,
}

/// Random event source for demo mode. Cloning yields another handle to the
/// same generator.
#[derive(Clone)]
pub struct DemoGenerator {
    inner: Arc<GeneratorInner>,
}

impl DemoGenerator {
    /// A generator seeded from the OS.
    pub fn new(config: GeneratorConfig) -> Self {
        Self::from_rng(config, StdRng::from_os_rng())
    }

    /// A reproducible generator.
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Self {
        Self::from_rng(config, StdRng::seed_from_u64(seed))
    }

    fn from_rng(config: GeneratorConfig, rng: StdRng) -> Self {
        Self {
            inner: Arc::new(GeneratorInner {
                config,
                rng: Mutex::new(rng),
                state: Mutex::new(GeneratorState::default()),
            }),
        }
    }

    /// True while the tick task is scheduled.
    pub fn is_running(&self) -> bool {
        self.inner.state().ticker.is_some()
    }

    /// Headline metrics: each field is a base value plus bounded jitter,
    /// clamped to its domain.
    pub fn generate_metrics(&self) -> MetricSnapshot {
        let mut rng = self.inner.rng();
        let live_users = (150 + rng.random_range(-25..25_i64)).max(0) as u64;
        let total_orders = (85 + rng.random_range(-10..10_i64)).max(0) as u64;
        let revenue = (12_500.0 + rng.random_range(-1000.0..1000.0_f64)).max(0.0);
        let conversion_rate = (0.025 + rng.random_range(-0.01..0.01_f64)).clamp(0.0, 1.0);
        let average_order_value = (147.5 + rng.random_range(-20.0..20.0_f64)).max(0.0);

        MetricSnapshot {
            live_users,
            total_orders,
            revenue,
            conversion_rate,
            average_order_value,
        }
    }

    /// One sales point for seeding the chart.
    pub fn generate_sales_point(&self) -> SalesPoint {
        let mut rng = self.inner.rng();
        SalesPoint {
            timestamp: Utc::now(),
            sales: rng.random_range(100.0..600.0),
            orders: rng.random_range(1..=5),
            category: Some(pick(&mut *rng, SALES_CATEGORIES).to_string()),
        }
    }

    /// A `new_order` payload.
    pub fn generate_order(&self) -> OrderPayload {
        let mut rng = self.inner.rng();
        OrderPayload {
            id: format!("order_{}", token(&mut *rng, 8)),
            total_amount: rng.random_range(50.0..350.0),
            category: Some(pick(&mut *rng, ORDER_CATEGORIES).to_string()),
        }
    }

    /// A shopper action with metadata for its kind only.
    pub fn generate_activity(&self) -> ActivityEvent {
        let mut rng = self.inner.rng();
        let rng = &mut *rng;
        let kind = match rng.random_range(0..5) {
            0 => ActivityKind::PageView {
                page: pick(rng, PAGES).to_string(),
            },
            1 => ActivityKind::ProductClick {
                product_name: pick(rng, CLICKED_PRODUCTS).to_string(),
                product_id: format!("prod_{}", token(rng, 6)),
            },
            2 => ActivityKind::Search {
                query: pick(rng, SEARCH_TERMS).to_string(),
            },
            3 => ActivityKind::AddToCart {
                product_name: pick(rng, CLICKED_PRODUCTS).to_string(),
                product_id: format!("prod_{}", token(rng, 6)),
            },
            _ => ActivityKind::CheckoutStart,
        };

        ActivityEvent {
            id: format!("activity_{}", token(rng, 10)),
            user_id: format!("user_{}", token(rng, 8)),
            session_id: format!("session_{}", token(rng, 10)),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// A low-stock alert with stock in `[1, 10]`.
    pub fn generate_alert(&self) -> InventoryAlert {
        let mut rng = self.inner.rng();
        let current_stock = rng.random_range(1..=10);
        InventoryAlert {
            id: format!("alert_{}", token(&mut *rng, 10)),
            product_id: format!("prod_{}", token(&mut *rng, 6)),
            product_name: pick(&mut *rng, LOW_STOCK_PRODUCTS).to_string(),
            current_stock,
            threshold: ALERT_THRESHOLD,
            severity: Severity::for_stock(current_stock),
            created_at: Utc::now(),
        }
    }

    /// The events of one tick.
    pub fn tick(&self) -> Vec<FeedEvent> {
        let config = &self.inner.config;
        let (metric, order, activity, alert) = {
            let mut rng = self.inner.rng();
            (
                rng.random_bool(probability(config.metric_probability)),
                rng.random_bool(probability(config.order_probability)),
                rng.random_bool(probability(config.activity_probability)),
                rng.random_bool(probability(config.alert_probability)),
            )
        };

        let mut events = Vec::new();
        if metric {
            events.push(DashboardEvent::MetricUpdate(self.generate_metrics()));
        }
        if order {
            events.push(DashboardEvent::NewOrder(self.generate_order()));
        }
        if activity {
            events.push(DashboardEvent::UserActivity(self.generate_activity()));
        }
        if alert {
            events.push(DashboardEvent::InventoryAlert(self.generate_alert()));
        }
        events
            .into_iter()
            .map(|event| FeedEvent::Message(Envelope::now(event)))
            .collect()
    }

    fn opening_events(&self) -> Vec<FeedEvent> {
        let mut events = vec![FeedEvent::Link(LinkEvent::DemoStarted)];
        if self.inner.config.seed_history > 0 {
            let now = Utc::now();
            let period = chrono::Duration::from_std(self.inner.config.tick_period)
                .unwrap_or_else(|_| chrono::Duration::seconds(3));
            let count = self.inner.config.seed_history;
            let history = (0..count)
                .map(|i| {
                    let mut point = self.generate_sales_point();
                    point.timestamp = now - period * (count - i) as i32;
                    point
                })
                .collect();
            events.push(FeedEvent::Snapshot(Snapshot::Sales(history)));
        }
        events.push(FeedEvent::Message(Envelope::now(DashboardEvent::MetricUpdate(
            self.generate_metrics(),
        ))));
        events
    }
}

impl GeneratorInner {
    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> MutexGuard<'_, GeneratorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits only while `ticker` is still the live tick token.
    fn emit(&self, ticker: &CancellationToken, events: Vec<FeedEvent>) {
        let mut state = self.state();
        if ticker.is_cancelled() {
            return;
        }
        for event in events {
            state.sinks.broadcast(event);
        }
    }
}

impl EventSource for DemoGenerator {
    fn name(&self) -> &'static str {
        "demo-generator"
    }

    fn start(&self, sink: FeedSender) {
        let mut state = self.inner.state();
        state.sinks.push(sink);
        if state.ticker.is_some() {
            log::debug!("Demo generator already running; sink registered.");
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::error!("Demo generator needs a tokio runtime to schedule ticks.");
            return;
        };

        for event in self.opening_events() {
            state.sinks.broadcast(event);
        }

        let ticker = CancellationToken::new();
        state.ticker = Some(ticker.clone());
        drop(state);

        let generator = self.clone();
        let period = self.inner.config.tick_period.max(MIN_TICK_PERIOD);
        log::info!("Demo generator started (tick every {:?}).", period);

        handle.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.cancelled() => break,
                    _ = interval.tick() => {
                        let events = generator.tick();
                        generator.inner.emit(&ticker, events);
                    }
                }
            }
            log::debug!("Demo generator tick task finished.");
        });
    }

    fn stop(&self) {
        let mut state = self.inner.state();
        if let Some(ticker) = state.ticker.take() {
            ticker.cancel();
            state.sinks.broadcast(FeedEvent::Link(LinkEvent::Disconnected));
            log::info!("Demo generator stopped.");
        }
        state.sinks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn quiet_config() -> GeneratorConfig {
        GeneratorConfig {
            seed_history: 0,
            ..GeneratorConfig::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<FeedEvent>) -> Vec<FeedEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn generated_values_stay_in_their_domains() {
        let generator = DemoGenerator::with_seed(GeneratorConfig::default(), 7);
        for _ in 0..500 {
            let m = generator.generate_metrics();
            assert!((125..175).contains(&m.live_users));
            assert!((0.015..0.035).contains(&m.conversion_rate));
            assert!(m.revenue >= 11_500.0 && m.revenue < 13_500.0);

            let alert = generator.generate_alert();
            assert!((1..=10).contains(&alert.current_stock));
            assert_eq!(alert.threshold, 20);
            assert_eq!(alert.severity == Severity::Critical, alert.current_stock <= 3);

            let order = generator.generate_order();
            assert!(order.total_amount >= 50.0 && order.total_amount < 350.0);
        }
    }

    #[test]
    fn activity_metadata_matches_its_kind() {
        let generator = DemoGenerator::with_seed(GeneratorConfig::default(), 11);
        for _ in 0..200 {
            match generator.generate_activity().kind {
                ActivityKind::Search { query } => assert!(SEARCH_TERMS.contains(&query.as_str())),
                ActivityKind::PageView { page } => assert!(PAGES.contains(&page.as_str())),
                ActivityKind::ProductClick { product_id, .. }
                | ActivityKind::AddToCart { product_id, .. } => {
                    assert!(product_id.starts_with("prod_"))
                }
                ActivityKind::CheckoutStart => {}
            }
        }
    }

    #[test]
    fn certain_probabilities_emit_all_four_kinds_in_one_tick() {
        let config = GeneratorConfig {
            metric_probability: 1.0,
            order_probability: 1.0,
            activity_probability: 1.0,
            alert_probability: 1.0,
            ..quiet_config()
        };
        let events = DemoGenerator::with_seed(config, 1).tick();
        assert_eq!(events.len(), 4);

        let silent = GeneratorConfig {
            metric_probability: 0.0,
            order_probability: 0.0,
            activity_probability: 0.0,
            alert_probability: f64::NAN,
            ..quiet_config()
        };
        assert!(DemoGenerator::with_seed(silent, 1).tick().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_emits_opening_metrics_then_ticks() {
        let config = GeneratorConfig {
            metric_probability: 1.0,
            order_probability: 0.0,
            activity_probability: 0.0,
            alert_probability: 0.0,
            ..quiet_config()
        };
        let generator = DemoGenerator::with_seed(config, 3);
        let (tx, mut rx) = mpsc::unbounded_channel();
        generator.start(tx);

        let opening = drain(&mut rx);
        assert_eq!(opening.len(), 2);
        assert_eq!(opening[0], FeedEvent::Link(LinkEvent::DemoStarted));
        assert!(matches!(
            &opening[1],
            FeedEvent::Message(Envelope { event: DashboardEvent::MetricUpdate(_), .. })
        ));

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(drain(&mut rx).len(), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(drain(&mut rx).len(), 1);
        generator.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_period_still_ticks() {
        let config = GeneratorConfig {
            tick_period: Duration::ZERO,
            metric_probability: 1.0,
            order_probability: 0.0,
            activity_probability: 0.0,
            alert_probability: 0.0,
            ..quiet_config()
        };
        let generator = DemoGenerator::with_seed(config, 11);
        let (tx, mut rx) = mpsc::unbounded_channel();
        generator.start(tx);
        assert_eq!(drain(&mut rx).len(), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(generator.is_running());
        assert!(!drain(&mut rx).is_empty());

        generator.stop();
        assert!(!generator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_does_not_schedule_again() {
        let config = GeneratorConfig {
            metric_probability: 1.0,
            order_probability: 0.0,
            activity_probability: 0.0,
            alert_probability: 0.0,
            ..quiet_config()
        };
        let generator = DemoGenerator::with_seed(config, 5);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        generator.start(tx1);
        generator.start(tx2);
        assert_eq!(drain(&mut rx1).len(), 2);
        assert!(drain(&mut rx2).is_empty());

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        generator.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_ticks() {
        let generator = DemoGenerator::with_seed(quiet_config(), 9);
        generator.stop();

        let (tx, mut rx) = mpsc::unbounded_channel();
        generator.start(tx);
        assert!(generator.is_running());
        generator.stop();
        generator.stop();
        assert!(!generator.is_running());

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&FeedEvent::Link(LinkEvent::Disconnected)));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn seeded_history_arrives_as_a_sales_snapshot() {
        let config = GeneratorConfig {
            seed_history: 4,
            ..GeneratorConfig::default()
        };
        let generator = DemoGenerator::with_seed(config, 13);
        let (tx, mut rx) = mpsc::unbounded_channel();
        generator.start(tx);
        let opening = drain(&mut rx);
        generator.stop();

        let FeedEvent::Snapshot(Snapshot::Sales(points)) = &opening[1] else {
            panic!("expected seeded sales history");
        };
        assert_eq!(points.len(), 4);
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}
