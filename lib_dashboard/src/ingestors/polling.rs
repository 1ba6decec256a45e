//! # Fallback REST Poller
//!
//! A self-scheduling source that refreshes whole collections from the REST
//! surface, independently of the live stream. Each resource has its own
//! cadence:
//!
//! | resource  | endpoint                    | default period |
//! |-----------|-----------------------------|----------------|
//! | metrics   | `/api/metrics`              | 30s            |
//! | sales     | `/api/sales?range=<range>`  | 60s            |
//! | alerts    | `/api/inventory/alerts`     | 120s           |
//! | activity  | `/api/user-activity`        | 30s            |
//!
//! Every loop polls once right away, then on its period. Results are emitted
//! as [`Snapshot`]s; failures are logged and the loop carries on. A filter
//! change refetches sales at once with the new range.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::source::{EventSource, FeedEvent, FeedSender, FeedSinks, Snapshot};
use crate::model::{DashboardFilter, TimeRange};
use crate::retrieve::api_client::{ApiClient, ApiError};

/// Refresh periods of the fallback poller.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Period of `GET /api/metrics`.
    pub metrics_every: Duration,
    /// Period of `GET /api/sales`.
    pub sales_every: Duration,
    /// Period of `GET /api/inventory/alerts`.
    pub alerts_every: Duration,
    /// Period of `GET /api/user-activity`.
    pub activity_every: Duration,
    /// Restricts activity to one user.
    pub user_id: Option<String>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            metrics_every: Duration::from_secs(30),
            sales_every: Duration::from_secs(60),
            alerts_every: Duration::from_secs(120),
            activity_every: Duration::from_secs(30),
            user_id: None,
        }
    }
}

/// A collection the poller refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Headline metrics.
    Metrics,
    /// Sales history for the current range.
    Sales,
    /// Inventory alerts.
    Alerts,
    /// Recent user activity.
    Activity,
}

impl Resource {
    const ALL: [Resource; 4] = [
        Resource::Metrics,
        Resource::Sales,
        Resource::Alerts,
        Resource::Activity,
    ];

    fn label(self) -> &'static str {
        match self {
            Resource::Metrics => "metrics",
            Resource::Sales => "sales",
            Resource::Alerts => "alerts",
            Resource::Activity => "activity",
        }
    }
}

#[derive(Default)]
struct PollerState {
    sinks: FeedSinks,
    token: Option<CancellationToken>,
    range: TimeRange,
}

struct PollerInner {
    client: ApiClient,
    config: PollingConfig,
    state: Mutex<PollerState>,
    sales_changed: Notify,
}

/// Periodic REST refresh source.
#[derive(Clone)]
pub struct FallbackPoller {
    inner: Arc<PollerInner>,
}

impl FallbackPoller {
    /// A stopped poller using `client`.
    pub fn new(client: ApiClient, config: PollingConfig) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                client,
                config,
                state: Mutex::new(PollerState::default()),
                sales_changed: Notify::new(),
            }),
        }
    }

    /// True while the poll loops are scheduled.
    pub fn is_running(&self) -> bool {
        self.inner.state().token.is_some()
    }

    /// The range used for the next sales poll.
    pub fn time_range(&self) -> TimeRange {
        self.inner.state().range
    }

    /// Fetches one resource now.
    pub async fn fetch(&self, resource: Resource) -> Result<Snapshot, ApiError> {
        self.inner.fetch(resource).await
    }

    fn period(&self, resource: Resource) -> Duration {
        let config = &self.inner.config;
        match resource {
            Resource::Metrics => config.metrics_every,
            Resource::Sales => config.sales_every,
            Resource::Alerts => config.alerts_every,
            Resource::Activity => config.activity_every,
        }
    }
}

impl PollerInner {
    fn state(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch(&self, resource: Resource) -> Result<Snapshot, ApiError> {
        match resource {
            Resource::Metrics => self.client.get_metrics().await.map(Snapshot::Metrics),
            Resource::Sales => {
                let range = self.state().range;
                self.client.get_sales_data(range).await.map(Snapshot::Sales)
            }
            Resource::Alerts => self.client.get_inventory_alerts().await.map(Snapshot::Alerts),
            Resource::Activity => self
                .client
                .get_user_activity(self.config.user_id.as_deref())
                .await
                .map(Snapshot::Activity),
        }
    }

    fn emit(&self, token: &CancellationToken, snapshot: Snapshot) {
        let mut state = self.state();
        if !token.is_cancelled() {
            state.sinks.broadcast(FeedEvent::Snapshot(snapshot));
        }
    }

    async fn poll_loop(self: Arc<Self>, resource: Resource, period: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.sales_changed.notified(), if resource == Resource::Sales => {
                    interval.reset();
                }
            }

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.fetch(resource) => result,
            };
            match result {
                Ok(snapshot) => self.emit(&token, snapshot),
                Err(e) => log::warn!("Fallback poll of {} failed: {}", resource.label(), e),
            }
        }
        log::debug!("Fallback {} poll loop finished.", resource.label());
    }
}

impl EventSource for FallbackPoller {
    fn name(&self) -> &'static str {
        "rest-poller"
    }

    fn start(&self, sink: FeedSender) {
        let mut state = self.inner.state();
        state.sinks.push(sink);
        if state.token.is_some() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::error!("Fallback poller needs a tokio runtime to schedule polls.");
            return;
        };
        let token = CancellationToken::new();
        state.token = Some(token.clone());
        drop(state);

        log::info!("Fallback poller started against {}.", self.inner.client.base_url());
        for resource in Resource::ALL {
            let period = self.period(resource);
            handle.spawn(self.inner.clone().poll_loop(resource, period, token.child_token()));
        }
    }

    fn stop(&self) {
        let mut state = self.inner.state();
        if let Some(token) = state.token.take() {
            token.cancel();
            log::info!("Fallback poller stopped.");
        }
        state.sinks.clear();
    }

    fn on_filter_change(&self, filter: &DashboardFilter) {
        let running = {
            let mut state = self.inner.state();
            if state.range == filter.time_range {
                return;
            }
            state.range = filter.time_range;
            state.token.is_some()
        };
        if running {
            self.inner.sales_changed.notify_one();
        }
    }
}
