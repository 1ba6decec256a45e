//! # Dashboard State Store
//!
//! The canonical in-memory state behind the dashboard: current metrics, the
//! sales series, the alert list, the activity feed, connection status and the
//! filter selection.
//!
//! ## Mutation model
//! All changes go through [`DashboardState::apply`], a reducer taking one
//! [`StoreAction`]. [`StateStore`] wraps the state in a `tokio::sync::watch`
//! channel and applies each action inside `send_modify`, so a mutation is a
//! single non-preemptible step: readers see the state before or after it,
//! never half of it. Watchers are woken after every applied action.
//!
//! ## Bounds
//! - sales: oldest first, newest [`SALES_HISTORY_CAP`] kept (FIFO eviction);
//! - activity: newest first, first [`ACTIVITY_HISTORY_CAP`] kept;
//! - alerts: newest first, first [`ALERT_HISTORY_CAP`] kept.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::model::{
    ActivityEvent, DashboardFilter, InventoryAlert, MetricSnapshot, SalesPoint,
};

/// Maximum number of sales points retained.
pub const SALES_HISTORY_CAP: usize = 100;
/// Maximum number of activity events retained.
pub const ACTIVITY_HISTORY_CAP: usize = 50;
/// Maximum number of inventory alerts retained.
pub const ALERT_HISTORY_CAP: usize = 100;

/// Transport status as shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Whether a source is currently delivering data.
    pub is_connected: bool,
    /// Time of the last data mutation.
    pub last_update: Option<DateTime<Utc>>,
}

/// One mutation of the dashboard state.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    /// Replace the metric snapshot wholesale.
    SetMetrics(MetricSnapshot),
    /// Append one sales point.
    AppendSale(SalesPoint),
    /// Prepend one activity event.
    PushActivity(ActivityEvent),
    /// Prepend one inventory alert.
    PushAlert(InventoryAlert),
    /// Replace the sales series (oldest first).
    ReplaceSales(Vec<SalesPoint>),
    /// Replace the activity feed (newest first).
    ReplaceActivity(Vec<ActivityEvent>),
    /// Replace the alert list (newest first).
    ReplaceAlerts(Vec<InventoryAlert>),
    /// Update the connection flag.
    SetConnected(bool),
    /// Update the filter selection.
    SetFilter(DashboardFilter),
}

/// Snapshot of everything the dashboard renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    /// Latest metrics, `None` until the first update.
    pub metrics: Option<MetricSnapshot>,
    /// Sales series in arrival order.
    pub sales: VecDeque<SalesPoint>,
    /// Inventory alerts, newest first.
    pub alerts: VecDeque<InventoryAlert>,
    /// Activity feed, newest first.
    pub activity: VecDeque<ActivityEvent>,
    /// Transport status.
    pub connection: ConnectionState,
    /// Current filter selection.
    pub filter: DashboardFilter,
    /// Number of actions applied so far.
    pub revision: u64,
}

fn push_newest_first<T>(list: &mut VecDeque<T>, item: T, cap: usize) {
    list.push_front(item);
    list.truncate(cap);
}

fn keep_newest_last<T>(items: Vec<T>, cap: usize) -> VecDeque<T> {
    let mut list = VecDeque::from(items);
    while list.len() > cap {
        list.pop_front();
    }
    list
}

fn keep_newest_first<T>(items: Vec<T>, cap: usize) -> VecDeque<T> {
    let mut list = VecDeque::from(items);
    list.truncate(cap);
    list
}

impl DashboardState {
    /// Folds one action into the state. Data actions refresh `last_update`
    /// to `now`; connection and filter changes do not.
    pub fn apply(&mut self, action: StoreAction, now: DateTime<Utc>) {
        let touches_data = !matches!(action, StoreAction::SetConnected(_) | StoreAction::SetFilter(_));

        match action {
            StoreAction::SetMetrics(metrics) => self.metrics = Some(metrics),
            StoreAction::AppendSale(point) => {
                self.sales.push_back(point);
                while self.sales.len() > SALES_HISTORY_CAP {
                    self.sales.pop_front();
                }
            }
            StoreAction::PushActivity(event) => {
                push_newest_first(&mut self.activity, event, ACTIVITY_HISTORY_CAP)
            }
            StoreAction::PushAlert(alert) => {
                push_newest_first(&mut self.alerts, alert, ALERT_HISTORY_CAP)
            }
            StoreAction::ReplaceSales(points) => {
                self.sales = keep_newest_last(points, SALES_HISTORY_CAP)
            }
            StoreAction::ReplaceActivity(events) => {
                self.activity = keep_newest_first(events, ACTIVITY_HISTORY_CAP)
            }
            StoreAction::ReplaceAlerts(alerts) => {
                self.alerts = keep_newest_first(alerts, ALERT_HISTORY_CAP)
            }
            StoreAction::SetConnected(connected) => self.connection.is_connected = connected,
            StoreAction::SetFilter(filter) => self.filter = filter,
        }

        if touches_data {
            self.connection.last_update = Some(now);
        }
        self.revision += 1;
    }
}

/// Shared handle to the dashboard state. Cloning is cheap; all clones see the
/// same state.
#[derive(Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<DashboardState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// An empty store.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(DashboardState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Applies one action atomically and wakes watchers.
    pub(crate) fn apply(&self, action: StoreAction) {
        let now = Utc::now();
        self.tx.send_modify(|state| state.apply(action, now));
    }

    /// A consistent copy of the current state.
    pub fn snapshot(&self) -> DashboardState {
        self.tx.borrow().clone()
    }

    /// Runs `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&DashboardState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// A receiver that is notified after every applied action.
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.tx.subscribe()
    }
}
