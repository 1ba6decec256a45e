//! # Dashboard Runtime
//!
//! Wires sources to the dispatcher. Every attached source shares one
//! unbounded channel; a single pump task drains it and calls the dispatcher,
//! so events from one source are applied strictly in arrival order.
//!
//! Shutdown stops every source (cancelling their ticks and reconnect timers),
//! closes the channel, lets the pump drain what was already queued and then
//! marks the connection down. After `shutdown` returns nothing mutates the
//! store any more. It is safe to call more than once.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::dispatcher::Dispatcher;
use crate::core::notifications::NotificationQueue;
use crate::core::source::{EventSource, FeedEvent, FeedReceiver, FeedSender, LinkEvent};
use crate::core::store::StateStore;
use crate::model::DashboardFilter;

/// Upper bound on waiting for the pump to drain during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct RuntimeParts {
    sender: Option<FeedSender>,
    pump: Option<JoinHandle<()>>,
    sources: Vec<Arc<dyn EventSource>>,
}

/// Owns the feed channel, the dispatch pump and the attached sources.
pub struct DashboardRuntime {
    dispatcher: Dispatcher,
    parts: Mutex<RuntimeParts>,
}

async fn pump(mut rx: FeedReceiver, dispatcher: Dispatcher) {
    while let Some(event) = rx.recv().await {
        dispatcher.dispatch(event);
    }
    log::debug!("Feed channel closed. Dispatch pump exiting.");
}

impl DashboardRuntime {
    /// A runtime with a fresh store and notification queue. Must be called
    /// from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_parts(StateStore::new(), NotificationQueue::new())
    }

    /// A runtime writing into existing handles.
    pub fn with_parts(store: StateStore, notifications: NotificationQueue) -> Self {
        let dispatcher = Dispatcher::new(store, notifications);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(pump(rx, dispatcher.clone()));

        Self {
            dispatcher,
            parts: Mutex::new(RuntimeParts {
                sender: Some(tx),
                pump: Some(handle),
                sources: Vec::new(),
            }),
        }
    }

    fn parts(&self) -> MutexGuard<'_, RuntimeParts> {
        self.parts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The dispatcher behind this runtime.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The dashboard state.
    pub fn store(&self) -> &StateStore {
        self.dispatcher.store()
    }

    /// The notification list.
    pub fn notifications(&self) -> &NotificationQueue {
        self.dispatcher.notifications()
    }

    /// A sender into the feed channel, `None` after shutdown.
    pub fn sender(&self) -> Option<FeedSender> {
        self.parts().sender.clone()
    }

    /// Starts `source` on this runtime's channel. Ignored after shutdown.
    pub fn attach(&self, source: Arc<dyn EventSource>) {
        let mut parts = self.parts();
        let Some(sender) = parts.sender.clone() else {
            log::warn!("Runtime is shut down; not attaching source '{}'.", source.name());
            return;
        };
        log::info!("Attaching event source '{}'.", source.name());
        source.on_filter_change(&self.store().read(|s| s.filter.clone()));
        source.start(sender);
        parts.sources.push(source);
    }

    /// Stops and forgets every attached source.
    pub fn detach_all(&self) {
        let sources = std::mem::take(&mut self.parts().sources);
        for source in sources {
            log::info!("Stopping event source '{}'.", source.name());
            source.stop();
        }
    }

    /// Records a filter change and forwards it to every source.
    pub fn set_filter(&self, filter: DashboardFilter) {
        self.dispatcher.set_filter(filter.clone());
        for source in self.parts().sources.iter() {
            source.on_filter_change(&filter);
        }
    }

    /// Stops all sources, drains queued events and marks the feed down.
    pub async fn shutdown(&self) {
        self.detach_all();

        let pump = {
            let mut parts = self.parts();
            parts.sender = None;
            parts.pump.take()
        };
        let Some(pump) = pump else {
            return;
        };

        match tokio::time::timeout(DRAIN_TIMEOUT, pump).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Dispatch pump ended abnormally: {}", e),
            Err(_) => log::warn!("Dispatch pump did not drain within {:?}.", DRAIN_TIMEOUT),
        }
        self.dispatcher.dispatch(FeedEvent::Link(LinkEvent::Disconnected));
        log::info!("Dashboard runtime shut down.");
    }
}
