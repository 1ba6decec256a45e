use colored::Colorize;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::sync::broadcast;

use lib_dashboard::core::store::DashboardState;
use lib_dashboard::model::{Notification, NotificationKind, Severity};
use lib_dashboard::{NotificationQueue, StateStore};

/// Renders the dashboard state as a short multi-line console block.
pub fn render_summary(state: &DashboardState, visible: &[Notification]) -> String {
    let mut out = String::new();

    let status = if state.connection.is_connected {
        "CONNECTED".green().bold()
    } else {
        "DISCONNECTED".red().bold()
    };
    let last_update = state
        .connection
        .last_update
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let _ = writeln!(
        out,
        "[{}] last update {} | range {}{}",
        status,
        last_update,
        state.filter.time_range,
        state
            .filter
            .category
            .as_deref()
            .map(|c| format!(" / {}", c))
            .unwrap_or_default()
    );

    match &state.metrics {
        Some(m) => {
            let _ = writeln!(
                out,
                "  users {} | orders {} | revenue ${:.2} | conversion {:.2}% | avg order ${:.2}",
                m.live_users,
                m.total_orders,
                m.revenue,
                m.conversion_percent(),
                m.average_order_value
            );
        }
        None => {
            let _ = writeln!(out, "  {}", "no metrics yet".dimmed());
        }
    }

    let latest_sale = state
        .sales
        .back()
        .map(|p| format!(" (latest ${:.2})", p.sales))
        .unwrap_or_default();
    let critical = state
        .alerts
        .iter()
        .filter(|a| a.severity == Severity::Critical)
        .count();
    let _ = writeln!(
        out,
        "  sales {} pts{} | activity {} | alerts {} ({} critical)",
        state.sales.len(),
        latest_sale,
        state.activity.len(),
        state.alerts.len(),
        critical
    );

    for note in visible {
        let title = match note.kind {
            NotificationKind::Success => note.title.green(),
            NotificationKind::Info => note.title.blue(),
            NotificationKind::Warning => note.title.yellow(),
            NotificationKind::Error => note.title.red(),
        };
        let _ = writeln!(out, "  * {}: {}", title, note.message);
    }

    out
}

/// Prints a summary every `every` until shutdown is signalled.
pub async fn run(
    store: StateStore,
    notifications: NotificationQueue,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Summary printer received shutdown signal.");
                break;
            }
            _ = ticker.tick() => {
                let state = store.snapshot();
                print!("{}", render_summary(&state, &notifications.visible()));
                log::debug!(
                    "State revision {}: {} sales, {} activity, {} alerts.",
                    state.revision,
                    state.sales.len(),
                    state.activity.len(),
                    state.alerts.len()
                );
            }
        }
    }
}
