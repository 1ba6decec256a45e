use anyhow::Result;
use std::sync::Arc;
use tokio::signal;

use lib_dashboard::ingestors::{DemoGenerator, FallbackPoller, SocketFeed};
use lib_dashboard::loggers::setup_logging;
use lib_dashboard::retrieve::ApiClient;
use lib_dashboard::DashboardRuntime;

mod feed_logic;
use feed_logic::config::{self, FeedSource};
use feed_logic::summary;

async fn wait_for_shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings = config::load_config()?;
    setup_logging("dashboard_feed", &settings.log_dir, &settings.log_level)?;

    let runtime = DashboardRuntime::new();
    runtime.set_filter(settings.filter.clone());

    match settings.source {
        FeedSource::Demo => {
            log::info!("Starting in demo mode (tick every {:?}).", settings.generator.tick_period);
            runtime.attach(Arc::new(DemoGenerator::new(settings.generator.clone())));
        }
        FeedSource::Live => {
            log::info!("Starting live feed from {}.", settings.socket.url);
            runtime.attach(Arc::new(SocketFeed::new(settings.socket.clone())));
        }
    }

    if let Some(api_url) = &settings.api_url {
        let client = ApiClient::new(api_url)?;
        runtime.attach(Arc::new(FallbackPoller::new(client, settings.polling.clone())));
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let summary_handle = tokio::spawn(summary::run(
        runtime.store().clone(),
        runtime.notifications().clone(),
        settings.summary_interval,
        shutdown_tx.subscribe(),
    ));

    wait_for_shutdown_signal().await;

    let _ = shutdown_tx.send(());
    let _ = summary_handle.await;
    runtime.shutdown().await;

    print!(
        "{}",
        summary::render_summary(&runtime.store().snapshot(), &runtime.notifications().visible())
    );
    log::info!("Shutdown complete.");
    Ok(())
}
