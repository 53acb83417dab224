mod bootstrap;
mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use attendance_bot::router::{WATCHDOG_FIRST, WATCHDOG_INTERVAL};
use attendance_bot::{Router, TelegramGateway};
use attendance_browser::WebDriverLauncher;
use attendance_core::settings::{Command, Settings};
use attendance_core::store::{JsonRecordStore, RecordStore};
use attendance_runtime::events::event_channel;
use attendance_runtime::registry::MonitorRegistry;
use tokio::sync::mpsc;

/// Buffer between the Telegram poller and the router.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::ensure_directories(&settings.data_dir())?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("attendance-watch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Portal: {}, WebDriver: {}, refresh every {}s",
        settings.portal_url,
        settings.webdriver_url,
        settings.refresh_interval
    );

    match settings.run_command() {
        Command::Bot => run_bot(&settings).await,
        Command::Watch { users } => watch::run(&settings, &users).await,
    }
}

async fn run_bot(settings: &Settings) -> Result<()> {
    let token = settings
        .bot_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN is not set")?;
    let admin = settings.admin();
    if admin.is_none() {
        tracing::warn!("ADMIN_TELEGRAM_ID not set; admin features disabled");
    }

    let store = Arc::new(JsonRecordStore::open(&settings.data_dir())?);
    for account in store.reset_monitoring_flags()? {
        tracing::info!(
            account = account.telegram_id,
            username = %account.username,
            "reset stale monitoring flag"
        );
    }

    let launcher = Arc::new(WebDriverLauncher::new(
        &settings.webdriver_url,
        !settings.headed,
    ));
    let (event_tx, event_rx) = event_channel();
    let registry = Arc::new(MonitorRegistry::new(
        launcher,
        event_tx,
        settings.portal_url.clone(),
        settings.timings(),
    ));

    let gateway = TelegramGateway::new(&token);
    let router = Arc::new(Router::new(
        store,
        Arc::clone(&registry),
        Arc::new(gateway.clone()),
        admin,
    ));

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

    let poller = gateway.spawn_poller(inbound_tx, cancel_rx.clone());
    let inbound = tokio::spawn(Arc::clone(&router).run_inbound(inbound_rx));
    let events = tokio::spawn(Arc::clone(&router).run_events(event_rx));
    let watchdog = tokio::spawn(Arc::clone(&router).run_watchdog(
        WATCHDOG_FIRST,
        WATCHDOG_INTERVAL,
        cancel_rx,
    ));

    tracing::info!("Bot started. Polling...");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Ctrl+C received; stopping all monitors");
        }
        _ = inbound => {
            tracing::warn!("inbound handler exited");
        }
    }

    cancel_tx.send_replace(true);
    registry.stop_all().await;
    let _ = poller.await;
    let _ = watchdog.await;
    // Monitors share the event sender with the registry, so the pump only
    // ends when aborted.
    events.abort();

    Ok(())
}
