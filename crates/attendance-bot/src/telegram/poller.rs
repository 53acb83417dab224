//! Long-polling loop for Telegram Bot API `getUpdates`.
//!
//! Converts updates into [`Inbound`] values and forwards them through a
//! channel. Routing and access control happen downstream in the router.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::gateway::Inbound;

use super::api::TelegramApi;

const MAX_BACKOFF_SECS: u64 = 60;

/// Run the long-polling loop until `cancel` fires or the receiver is gone.
pub async fn poll_loop(
    api: Arc<TelegramApi>,
    poll_timeout: u64,
    inbound_tx: mpsc::Sender<Inbound>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut offset: Option<i64> = None;
    let mut backoff_secs = 1u64;

    info!("Telegram poller started");

    loop {
        if *cancel.borrow() {
            info!("Telegram poller shutting down");
            return;
        }

        let updates = tokio::select! {
            result = api.get_updates(offset, poll_timeout) => result,
            _ = cancel.changed() => {
                info!("Telegram poller cancelled");
                return;
            }
        };

        match updates {
            Ok(updates) => {
                backoff_secs = 1;

                for update in updates {
                    // Advance offset to acknowledge this update
                    offset = Some(update.update_id + 1);
                    let update_id = update.update_id;

                    let Some(inbound) = update.into_inbound() else {
                        debug!(update_id, "ignoring update without text or data");
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        warn!("inbound channel closed, stopping poller");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, backoff_secs, "getUpdates failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                    _ = cancel.changed() => {
                        info!("Telegram poller cancelled");
                        return;
                    }
                }
                backoff_secs = next_backoff(backoff_secs);
            }
        }
    }
}

fn next_backoff(current: u64) -> u64 {
    (current * 2).min(MAX_BACKOFF_SECS)
}
