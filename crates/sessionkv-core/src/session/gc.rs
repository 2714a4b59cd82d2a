use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::SessionProvider;
use crate::config::GcConfig;

/// Run `garbage_collect` every `interval` on a background task.
///
/// The first pass happens one interval after spawning. Abort the returned
/// handle to stop it.
pub fn spawn_garbage_collector(
    provider: Arc<dyn SessionProvider>,
    interval: Duration,
    max_lifetime: Duration,
) -> JoinHandle<()> {
    info!(
        "Session GC every {}s (max lifetime {}s)",
        interval.as_secs(),
        max_lifetime.as_secs()
    );
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = provider.garbage_collect(max_lifetime).await;
            debug!("Session GC pass done, {} removed", removed);
        }
    })
}

/// Spawn the collector described by `config`, if enabled.
pub fn spawn_from_config(
    provider: Arc<dyn SessionProvider>,
    config: &GcConfig,
) -> Option<JoinHandle<()>> {
    if !config.enabled || config.interval_secs == 0 {
        return None;
    }
    Some(spawn_garbage_collector(
        provider,
        Duration::from_secs(config.interval_secs),
        Duration::from_secs(config.max_lifetime_secs),
    ))
}
