use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::dao::{
    profile_store::{ProfileStore, StoreSlot},
    storage::StorageError,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a remote profile store installed in `slot`, falling back to degraded
/// mode while it is unreachable. Never returns.
pub async fn run<F, Fut>(slot: StoreSlot, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ProfileStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                slot.install(store.clone()).await;
                info!("profile store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&slot, store.as_ref()).await;

                slot.clear().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "profile store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll `store` until it stays unreachable after every reconnect attempt.
async fn watch_health(slot: &StoreSlot, store: &dyn ProfileStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if slot.is_degraded() {
                    info!("profile store healthy again; leaving degraded mode");
                    slot.set_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "profile store health check failed");
                if !reconnect(slot, store).await {
                    warn!("exhausted profile store reconnect attempts; staying in degraded mode");
                    return;
                }
                slot.set_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(slot: &StoreSlot, store: &dyn ProfileStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "profile store reconnected after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "profile store reconnect first attempt failed; entering degraded mode"
                    );
                    slot.set_degraded(true);
                } else {
                    warn!(attempt, error = %err, "profile store reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::profile_store::MemoryProfileStore;

    #[tokio::test(start_paused = true)]
    async fn outage_enters_and_leaves_degraded_mode() {
        let slot = StoreSlot::new();
        let backend = MemoryProfileStore::new();
        let connector = backend.clone();
        let supervisor = tokio::spawn(run(slot.clone(), move || {
            let store: Arc<dyn ProfileStore> = Arc::new(connector.clone());
            async move { Ok::<_, StorageError>(store) }
        }));

        sleep(Duration::from_millis(10)).await;
        assert!(!slot.is_degraded());

        backend.set_offline(true);
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(slot.is_degraded());

        backend.set_offline(false);
        sleep(INITIAL_DELAY + Duration::from_millis(10)).await;
        assert!(!slot.is_degraded());

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_keep_the_slot_empty() {
        let slot = StoreSlot::new();
        let supervisor = tokio::spawn(run(slot.clone(), || async {
            Err::<Arc<dyn ProfileStore>, _>(StorageError::unavailable(
                "refused".into(),
                std::io::Error::other("refused"),
            ))
        }));

        sleep(Duration::from_secs(30)).await;
        assert!(slot.is_degraded());
        assert!(slot.current().await.is_none());

        supervisor.abort();
    }
}
