//! CamBlaster sync daemon entrypoint wiring the profile store, local cache, audio, REST and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use camblaster_sync::{
    cache::{FileStorage, LocalCache},
    config::{AppConfig, CacheConfig, StoreBackend},
    dao::{
        profile_store::{MemoryProfileStore, StoreSlot},
        storage::StorageError,
    },
    routes,
    services::audio::{AudioConfig, AudioSubsystem, SseSoundSink},
    state::{self, AppState, SharedState, SseHub},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let cache = open_cache(&config.cache);
    let sse = SseHub::new(config.sse_capacity);
    let audio = AudioSubsystem::start(
        AudioConfig {
            muted: cache.muted(),
        },
        Arc::new(SseSoundSink::new(sse.clone())),
    );

    let slot = StoreSlot::new();
    let backend = config.store.backend;
    let app_state = AppState::new(config, slot.clone(), cache, audio.handle(), sse);

    tokio::spawn(state::forward_degraded_status(app_state.clone()));
    spawn_store_supervisor(backend, slot);

    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, backend = backend.as_str(), "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    info!("flushing pending profile writes");
    app_state.controller().lock().await.settle().await;
    audio.shutdown().await;

    Ok(())
}

/// Open the on-disk cache, starting over when the file is unreadable.
fn open_cache(config: &CacheConfig) -> LocalCache {
    let storage = match FileStorage::open(&config.path, config.quota_bytes) {
        Ok(storage) => storage,
        Err(err) => {
            warn!(
                path = %config.path.display(),
                error = %err,
                "local cache unreadable; starting with an empty cache"
            );
            FileStorage::empty(&config.path, config.quota_bytes)
        }
    };
    LocalCache::new(Arc::new(storage))
}

/// Connect the configured backend in the background; the daemon serves in
/// degraded mode until it is installed.
fn spawn_store_supervisor(backend: StoreBackend, slot: StoreSlot) {
    match backend {
        StoreBackend::Memory => {
            tokio::spawn(async move {
                slot.install(Arc::new(MemoryProfileStore::new())).await;
                info!("using in-memory profile store");
            });
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use camblaster_sync::{
                dao::profile_store::{
                    ProfileStore,
                    mongodb::{MongoConfig, MongoProfileStore},
                },
                services::storage_supervisor,
            };

            tokio::spawn(storage_supervisor::run(slot, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoProfileStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ProfileStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            use camblaster_sync::{
                dao::profile_store::{
                    ProfileStore,
                    couchdb::{CouchConfig, CouchProfileStore},
                },
                services::storage_supervisor,
            };

            tokio::spawn(storage_supervisor::run(slot, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchProfileStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ProfileStore>)
            }));
        }
        #[allow(unreachable_patterns)]
        other => warn!(
            backend = other.as_str(),
            "profile store backend not compiled in; running in degraded mode"
        ),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
