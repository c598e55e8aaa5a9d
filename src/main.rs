//! Quiz Arena Back binary entrypoint wiring REST, WebSocket and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_arena_back::{
    config::AppConfig,
    dao::{game_store::memory::InMemoryGameStore, models::SeedData},
    routes,
    services::auth::StaticTokenProvider,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let identity = Arc::new(StaticTokenProvider::from_config(&config.auth));
    let app_state = AppState::new(config, identity);

    start_storage(&app_state).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Use MongoDB when `MONGO_URI` is set, otherwise an in-memory store seeded from the config.
async fn start_storage(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        if env::var_os("MONGO_URI").is_some() {
            use quiz_arena_back::{
                dao::{
                    game_store::{
                        GameStore,
                        mongodb::{MongoConfig, MongoGameStore},
                    },
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            info!("MONGO_URI set; supervising MongoDB storage");
            tokio::spawn(storage_supervisor::run(state.clone(), || async {
                let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
                let store = MongoGameStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
            }));
            return;
        }
    }

    let store = match state.config().seed_path.as_deref() {
        Some(path) => match SeedData::load(path) {
            Ok(seed) => InMemoryGameStore::from_seed(seed),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load seed; starting empty");
                InMemoryGameStore::new()
            }
        },
        None => {
            info!("no seed configured; starting with an empty in-memory store");
            InMemoryGameStore::new()
        }
    };
    state.install_game_store(Arc::new(store)).await;
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
