//! Dart Live Back binary entrypoint wiring configuration, storage, the match
//! engine and the SSE/HTTP layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dart_live_back::{
    config::AppConfig,
    dao::match_store::{MatchStore, memory::InMemoryMatchStore},
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);
    let _workers = app_state.start();

    spawn_storage(app_state.clone());
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

/// Start the storage supervisor: MongoDB when configured, otherwise the in-memory store.
fn spawn_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    if let Some(mongo) = state.config().mongo.clone() {
        use dart_live_back::dao::{
            match_store::mongodb::{MongoConfig, MongoMatchStore},
            storage::StorageError,
        };

        info!(database = ?mongo.database, "using MongoDB match store");
        tokio::spawn(storage_supervisor::run(state, move || {
            let mongo = mongo.clone();
            async move {
                let config = MongoConfig::from_uri(&mongo.uri, mongo.database.as_deref()).await?;
                let store = MongoMatchStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
            }
        }));
        return;
    }

    #[cfg(not(feature = "mongo-store"))]
    if state.config().mongo.is_some() {
        warn!("MONGO_URI set but the mongo-store feature is disabled; using the in-memory store");
    }

    info!("using in-memory match store");
    tokio::spawn(storage_supervisor::run(state, || async {
        Ok(Arc::new(InMemoryMatchStore::new()) as Arc<dyn MatchStore>)
    }));
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
